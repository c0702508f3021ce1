//! Reference data: categories, teams, projects, external contacts and their
//! types, and per-user dashboard charts.
//!
//! Every entity goes through the same generic operations. What differs per
//! type (input shape, view, who may write, who may see) lives in its
//! [`CatalogEntity`] impl.

use std::sync::Arc;

use bson::oid::ObjectId;
use bson::DateTime as BsonDateTime;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::models::{AuthenticatedUser, Role};
use crate::clock::Clock;
use crate::db::catalog_repository::{CatalogRecord, CatalogRepositories, CatalogRepository};
use crate::db::models::{Category, CustomChart, ExternalContact, ExternalContactType, Project, Team};
use crate::error::AppError;
use crate::services::validation::{
    optional_text, parse_object_id, parse_object_ids, validate_email, validate_name, validate_phone,
};

const CHART_TYPES: [&str; 4] = ["bar", "line", "pie", "table"];

pub trait CatalogEntity: CatalogRecord {
    /// Request body for create and update.
    type Input: DeserializeOwned + Send + 'static;
    type View: Serialize + From<Self> + Send + 'static;

    /// Human name used in messages.
    const LABEL: &'static str;
    /// Least role that may create, update or delete.
    const WRITE_ROLE: Role = Role::Admin;

    fn repository(repos: &CatalogRepositories) -> &Arc<dyn CatalogRepository<Self>>;

    fn build(
        input: Self::Input,
        actor: &AuthenticatedUser,
        now: BsonDateTime,
    ) -> Result<Self, AppError>;

    /// Overwrite the editable fields from `input`.
    fn apply(&mut self, input: Self::Input) -> Result<(), AppError>;

    /// Set for records only their owner (and admins) may see and change.
    fn owner(&self) -> Option<ObjectId> {
        None
    }
}

fn visible_to<T: CatalogEntity>(record: &T, user: &AuthenticatedUser) -> bool {
    match record.owner() {
        Some(owner) => owner == user.user_id || user.is_admin(),
        None => true,
    }
}

pub struct CatalogService<'a, T: CatalogEntity> {
    pub repo: &'a dyn CatalogRepository<T>,
    pub clock: &'a dyn Clock,
}

impl<T: CatalogEntity> CatalogService<'_, T> {
    async fn load(&self, user: &AuthenticatedUser, id: ObjectId) -> Result<T, AppError> {
        let record = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} not found", T::LABEL)))?;

        if !visible_to(&record, user) {
            tracing::warn!(
                user = %user.user_id,
                collection = T::COLLECTION,
                record = %id,
                "Denied: foreign record"
            );
            return Err(AppError::Authorization(format!(
                "You may not access this {}",
                T::LABEL.to_lowercase()
            )));
        }
        Ok(record)
    }

    pub async fn list(&self, user: &AuthenticatedUser) -> Result<Vec<T::View>, AppError> {
        let records = self.repo.list().await?;
        Ok(records
            .into_iter()
            .filter(|r| visible_to(r, user))
            .map(T::View::from)
            .collect())
    }

    pub async fn get(&self, user: &AuthenticatedUser, id: ObjectId) -> Result<T::View, AppError> {
        Ok(self.load(user, id).await?.into())
    }

    pub async fn create(
        &self,
        user: &AuthenticatedUser,
        input: T::Input,
    ) -> Result<T::View, AppError> {
        user.require(T::WRITE_ROLE)?;

        let record = T::build(input, user, BsonDateTime::from_chrono(self.clock.now()))?;
        let record = self.repo.insert(record).await?;

        tracing::info!(
            collection = T::COLLECTION,
            record = ?record.id(),
            by = %user.user_id,
            "Catalog record created"
        );
        Ok(record.into())
    }

    pub async fn update(
        &self,
        user: &AuthenticatedUser,
        id: ObjectId,
        input: T::Input,
    ) -> Result<T::View, AppError> {
        user.require(T::WRITE_ROLE)?;

        let mut record = self.load(user, id).await?;
        record.apply(input)?;
        self.repo.replace(&record).await?;
        Ok(record.into())
    }

    pub async fn delete(&self, user: &AuthenticatedUser, id: ObjectId) -> Result<(), AppError> {
        user.require(T::WRITE_ROLE)?;

        self.load(user, id).await?;
        if !self.repo.delete(id).await? {
            return Err(AppError::NotFound(format!("{} not found", T::LABEL)));
        }
        tracing::info!(
            collection = T::COLLECTION,
            record = %id,
            by = %user.user_id,
            "Catalog record deleted"
        );
        Ok(())
    }
}

fn hex(id: Option<ObjectId>) -> String {
    id.map(|id| id.to_hex()).unwrap_or_default()
}

fn optional_ref(raw: Option<&str>, what: &str) -> Result<Option<ObjectId>, AppError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => parse_object_id(value, what).map(Some),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInput {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<Category> for CategoryView {
    fn from(c: Category) -> Self {
        Self {
            id: hex(c.id),
            name: c.name,
            description: c.description,
            created_at: c.created_at.to_chrono(),
        }
    }
}

impl CatalogEntity for Category {
    type Input = CategoryInput;
    type View = CategoryView;
    const LABEL: &'static str = "Category";

    fn repository(repos: &CatalogRepositories) -> &Arc<dyn CatalogRepository<Self>> {
        &repos.categories
    }

    fn build(
        input: CategoryInput,
        _actor: &AuthenticatedUser,
        now: BsonDateTime,
    ) -> Result<Self, AppError> {
        let mut category = Category {
            id: None,
            name: String::new(),
            description: String::new(),
            created_at: now,
        };
        category.apply(input)?;
        Ok(category)
    }

    fn apply(&mut self, input: CategoryInput) -> Result<(), AppError> {
        self.name = validate_name(&input.name)?;
        self.description = optional_text(input.description).unwrap_or_default();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Teams
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamInput {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Team> for TeamView {
    fn from(t: Team) -> Self {
        Self {
            id: hex(t.id),
            name: t.name,
            description: t.description,
            members: t.members.iter().map(|id| id.to_hex()).collect(),
            created_at: t.created_at.to_chrono(),
        }
    }
}

impl CatalogEntity for Team {
    type Input = TeamInput;
    type View = TeamView;
    const LABEL: &'static str = "Team";

    fn repository(repos: &CatalogRepositories) -> &Arc<dyn CatalogRepository<Self>> {
        &repos.teams
    }

    fn build(
        input: TeamInput,
        _actor: &AuthenticatedUser,
        now: BsonDateTime,
    ) -> Result<Self, AppError> {
        let mut team = Team {
            id: None,
            name: String::new(),
            description: String::new(),
            members: vec![],
            created_at: now,
        };
        team.apply(input)?;
        Ok(team)
    }

    fn apply(&mut self, input: TeamInput) -> Result<(), AppError> {
        self.name = validate_name(&input.name)?;
        self.description = optional_text(input.description).unwrap_or_default();
        self.members = parse_object_ids(&input.members, "member")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInput {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub team: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub team: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Project> for ProjectView {
    fn from(p: Project) -> Self {
        Self {
            id: hex(p.id),
            name: p.name,
            description: p.description,
            team: p.team.map(|t| t.to_hex()),
            created_at: p.created_at.to_chrono(),
        }
    }
}

impl CatalogEntity for Project {
    type Input = ProjectInput;
    type View = ProjectView;
    const LABEL: &'static str = "Project";

    fn repository(repos: &CatalogRepositories) -> &Arc<dyn CatalogRepository<Self>> {
        &repos.projects
    }

    fn build(
        input: ProjectInput,
        _actor: &AuthenticatedUser,
        now: BsonDateTime,
    ) -> Result<Self, AppError> {
        let mut project = Project {
            id: None,
            name: String::new(),
            description: String::new(),
            team: None,
            created_at: now,
        };
        project.apply(input)?;
        Ok(project)
    }

    fn apply(&mut self, input: ProjectInput) -> Result<(), AppError> {
        self.name = validate_name(&input.name)?;
        self.description = optional_text(input.description).unwrap_or_default();
        self.team = optional_ref(input.team.as_deref(), "team")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// External contacts
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactTypeInput {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactTypeView {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<ExternalContactType> for ContactTypeView {
    fn from(t: ExternalContactType) -> Self {
        Self {
            id: hex(t.id),
            name: t.name,
            created_at: t.created_at.to_chrono(),
        }
    }
}

impl CatalogEntity for ExternalContactType {
    type Input = ContactTypeInput;
    type View = ContactTypeView;
    const LABEL: &'static str = "Contact type";

    fn repository(repos: &CatalogRepositories) -> &Arc<dyn CatalogRepository<Self>> {
        &repos.contact_types
    }

    fn build(
        input: ContactTypeInput,
        _actor: &AuthenticatedUser,
        now: BsonDateTime,
    ) -> Result<Self, AppError> {
        Ok(ExternalContactType {
            id: None,
            name: validate_name(&input.name)?,
            created_at: now,
        })
    }

    fn apply(&mut self, input: ContactTypeInput) -> Result<(), AppError> {
        self.name = validate_name(&input.name)?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInput {
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub organization: Option<String>,
    pub contact_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactView {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub organization: Option<String>,
    pub contact_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ExternalContact> for ContactView {
    fn from(c: ExternalContact) -> Self {
        Self {
            id: hex(c.id),
            name: c.name,
            email: c.email,
            phone: c.phone,
            organization: c.organization,
            contact_type: c.contact_type.map(|t| t.to_hex()),
            created_at: c.created_at.to_chrono(),
        }
    }
}

impl CatalogEntity for ExternalContact {
    type Input = ContactInput;
    type View = ContactView;
    const LABEL: &'static str = "Contact";
    const WRITE_ROLE: Role = Role::Editor;

    fn repository(repos: &CatalogRepositories) -> &Arc<dyn CatalogRepository<Self>> {
        &repos.contacts
    }

    fn build(
        input: ContactInput,
        _actor: &AuthenticatedUser,
        now: BsonDateTime,
    ) -> Result<Self, AppError> {
        let mut contact = ExternalContact {
            id: None,
            name: String::new(),
            email: None,
            phone: None,
            organization: None,
            contact_type: None,
            created_at: now,
        };
        contact.apply(input)?;
        Ok(contact)
    }

    fn apply(&mut self, input: ContactInput) -> Result<(), AppError> {
        self.name = validate_name(&input.name)?;
        self.email = optional_text(input.email).map(|e| validate_email(&e)).transpose()?;
        self.phone = optional_text(input.phone).map(|p| validate_phone(&p)).transpose()?;
        self.organization = optional_text(input.organization);
        self.contact_type = optional_ref(input.contact_type.as_deref(), "contact type")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Custom charts
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub chart_type: String,
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartView {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub chart_type: String,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<CustomChart> for ChartView {
    fn from(c: CustomChart) -> Self {
        Self {
            id: hex(c.id),
            name: c.name,
            owner: c.owner.to_hex(),
            chart_type: c.chart_type,
            config: bson::Bson::Document(c.config).into_relaxed_extjson(),
            created_at: c.created_at.to_chrono(),
        }
    }
}

fn chart_config(raw: Option<serde_json::Value>) -> Result<bson::Document, AppError> {
    match raw {
        None | Some(serde_json::Value::Null) => Ok(bson::Document::new()),
        Some(value @ serde_json::Value::Object(_)) => Ok(bson::to_document(&value)?),
        Some(_) => Err(AppError::Validation("Chart config must be an object".into())),
    }
}

impl CatalogEntity for CustomChart {
    type Input = ChartInput;
    type View = ChartView;
    const LABEL: &'static str = "Chart";
    const WRITE_ROLE: Role = Role::Viewer;

    fn repository(repos: &CatalogRepositories) -> &Arc<dyn CatalogRepository<Self>> {
        &repos.charts
    }

    fn build(
        input: ChartInput,
        actor: &AuthenticatedUser,
        now: BsonDateTime,
    ) -> Result<Self, AppError> {
        let mut chart = CustomChart {
            id: None,
            name: String::new(),
            owner: actor.user_id,
            chart_type: String::new(),
            config: bson::Document::new(),
            created_at: now,
        };
        chart.apply(input)?;
        Ok(chart)
    }

    fn apply(&mut self, input: ChartInput) -> Result<(), AppError> {
        let chart_type = input.chart_type.trim().to_lowercase();
        if !CHART_TYPES.contains(&chart_type.as_str()) {
            return Err(AppError::Validation(format!(
                "Chart type must be one of {}",
                CHART_TYPES.join(", ")
            )));
        }
        self.name = validate_name(&input.name)?;
        self.chart_type = chart_type;
        self.config = chart_config(input.config)?;
        Ok(())
    }

    fn owner(&self) -> Option<ObjectId> {
        Some(self.owner)
    }
}
