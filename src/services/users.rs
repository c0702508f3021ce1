use bson::oid::ObjectId;
use bson::DateTime as BsonDateTime;
use serde::Deserialize;

use crate::auth::models::{AuthenticatedUser, Role};
use crate::auth::password::hash_password;
use crate::clock::Clock;
use crate::db::models::{User, UserView};
use crate::db::user_repository::UserRepository;
use crate::error::AppError;
use crate::services::validation::{
    are_all_fields_empty, optional_text, parse_object_id, validate_email, validate_name,
    validate_password, validate_phone,
};

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub role: Option<String>,
    pub username: Option<String>,
    pub department: Option<String>,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub team: Option<String>,
}

/// Partial profile update. Blank optional fields are cleared.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub username: Option<String>,
    pub department: Option<String>,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub team: Option<String>,
}

fn parse_role(raw: &str) -> Result<Role, AppError> {
    Role::from_str_ci(raw)
        .ok_or_else(|| AppError::Validation(format!("Unknown role '{}'", raw.trim())))
}

/// Roles above the actor's own cannot be handed out.
fn ensure_grantable(actor: &AuthenticatedUser, role: Role) -> Result<(), AppError> {
    if role > actor.role {
        tracing::warn!(
            user = %actor.user_id,
            role = %actor.role,
            requested = %role,
            "Role grant refused"
        );
        return Err(AppError::Authorization(format!(
            "You may not grant the {role} role"
        )));
    }
    Ok(())
}

fn optional_phone(raw: Option<String>) -> Result<Option<String>, AppError> {
    optional_text(raw).map(|p| validate_phone(&p)).transpose()
}

fn optional_team(raw: Option<&str>) -> Result<Option<ObjectId>, AppError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => parse_object_id(value, "team").map(Some),
        None => Ok(None),
    }
}

/// The view `viewer` gets of `user`. Contact details of other people are
/// for admins only.
pub fn visible_view(user: User, viewer: &AuthenticatedUser) -> UserView {
    let own = user.id == Some(viewer.user_id);
    let mut view = UserView::from(user);
    if !own && !viewer.is_admin() {
        view.department = None;
        view.title = None;
        view.phone = None;
    }
    view
}

pub struct UserService<'a> {
    pub users: &'a dyn UserRepository,
    pub clock: &'a dyn Clock,
}

impl UserService<'_> {
    async fn load(&self, id: ObjectId) -> Result<User, AppError> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    async fn ensure_email_free(
        &self,
        email: &str,
        except: Option<ObjectId>,
    ) -> Result<(), AppError> {
        match self.users.find_by_email(email).await? {
            Some(existing) if existing.id != except => Err(AppError::Conflict(format!(
                "A user with email '{email}' already exists"
            ))),
            _ => Ok(()),
        }
    }

    pub async fn create_user(
        &self,
        actor: &AuthenticatedUser,
        input: CreateUserInput,
    ) -> Result<UserView, AppError> {
        actor.require(Role::Admin)?;

        // 1. Validate
        let name = validate_name(&input.name)?;
        let email = validate_email(&input.email)?;
        validate_password(&input.password)?;
        let role = match input.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            Some(raw) => parse_role(raw)?,
            None => Role::Viewer,
        };
        ensure_grantable(actor, role)?;
        let phone = optional_phone(input.phone)?;
        let team = optional_team(input.team.as_deref())?;

        // 2. Check uniqueness
        self.ensure_email_free(&email, None).await?;

        // 3. Store
        let now = BsonDateTime::from_chrono(self.clock.now());
        let user = User {
            id: None,
            name,
            email,
            username: optional_text(input.username),
            password_hash: hash_password(&input.password)?,
            role,
            department: optional_text(input.department),
            title: optional_text(input.title),
            phone,
            team,
            created_at: now,
            updated_at: now,
        };
        let user = self.users.insert(user).await?;

        tracing::info!(user = ?user.id, role = %user.role, by = %actor.user_id, "User created");
        Ok(UserView::from(user))
    }

    pub async fn list_users(
        &self,
        actor: &AuthenticatedUser,
        role: Option<&str>,
    ) -> Result<Vec<UserView>, AppError> {
        let role = role
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(parse_role)
            .transpose()?;

        let users = self.users.list(role).await?;
        Ok(users.into_iter().map(|u| visible_view(u, actor)).collect())
    }

    pub async fn get_user(
        &self,
        actor: &AuthenticatedUser,
        id: ObjectId,
    ) -> Result<UserView, AppError> {
        let user = self.load(id).await?;
        Ok(visible_view(user, actor))
    }

    pub async fn update_user(
        &self,
        actor: &AuthenticatedUser,
        id: ObjectId,
        patch: serde_json::Value,
    ) -> Result<UserView, AppError> {
        if !patch.is_object() {
            return Err(AppError::Validation("Expected a JSON object".into()));
        }
        if are_all_fields_empty(&patch) {
            return Err(AppError::Validation("No fields to update".into()));
        }
        let input: UpdateUserInput = serde_json::from_value(patch)
            .map_err(|e| AppError::Validation(format!("Invalid update: {e}")))?;

        let is_self = actor.user_id == id;
        if !is_self && !actor.is_admin() {
            tracing::warn!(user = %actor.user_id, target = %id, "Denied: update another user");
            return Err(AppError::Authorization("You may only update your own profile".into()));
        }

        let mut user = self.load(id).await?;
        if user.role > actor.role {
            return Err(AppError::Authorization(
                "You may not modify a user with a higher role".into(),
            ));
        }

        if let Some(name) = input.name.as_deref() {
            user.name = validate_name(name)?;
        }
        if let Some(email) = input.email.as_deref() {
            let email = validate_email(email)?;
            if email != user.email {
                self.ensure_email_free(&email, user.id).await?;
                user.email = email;
            }
        }
        if let Some(password) = input.password.as_deref() {
            validate_password(password)?;
            user.password_hash = hash_password(password)?;
        }
        if let Some(raw) = input.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            let role = parse_role(raw)?;
            if role != user.role {
                actor.require(Role::Admin)?;
                ensure_grantable(actor, role)?;
                if is_self {
                    return Err(AppError::Authorization("You may not change your own role".into()));
                }
                tracing::info!(
                    user = %id,
                    from = %user.role,
                    to = %role,
                    by = %actor.user_id,
                    "Role changed"
                );
                user.role = role;
            }
        }
        if input.username.is_some() {
            user.username = optional_text(input.username);
        }
        if input.department.is_some() {
            user.department = optional_text(input.department);
        }
        if input.title.is_some() {
            user.title = optional_text(input.title);
        }
        if input.phone.is_some() {
            user.phone = optional_phone(input.phone)?;
        }
        if let Some(team) = input.team.as_deref() {
            user.team = optional_team(Some(team))?;
        }

        user.updated_at = BsonDateTime::from_chrono(self.clock.now());
        self.users.replace(&user).await?;

        Ok(visible_view(user, actor))
    }

    pub async fn delete_user(
        &self,
        actor: &AuthenticatedUser,
        id: ObjectId,
    ) -> Result<(), AppError> {
        actor.require(Role::Superadmin)?;
        if actor.user_id == id {
            return Err(AppError::Validation("You cannot delete your own account".into()));
        }

        if !self.users.delete(id).await? {
            return Err(AppError::NotFound("User not found".into()));
        }
        tracing::info!(user = %id, by = %actor.user_id, "User deleted");
        Ok(())
    }
}
