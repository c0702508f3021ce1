use bson::oid::ObjectId;
use bson::DateTime as BsonDateTime;
use serde::Deserialize;

use crate::auth::models::AuthenticatedUser;
use crate::clock::Clock;
use crate::db::models::{Document, NotificationKind, ReviewAssignment, ReviewAssignmentView};
use crate::db::notification_repository::NotificationRepository;
use crate::db::repository::DocumentRepository;
use crate::db::review_repository::ReviewRepository;
use crate::db::user_repository::UserRepository;
use crate::error::AppError;
use crate::services::access;
use crate::services::dashboard::DashboardCaches;
use crate::services::notifications::{self, Event};
use crate::services::validation::{parse_date, parse_object_id};

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignReviewerInput {
    #[serde(default)]
    pub reviewer: String,
    pub due_date: Option<String>,
}

pub struct ReviewService<'a> {
    pub documents: &'a dyn DocumentRepository,
    pub reviews: &'a dyn ReviewRepository,
    pub users: &'a dyn UserRepository,
    pub notifications: &'a dyn NotificationRepository,
    pub caches: &'a DashboardCaches,
    pub clock: &'a dyn Clock,
}

impl ReviewService<'_> {
    async fn load(&self, id: ObjectId) -> Result<Document, AppError> {
        self.documents
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Document not found".into()))
    }

    pub async fn assign_reviewer(
        &self,
        user: &AuthenticatedUser,
        document: ObjectId,
        input: AssignReviewerInput,
    ) -> Result<ReviewAssignmentView, AppError> {
        let reviewer = parse_object_id(&input.reviewer, "reviewer")?;
        let due_date = input
            .due_date
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| parse_date(d, "due"))
            .transpose()?;

        let doc = self.load(document).await?;
        access::ensure_modify(&doc, user)?;

        let (reviewer_user, existing) = futures::try_join!(
            self.users.find_by_id(reviewer),
            self.reviews.list_for_document(document),
        )?;
        if reviewer_user.is_none() {
            return Err(AppError::Validation("Reviewer does not exist".into()));
        }
        if existing.iter().any(|a| a.reviewer == reviewer && !a.completed) {
            return Err(AppError::Conflict("Reviewer is already assigned".into()));
        }

        let now = self.clock.now();
        let assignment = self
            .reviews
            .insert(ReviewAssignment {
                id: None,
                document,
                reviewer,
                assigned_by: user.user_id,
                due_date,
                completed: false,
                completed_at: None,
                created_at: BsonDateTime::from_chrono(now),
            })
            .await?;

        tracing::info!(document = %document, reviewer = %reviewer, "Reviewer assigned");

        let event = Event {
            kind: NotificationKind::ReviewAssigned,
            actor: user.user_id,
            document: Some(document),
            message: format!("{} asked you to review \"{}\"", user.email, doc.title),
        };
        notifications::fan_out(self.notifications, &event, [reviewer], now).await;
        self.caches.invalidate_documents();

        Ok(assignment.into())
    }

    pub async fn list_for_document(
        &self,
        user: &AuthenticatedUser,
        document: ObjectId,
    ) -> Result<Vec<ReviewAssignmentView>, AppError> {
        let doc = self.load(document).await?;
        access::ensure_read(&doc, user)?;

        let assignments = self.reviews.list_for_document(document).await?;
        Ok(assignments.into_iter().map(ReviewAssignmentView::from).collect())
    }

    /// Open assignments of the caller.
    pub async fn list_mine(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<Vec<ReviewAssignmentView>, AppError> {
        let assignments = self.reviews.list_pending_for_reviewer(user.user_id).await?;
        Ok(assignments.into_iter().map(ReviewAssignmentView::from).collect())
    }
}
