use bson::oid::ObjectId;
use bson::DateTime as BsonDateTime;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::models::AuthenticatedUser;
use crate::db::models::{Notification, NotificationKind, NotificationView};
use crate::db::notification_repository::NotificationRepository;
use crate::error::AppError;
use crate::services::pagination::{PageRequest, Pagination};

/// What happened, for every recipient of a fan-out.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: NotificationKind,
    pub actor: ObjectId,
    pub document: Option<ObjectId>,
    pub message: String,
}

/// Notify `recipients` of `event`.
///
/// Duplicates and the actor are skipped. Failures are logged and swallowed so
/// the operation that triggered the notification still succeeds. Returns the
/// number of notifications written.
pub async fn fan_out(
    repo: &dyn NotificationRepository,
    event: &Event,
    recipients: impl IntoIterator<Item = ObjectId>,
    now: DateTime<Utc>,
) -> usize {
    let mut unique: Vec<ObjectId> = Vec::new();
    for recipient in recipients {
        if recipient != event.actor && !unique.contains(&recipient) {
            unique.push(recipient);
        }
    }
    if unique.is_empty() {
        return 0;
    }

    let created_at = BsonDateTime::from_chrono(now);
    let notifications: Vec<Notification> = unique
        .iter()
        .map(|recipient| Notification {
            id: None,
            recipient: *recipient,
            actor: event.actor,
            document: event.document,
            kind: event.kind,
            message: event.message.clone(),
            read: false,
            created_at,
        })
        .collect();

    let count = notifications.len();
    match repo.insert_many(notifications).await {
        Ok(()) => count,
        Err(e) => {
            tracing::warn!(
                kind = ?event.kind,
                recipients = count,
                "Failed to send notifications: {e}"
            );
            0
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationList {
    pub items: Vec<NotificationView>,
    pub unread: u64,
    pub pagination: Pagination,
}

pub async fn list(
    repo: &dyn NotificationRepository,
    user: &AuthenticatedUser,
    unread_only: bool,
    page: PageRequest,
) -> Result<NotificationList, AppError> {
    let ((items, total), unread) = futures::try_join!(
        repo.list_for_user(user.user_id, unread_only, page.skip, page.limit as i64),
        repo.count_unread(user.user_id),
    )?;

    Ok(NotificationList {
        items: items.into_iter().map(NotificationView::from).collect(),
        unread,
        pagination: Pagination::for_request(total, page),
    })
}

pub async fn mark_read(
    repo: &dyn NotificationRepository,
    user: &AuthenticatedUser,
    id: ObjectId,
) -> Result<(), AppError> {
    if repo.mark_read(id, user.user_id).await? {
        Ok(())
    } else {
        Err(AppError::NotFound("Notification not found".into()))
    }
}

pub async fn mark_all_read(
    repo: &dyn NotificationRepository,
    user: &AuthenticatedUser,
) -> Result<u64, AppError> {
    repo.mark_all_read(user.user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Role;
    use crate::db::notification_repository::MockNotificationRepository;

    fn event(actor: ObjectId) -> Event {
        Event {
            kind: NotificationKind::DocumentUpdated,
            actor,
            document: Some(ObjectId::new()),
            message: "Policy was updated".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fan_out_dedupes_and_skips_actor() {
        let actor = ObjectId::new();
        let a = ObjectId::new();
        let b = ObjectId::new();

        let mut repo = MockNotificationRepository::new();
        repo.expect_insert_many()
            .withf(move |batch| {
                let recipients: Vec<ObjectId> = batch.iter().map(|n| n.recipient).collect();
                recipients == vec![a, b] && batch.iter().all(|n| !n.read)
            })
            .times(1)
            .returning(|_| Ok(()));

        let sent = fan_out(&repo, &event(actor), [a, actor, b, a], Utc::now()).await;
        assert_eq!(sent, 2);
    }

    #[tokio::test]
    async fn test_fan_out_without_recipients_writes_nothing() {
        let actor = ObjectId::new();
        let mut repo = MockNotificationRepository::new();
        repo.expect_insert_many().times(0);

        assert_eq!(fan_out(&repo, &event(actor), [actor], Utc::now()).await, 0);
    }

    #[tokio::test]
    async fn test_fan_out_failure_is_swallowed() {
        let mut repo = MockNotificationRepository::new();
        repo.expect_insert_many()
            .returning(|_| Err(AppError::Database("down".into())));

        let sent = fan_out(&repo, &event(ObjectId::new()), [ObjectId::new()], Utc::now()).await;
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn test_mark_read_of_foreign_notification() {
        let user = AuthenticatedUser {
            user_id: ObjectId::new(),
            email: "u@example.com".to_string(),
            role: Role::Viewer,
            token_id: "t".to_string(),
        };
        let mut repo = MockNotificationRepository::new();
        repo.expect_mark_read().returning(|_, _| Ok(false));

        let result = mark_read(&repo, &user, ObjectId::new()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
