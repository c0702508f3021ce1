use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::services::notifications::{self, NotificationList};
use crate::services::pagination::PageRequest;
use crate::services::validation::parse_object_id;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationParams {
    pub unread_only: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub skip: Option<String>,
}

impl NotificationParams {
    fn unread_only(&self) -> bool {
        matches!(self.unread_only.as_deref().map(str::trim), Some("true" | "1"))
    }
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

/// `GET /api/notifications`
pub async fn list_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<NotificationParams>,
) -> Result<Json<NotificationList>, AppError> {
    let page = PageRequest::from_params(
        params.page.as_deref(),
        params.limit.as_deref(),
        params.skip.as_deref(),
    );
    let list = notifications::list(
        state.notification_repo.as_ref(),
        &user,
        params.unread_only(),
        page,
    )
    .await?;
    Ok(Json(list))
}

/// `POST /api/notifications/{id}/read`
pub async fn read_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_object_id(&id, "notification")?;
    notifications::mark_read(state.notification_repo.as_ref(), &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/notifications/read-all`
pub async fn read_all_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<MarkedRead>, AppError> {
    let updated = notifications::mark_all_read(state.notification_repo.as_ref(), &user).await?;
    Ok(Json(MarkedRead { updated }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unread_only_flag() {
        let flag = |raw: Option<&str>| NotificationParams {
            unread_only: raw.map(str::to_string),
            ..Default::default()
        }
        .unread_only();

        assert!(flag(Some("true")));
        assert!(flag(Some("1")));
        assert!(!flag(Some("false")));
        assert!(!flag(Some("yes please")));
        assert!(!flag(None));
    }
}
