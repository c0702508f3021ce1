use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::db::models::ReviewAssignmentView;
use crate::error::AppError;
use crate::services::reviews::AssignReviewerInput;
use crate::services::validation::parse_object_id;

/// `GET /api/documents/{id}/reviewers`
pub async fn list_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<ReviewAssignmentView>>, AppError> {
    let id = parse_object_id(&id, "document")?;
    Ok(Json(state.reviews().list_for_document(&user, id).await?))
}

/// `POST /api/documents/{id}/reviewers`
pub async fn assign_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<AssignReviewerInput>, JsonRejection>,
) -> Result<(StatusCode, Json<ReviewAssignmentView>), AppError> {
    let id = parse_object_id(&id, "document")?;
    let Json(input) = payload?;
    let assignment = state.reviews().assign_reviewer(&user, id, input).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

/// `GET /api/reviews/mine`: open assignments of the caller.
pub async fn mine_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<ReviewAssignmentView>>, AppError> {
    Ok(Json(state.reviews().list_mine(&user).await?))
}
