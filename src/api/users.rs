use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::db::models::UserView;
use crate::error::AppError;
use crate::services::users::CreateUserInput;
use crate::services::validation::parse_object_id;

#[derive(Debug, Default, Deserialize)]
pub struct UserListParams {
    pub role: Option<String>,
}

/// `GET /api/users?role=editor`
pub async fn list_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<UserListParams>,
) -> Result<Json<Vec<UserView>>, AppError> {
    let users = state.users().list_users(&user, params.role.as_deref()).await?;
    Ok(Json(users))
}

/// `POST /api/users`: admins only.
pub async fn create_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<CreateUserInput>, JsonRejection>,
) -> Result<(StatusCode, Json<UserView>), AppError> {
    let Json(input) = payload?;
    let created = state.users().create_user(&user, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<UserView>, AppError> {
    let id = parse_object_id(&id, "user")?;
    Ok(Json(state.users().get_user(&user, id).await?))
}

pub async fn update_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<UserView>, AppError> {
    let id = parse_object_id(&id, "user")?;
    let Json(patch) = payload?;
    Ok(Json(state.users().update_user(&user, id, patch).await?))
}

/// `DELETE /api/users/{id}`: superadmins only, never the caller.
pub async fn delete_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_object_id(&id, "user")?;
    state.users().delete_user(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
