use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::db::models::DocumentView;
use crate::error::AppError;
use crate::services::documents::{CreateDocumentInput, UpdatedDocument};
use crate::services::pagination::Page;
use crate::services::query::DocumentQuery;
use crate::services::validation::parse_object_id;

/// `GET /api/documents`
///
/// Filters, sorting and paging come from the query string. Non-admins only
/// see documents they are related to.
pub async fn list_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    query: Result<Query<DocumentQuery>, QueryRejection>,
) -> Result<Json<Page<DocumentView>>, AppError> {
    let Query(query) = query?;
    let page = state.documents().search_documents(&user, &query).await?;
    Ok(Json(page))
}

/// `POST /api/documents` with a JSON body and no file.
pub async fn create_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<CreateDocumentInput>, JsonRejection>,
) -> Result<(StatusCode, Json<DocumentView>), AppError> {
    let Json(input) = payload?;
    let document = state.documents().create_document(&user, input, None).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// `GET /api/documents/{id}`
pub async fn get_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DocumentView>, AppError> {
    let id = parse_object_id(&id, "document")?;
    Ok(Json(state.documents().get_document(&user, id).await?))
}

/// `PATCH /api/documents/{id}`
pub async fn update_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<UpdatedDocument>, AppError> {
    let id = parse_object_id(&id, "document")?;
    let Json(patch) = payload?;
    Ok(Json(state.documents().update_document(&user, id, patch).await?))
}

/// `DELETE /api/documents/{id}`
///
/// Removes the document with its versions, stored files and review
/// assignments.
pub async fn delete_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_object_id(&id, "document")?;
    state.documents().delete_document(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/documents/{id}/review/complete`
pub async fn complete_review_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DocumentView>, AppError> {
    let id = parse_object_id(&id, "document")?;
    Ok(Json(state.documents().complete_review(&user, id).await?))
}

/// `POST /api/documents/{id}/review/reopen`
pub async fn reopen_review_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DocumentView>, AppError> {
    let id = parse_object_id(&id, "document")?;
    Ok(Json(state.documents().reopen_review(&user, id).await?))
}
