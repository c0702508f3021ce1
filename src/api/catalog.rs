//! Handlers shared by every reference-data collection. Routes instantiate
//! them per entity, e.g. `list::<Category>`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::services::catalog::CatalogEntity;
use crate::services::validation::parse_object_id;

pub async fn list<T: CatalogEntity>(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<T::View>>, AppError> {
    Ok(Json(state.catalog::<T>().list(&user).await?))
}

pub async fn get_one<T: CatalogEntity>(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<T::View>, AppError> {
    let id = parse_object_id(&id, &T::LABEL.to_lowercase())?;
    Ok(Json(state.catalog::<T>().get(&user, id).await?))
}

pub async fn create<T: CatalogEntity>(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<T::Input>, JsonRejection>,
) -> Result<(StatusCode, Json<T::View>), AppError> {
    let Json(input) = payload?;
    let created = state.catalog::<T>().create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update<T: CatalogEntity>(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<T::Input>, JsonRejection>,
) -> Result<Json<T::View>, AppError> {
    let id = parse_object_id(&id, &T::LABEL.to_lowercase())?;
    let Json(input) = payload?;
    Ok(Json(state.catalog::<T>().update(&user, id, input).await?))
}

pub async fn delete<T: CatalogEntity>(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_object_id(&id, &T::LABEL.to_lowercase())?;
    state.catalog::<T>().delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
