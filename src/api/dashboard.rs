use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::services::cache::ClearScope;
use crate::services::dashboard::{AnalyticsSummary, DashboardData};

/// Body of `DELETE /api/cache`. Empty or absent clears everything.
#[derive(Debug, Default, Deserialize)]
pub struct ClearCacheRequest {
    pub keys: Option<Vec<String>>,
    pub pattern: Option<String>,
}

impl ClearCacheRequest {
    fn scope(self) -> Result<ClearScope, AppError> {
        let pattern = self.pattern.filter(|p| !p.trim().is_empty());
        let keys = self.keys.filter(|k| !k.is_empty());
        match (keys, pattern) {
            (Some(_), Some(_)) => Err(AppError::Validation(
                "Give either keys or a pattern, not both".into(),
            )),
            (Some(keys), None) => Ok(ClearScope::Keys(keys)),
            (None, Some(pattern)) => Ok(ClearScope::Pattern(pattern)),
            (None, None) => Ok(ClearScope::All),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CacheCleared {
    pub removed: usize,
}

/// `GET /api/dashboard`
pub async fn dashboard_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<DashboardData>, AppError> {
    Ok(Json(state.dashboard().user_dashboard_data(&user).await?))
}

/// `GET /api/analytics`
pub async fn analytics_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<AnalyticsSummary>, AppError> {
    Ok(Json(state.dashboard().optimized_analytics(&user).await?))
}

/// `DELETE /api/cache`
pub async fn clear_cache_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: Bytes,
) -> Result<Json<CacheCleared>, AppError> {
    let request: ClearCacheRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ClearCacheRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("Invalid cache clear request: {e}")))?
    };

    let removed = state.dashboard().clear_cache(&user, &request.scope()?)?;
    Ok(Json(CacheCleared { removed }))
}
