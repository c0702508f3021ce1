use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use bson::DateTime as BsonDateTime;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::db::models::UserView;
use crate::error::AppError;

/// `GET /api/auth/me`: the caller's own profile.
pub async fn me_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<UserView>, AppError> {
    Ok(Json(state.users().get_user(&user, user.user_id).await?))
}

/// `POST /api/auth/logout`
///
/// Blacklists the presented token until it would have expired anyway.
pub async fn logout_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
) -> Result<StatusCode, AppError> {
    let claims = state.token_keys.verify(bearer.token())?;
    state
        .token_blacklist
        .revoke(&claims.jti, BsonDateTime::from_chrono(claims.expires_at()))
        .await?;

    tracing::info!(user = %user.user_id, "Logged out");
    Ok(StatusCode::NO_CONTENT)
}
