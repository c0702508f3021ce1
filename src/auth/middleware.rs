use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::RequestPartsExt;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use bson::oid::ObjectId;

use crate::app::AppState;
use crate::auth::models::AuthenticatedUser;
use crate::auth::token::TokenKeys;
use crate::db::token_repository::TokenBlacklist;
use crate::db::user_repository::UserRepository;
use crate::error::AppError;

/// Resolve a bearer token to the user behind it.
///
/// The role comes from the stored user, not from the token, so demotions
/// apply to tokens that are already out.
pub async fn authenticate(
    keys: &TokenKeys,
    blacklist: &dyn TokenBlacklist,
    users: &dyn UserRepository,
    token: &str,
) -> Result<AuthenticatedUser, AppError> {
    let claims = keys.verify(token)?;

    if blacklist.is_revoked(&claims.jti).await? {
        return Err(AppError::Authentication("Token has been revoked".into()));
    }

    let user_id = ObjectId::parse_str(&claims.sub)
        .map_err(|_| AppError::Authentication("Invalid token subject".into()))?;
    let user = users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::Authentication("User no longer exists".into()))?;

    Ok(AuthenticatedUser {
        user_id,
        email: user.email,
        role: user.role,
        token_id: claims.jti,
    })
}

/// Extractor for handlers that need a signed-in caller.
pub struct AuthUser(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Authentication("Missing bearer token".into()))?;

        let user = authenticate(
            &state.token_keys,
            state.token_blacklist.as_ref(),
            state.user_repo.as_ref(),
            bearer.token(),
        )
        .await?;

        Ok(AuthUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Role;
    use crate::db::models::User;
    use crate::db::token_repository::MockTokenBlacklist;
    use crate::db::user_repository::MockUserRepository;
    use bson::DateTime as BsonDateTime;
    use chrono::{Duration, Utc};

    fn account(id: ObjectId, role: Role) -> User {
        let now = BsonDateTime::now();
        User {
            id: Some(id),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            username: None,
            password_hash: String::new(),
            role,
            department: None,
            title: None,
            phone: None,
            team: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_stored_role_wins_over_token_role() {
        let keys = TokenKeys::from_secret("secret");
        let id = ObjectId::new();
        let token = keys
            .issue(&id.to_hex(), Role::Admin, Utc::now(), Duration::hours(1))
            .unwrap();

        let mut blacklist = MockTokenBlacklist::new();
        blacklist.expect_is_revoked().returning(|_| Ok(false));
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_id()
            .returning(|id| Ok(Some(account(id, Role::Viewer))));

        let user = authenticate(&keys, &blacklist, &users, &token).await.unwrap();
        assert_eq!(user.user_id, id);
        assert_eq!(user.role, Role::Viewer);
        assert_eq!(user.email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_revoked_token_rejected() {
        let keys = TokenKeys::from_secret("secret");
        let token = keys
            .issue(&ObjectId::new().to_hex(), Role::Editor, Utc::now(), Duration::hours(1))
            .unwrap();

        let mut blacklist = MockTokenBlacklist::new();
        blacklist.expect_is_revoked().returning(|_| Ok(true));
        let mut users = MockUserRepository::new();
        users.expect_find_by_id().times(0);

        let result = authenticate(&keys, &blacklist, &users, &token).await;
        assert!(matches!(result, Err(AppError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_deleted_user_rejected() {
        let keys = TokenKeys::from_secret("secret");
        let token = keys
            .issue(&ObjectId::new().to_hex(), Role::Editor, Utc::now(), Duration::hours(1))
            .unwrap();

        let mut blacklist = MockTokenBlacklist::new();
        blacklist.expect_is_revoked().returning(|_| Ok(false));
        let mut users = MockUserRepository::new();
        users.expect_find_by_id().returning(|_| Ok(None));

        let result = authenticate(&keys, &blacklist, &users, &token).await;
        assert!(matches!(result, Err(AppError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_foreign_signature_rejected() {
        let token = TokenKeys::from_secret("other")
            .issue(&ObjectId::new().to_hex(), Role::Editor, Utc::now(), Duration::hours(1))
            .unwrap();

        let blacklist = MockTokenBlacklist::new();
        let users = MockUserRepository::new();
        let result = authenticate(&TokenKeys::from_secret("secret"), &blacklist, &users, &token).await;
        assert!(matches!(result, Err(AppError::Authentication(_))));
    }
}
