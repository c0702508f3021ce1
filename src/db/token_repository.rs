use async_trait::async_trait;
use bson::DateTime as BsonDateTime;

use crate::db::models::BlacklistedToken;
use crate::error::AppError;

/// Revoked bearer tokens, keyed by `jti`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    async fn revoke(&self, jti: &str, expires_at: BsonDateTime) -> Result<(), AppError>;

    async fn is_revoked(&self, jti: &str) -> Result<bool, AppError>;
}

pub struct MongoTokenBlacklist {
    collection: mongodb::Collection<BlacklistedToken>,
}

impl MongoTokenBlacklist {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("blacklistedTokens"),
        }
    }

    /// Unique `jti` plus a TTL index so Mongo drops entries once the token
    /// would have expired anyway.
    pub async fn ensure_indexes(&self) -> Result<(), AppError> {
        use bson::doc;
        use mongodb::options::IndexOptions;
        use mongodb::IndexModel;
        use std::time::Duration;

        let models = vec![
            IndexModel::builder()
                .keys(doc! { "jti": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
            IndexModel::builder()
                .keys(doc! { "expiresAt": 1 })
                .options(
                    IndexOptions::builder()
                        .expire_after(Duration::from_secs(0))
                        .build(),
                )
                .build(),
        ];
        self.collection.create_indexes(models).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenBlacklist for MongoTokenBlacklist {
    async fn revoke(&self, jti: &str, expires_at: BsonDateTime) -> Result<(), AppError> {
        use bson::doc;
        use mongodb::options::UpdateOptions;

        let options = UpdateOptions::builder().upsert(true).build();

        self.collection
            .update_one(
                doc! { "jti": jti },
                doc! { "$set": { "jti": jti, "expiresAt": expires_at } },
            )
            .with_options(options)
            .await?;

        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, AppError> {
        use bson::doc;

        Ok(self
            .collection
            .find_one(doc! { "jti": jti })
            .await?
            .is_some())
    }
}
