use async_trait::async_trait;
use bson::oid::ObjectId;
use futures::TryStreamExt;

use crate::auth::models::Role;
use crate::db::models::User;
use crate::error::AppError;

/// Repository trait for user accounts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: User) -> Result<User, AppError>;

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<User>, AppError>;

    /// Look up by (lower-cased) email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Users sorted by name, optionally restricted to one role.
    async fn list(&self, role: Option<Role>) -> Result<Vec<User>, AppError>;

    async fn replace(&self, user: &User) -> Result<(), AppError>;

    async fn delete(&self, id: ObjectId) -> Result<bool, AppError>;

    /// Number of users per role.
    async fn count_by_role(&self) -> Result<Vec<(Role, u64)>, AppError>;
}

/// MongoDB implementation of the UserRepository.
pub struct MongoUserRepository {
    collection: mongodb::Collection<User>,
}

impl MongoUserRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("users"),
        }
    }

    pub async fn ensure_indexes(&self) -> Result<(), AppError> {
        use bson::doc;
        use mongodb::options::IndexOptions;
        use mongodb::IndexModel;

        let model = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection.create_index(model).await?;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MongoUserRepository {
    async fn insert(&self, mut user: User) -> Result<User, AppError> {
        let result = self.collection.insert_one(&user).await?;
        user.id = result.inserted_id.as_object_id();
        Ok(user)
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<User>, AppError> {
        use bson::doc;

        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        use bson::doc;

        Ok(self
            .collection
            .find_one(doc! { "email": email.to_lowercase() })
            .await?)
    }

    async fn list(&self, role: Option<Role>) -> Result<Vec<User>, AppError> {
        use bson::doc;
        use mongodb::options::FindOptions;

        let filter = match role {
            Some(role) => doc! { "role": role.to_string() },
            None => doc! {},
        };
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();

        let cursor = self.collection.find(filter).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn replace(&self, user: &User) -> Result<(), AppError> {
        use bson::doc;

        let id = user
            .id
            .ok_or_else(|| AppError::Internal("Cannot replace a user without id".into()))?;

        let result = self.collection.replace_one(doc! { "_id": id }, user).await?;
        if result.matched_count == 0 {
            return Err(AppError::NotFound("User not found".into()));
        }
        Ok(())
    }

    async fn delete(&self, id: ObjectId) -> Result<bool, AppError> {
        use bson::doc;

        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn count_by_role(&self) -> Result<Vec<(Role, u64)>, AppError> {
        use bson::doc;

        let pipeline = vec![
            doc! { "$group": { "_id": "$role", "count": { "$sum": 1 } } },
            doc! { "$sort": { "_id": 1 } },
        ];

        let rows: Vec<bson::Document> =
            self.collection.aggregate(pipeline).await?.try_collect().await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let role = Role::from_str_ci(row.get_str("_id").ok()?)?;
                Some((role, crate::db::count_field(row)))
            })
            .collect())
    }
}
