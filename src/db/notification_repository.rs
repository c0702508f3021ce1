use async_trait::async_trait;
use bson::oid::ObjectId;
use futures::TryStreamExt;

use crate::db::models::Notification;
use crate::error::AppError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert_many(&self, notifications: Vec<Notification>) -> Result<(), AppError>;

    /// One page of a user's notifications, newest first, plus the total.
    async fn list_for_user(
        &self,
        recipient: ObjectId,
        unread_only: bool,
        skip: u64,
        limit: i64,
    ) -> Result<(Vec<Notification>, u64), AppError>;

    async fn count_unread(&self, recipient: ObjectId) -> Result<u64, AppError>;

    /// Mark one notification read. Returns `false` if the recipient does not own it.
    async fn mark_read(&self, id: ObjectId, recipient: ObjectId) -> Result<bool, AppError>;

    /// Returns how many notifications changed.
    async fn mark_all_read(&self, recipient: ObjectId) -> Result<u64, AppError>;
}

pub struct MongoNotificationRepository {
    collection: mongodb::Collection<Notification>,
}

impl MongoNotificationRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("notifications"),
        }
    }

    pub async fn ensure_indexes(&self) -> Result<(), AppError> {
        use bson::doc;
        use mongodb::IndexModel;

        let model = IndexModel::builder()
            .keys(doc! { "recipient": 1, "read": 1, "createdAt": -1 })
            .build();
        self.collection.create_index(model).await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for MongoNotificationRepository {
    async fn insert_many(&self, notifications: Vec<Notification>) -> Result<(), AppError> {
        if notifications.is_empty() {
            return Ok(());
        }
        self.collection.insert_many(&notifications).await?;
        Ok(())
    }

    async fn list_for_user(
        &self,
        recipient: ObjectId,
        unread_only: bool,
        skip: u64,
        limit: i64,
    ) -> Result<(Vec<Notification>, u64), AppError> {
        use bson::doc;
        use mongodb::options::FindOptions;

        let mut filter = doc! { "recipient": recipient };
        if unread_only {
            filter.insert("read", false);
        }

        let options = FindOptions::builder()
            .sort(doc! { "createdAt": -1, "_id": -1 })
            .skip(skip)
            .limit(limit)
            .build();

        let find = async {
            let cursor = self
                .collection
                .find(filter.clone())
                .with_options(options)
                .await?;
            cursor.try_collect::<Vec<Notification>>().await
        };
        let count = async { self.collection.count_documents(filter.clone()).await };

        Ok(futures::try_join!(find, count)?)
    }

    async fn count_unread(&self, recipient: ObjectId) -> Result<u64, AppError> {
        use bson::doc;

        Ok(self
            .collection
            .count_documents(doc! { "recipient": recipient, "read": false })
            .await?)
    }

    async fn mark_read(&self, id: ObjectId, recipient: ObjectId) -> Result<bool, AppError> {
        use bson::doc;

        let result = self
            .collection
            .update_one(
                doc! { "_id": id, "recipient": recipient },
                doc! { "$set": { "read": true } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn mark_all_read(&self, recipient: ObjectId) -> Result<u64, AppError> {
        use bson::doc;

        let result = self
            .collection
            .update_many(
                doc! { "recipient": recipient, "read": false },
                doc! { "$set": { "read": true } },
            )
            .await?;
        Ok(result.modified_count)
    }
}
