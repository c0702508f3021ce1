use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::DateTime as BsonDateTime;
use futures::TryStreamExt;

use crate::db::models::ReviewAssignment;
use crate::error::AppError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    async fn insert(&self, assignment: ReviewAssignment) -> Result<ReviewAssignment, AppError>;

    async fn list_for_document(
        &self,
        document: ObjectId,
    ) -> Result<Vec<ReviewAssignment>, AppError>;

    /// Open assignments of a reviewer, earliest due first.
    async fn list_pending_for_reviewer(
        &self,
        reviewer: ObjectId,
    ) -> Result<Vec<ReviewAssignment>, AppError>;

    async fn count_pending_for_reviewer(&self, reviewer: ObjectId) -> Result<u64, AppError>;

    /// Close the open assignments of `reviewer` on `document`.
    async fn complete(
        &self,
        document: ObjectId,
        reviewer: ObjectId,
        at: BsonDateTime,
    ) -> Result<u64, AppError>;

    async fn delete_for_document(&self, document: ObjectId) -> Result<u64, AppError>;
}

pub struct MongoReviewRepository {
    collection: mongodb::Collection<ReviewAssignment>,
}

impl MongoReviewRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("reviewAssignments"),
        }
    }

    pub async fn ensure_indexes(&self) -> Result<(), AppError> {
        use bson::doc;
        use mongodb::IndexModel;

        let models = vec![
            IndexModel::builder().keys(doc! { "document": 1 }).build(),
            IndexModel::builder()
                .keys(doc! { "reviewer": 1, "completed": 1 })
                .build(),
        ];
        self.collection.create_indexes(models).await?;
        Ok(())
    }
}

#[async_trait]
impl ReviewRepository for MongoReviewRepository {
    async fn insert(&self, mut assignment: ReviewAssignment) -> Result<ReviewAssignment, AppError> {
        let result = self.collection.insert_one(&assignment).await?;
        assignment.id = result.inserted_id.as_object_id();
        Ok(assignment)
    }

    async fn list_for_document(
        &self,
        document: ObjectId,
    ) -> Result<Vec<ReviewAssignment>, AppError> {
        use bson::doc;
        use mongodb::options::FindOptions;

        let options = FindOptions::builder().sort(doc! { "createdAt": 1 }).build();
        let cursor = self
            .collection
            .find(doc! { "document": document })
            .with_options(options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list_pending_for_reviewer(
        &self,
        reviewer: ObjectId,
    ) -> Result<Vec<ReviewAssignment>, AppError> {
        use bson::doc;
        use mongodb::options::FindOptions;

        let options = FindOptions::builder()
            .sort(doc! { "dueDate": 1, "createdAt": 1 })
            .build();
        let cursor = self
            .collection
            .find(doc! { "reviewer": reviewer, "completed": false })
            .with_options(options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count_pending_for_reviewer(&self, reviewer: ObjectId) -> Result<u64, AppError> {
        use bson::doc;

        Ok(self
            .collection
            .count_documents(doc! { "reviewer": reviewer, "completed": false })
            .await?)
    }

    async fn complete(
        &self,
        document: ObjectId,
        reviewer: ObjectId,
        at: BsonDateTime,
    ) -> Result<u64, AppError> {
        use bson::doc;

        let result = self
            .collection
            .update_many(
                doc! { "document": document, "reviewer": reviewer, "completed": false },
                doc! { "$set": { "completed": true, "completedAt": at } },
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn delete_for_document(&self, document: ObjectId) -> Result<u64, AppError> {
        use bson::doc;

        let result = self
            .collection
            .delete_many(doc! { "document": document })
            .await?;
        Ok(result.deleted_count)
    }
}
