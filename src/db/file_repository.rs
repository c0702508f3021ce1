use async_trait::async_trait;
use bson::oid::ObjectId;
use futures::TryStreamExt;

use crate::db::models::FileRecord;
use crate::error::AppError;

/// Attempts at claiming a version number before giving up on a busy document.
const VERSION_CLAIM_ATTEMPTS: usize = 3;

/// Repository trait for file metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Insert a file record as the next version of its document.
    ///
    /// The `version` on the input is ignored; the stored record gets
    /// `max(existing) + 1` and is returned with its id.
    async fn insert_next_version(&self, file: FileRecord) -> Result<FileRecord, AppError>;

    /// Highest version stored for a document, if any.
    async fn latest_version(&self, document: ObjectId) -> Result<Option<i32>, AppError>;

    /// All versions of a document, oldest first.
    async fn list_for_document(&self, document: ObjectId) -> Result<Vec<FileRecord>, AppError>;

    async fn find_version(
        &self,
        document: ObjectId,
        version: i32,
    ) -> Result<Option<FileRecord>, AppError>;

    /// Delete every record of a document, returning what was removed.
    async fn delete_for_document(&self, document: ObjectId) -> Result<Vec<FileRecord>, AppError>;
}

/// MongoDB implementation of the FileRepository.
pub struct MongoFileRepository {
    collection: mongodb::Collection<FileRecord>,
}

impl MongoFileRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("files"),
        }
    }

    /// The unique `(document, version)` index is what keeps racing uploads
    /// from sharing a version number.
    pub async fn ensure_indexes(&self) -> Result<(), AppError> {
        use bson::doc;
        use mongodb::options::IndexOptions;
        use mongodb::IndexModel;

        let model = IndexModel::builder()
            .keys(doc! { "document": 1, "version": -1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection.create_index(model).await?;
        Ok(())
    }
}

#[async_trait]
impl FileRepository for MongoFileRepository {
    async fn insert_next_version(&self, mut file: FileRecord) -> Result<FileRecord, AppError> {
        for attempt in 1..=VERSION_CLAIM_ATTEMPTS {
            file.version = self.latest_version(file.document).await?.unwrap_or(0) + 1;
            file.id = None;

            match self.collection.insert_one(&file).await.map_err(AppError::from) {
                Ok(result) => {
                    file.id = result.inserted_id.as_object_id();
                    return Ok(file);
                }
                Err(AppError::Conflict(_)) if attempt < VERSION_CLAIM_ATTEMPTS => {
                    tracing::debug!(
                        document = %file.document,
                        version = file.version,
                        "Version already claimed, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Conflict(
            "Another upload for this document is in progress".into(),
        ))
    }

    async fn latest_version(&self, document: ObjectId) -> Result<Option<i32>, AppError> {
        use bson::doc;
        use mongodb::options::FindOneOptions;

        let options = FindOneOptions::builder()
            .sort(doc! { "version": -1 })
            .build();

        let latest = self
            .collection
            .find_one(doc! { "document": document })
            .with_options(options)
            .await?;

        Ok(latest.map(|f| f.version))
    }

    async fn list_for_document(&self, document: ObjectId) -> Result<Vec<FileRecord>, AppError> {
        use bson::doc;
        use mongodb::options::FindOptions;

        let options = FindOptions::builder().sort(doc! { "version": 1 }).build();
        let cursor = self
            .collection
            .find(doc! { "document": document })
            .with_options(options)
            .await?;

        Ok(cursor.try_collect().await?)
    }

    async fn find_version(
        &self,
        document: ObjectId,
        version: i32,
    ) -> Result<Option<FileRecord>, AppError> {
        use bson::doc;

        Ok(self
            .collection
            .find_one(doc! { "document": document, "version": version })
            .await?)
    }

    async fn delete_for_document(&self, document: ObjectId) -> Result<Vec<FileRecord>, AppError> {
        use bson::doc;

        let removed = self.list_for_document(document).await?;
        self.collection
            .delete_many(doc! { "document": document })
            .await?;
        Ok(removed)
    }
}
