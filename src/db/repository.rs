use async_trait::async_trait;
use bson::oid::ObjectId;
use futures::TryStreamExt;

use bson::DateTime as BsonDateTime;

use crate::db::models::{Document, VersionEntry};
use crate::error::AppError;

/// A fully built document query: filter, ordering and pagination window.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub filter: bson::Document,
    pub sort: bson::Document,
    pub skip: u64,
    pub limit: i64,
}

/// Repository trait for document operations.
///
/// This trait allows mocking the database layer in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a new document, returning it with its assigned id.
    async fn insert(&self, doc: Document) -> Result<Document, AppError>;

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<Document>, AppError>;

    /// `$set` the given fields, returning the document as stored afterwards.
    async fn update_fields(
        &self,
        id: ObjectId,
        set: bson::Document,
    ) -> Result<Option<Document>, AppError>;

    /// Append an upload to the history in a single update.
    ///
    /// `currentVersion` only moves forward and `currentFile` follows it, so
    /// overlapping uploads never lose an entry or roll the pointer back.
    async fn append_version(
        &self,
        id: ObjectId,
        entry: VersionEntry,
        updated_by: ObjectId,
        updated_at: BsonDateTime,
    ) -> Result<Option<Document>, AppError>;

    /// Delete by id. Returns `false` if nothing was deleted.
    async fn delete(&self, id: ObjectId) -> Result<bool, AppError>;

    /// Run a search, returning one page of results and the total match count.
    async fn search(&self, query: &SearchQuery) -> Result<(Vec<Document>, u64), AppError>;

    async fn count(&self, filter: bson::Document) -> Result<u64, AppError>;

    /// Run an aggregation pipeline over the collection.
    async fn aggregate(
        &self,
        pipeline: Vec<bson::Document>,
    ) -> Result<Vec<bson::Document>, AppError>;
}

/// MongoDB implementation of the DocumentRepository.
pub struct MongoDocumentRepository {
    collection: mongodb::Collection<Document>,
}

impl MongoDocumentRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("documents"),
        }
    }

    /// Indexes backing the common list filters.
    pub async fn ensure_indexes(&self) -> Result<(), AppError> {
        use bson::doc;
        use mongodb::IndexModel;

        let models = vec![
            IndexModel::builder().keys(doc! { "author": 1 }).build(),
            IndexModel::builder().keys(doc! { "stakeholders": 1 }).build(),
            IndexModel::builder().keys(doc! { "owners": 1 }).build(),
            IndexModel::builder().keys(doc! { "category": 1, "createdAt": -1 }).build(),
            IndexModel::builder().keys(doc! { "createdAt": -1 }).build(),
        ];
        self.collection.create_indexes(models).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentRepository for MongoDocumentRepository {
    async fn insert(&self, mut doc: Document) -> Result<Document, AppError> {
        let result = self.collection.insert_one(&doc).await?;
        doc.id = result.inserted_id.as_object_id();
        Ok(doc)
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<Document>, AppError> {
        use bson::doc;

        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn update_fields(
        &self,
        id: ObjectId,
        set: bson::Document,
    ) -> Result<Option<Document>, AppError> {
        use bson::doc;
        use mongodb::options::ReturnDocument;

        Ok(self
            .collection
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn append_version(
        &self,
        id: ObjectId,
        entry: VersionEntry,
        updated_by: ObjectId,
        updated_at: BsonDateTime,
    ) -> Result<Option<Document>, AppError> {
        use bson::doc;
        use mongodb::options::ReturnDocument;

        let version = entry.version;
        let file = entry.file;
        let entry = bson::to_document(&entry)?;
        let current = doc! { "$ifNull": ["$currentVersion", 0] };
        let newer = doc! { "$gt": [version, current.clone()] };

        let pipeline = vec![doc! { "$set": {
            "versionHistory": { "$concatArrays": [
                { "$ifNull": ["$versionHistory", []] },
                [{ "$literal": entry }],
            ] },
            "currentVersion": { "$max": [version, current] },
            "currentFile": { "$cond": [newer, file, "$currentFile"] },
            "updatedBy": updated_by,
            "updatedAt": updated_at,
        } }];

        Ok(self
            .collection
            .find_one_and_update(doc! { "_id": id }, pipeline)
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn delete(&self, id: ObjectId) -> Result<bool, AppError> {
        use bson::doc;

        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn search(&self, query: &SearchQuery) -> Result<(Vec<Document>, u64), AppError> {
        use mongodb::options::FindOptions;

        let options = FindOptions::builder()
            .sort(query.sort.clone())
            .skip(query.skip)
            .limit(query.limit)
            .build();

        let find = async {
            let cursor = self
                .collection
                .find(query.filter.clone())
                .with_options(options)
                .await?;
            cursor.try_collect::<Vec<Document>>().await
        };
        let count = async { self.collection.count_documents(query.filter.clone()).await };

        let (documents, total) = futures::try_join!(find, count)?;
        Ok((documents, total))
    }

    async fn count(&self, filter: bson::Document) -> Result<u64, AppError> {
        Ok(self.collection.count_documents(filter).await?)
    }

    async fn aggregate(
        &self,
        pipeline: Vec<bson::Document>,
    ) -> Result<Vec<bson::Document>, AppError> {
        let cursor = self.collection.aggregate(pipeline).await?;
        Ok(cursor.try_collect().await?)
    }
}
