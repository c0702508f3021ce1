use std::sync::Arc;

use async_trait::async_trait;
use bson::oid::ObjectId;
use futures::TryStreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::models::{Category, CustomChart, ExternalContact, ExternalContactType, Project, Team};
use crate::error::AppError;

/// A record type kept in its own collection with an `_id` and a name.
pub trait CatalogRecord: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    const COLLECTION: &'static str;
    /// Whether `name` is unique across the collection.
    const UNIQUE_NAME: bool = true;

    fn id(&self) -> Option<ObjectId>;
    fn set_id(&mut self, id: Option<ObjectId>);
}

macro_rules! catalog_record {
    ($ty:ty, $collection:literal) => {
        impl CatalogRecord for $ty {
            const COLLECTION: &'static str = $collection;

            fn id(&self) -> Option<ObjectId> {
                self.id
            }

            fn set_id(&mut self, id: Option<ObjectId>) {
                self.id = id;
            }
        }
    };
}

catalog_record!(Category, "categories");
catalog_record!(Team, "teams");
catalog_record!(Project, "projects");
catalog_record!(ExternalContactType, "externalContactTypes");
catalog_record!(ExternalContact, "externalContacts");

// Chart names are only meaningful per owner.
impl CatalogRecord for CustomChart {
    const COLLECTION: &'static str = "customCharts";
    const UNIQUE_NAME: bool = false;

    fn id(&self) -> Option<ObjectId> {
        self.id
    }

    fn set_id(&mut self, id: Option<ObjectId>) {
        self.id = id;
    }
}

/// CRUD over one catalog collection.
#[async_trait]
pub trait CatalogRepository<T: CatalogRecord>: Send + Sync {
    async fn insert(&self, item: T) -> Result<T, AppError>;

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<T>, AppError>;

    /// Everything, sorted by name.
    async fn list(&self) -> Result<Vec<T>, AppError>;

    async fn replace(&self, item: &T) -> Result<(), AppError>;

    async fn delete(&self, id: ObjectId) -> Result<bool, AppError>;
}

pub struct MongoCatalogRepository<T: CatalogRecord> {
    collection: mongodb::Collection<T>,
}

impl<T: CatalogRecord> MongoCatalogRepository<T> {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection(T::COLLECTION),
        }
    }

    pub async fn ensure_indexes(&self) -> Result<(), AppError> {
        use bson::doc;
        use mongodb::options::IndexOptions;
        use mongodb::IndexModel;

        let model = IndexModel::builder()
            .keys(doc! { "name": 1 })
            .options(IndexOptions::builder().unique(T::UNIQUE_NAME).build())
            .build();
        self.collection.create_index(model).await?;
        Ok(())
    }
}

#[async_trait]
impl<T: CatalogRecord> CatalogRepository<T> for MongoCatalogRepository<T> {
    async fn insert(&self, mut item: T) -> Result<T, AppError> {
        let result = self.collection.insert_one(&item).await?;
        item.set_id(result.inserted_id.as_object_id());
        Ok(item)
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<T>, AppError> {
        use bson::doc;

        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn list(&self) -> Result<Vec<T>, AppError> {
        use bson::doc;
        use mongodb::options::FindOptions;

        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        let cursor = self.collection.find(doc! {}).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn replace(&self, item: &T) -> Result<(), AppError> {
        use bson::doc;

        let id = item
            .id()
            .ok_or_else(|| AppError::Internal("Cannot replace a record without id".into()))?;

        let result = self.collection.replace_one(doc! { "_id": id }, item).await?;
        if result.matched_count == 0 {
            return Err(AppError::NotFound("Record not found".into()));
        }
        Ok(())
    }

    async fn delete(&self, id: ObjectId) -> Result<bool, AppError> {
        use bson::doc;

        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }
}

/// One repository per catalog collection.
#[derive(Clone)]
pub struct CatalogRepositories {
    pub categories: Arc<dyn CatalogRepository<Category>>,
    pub teams: Arc<dyn CatalogRepository<Team>>,
    pub projects: Arc<dyn CatalogRepository<Project>>,
    pub contact_types: Arc<dyn CatalogRepository<ExternalContactType>>,
    pub contacts: Arc<dyn CatalogRepository<ExternalContact>>,
    pub charts: Arc<dyn CatalogRepository<CustomChart>>,
}

impl CatalogRepositories {
    /// Mongo-backed repositories with their indexes in place.
    pub async fn connect(db: &mongodb::Database) -> Result<Self, AppError> {
        async fn build<T: CatalogRecord>(
            db: &mongodb::Database,
        ) -> Result<Arc<dyn CatalogRepository<T>>, AppError> {
            let repo = MongoCatalogRepository::<T>::new(db);
            repo.ensure_indexes().await?;
            Ok(Arc::new(repo))
        }

        Ok(Self {
            categories: build(db).await?,
            teams: build(db).await?,
            projects: build(db).await?,
            contact_types: build(db).await?,
            contacts: build(db).await?,
            charts: build(db).await?,
        })
    }
}
