use bson::oid::ObjectId;
use bson::DateTime as BsonDateTime;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::auth::models::{AuthenticatedUser, Role};
use crate::clock::Clock;
use crate::db::file_repository::FileRepository;
use crate::db::models::{
    Document, DocumentView, FileRecord, FileView, NotificationKind, VersionEntry,
};
use crate::db::notification_repository::NotificationRepository;
use crate::db::repository::DocumentRepository;
use crate::db::review_repository::ReviewRepository;
use crate::error::AppError;
use crate::services::access;
use crate::services::dashboard::DashboardCaches;
use crate::services::notifications::{self, Event};
use crate::services::pagination::{Page, Pagination};
use crate::services::query::{self, DocumentQuery};
use crate::services::validation::{
    are_all_fields_empty, optional_text, parse_date, parse_object_id, parse_object_ids,
    validate_title,
};
use crate::storage::client::StorageClient;

/// A file received with a request, read fully into memory.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Stored content of one document version.
#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentInput {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub team: Option<String>,
    pub project: Option<String>,
    #[serde(default)]
    pub stakeholders: Vec<String>,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub external_contacts: Vec<String>,
    pub opens_for_review: Option<String>,
    pub review_interval: Option<u32>,
    /// Changelog of the initial file, if one is uploaded.
    pub changelog: Option<String>,
}

/// Partial update. Absent fields are left alone; a blank reference or date
/// clears the field.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocumentInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub team: Option<String>,
    pub project: Option<String>,
    pub stakeholders: Option<Vec<String>>,
    pub owners: Option<Vec<String>>,
    pub external_contacts: Option<Vec<String>>,
    pub opens_for_review: Option<String>,
    pub review_interval: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedDocument {
    pub document: DocumentView,
    pub changed_fields: Vec<String>,
}

pub struct DocumentService<'a> {
    pub documents: &'a dyn DocumentRepository,
    pub files: &'a dyn FileRepository,
    pub reviews: &'a dyn ReviewRepository,
    pub notifications: &'a dyn NotificationRepository,
    pub storage: &'a dyn StorageClient,
    pub caches: &'a DashboardCaches,
    pub clock: &'a dyn Clock,
}

fn optional_ref(raw: Option<&str>, what: &str) -> Result<Option<ObjectId>, AppError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => parse_object_id(value, what).map(Some),
        None => Ok(None),
    }
}

fn optional_date(raw: Option<&str>, what: &str) -> Result<Option<BsonDateTime>, AppError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => parse_date(value, what).map(Some),
        None => Ok(None),
    }
}

fn set_if_changed<T: PartialEq>(slot: &mut T, value: T, field: &str, changed: &mut Vec<String>) {
    if *slot != value {
        *slot = value;
        changed.push(field.to_string());
    }
}

/// Keep a file name usable inside a storage key.
fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    let sanitized = sanitized.trim_matches('.').to_string();
    if sanitized.is_empty() {
        "upload.bin".to_string()
    } else {
        sanitized
    }
}

fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn stored_id(doc: &Document) -> Result<ObjectId, AppError> {
    doc.id
        .ok_or_else(|| AppError::Internal("Stored document has no id".into()))
}

/// `$set` body holding the named fields of `doc` as they would be stored.
fn fields_of(doc: &Document, fields: &[&str]) -> Result<bson::Document, AppError> {
    let stored = bson::to_document(doc)?;
    Ok(fields
        .iter()
        .map(|field| {
            let value = stored.get(*field).cloned().unwrap_or(bson::Bson::Null);
            (field.to_string(), value)
        })
        .collect())
}

impl DocumentService<'_> {
    fn now(&self) -> BsonDateTime {
        BsonDateTime::from_chrono(self.clock.now())
    }

    async fn load(&self, id: ObjectId) -> Result<Document, AppError> {
        self.documents
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Document not found".into()))
    }

    /// Write only `fields` of `doc` and return the stored result.
    async fn save_fields(&self, doc: &Document, fields: &[&str]) -> Result<Document, AppError> {
        let id = stored_id(doc)?;
        self.documents
            .update_fields(id, fields_of(doc, fields)?)
            .await?
            .ok_or_else(|| AppError::NotFound("Document not found".into()))
    }

    /// Attach a stored file to the document's history.
    async fn attach_version(
        &self,
        id: ObjectId,
        file: &FileRecord,
        user: &AuthenticatedUser,
    ) -> Result<Document, AppError> {
        let entry = VersionEntry::for_file(file)
            .ok_or_else(|| AppError::Internal("Stored file has no id".into()))?;
        self.documents
            .append_version(id, entry, user.user_id, self.now())
            .await?
            .ok_or_else(|| AppError::NotFound("Document not found".into()))
    }

    async fn notify(
        &self,
        user: &AuthenticatedUser,
        doc: &Document,
        kind: NotificationKind,
        message: String,
        recipients: Vec<ObjectId>,
    ) {
        let event = Event {
            kind,
            actor: user.user_id,
            document: doc.id,
            message,
        };
        notifications::fan_out(self.notifications, &event, recipients, self.clock.now()).await;
    }

    /// Put the bytes into storage and record them as the document's next version.
    async fn store_file(
        &self,
        document: ObjectId,
        upload: UploadedFile,
        changelog: String,
        user: &AuthenticatedUser,
    ) -> Result<FileRecord, AppError> {
        if upload.bytes.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".into()));
        }

        let storage_key = format!(
            "documents/{}/{}-{}",
            document.to_hex(),
            uuid::Uuid::new_v4(),
            sanitize_file_name(&upload.original_name)
        );
        let record = FileRecord {
            id: None,
            document,
            original_name: upload.original_name,
            storage_key: storage_key.clone(),
            mime_type: upload.mime_type,
            size: upload.bytes.len() as i64,
            checksum: checksum(&upload.bytes),
            version: 0,
            changelog,
            uploaded_by: user.user_id,
            uploaded_at: self.now(),
        };

        self.storage.put_object(&storage_key, upload.bytes).await?;

        match self.files.insert_next_version(record).await {
            Ok(stored) => Ok(stored),
            Err(e) => {
                if let Err(cleanup) = self.storage.delete_object(&storage_key).await {
                    tracing::warn!(
                        key = %storage_key,
                        "Failed to remove orphaned upload: {cleanup}"
                    );
                }
                Err(e)
            }
        }
    }

    pub async fn create_document(
        &self,
        user: &AuthenticatedUser,
        input: CreateDocumentInput,
        upload: Option<UploadedFile>,
    ) -> Result<DocumentView, AppError> {
        user.require(Role::Editor)?;

        let title = validate_title(&input.title)?;
        if upload.as_ref().is_some_and(|u| u.bytes.is_empty()) {
            return Err(AppError::Validation("Uploaded file is empty".into()));
        }

        let now = self.now();
        let doc = Document {
            id: None,
            title,
            description: optional_text(input.description).unwrap_or_default(),
            author: user.user_id,
            category: optional_ref(input.category.as_deref(), "category")?,
            team: optional_ref(input.team.as_deref(), "team")?,
            project: optional_ref(input.project.as_deref(), "project")?,
            stakeholders: parse_object_ids(&input.stakeholders, "stakeholder")?,
            owners: parse_object_ids(&input.owners, "owner")?,
            external_contacts: parse_object_ids(&input.external_contacts, "contact")?,
            opens_for_review: optional_date(input.opens_for_review.as_deref(), "review")?,
            review_date: None,
            review_interval: input.review_interval.filter(|days| *days > 0),
            review_completed: false,
            review_completed_by: None,
            review_completed_at: None,
            current_version: 0,
            current_file: None,
            version_history: vec![],
            created_by: user.user_id,
            updated_by: None,
            created_at: now,
            updated_at: now,
        };

        let mut doc = self.documents.insert(doc).await?;
        let doc_id = stored_id(&doc)?;

        if let Some(upload) = upload {
            let changelog =
                optional_text(input.changelog).unwrap_or_else(|| "Initial version".into());
            let file = match self.store_file(doc_id, upload, changelog, user).await {
                Ok(file) => file,
                Err(e) => {
                    if let Err(cleanup) = self.documents.delete(doc_id).await {
                        tracing::warn!(
                            document = %doc_id,
                            "Failed to roll back document: {cleanup}"
                        );
                    }
                    return Err(e);
                }
            };
            doc = self.attach_version(doc_id, &file, user).await?;
        }

        tracing::info!(document = %doc_id, author = %user.user_id, "Document created");

        let recipients = doc.stakeholders.iter().chain(&doc.owners).copied().collect();
        let message = format!("{} shared \"{}\" with you", user.email, doc.title);
        self.notify(user, &doc, NotificationKind::DocumentCreated, message, recipients)
            .await;
        self.caches.invalidate_documents();

        Ok(doc.into())
    }

    pub async fn get_document(
        &self,
        user: &AuthenticatedUser,
        id: ObjectId,
    ) -> Result<DocumentView, AppError> {
        let doc = self.load(id).await?;
        access::ensure_read(&doc, user)?;
        Ok(doc.into())
    }

    pub async fn search_documents(
        &self,
        user: &AuthenticatedUser,
        query: &DocumentQuery,
    ) -> Result<Page<DocumentView>, AppError> {
        let search = query::build_search(query, user, self.clock.now());
        let (documents, total) = self.documents.search(&search).await?;

        Ok(Page {
            items: documents.into_iter().map(DocumentView::from).collect(),
            pagination: Pagination::new(total, search.limit as u64, search.skip),
        })
    }

    pub async fn update_document(
        &self,
        user: &AuthenticatedUser,
        id: ObjectId,
        patch: serde_json::Value,
    ) -> Result<UpdatedDocument, AppError> {
        if !patch.is_object() {
            return Err(AppError::Validation("Expected a JSON object".into()));
        }
        if are_all_fields_empty(&patch) {
            return Err(AppError::Validation("No fields to update".into()));
        }
        let input: UpdateDocumentInput = serde_json::from_value(patch)
            .map_err(|e| AppError::Validation(format!("Invalid update: {e}")))?;

        let mut doc = self.load(id).await?;
        access::ensure_modify(&doc, user)?;

        let mut changed = Vec::new();
        if let Some(title) = input.title.as_deref() {
            set_if_changed(&mut doc.title, validate_title(title)?, "title", &mut changed);
        }
        if let Some(description) = input.description {
            let description = description.trim().to_string();
            set_if_changed(&mut doc.description, description, "description", &mut changed);
        }
        if let Some(category) = input.category.as_deref() {
            let category = optional_ref(Some(category), "category")?;
            set_if_changed(&mut doc.category, category, "category", &mut changed);
        }
        if let Some(team) = input.team.as_deref() {
            let team = optional_ref(Some(team), "team")?;
            set_if_changed(&mut doc.team, team, "team", &mut changed);
        }
        if let Some(project) = input.project.as_deref() {
            let project = optional_ref(Some(project), "project")?;
            set_if_changed(&mut doc.project, project, "project", &mut changed);
        }
        if let Some(stakeholders) = &input.stakeholders {
            let stakeholders = parse_object_ids(stakeholders, "stakeholder")?;
            set_if_changed(&mut doc.stakeholders, stakeholders, "stakeholders", &mut changed);
        }
        if let Some(owners) = &input.owners {
            let owners = parse_object_ids(owners, "owner")?;
            set_if_changed(&mut doc.owners, owners, "owners", &mut changed);
        }
        if let Some(contacts) = &input.external_contacts {
            let contacts = parse_object_ids(contacts, "contact")?;
            set_if_changed(&mut doc.external_contacts, contacts, "externalContacts", &mut changed);
        }
        if let Some(opens) = input.opens_for_review.as_deref() {
            let opens = optional_date(Some(opens), "review")?;
            set_if_changed(&mut doc.opens_for_review, opens, "opensForReview", &mut changed);
        }
        if let Some(days) = input.review_interval {
            let days = Some(days).filter(|d| *d > 0);
            set_if_changed(&mut doc.review_interval, days, "reviewInterval", &mut changed);
        }

        if changed.is_empty() {
            return Ok(UpdatedDocument {
                document: doc.into(),
                changed_fields: changed,
            });
        }

        doc.updated_by = Some(user.user_id);
        doc.updated_at = self.now();
        let mut fields: Vec<&str> = changed.iter().map(String::as_str).collect();
        fields.extend(["updatedBy", "updatedAt"]);
        let doc = self.save_fields(&doc, &fields).await?;

        tracing::info!(document = %id, fields = ?changed, "Document updated");

        let mut recipients: Vec<ObjectId> =
            doc.stakeholders.iter().chain(&doc.owners).copied().collect();
        match self.reviews.list_for_document(id).await {
            Ok(assignments) => recipients.extend(
                assignments
                    .into_iter()
                    .filter(|a| !a.completed)
                    .map(|a| a.reviewer),
            ),
            Err(e) => {
                tracing::warn!(document = %id, "Could not load reviewers to notify: {e}")
            }
        }
        let message = format!("{} updated \"{}\": {}", user.email, doc.title, changed.join(", "));
        self.notify(user, &doc, NotificationKind::DocumentUpdated, message, recipients)
            .await;
        self.caches.invalidate_documents();

        Ok(UpdatedDocument {
            document: doc.into(),
            changed_fields: changed,
        })
    }

    /// Remove a document with its files, stored content and review assignments.
    pub async fn delete_document(
        &self,
        user: &AuthenticatedUser,
        id: ObjectId,
    ) -> Result<(), AppError> {
        let doc = self.load(id).await?;
        access::ensure_delete(&doc, user)?;

        if !self.documents.delete(id).await? {
            return Err(AppError::NotFound("Document not found".into()));
        }

        let removed = self.files.delete_for_document(id).await?;
        for file in &removed {
            if let Err(e) = self.storage.delete_object(&file.storage_key).await {
                tracing::warn!(key = %file.storage_key, "Failed to delete stored file: {e}");
            }
        }
        self.reviews.delete_for_document(id).await?;

        tracing::info!(
            document = %id,
            files = removed.len(),
            by = %user.user_id,
            "Document deleted"
        );
        self.caches.invalidate_documents();
        Ok(())
    }

    /// Sign off the current review.
    ///
    /// Allowed for anyone who may modify the document and for its open
    /// reviewers. With a review interval, the next review is scheduled.
    pub async fn complete_review(
        &self,
        user: &AuthenticatedUser,
        id: ObjectId,
    ) -> Result<DocumentView, AppError> {
        let mut doc = self.load(id).await?;

        if !access::can_modify(&doc, user) {
            let assignments = self.reviews.list_for_document(id).await?;
            let assigned = assignments
                .iter()
                .any(|a| a.reviewer == user.user_id && !a.completed);
            if !assigned {
                access::ensure_modify(&doc, user)?;
            }
        }

        if doc.review_completed {
            return Err(AppError::Conflict("Review is already completed".into()));
        }

        let now = self.clock.now();
        doc.complete_review(user.user_id, BsonDateTime::from_chrono(now));
        if let Some(days) = doc.review_interval {
            let next = now + Duration::days(i64::from(days));
            doc.opens_for_review = Some(BsonDateTime::from_chrono(next));
        }
        doc.updated_by = Some(user.user_id);
        doc.updated_at = BsonDateTime::from_chrono(now);
        let doc = self
            .save_fields(
                &doc,
                &[
                    "reviewCompleted",
                    "reviewCompletedBy",
                    "reviewCompletedAt",
                    "opensForReview",
                    "updatedBy",
                    "updatedAt",
                ],
            )
            .await?;

        let closed = self
            .reviews
            .complete(id, user.user_id, BsonDateTime::from_chrono(now))
            .await?;
        tracing::info!(document = %id, reviewer = %user.user_id, closed, "Review completed");

        let message = format!("{} completed the review of \"{}\"", user.email, doc.title);
        let author = doc.author;
        self.notify(user, &doc, NotificationKind::ReviewCompleted, message, vec![author])
            .await;
        self.caches.invalidate_documents();

        Ok(doc.into())
    }

    pub async fn reopen_review(
        &self,
        user: &AuthenticatedUser,
        id: ObjectId,
    ) -> Result<DocumentView, AppError> {
        let mut doc = self.load(id).await?;
        access::ensure_modify(&doc, user)?;

        if !doc.review_completed {
            return Err(AppError::Conflict("Review is not completed".into()));
        }

        doc.reopen_review();
        doc.updated_by = Some(user.user_id);
        doc.updated_at = self.now();
        let doc = self
            .save_fields(
                &doc,
                &[
                    "reviewCompleted",
                    "reviewCompletedBy",
                    "reviewCompletedAt",
                    "updatedBy",
                    "updatedAt",
                ],
            )
            .await?;

        tracing::info!(document = %id, by = %user.user_id, "Review reopened");
        self.caches.invalidate_documents();
        Ok(doc.into())
    }

    pub async fn upload_version(
        &self,
        user: &AuthenticatedUser,
        id: ObjectId,
        upload: UploadedFile,
        changelog: Option<String>,
    ) -> Result<FileView, AppError> {
        let doc = self.load(id).await?;
        access::ensure_modify(&doc, user)?;

        let changelog = optional_text(changelog).unwrap_or_default();
        let file = self.store_file(id, upload, changelog, user).await?;
        let doc = self.attach_version(id, &file, user).await?;

        tracing::info!(
            document = %id,
            version = file.version,
            size = file.size,
            "New version uploaded"
        );

        let recipients = doc.stakeholders.iter().chain(&doc.owners).copied().collect();
        let message = format!(
            "{} uploaded version {} of \"{}\"",
            user.email, file.version, doc.title
        );
        self.notify(user, &doc, NotificationKind::NewVersion, message, recipients)
            .await;
        self.caches.invalidate_documents();

        Ok(file.into())
    }

    pub async fn list_versions(
        &self,
        user: &AuthenticatedUser,
        id: ObjectId,
    ) -> Result<Vec<FileView>, AppError> {
        let doc = self.load(id).await?;
        access::ensure_read(&doc, user)?;

        let files = self.files.list_for_document(id).await?;
        Ok(files.into_iter().map(FileView::from).collect())
    }

    /// Content of `version`, or of the current version when `None`.
    pub async fn download(
        &self,
        user: &AuthenticatedUser,
        id: ObjectId,
        version: Option<i32>,
    ) -> Result<Download, AppError> {
        let doc = self.load(id).await?;
        access::ensure_read(&doc, user)?;

        let version = version.unwrap_or(doc.current_version);
        if version < 1 {
            return Err(AppError::NotFound("Document has no file".into()));
        }

        let file = self
            .files
            .find_version(id, version)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Version {version} not found")))?;

        let bytes = self
            .storage
            .get_object(&file.storage_key)
            .await?
            .ok_or_else(|| AppError::NotFound("Stored file content is missing".into()))?;

        Ok(Download {
            file_name: file.original_name,
            mime_type: file.mime_type,
            bytes,
        })
    }
}
