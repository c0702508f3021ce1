use bson::oid::ObjectId;
use bson::DateTime as BsonDateTime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::models::Role;

fn hex(id: &Option<ObjectId>) -> String {
    id.map(|id| id.to_hex()).unwrap_or_default()
}

fn hex_opt(id: &Option<ObjectId>) -> Option<String> {
    id.map(|id| id.to_hex())
}

fn hex_all(ids: &[ObjectId]) -> Vec<String> {
    ids.iter().map(|id| id.to_hex()).collect()
}

fn chrono_opt(at: Option<BsonDateTime>) -> Option<DateTime<Utc>> {
    at.map(BsonDateTime::to_chrono)
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// A user account, stored in the `users` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    /// Unique, stored lower-case.
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub team: Option<ObjectId>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

/// User as returned by the API. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        Self {
            id: hex(&u.id),
            name: u.name,
            email: u.email,
            username: u.username,
            role: u.role,
            department: u.department,
            title: u.title,
            phone: u.phone,
            team: hex_opt(&u.team),
            created_at: u.created_at.to_chrono(),
            updated_at: u.updated_at.to_chrono(),
        }
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// One entry of a document's upload history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub version: i32,
    pub file: ObjectId,
    #[serde(default)]
    pub changelog: String,
    pub uploaded_by: ObjectId,
    pub uploaded_at: BsonDateTime,
}

impl VersionEntry {
    /// History entry for a stored file; `None` until the file has an id.
    pub fn for_file(file: &FileRecord) -> Option<Self> {
        Some(Self {
            version: file.version,
            file: file.id?,
            changelog: file.changelog.clone(),
            uploaded_by: file.uploaded_by,
            uploaded_at: file.uploaded_at,
        })
    }
}

/// A managed document, stored in the `documents` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// The owning user.
    pub author: ObjectId,
    #[serde(default)]
    pub category: Option<ObjectId>,
    #[serde(default)]
    pub team: Option<ObjectId>,
    #[serde(default)]
    pub project: Option<ObjectId>,
    #[serde(default)]
    pub stakeholders: Vec<ObjectId>,
    #[serde(default)]
    pub owners: Vec<ObjectId>,
    #[serde(default)]
    pub external_contacts: Vec<ObjectId>,
    /// When the document next opens for review.
    #[serde(default)]
    pub opens_for_review: Option<BsonDateTime>,
    /// Legacy review date, consulted only when `opens_for_review` is unset.
    #[serde(default)]
    pub review_date: Option<BsonDateTime>,
    /// Days between periodic reviews.
    #[serde(default)]
    pub review_interval: Option<u32>,
    #[serde(default)]
    pub review_completed: bool,
    #[serde(default)]
    pub review_completed_by: Option<ObjectId>,
    #[serde(default)]
    pub review_completed_at: Option<BsonDateTime>,
    /// Version number of the current file, 0 when no file was uploaded.
    #[serde(default)]
    pub current_version: i32,
    #[serde(default)]
    pub current_file: Option<ObjectId>,
    #[serde(default)]
    pub version_history: Vec<VersionEntry>,
    pub created_by: ObjectId,
    #[serde(default)]
    pub updated_by: Option<ObjectId>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

impl Document {
    /// The review due date, preferring the current field over the legacy one.
    pub fn review_due(&self) -> Option<BsonDateTime> {
        self.opens_for_review.or(self.review_date)
    }

    pub fn is_overdue(&self, now: BsonDateTime) -> bool {
        !self.review_completed && self.review_due().is_some_and(|due| due < now)
    }

    /// Mark the review as done by `by`.
    pub fn complete_review(&mut self, by: ObjectId, at: BsonDateTime) {
        self.review_completed = true;
        self.review_completed_by = Some(by);
        self.review_completed_at = Some(at);
    }

    /// Reopen the review. Completion metadata is cleared with the flag.
    pub fn reopen_review(&mut self) {
        self.review_completed = false;
        self.review_completed_by = None;
        self.review_completed_at = None;
    }

    /// Record an upload. The current version only moves forward.
    pub fn push_version(&mut self, entry: VersionEntry) {
        if entry.version > self.current_version {
            self.current_version = entry.version;
            self.current_file = Some(entry.file);
        }
        self.version_history.push(entry);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntryView {
    pub version: i32,
    pub file: String,
    pub changelog: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&VersionEntry> for VersionEntryView {
    fn from(v: &VersionEntry) -> Self {
        Self {
            version: v.version,
            file: v.file.to_hex(),
            changelog: v.changelog.clone(),
            uploaded_by: v.uploaded_by.to_hex(),
            uploaded_at: v.uploaded_at.to_chrono(),
        }
    }
}

/// Document as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub category: Option<String>,
    pub team: Option<String>,
    pub project: Option<String>,
    pub stakeholders: Vec<String>,
    pub owners: Vec<String>,
    pub external_contacts: Vec<String>,
    pub opens_for_review: Option<DateTime<Utc>>,
    pub review_interval: Option<u32>,
    pub review_completed: bool,
    pub review_completed_by: Option<String>,
    pub review_completed_at: Option<DateTime<Utc>>,
    pub current_version: i32,
    pub version_history: Vec<VersionEntryView>,
    pub created_by: String,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Document> for DocumentView {
    fn from(d: Document) -> Self {
        Self {
            id: hex(&d.id),
            opens_for_review: chrono_opt(d.review_due()),
            title: d.title,
            description: d.description,
            author: d.author.to_hex(),
            category: hex_opt(&d.category),
            team: hex_opt(&d.team),
            project: hex_opt(&d.project),
            stakeholders: hex_all(&d.stakeholders),
            owners: hex_all(&d.owners),
            external_contacts: hex_all(&d.external_contacts),
            review_interval: d.review_interval,
            review_completed: d.review_completed,
            review_completed_by: hex_opt(&d.review_completed_by),
            review_completed_at: chrono_opt(d.review_completed_at),
            current_version: d.current_version,
            version_history: d.version_history.iter().map(VersionEntryView::from).collect(),
            created_by: d.created_by.to_hex(),
            updated_by: hex_opt(&d.updated_by),
            created_at: d.created_at.to_chrono(),
            updated_at: d.updated_at.to_chrono(),
        }
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Metadata of an uploaded artifact, stored in the `files` collection.
///
/// The bytes live in the storage backend under `storage_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub document: ObjectId,
    pub original_name: String,
    pub storage_key: String,
    pub mime_type: String,
    pub size: i64,
    /// Hex SHA-256 of the content.
    pub checksum: String,
    /// Per-document version, assigned on insert.
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub changelog: String,
    pub uploaded_by: ObjectId,
    pub uploaded_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileView {
    pub id: String,
    pub document: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub checksum: String,
    pub version: i32,
    pub changelog: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<FileRecord> for FileView {
    fn from(f: FileRecord) -> Self {
        Self {
            id: hex(&f.id),
            document: f.document.to_hex(),
            original_name: f.original_name,
            mime_type: f.mime_type,
            size: f.size,
            checksum: f.checksum,
            version: f.version,
            changelog: f.changelog,
            uploaded_by: f.uploaded_by.to_hex(),
            uploaded_at: f.uploaded_at.to_chrono(),
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    DocumentCreated,
    DocumentUpdated,
    NewVersion,
    ReviewAssigned,
    ReviewCompleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub recipient: ObjectId,
    pub actor: ObjectId,
    #[serde(default)]
    pub document: Option<ObjectId>,
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: String,
    pub actor: String,
    pub document: Option<String>,
    pub kind: NotificationKind,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationView {
    fn from(n: Notification) -> Self {
        Self {
            id: hex(&n.id),
            actor: n.actor.to_hex(),
            document: hex_opt(&n.document),
            kind: n.kind,
            message: n.message,
            read: n.read,
            created_at: n.created_at.to_chrono(),
        }
    }
}

// ---------------------------------------------------------------------------
// Review assignments
// ---------------------------------------------------------------------------

/// Ties a reviewer to a document for sign-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAssignment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub document: ObjectId,
    pub reviewer: ObjectId,
    pub assigned_by: ObjectId,
    #[serde(default)]
    pub due_date: Option<BsonDateTime>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<BsonDateTime>,
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAssignmentView {
    pub id: String,
    pub document: String,
    pub reviewer: String,
    pub assigned_by: String,
    pub due_date: Option<DateTime<Utc>>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ReviewAssignment> for ReviewAssignmentView {
    fn from(r: ReviewAssignment) -> Self {
        Self {
            id: hex(&r.id),
            document: r.document.to_hex(),
            reviewer: r.reviewer.to_hex(),
            assigned_by: r.assigned_by.to_hex(),
            due_date: chrono_opt(r.due_date),
            completed: r.completed,
            completed_at: chrono_opt(r.completed_at),
            created_at: r.created_at.to_chrono(),
        }
    }
}

// ---------------------------------------------------------------------------
// Revoked tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistedToken {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub jti: String,
    /// Mongo's TTL monitor deletes the entry after this instant.
    pub expires_at: BsonDateTime,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: Vec<ObjectId>,
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub team: Option<ObjectId>,
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalContactType {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalContact {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub contact_type: Option<ObjectId>,
    pub created_at: BsonDateTime,
}

/// A dashboard chart saved by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomChart {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub owner: ObjectId,
    /// `bar`, `line`, `pie` or `table`.
    pub chart_type: String,
    /// Free-form chart settings owned by the frontend.
    #[serde(default)]
    pub config: bson::Document,
    pub created_at: BsonDateTime,
}
