use std::collections::HashMap;

use axum::extract::multipart::MultipartRejection;
use axum::extract::Multipart;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::auth::AuthUser;
use crate::db::models::{DocumentView, FileView};
use crate::error::AppError;
use crate::services::documents::{CreateDocumentInput, Download, UploadedFile};
use crate::services::validation::parse_object_id;

/// Text fields and the optional `file` part of a multipart form.
#[derive(Debug, Default)]
struct UploadForm {
    fields: HashMap<String, Vec<String>>,
    file: Option<UploadedFile>,
}

impl UploadForm {
    fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).and_then(|values| values.last().cloned())
    }

    /// Id lists arrive either as repeated fields (`owners`, `owners[]`) or
    /// as one field holding a JSON array.
    fn list(&self, name: &str) -> Result<Vec<String>, AppError> {
        let mut values = Vec::new();
        for key in [name.to_string(), format!("{name}[]")] {
            for raw in self.fields.get(&key).into_iter().flatten() {
                let raw = raw.trim();
                if raw.starts_with('[') {
                    let parsed: Vec<String> = serde_json::from_str(raw)
                        .map_err(|_| AppError::Validation(format!("Invalid {name} list")))?;
                    values.extend(parsed);
                } else if !raw.is_empty() {
                    values.push(raw.to_string());
                }
            }
        }
        Ok(values)
    }

    fn into_document_input(self) -> Result<(CreateDocumentInput, Option<UploadedFile>), AppError> {
        let review_interval = match self.text("reviewInterval").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(raw.trim().parse::<u32>().map_err(|_| {
                AppError::Validation("Review interval must be a whole number of days".into())
            })?),
            None => None,
        };

        let input = CreateDocumentInput {
            title: self.text("title").unwrap_or_default(),
            description: self.text("description"),
            category: self.text("category"),
            team: self.text("team"),
            project: self.text("project"),
            stakeholders: self.list("stakeholders")?,
            owners: self.list("owners")?,
            external_contacts: self.list("externalContacts")?,
            opens_for_review: self.text("opensForReview"),
            review_interval,
            changelog: self.text("changelog"),
        };
        Ok((input, self.file))
    }
}

async fn read_form(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadForm, AppError> {
    let mut multipart = multipart?;
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == "file" {
            if form.file.is_some() {
                return Err(AppError::Validation("Only one file may be uploaded".into()));
            }
            let original_name = field.file_name().unwrap_or("upload.bin").to_string();
            let mime_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read file: {e}")))?;

            form.file = Some(UploadedFile {
                original_name,
                mime_type,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read field '{name}': {e}")))?;
        form.fields.entry(name).or_default().push(value);
    }

    Ok(form)
}

/// `POST /api/documents/upload`
///
/// Creates a document from multipart metadata fields; the `file` part
/// becomes version 1.
pub async fn create_with_file_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    AuthUser(user): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, axum::Json<DocumentView>), AppError> {
    let form = read_form(multipart).await?;
    let (input, file) = form.into_document_input()?;
    let file = file.ok_or_else(|| AppError::Validation("No file field found in request".into()))?;

    let document = state
        .documents()
        .create_document(&user, input, Some(file))
        .await?;
    Ok((StatusCode::CREATED, axum::Json(document)))
}

/// `POST /api/documents/{id}/versions`
pub async fn upload_version_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    AuthUser(user): AuthUser,
    axum::extract::Path(id): axum::extract::Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, axum::Json<FileView>), AppError> {
    let id = parse_object_id(&id, "document")?;
    let mut form = read_form(multipart).await?;
    let changelog = form.text("changelog");
    let file = form
        .file
        .take()
        .ok_or_else(|| AppError::Validation("No file field found in request".into()))?;

    let version = state
        .documents()
        .upload_version(&user, id, file, changelog)
        .await?;
    Ok((StatusCode::CREATED, axum::Json(version)))
}

/// `GET /api/documents/{id}/versions`
pub async fn list_versions_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    AuthUser(user): AuthUser,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<axum::Json<Vec<FileView>>, AppError> {
    let id = parse_object_id(&id, "document")?;
    Ok(axum::Json(state.documents().list_versions(&user, id).await?))
}

/// `GET /api/documents/{id}/download`
pub async fn download_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    AuthUser(user): AuthUser,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<Response, AppError> {
    let id = parse_object_id(&id, "document")?;
    let download = state.documents().download(&user, id, None).await?;
    Ok(attachment(download))
}

/// `GET /api/documents/{id}/versions/{version}/download`
pub async fn download_version_handler(
    axum::extract::State(state): axum::extract::State<crate::app::AppState>,
    AuthUser(user): AuthUser,
    axum::extract::Path((id, version)): axum::extract::Path<(String, String)>,
) -> Result<Response, AppError> {
    let id = parse_object_id(&id, "document")?;
    let version = version
        .trim()
        .parse::<i32>()
        .map_err(|_| AppError::Validation(format!("Invalid version '{version}'")))?;

    let download = state.documents().download(&user, id, Some(version)).await?;
    Ok(attachment(download))
}

/// Header-safe rendering of a stored file name.
fn disposition_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim().is_empty() {
        "download".to_string()
    } else {
        cleaned
    }
}

fn attachment(download: Download) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}\"",
        disposition_name(&download.file_name)
    );
    (
        [
            (header::CONTENT_TYPE, download.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    )
        .into_response()
}
