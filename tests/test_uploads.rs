mod common;

use axum::http::{header, StatusCode};
use axum_test::multipart::{MultipartForm, Part};
use docman::auth::models::Role;
use docman::db::file_repository::FileRepository;
use docman::storage::client::StorageClient;

fn file_part(content: &str, name: &str) -> Part {
    Part::bytes(content.as_bytes().to_vec())
        .file_name(name)
        .mime_type("text/plain")
}

#[tokio::test]
async fn upload_creates_document_with_first_version() {
    let env = common::TestEnv::start().await;
    let server = env.server();
    let viewer = env.user_id(Role::Viewer).to_hex();

    let form = MultipartForm::new()
        .add_text("title", "Calibration procedure")
        .add_text("description", "How to calibrate gauges")
        .add_text("stakeholders", viewer.clone())
        .add_text("reviewInterval", "180")
        .add_part("file", file_part("step 1: zero the gauge", "calibration.txt"));

    let response = server
        .post("/api/documents/upload")
        .authorization_bearer(env.token(Role::Editor))
        .multipart(form)
        .await;
    response.assert_status(StatusCode::CREATED);

    let doc = response.json::<serde_json::Value>();
    assert_eq!(doc["title"], "Calibration procedure");
    assert_eq!(doc["currentVersion"], 1);
    assert_eq!(doc["stakeholders"], serde_json::json!([viewer]));
    assert_eq!(doc["reviewInterval"], 180);
    assert_eq!(doc["versionHistory"][0]["changelog"], "Initial version");

    // Stakeholders can download.
    let id = doc["id"].as_str().unwrap();
    let download = server
        .get(&format!("/api/documents/{id}/download"))
        .authorization_bearer(env.token(Role::Viewer))
        .await;
    assert_eq!(download.as_bytes().as_ref(), b"step 1: zero the gauge");
    assert_eq!(download.header(header::CONTENT_TYPE), "text/plain");
    assert_eq!(
        download.header(header::CONTENT_DISPOSITION),
        "attachment; filename=\"calibration.txt\""
    );
}

#[tokio::test]
async fn new_versions_are_numbered_and_downloadable() {
    let env = common::TestEnv::start().await;
    let server = env.server();

    let form = MultipartForm::new()
        .add_text("title", "Work instruction")
        .add_part("file", file_part("v1", "wi.txt"));
    let doc = server
        .post("/api/documents/upload")
        .authorization_bearer(env.token(Role::Editor))
        .multipart(form)
        .await
        .json::<serde_json::Value>();
    let id = doc["id"].as_str().unwrap();

    let form = MultipartForm::new()
        .add_text("changelog", "Clarified step 3")
        .add_part("file", file_part("v2", "wi-rev2.txt"));
    let version = server
        .post(&format!("/api/documents/{id}/versions"))
        .authorization_bearer(env.token(Role::Editor))
        .multipart(form)
        .await
        .json::<serde_json::Value>();
    assert_eq!(version["version"], 2);
    assert_eq!(version["changelog"], "Clarified step 3");
    assert_eq!(version["size"], 2);

    let versions = server
        .get(&format!("/api/documents/{id}/versions"))
        .authorization_bearer(env.token(Role::Editor))
        .await
        .json::<serde_json::Value>();
    let numbers: Vec<i64> = versions
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["version"].as_i64().unwrap())
        .collect();
    assert_eq!(numbers.len(), 2);
    assert!(numbers.contains(&1) && numbers.contains(&2));

    let latest = server
        .get(&format!("/api/documents/{id}/download"))
        .authorization_bearer(env.token(Role::Editor))
        .await;
    assert_eq!(latest.as_bytes().as_ref(), b"v2");

    let first = server
        .get(&format!("/api/documents/{id}/versions/1/download"))
        .authorization_bearer(env.token(Role::Editor))
        .await;
    assert_eq!(first.as_bytes().as_ref(), b"v1");

    server
        .get(&format!("/api/documents/{id}/versions/7/download"))
        .authorization_bearer(env.token(Role::Editor))
        .expect_failure()
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_requires_a_file_and_write_access() {
    let env = common::TestEnv::start().await;
    let server = env.server_permissive();

    let form = MultipartForm::new().add_text("title", "No file");
    server
        .post("/api/documents/upload")
        .authorization_bearer(env.token(Role::Editor))
        .multipart(form)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let form = MultipartForm::new()
        .add_text("title", "Empty")
        .add_part("file", file_part("", "empty.txt"));
    server
        .post("/api/documents/upload")
        .authorization_bearer(env.token(Role::Editor))
        .multipart(form)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let doc = env
        .create_document(&env.server(), Role::Editor, serde_json::json!({ "title": "Locked" }))
        .await;
    let form = MultipartForm::new().add_part("file", file_part("sneaky", "x.txt"));
    server
        .post(&format!("/api/documents/{}/versions", doc["id"].as_str().unwrap()))
        .authorization_bearer(env.token(Role::Viewer))
        .multipart(form)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    // A document without file has nothing to download.
    server
        .get(&format!("/api/documents/{}/download", doc["id"].as_str().unwrap()))
        .authorization_bearer(env.token(Role::Editor))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_document_removes_stored_files() {
    let env = common::TestEnv::start().await;
    let server = env.server();

    let form = MultipartForm::new()
        .add_text("title", "Temporary")
        .add_part("file", file_part("bytes", "tmp.txt"));
    let doc = server
        .post("/api/documents/upload")
        .authorization_bearer(env.token(Role::Editor))
        .multipart(form)
        .await
        .json::<serde_json::Value>();
    let id = doc["id"].as_str().unwrap();

    let key = env
        .state
        .file_repo
        .find_version(bson::oid::ObjectId::parse_str(id).unwrap(), 1)
        .await
        .unwrap()
        .expect("file record")
        .storage_key;
    assert!(env.storage.get_object(&key).await.unwrap().is_some());

    server
        .delete(&format!("/api/documents/{id}"))
        .authorization_bearer(env.token(Role::Editor))
        .await;

    assert!(env.storage.get_object(&key).await.unwrap().is_none());
}
