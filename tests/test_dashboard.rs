mod common;

use axum::http::StatusCode;
use bson::DateTime as BsonDateTime;
use docman::auth::models::Role;
use docman::db::models::Document;
use docman::db::repository::DocumentRepository;
use serde_json::json;

fn bare_document(title: &str, author: bson::oid::ObjectId) -> Document {
    let now = BsonDateTime::now();
    Document {
        id: None,
        title: title.to_string(),
        description: String::new(),
        author,
        category: None,
        team: None,
        project: None,
        stakeholders: vec![],
        owners: vec![],
        external_contacts: vec![],
        opens_for_review: None,
        review_date: None,
        review_interval: None,
        review_completed: false,
        review_completed_by: None,
        review_completed_at: None,
        current_version: 0,
        current_file: None,
        version_history: vec![],
        created_by: author,
        updated_by: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn stakeholders_are_notified_and_can_mark_read() {
    let env = common::TestEnv::start().await;
    let server = env.server();
    let viewer = env.user_id(Role::Viewer).to_hex();

    let doc = env
        .create_document(&server, Role::Editor, json!({ "title": "Shared SOP", "stakeholders": [viewer] }))
        .await;
    server
        .patch(&format!("/api/documents/{}", doc["id"].as_str().unwrap()))
        .authorization_bearer(env.token(Role::Editor))
        .json(&json!({ "description": "now with scope" }))
        .await;

    let list = server
        .get("/api/notifications")
        .authorization_bearer(env.token(Role::Viewer))
        .await
        .json::<serde_json::Value>();
    assert_eq!(list["unread"], 2);
    assert_eq!(list["pagination"]["total"], 2);
    let kinds: Vec<&str> = list["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"documentCreated"));
    assert!(kinds.contains(&"documentUpdated"));

    // The actor is never notified about their own change.
    let author_list = server
        .get("/api/notifications")
        .authorization_bearer(env.token(Role::Editor))
        .await
        .json::<serde_json::Value>();
    assert_eq!(author_list["pagination"]["total"], 0);

    let first = list["items"][0]["id"].as_str().unwrap();
    server
        .post(&format!("/api/notifications/{first}/read"))
        .authorization_bearer(env.token(Role::Viewer))
        .await;
    let unread = server
        .get("/api/notifications")
        .add_query_param("unreadOnly", "true")
        .authorization_bearer(env.token(Role::Viewer))
        .await
        .json::<serde_json::Value>();
    assert_eq!(unread["pagination"]["total"], 1);

    // Someone else's notification looks like a missing one.
    server
        .post(&format!("/api/notifications/{}/read", unread["items"][0]["id"].as_str().unwrap()))
        .authorization_bearer(env.token(Role::Admin))
        .expect_failure()
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let marked = server
        .post("/api/notifications/read-all")
        .authorization_bearer(env.token(Role::Viewer))
        .await
        .json::<serde_json::Value>();
    assert_eq!(marked["updated"], 1);
}

#[tokio::test]
async fn reviewers_are_assigned_and_see_their_queue() {
    let env = common::TestEnv::start().await;
    let server = env.server();
    let viewer = env.user_id(Role::Viewer).to_hex();

    let doc = env
        .create_document(&server, Role::Editor, json!({ "title": "Annual review" }))
        .await;
    let id = doc["id"].as_str().unwrap();

    let response = server
        .post(&format!("/api/documents/{id}/reviewers"))
        .authorization_bearer(env.token(Role::Editor))
        .json(&json!({ "reviewer": viewer, "dueDate": "2030-03-01" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.json::<serde_json::Value>()["reviewer"], viewer);

    server
        .post(&format!("/api/documents/{id}/reviewers"))
        .authorization_bearer(env.token(Role::Editor))
        .json(&json!({ "reviewer": viewer }))
        .expect_failure()
        .await
        .assert_status(StatusCode::CONFLICT);

    let mine = server
        .get("/api/reviews/mine")
        .authorization_bearer(env.token(Role::Viewer))
        .await
        .json::<serde_json::Value>();
    assert_eq!(mine.as_array().unwrap().len(), 1);
    assert_eq!(mine[0]["document"], id);

    // An open assignee may sign off without edit rights; that closes the assignment.
    server
        .post(&format!("/api/documents/{id}/review/complete"))
        .authorization_bearer(env.token(Role::Viewer))
        .await;
    let mine = server
        .get("/api/reviews/mine")
        .authorization_bearer(env.token(Role::Viewer))
        .await
        .json::<serde_json::Value>();
    assert!(mine.as_array().unwrap().is_empty());

    let dashboard = server
        .get("/api/dashboard")
        .authorization_bearer(env.token(Role::Viewer))
        .await
        .json::<serde_json::Value>();
    assert_eq!(dashboard["assignedReviews"], 0);
    assert_eq!(dashboard["unreadNotifications"], 1);
}

#[tokio::test]
async fn dashboard_is_cached_until_cleared() {
    let env = common::TestEnv::start().await;
    let server = env.server();
    let editor = env.user_id(Role::Editor);

    env.create_document(&server, Role::Editor, json!({ "title": "Visible" }))
        .await;
    let first = server
        .get("/api/dashboard")
        .authorization_bearer(env.token(Role::Editor))
        .await
        .json::<serde_json::Value>();
    assert_eq!(first["totalDocuments"], 1);

    // Written behind the service's back, so nothing invalidates the cache.
    env.state
        .document_repo
        .insert(bare_document("Direct", editor))
        .await
        .unwrap();

    let cached = server
        .get("/api/dashboard")
        .authorization_bearer(env.token(Role::Editor))
        .await
        .json::<serde_json::Value>();
    assert_eq!(cached["totalDocuments"], 1);
    assert_eq!(cached["generatedAt"], first["generatedAt"]);

    server
        .delete("/api/cache")
        .authorization_bearer(env.token(Role::Admin))
        .expect_failure()
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let cleared = server
        .delete("/api/cache")
        .authorization_bearer(env.token(Role::Superadmin))
        .json(&json!({ "pattern": "dashboard:*" }))
        .await
        .json::<serde_json::Value>();
    assert_eq!(cleared["removed"], 1);

    let fresh = server
        .get("/api/dashboard")
        .authorization_bearer(env.token(Role::Editor))
        .await
        .json::<serde_json::Value>();
    assert_eq!(fresh["totalDocuments"], 2);
}

#[tokio::test]
async fn analytics_are_for_admins() {
    let env = common::TestEnv::start().await;
    let server = env.server();

    let category = server
        .post("/api/categories")
        .authorization_bearer(env.token(Role::Admin))
        .json(&json!({ "name": "Policy" }))
        .await
        .json::<serde_json::Value>();
    env.create_document(
        &server,
        Role::Editor,
        json!({ "title": "Code of conduct", "category": category["id"] }),
    )
    .await;
    env.create_document(&server, Role::Editor, json!({ "title": "Loose note" }))
        .await;

    server
        .get("/api/analytics")
        .authorization_bearer(env.token(Role::Editor))
        .expect_failure()
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let analytics = server
        .get("/api/analytics")
        .authorization_bearer(env.token(Role::Admin))
        .await
        .json::<serde_json::Value>();
    assert_eq!(analytics["totalDocuments"], 2);
    assert_eq!(analytics["reviewStatus"]["pending"], 2);

    let names: Vec<&str> = analytics["documentsByCategory"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Policy"));
    assert!(names.contains(&"Uncategorized"));

    let roles = analytics["usersByRole"].as_array().unwrap();
    assert_eq!(roles.len(), 4);
}
