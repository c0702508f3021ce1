#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use bson::oid::ObjectId;
use bson::DateTime as BsonDateTime;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::mongo::Mongo;

use docman::app::AppState;
use docman::auth::models::Role;
use docman::config::{RateLimitSettings, ServerSettings, Settings};
use docman::db::models::User;
use docman::db::user_repository::UserRepository;
use docman::storage::client::{LocalStorageClient, StorageClient};

/// Holds the running MongoDB container and the router under test.
///
/// One account per role is created on start. The container and the upload
/// directory go away when this struct is dropped.
pub struct TestEnv {
    _mongo: ContainerAsync<Mongo>,
    _uploads: tempfile::TempDir,
    pub state: AppState,
    pub router: Router,
    pub storage: Arc<dyn StorageClient>,
    accounts: HashMap<Role, ObjectId>,
}

impl TestEnv {
    pub async fn start() -> Self {
        let mongo_container = Mongo::default()
            .start()
            .await
            .expect("Failed to start MongoDB container");
        let mongo_port = mongo_container
            .get_host_port_ipv4(27017)
            .await
            .expect("Failed to get MongoDB port");

        let mongo_uri = format!("mongodb://127.0.0.1:{}", mongo_port);
        let mongo_client = mongodb::Client::with_uri_str(&mongo_uri)
            .await
            .expect("Failed to connect to MongoDB");
        let mongo_db = mongo_client.database("docman_test");

        let uploads = tempfile::tempdir().expect("Failed to create upload directory");
        let storage: Arc<dyn StorageClient> = Arc::new(LocalStorageClient::new(uploads.path()));

        let settings = Settings::default();
        let state = AppState::connect(&mongo_db, storage.clone(), &settings)
            .await
            .expect("Failed to build application state");

        docman::api::errors::expose_error_details(true);
        let router = docman::app::router(
            state.clone(),
            &ServerSettings::default(),
            &RateLimitSettings::default(),
        );

        let mut env = Self {
            _mongo: mongo_container,
            _uploads: uploads,
            state,
            router,
            storage,
            accounts: HashMap::new(),
        };
        for role in [Role::Viewer, Role::Editor, Role::Admin, Role::Superadmin] {
            let id = env
                .add_user(&format!("{role} user"), &format!("{role}@docman.test"), role)
                .await;
            env.accounts.insert(role, id);
        }
        env
    }

    /// Build an `axum_test::TestServer` from this environment's router.
    pub fn server(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .expect_success_by_default()
            .build(self.router.clone())
    }

    /// Build a `TestServer` that does NOT expect success by default (for error tests).
    pub fn server_permissive(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .build(self.router.clone())
    }

    /// Insert an account directly into the database.
    pub async fn add_user(&self, name: &str, email: &str, role: Role) -> ObjectId {
        let now = BsonDateTime::now();
        let user = self
            .state
            .user_repo
            .insert(User {
                id: None,
                name: name.to_string(),
                email: email.to_string(),
                username: None,
                password_hash: String::new(),
                role,
                department: Some("Quality".to_string()),
                title: Some("Specialist".to_string()),
                phone: None,
                team: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("Failed to insert user");
        user.id.expect("Inserted user has no id")
    }

    /// Id of the seeded account with `role`.
    pub fn user_id(&self, role: Role) -> ObjectId {
        self.accounts[&role]
    }

    pub fn token_for(&self, user: ObjectId, role: Role) -> String {
        self.state
            .token_keys
            .issue(&user.to_hex(), role, chrono::Utc::now(), chrono::Duration::hours(1))
            .expect("Failed to issue token")
    }

    /// Bearer token of the seeded account with `role`.
    pub fn token(&self, role: Role) -> String {
        self.token_for(self.user_id(role), role)
    }

    /// Helper: create a document as the seeded user with `role`.
    pub async fn create_document(
        &self,
        server: &axum_test::TestServer,
        role: Role,
        body: serde_json::Value,
    ) -> serde_json::Value {
        server
            .post("/api/documents")
            .authorization_bearer(self.token(role))
            .json(&body)
            .await
            .json::<serde_json::Value>()
    }
}
