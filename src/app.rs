use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::auth::token::TokenKeys;
use crate::clock::{Clock, SystemClock};
use crate::config::{RateLimitSettings, ServerSettings, Settings, StorageBackend};
use crate::db::catalog_repository::CatalogRepositories;
use crate::db::file_repository::{FileRepository, MongoFileRepository};
use crate::db::models::{Category, CustomChart, ExternalContact, ExternalContactType, Project, Team};
use crate::db::notification_repository::{MongoNotificationRepository, NotificationRepository};
use crate::db::repository::{DocumentRepository, MongoDocumentRepository};
use crate::db::review_repository::{MongoReviewRepository, ReviewRepository};
use crate::db::token_repository::{MongoTokenBlacklist, TokenBlacklist};
use crate::db::user_repository::{MongoUserRepository, UserRepository};
use crate::error::AppError;
use crate::services::catalog::{CatalogEntity, CatalogService};
use crate::services::dashboard::{DashboardCaches, DashboardService};
use crate::services::documents::DocumentService;
use crate::services::reviews::ReviewService;
use crate::services::users::UserService;
use crate::storage::client::{LocalStorageClient, S3StorageClient, StorageClient};

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub document_repo: Arc<dyn DocumentRepository>,
    pub file_repo: Arc<dyn FileRepository>,
    pub user_repo: Arc<dyn UserRepository>,
    pub notification_repo: Arc<dyn NotificationRepository>,
    pub review_repo: Arc<dyn ReviewRepository>,
    pub token_blacklist: Arc<dyn TokenBlacklist>,
    pub catalog: CatalogRepositories,
    pub storage_client: Arc<dyn StorageClient>,
    pub caches: Arc<DashboardCaches>,
    pub clock: Arc<dyn Clock>,
    pub token_keys: Arc<TokenKeys>,
}

impl AppState {
    /// Mongo-backed state with every index in place.
    pub async fn connect(
        db: &mongodb::Database,
        storage_client: Arc<dyn StorageClient>,
        settings: &Settings,
    ) -> Result<Self, AppError> {
        let documents = MongoDocumentRepository::new(db);
        let files = MongoFileRepository::new(db);
        let users = MongoUserRepository::new(db);
        let notifications = MongoNotificationRepository::new(db);
        let reviews = MongoReviewRepository::new(db);
        let blacklist = MongoTokenBlacklist::new(db);

        futures::try_join!(
            documents.ensure_indexes(),
            files.ensure_indexes(),
            users.ensure_indexes(),
            notifications.ensure_indexes(),
            reviews.ensure_indexes(),
            blacklist.ensure_indexes(),
        )?;
        let catalog = CatalogRepositories::connect(db).await?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let caches = DashboardCaches::new(
            clock.clone(),
            Duration::seconds(settings.cache.ttl_seconds),
            settings.cache.sweep_threshold,
        );

        Ok(Self {
            document_repo: Arc::new(documents),
            file_repo: Arc::new(files),
            user_repo: Arc::new(users),
            notification_repo: Arc::new(notifications),
            review_repo: Arc::new(reviews),
            token_blacklist: Arc::new(blacklist),
            catalog,
            storage_client,
            caches: Arc::new(caches),
            clock,
            token_keys: Arc::new(TokenKeys::from_secret(&settings.auth.jwt_secret)),
        })
    }

    pub fn documents(&self) -> DocumentService<'_> {
        DocumentService {
            documents: self.document_repo.as_ref(),
            files: self.file_repo.as_ref(),
            reviews: self.review_repo.as_ref(),
            notifications: self.notification_repo.as_ref(),
            storage: self.storage_client.as_ref(),
            caches: &self.caches,
            clock: self.clock.as_ref(),
        }
    }

    pub fn users(&self) -> UserService<'_> {
        UserService {
            users: self.user_repo.as_ref(),
            clock: self.clock.as_ref(),
        }
    }

    pub fn reviews(&self) -> ReviewService<'_> {
        ReviewService {
            documents: self.document_repo.as_ref(),
            reviews: self.review_repo.as_ref(),
            users: self.user_repo.as_ref(),
            notifications: self.notification_repo.as_ref(),
            caches: &self.caches,
            clock: self.clock.as_ref(),
        }
    }

    pub fn dashboard(&self) -> DashboardService<'_> {
        DashboardService {
            documents: self.document_repo.as_ref(),
            users: self.user_repo.as_ref(),
            notifications: self.notification_repo.as_ref(),
            reviews: self.review_repo.as_ref(),
            caches: &self.caches,
            clock: self.clock.as_ref(),
        }
    }

    pub fn catalog<T: CatalogEntity>(&self) -> CatalogService<'_, T> {
        CatalogService {
            repo: T::repository(&self.catalog).as_ref(),
            clock: self.clock.as_ref(),
        }
    }
}

/// Storage backend selected by the settings.
pub async fn storage_from_settings(settings: &Settings) -> Arc<dyn StorageClient> {
    match settings.storage.backend {
        StorageBackend::Local => Arc::new(LocalStorageClient::new(&settings.storage.root)),
        StorageBackend::S3 => {
            let bucket = settings.storage.bucket.clone();
            let endpoint = settings.storage.endpoint.as_deref();
            Arc::new(S3StorageClient::connect(bucket, endpoint).await)
        }
    }
}

fn catalog_routes<T: CatalogEntity>(path: &str) -> Router<AppState> {
    Router::new()
        .route(path, get(api::catalog::list::<T>).post(api::catalog::create::<T>))
        .route(
            &format!("{path}/{{id}}"),
            get(api::catalog::get_one::<T>)
                .put(api::catalog::update::<T>)
                .delete(api::catalog::delete::<T>),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers(Any);
    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}

/// All `/api` routes with their middleware.
pub fn router(state: AppState, server: &ServerSettings, rate_limit: &RateLimitSettings) -> Router {
    let documents = Router::new()
        .route(
            "/api/documents",
            get(api::documents::list_handler).post(api::documents::create_handler),
        )
        .route("/api/documents/upload", post(api::files::create_with_file_handler))
        .route(
            "/api/documents/{id}",
            get(api::documents::get_handler)
                .patch(api::documents::update_handler)
                .delete(api::documents::delete_handler),
        )
        .route(
            "/api/documents/{id}/review/complete",
            post(api::documents::complete_review_handler),
        )
        .route(
            "/api/documents/{id}/review/reopen",
            post(api::documents::reopen_review_handler),
        )
        .route(
            "/api/documents/{id}/versions",
            get(api::files::list_versions_handler).post(api::files::upload_version_handler),
        )
        .route("/api/documents/{id}/download", get(api::files::download_handler))
        .route(
            "/api/documents/{id}/versions/{version}/download",
            get(api::files::download_version_handler),
        )
        .route(
            "/api/documents/{id}/reviewers",
            get(api::reviews::list_handler).post(api::reviews::assign_handler),
        )
        .route("/api/reviews/mine", get(api::reviews::mine_handler))
        .layer(DefaultBodyLimit::max(server.max_upload_bytes));

    let mut app = Router::new()
        .route("/api/health", get(api::health::health_handler))
        .route("/api/auth/me", get(api::auth::me_handler))
        .route("/api/auth/logout", post(api::auth::logout_handler))
        .route(
            "/api/users",
            get(api::users::list_handler).post(api::users::create_handler),
        )
        .route(
            "/api/users/{id}",
            get(api::users::get_handler)
                .patch(api::users::update_handler)
                .delete(api::users::delete_handler),
        )
        .route("/api/notifications", get(api::notifications::list_handler))
        .route("/api/notifications/read-all", post(api::notifications::read_all_handler))
        .route("/api/notifications/{id}/read", post(api::notifications::read_handler))
        .route("/api/dashboard", get(api::dashboard::dashboard_handler))
        .route("/api/analytics", get(api::dashboard::analytics_handler))
        .route("/api/cache", axum::routing::delete(api::dashboard::clear_cache_handler))
        .merge(documents)
        .merge(catalog_routes::<Category>("/api/categories"))
        .merge(catalog_routes::<Team>("/api/teams"))
        .merge(catalog_routes::<Project>("/api/projects"))
        .merge(catalog_routes::<ExternalContactType>("/api/contact-types"))
        .merge(catalog_routes::<ExternalContact>("/api/contacts"))
        .merge(catalog_routes::<CustomChart>("/api/charts"))
        .with_state(state);

    if rate_limit.enabled {
        app = with_rate_limit(app, rate_limit);
    }

    app.layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// Per-peer-IP limiting. Needs the server to provide `ConnectInfo<SocketAddr>`.
fn with_rate_limit(app: Router, settings: &RateLimitSettings) -> Router {
    let Some(config) = tower_governor::governor::GovernorConfigBuilder::default()
        .per_second(settings.per_second.max(1))
        .burst_size(settings.burst.max(1))
        .finish()
    else {
        tracing::warn!("Rate limiting disabled: invalid settings");
        return app;
    };

    tracing::info!(
        per_second = settings.per_second,
        burst = settings.burst,
        "Rate limiting enabled"
    );
    app.layer(tower_governor::GovernorLayer::new(Arc::new(config)))
        .layer(axum::middleware::map_response(rate_limit_body))
}

/// Give the limiter's plain-text rejection the common error body, keeping
/// its `retry-after` style headers.
async fn rate_limit_body(response: Response) -> Response {
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return response;
    }

    let (parts, _) = response.into_parts();
    let mut limited = AppError::RateLimit.into_response();
    for (name, value) in &parts.headers {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            limited.headers_mut().insert(name.clone(), value.clone());
        }
    }
    limited
}
