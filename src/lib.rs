pub mod app;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod api {
    pub mod auth;
    pub mod catalog;
    pub mod dashboard;
    pub mod documents;
    pub mod errors;
    pub mod files;
    pub mod health;
    pub mod notifications;
    pub mod reviews;
    pub mod users;
}
pub mod services {
    pub mod access;
    pub mod cache;
    pub mod catalog;
    pub mod dashboard;
    pub mod documents;
    pub mod notifications;
    pub mod pagination;
    pub mod query;
    pub mod reviews;
    pub mod users;
    pub mod validation;
}
pub mod storage {
    pub mod client;
}
