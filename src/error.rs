use thiserror::Error;

/// Application-wide error types.
///
/// Every failure carries an explicit kind; the HTTP layer maps kinds to
/// status codes without looking at message text.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Access denied: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Database error: {0}")]
    Database(String),

    #[error("External service error: {0}")]
    External(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    RateLimit,
    Server,
    Database,
    External,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Authentication => "AUTHENTICATION",
            ErrorKind::Authorization => "AUTHORIZATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::Server => "SERVER",
            ErrorKind::Database => "DATABASE",
            ErrorKind::External => "EXTERNAL",
        }
    }

    /// Whether the failure originates on the server side. Details of these
    /// are not shown to clients in production.
    pub fn is_server_side(&self) -> bool {
        matches!(
            self,
            ErrorKind::Server | ErrorKind::Database | ErrorKind::External
        )
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Authentication(_) => ErrorKind::Authentication,
            AppError::Authorization(_) => ErrorKind::Authorization,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::RateLimit => ErrorKind::RateLimit,
            AppError::Database(_) => ErrorKind::Database,
            AppError::External(_) => ErrorKind::External,
            AppError::Internal(_) => ErrorKind::Server,
        }
    }

    /// The message without the kind prefix added by `Display`.
    pub fn message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Database(msg)
            | AppError::External(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::RateLimit => "Too many requests, please try again later".to_string(),
        }
    }
}

/// Helper conversion from anyhow::Error
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

const DUPLICATE_KEY: i32 = 11000;

/// Translate driver errors into the application taxonomy.
///
/// Duplicate keys become conflicts and values that cannot be encoded become
/// validation errors. Stored data that fails to decode is a database failure,
/// like everything else.
impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind as MongoKind, WriteFailure};

        match err.kind.as_ref() {
            MongoKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY => {
                AppError::Conflict(duplicate_key_message(&write.message))
            }
            MongoKind::Command(command) if command.code == DUPLICATE_KEY => {
                AppError::Conflict(duplicate_key_message(&command.message))
            }
            MongoKind::BsonDeserialization(e) => {
                AppError::Database(format!("Malformed stored value: {e}"))
            }
            MongoKind::BsonSerialization(e) => {
                AppError::Validation(format!("Value cannot be stored: {e}"))
            }
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<bson::ser::Error> for AppError {
    fn from(err: bson::ser::Error) -> Self {
        AppError::Validation(format!("Value cannot be stored: {err}"))
    }
}

impl From<bson::de::Error> for AppError {
    fn from(err: bson::de::Error) -> Self {
        AppError::Database(format!("Malformed stored value: {err}"))
    }
}

/// Pull the offending key out of a server duplicate-key message
/// (`... dup key: { email: "a@b.c" }`).
fn duplicate_key_message(raw: &str) -> String {
    match raw.split_once("dup key:") {
        Some((_, key)) => format!("Duplicate value for {}", key.trim()),
        None => "Duplicate value".to_string(),
    }
}
