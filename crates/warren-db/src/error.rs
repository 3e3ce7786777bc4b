use thiserror::Error;

/// Errors raised by the entity store and registries.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed entity key: {0}")]
    MalformedKey(String),

    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: String },

    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: &'static str, key: String },
}

/// Errors raised while authenticating an account.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown login and wrong password are reported identically.
    #[error("invalid login or password")]
    InvalidCredentials,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<password_hash::Error> for AuthError {
    fn from(e: password_hash::Error) -> Self {
        AuthError::Hash(e.to_string())
    }
}
