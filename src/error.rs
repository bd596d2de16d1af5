//! Error handling for the gigboard client

use std::fmt;
use thiserror::Error;

use gigboard_auth::AuthError;
use gigboard_postgrest::PostgrestError;
use gigboard_storage::StorageError;

use crate::forms::ValidationErrors;

/// Unified error type for the gigboard client
#[derive(Error, Debug)]
pub enum Error {
    /// Identity provider errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Database query errors
    #[error("Database error: {0}")]
    Database(#[from] PostgrestError),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Form input rejected before any request was made
    #[error("{0}")]
    Validation(#[from] ValidationErrors),

    /// The operation needs a signed-in user
    #[error("Not signed in")]
    NotSignedIn,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new general error
    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }

    /// Whether the error was raised by input validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Text suitable for a notification.
    ///
    /// Provider messages are passed through as the backend phrased them.
    pub fn user_message(&self) -> String {
        match self {
            Error::Auth(AuthError::ApiError(message)) => message.clone(),
            Error::Auth(AuthError::MissingSession) | Error::NotSignedIn => {
                "You need to sign in first".to_string()
            }
            Error::Database(err) => err.user_message(),
            Error::Storage(StorageError::ApiError(message)) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result alias used by the gateways
pub type Result<T> = std::result::Result<T, Error>;
