// Error types shared by the admin client. Compiler failures live next to
// the compiler in `compiler.rs` because they carry different context.

use crate::modules::{Failure, FailureCode};

/// Errors produced while talking to the admin panel.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The store could not be reached or the response could not be read.
    #[error("transport error: {0}")]
    Infra(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL {0}")]
    InvalidUrl(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Login was rejected or no session token came back.
    #[error("login failed: {0}")]
    Auth(String),

    /// A classified, terminal failure reported by an admin screen.
    #[error("module {module}: {failure}")]
    Operation { module: String, failure: Failure },
}

impl Error {
    /// Only a mid-session sign-out is worth another login and attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Operation { failure, .. } if failure.code == FailureCode::SignedOut
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
