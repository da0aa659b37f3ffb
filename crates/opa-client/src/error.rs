//! Error type shared by every client operation.

use std::string::FromUtf8Error;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpaError {
    #[error("Invalid policy name '{0}': only slashes, underscores and letters are acceptable")]
    InvalidPolicyName(String),

    #[error("Invalid Rego policy: {errors}")]
    InvalidRego { errors: String },

    #[error("Policy was not created (HTTP {status}): {message}")]
    PolicyNotCreated { status: u16, message: String },

    #[error("Watch was rejected (HTTP {status}): {message}")]
    WatchRejected { status: u16, message: String },

    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record is not valid UTF-8: {0}")]
    Decode(#[from] FromUtf8Error),

    #[error("Watch worker failed: {0}")]
    Worker(String),
}

impl OpaError {
    /// True for errors raised because the policy itself was refused, either
    /// locally (bad name) or by the server (bad Rego).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OpaError::InvalidPolicyName(_) | OpaError::InvalidRego { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, OpaError>;
