//! Error types for the Bulwark service.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pow::PowError;
use crate::store::StoreError;

/// Machine-readable reason attached to every refusal.
///
/// Callers use this to render differentiated messaging, e.g. "too many
/// requests from this client" versus "plan limit reached".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    BurstExceeded,
    TierLimitExceeded,
    QuotaExceeded,
    ChallengeExpiredOrMissing,
    ChallengeMismatch,
    InvalidSolution,
    StoreUnavailable,
}

impl ErrorKind {
    /// The wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BurstExceeded => "BURST_EXCEEDED",
            ErrorKind::TierLimitExceeded => "TIER_LIMIT_EXCEEDED",
            ErrorKind::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorKind::ChallengeExpiredOrMissing => "CHALLENGE_EXPIRED_OR_MISSING",
            ErrorKind::ChallengeMismatch => "CHALLENGE_MISMATCH",
            ErrorKind::InvalidSolution => "INVALID_SOLUTION",
            ErrorKind::StoreUnavailable => "STORE_UNAVAILABLE",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for Bulwark operations.
#[derive(Error, Debug)]
pub enum BulwarkError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shared store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Proof-of-work errors
    #[error("Proof-of-work error: {0}")]
    Pow(#[from] PowError),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BulwarkError {
    /// The refusal kind carried by this error, if it is one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            BulwarkError::Store(_) => Some(ErrorKind::StoreUnavailable),
            BulwarkError::Pow(e) => Some(e.kind()),
            _ => None,
        }
    }
}

/// Result type alias for Bulwark operations.
pub type Result<T> = std::result::Result<T, BulwarkError>;
