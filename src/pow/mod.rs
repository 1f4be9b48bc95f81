//! Proof-of-work gate for cost-sensitive mutations.
//!
//! A client first asks for a challenge, then searches for a solution such
//! that `SHA-256(challenge || solution)` starts with enough zero hex digits,
//! and finally submits it with the mutation it wants to perform. Challenges
//! live in the shared store and are consumed on first successful use.

mod challenge;
mod gate;

pub use challenge::{
    estimate_solve_time_ms, meets_difficulty, solution_hash, solve, Challenge, IssuedChallenge,
    MAX_DIFFICULTY,
};
pub use gate::ProofOfWorkGate;

use thiserror::Error;

use crate::error::ErrorKind;
use crate::store::StoreError;

/// Reasons a solution is refused.
#[derive(Debug, Error)]
pub enum PowError {
    #[error("no live challenge for this subject")]
    ChallengeExpiredOrMissing,

    #[error("submitted challenge does not match the issued one")]
    ChallengeMismatch,

    #[error("solution hash lacks {difficulty} leading zero digits")]
    InvalidSolution { difficulty: u32 },

    #[error("challenge store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl PowError {
    /// The refusal kind reported to callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PowError::ChallengeExpiredOrMissing => ErrorKind::ChallengeExpiredOrMissing,
            PowError::ChallengeMismatch => ErrorKind::ChallengeMismatch,
            PowError::InvalidSolution { .. } => ErrorKind::InvalidSolution,
            PowError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }
}
