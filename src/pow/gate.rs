//! Issuing and verifying challenges against the shared store.
//!
//! A challenge is stored as JSON under `pow:{purpose}:{subject}`. It is
//! consumed with a compare-and-delete on the exact JSON that was verified,
//! so a challenge replaced by a newer one can no longer be redeemed.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::challenge::{estimate_solve_time_ms, Challenge, IssuedChallenge};
use super::PowError;
use crate::config::PowConfig;
use crate::store::{challenge_key, SharedStore, StoreError};

/// Issues and verifies single-use proof-of-work challenges.
pub struct ProofOfWorkGate {
    store: Arc<dyn SharedStore>,
    config: PowConfig,
}

impl ProofOfWorkGate {
    /// Create a gate keeping its challenges in `store`.
    pub fn new(store: Arc<dyn SharedStore>, config: PowConfig) -> Self {
        Self { store, config }
    }

    /// Required leading zero digits for `tier`.
    ///
    /// Tiers missing from the table get the hardest configured difficulty.
    pub fn difficulty_for(&self, tier: &str) -> u32 {
        match self.config.difficulty.get(tier) {
            Some(difficulty) => *difficulty,
            None => {
                let hardest = self.config.difficulty.values().copied().max().unwrap_or(0);
                warn!(tier = %tier, difficulty = hardest, "Unknown tier, using hardest difficulty");
                hardest
            }
        }
    }

    /// Create a challenge for `subject`, replacing any previous one.
    pub async fn issue_challenge(
        &self,
        subject: &str,
        tier: &str,
    ) -> Result<IssuedChallenge, PowError> {
        let challenge = Challenge::generate(self.difficulty_for(tier), tier);
        let encoded = serde_json::to_string(&challenge)
            .map_err(|e| StoreError::Codec(e.to_string()))?;

        self.store
            .set_ex(
                &challenge_key(&self.config.purpose, subject),
                &encoded,
                self.config.challenge_ttl(),
            )
            .await?;

        info!(
            subject = %subject,
            tier = %tier,
            challenge_id = %challenge.challenge_id,
            difficulty = challenge.difficulty,
            "Issued proof-of-work challenge"
        );

        Ok(IssuedChallenge {
            estimated_time_ms: estimate_solve_time_ms(
                challenge.difficulty,
                self.config.assumed_hash_rate,
            ),
            difficulty: challenge.difficulty,
            challenge: challenge.challenge,
        })
    }

    /// The live challenge for `subject`, if any.
    pub async fn pending(&self, subject: &str) -> Result<Option<Challenge>, PowError> {
        let key = challenge_key(&self.config.purpose, subject);
        Ok(self.load(&key).await?.map(|(_, challenge)| challenge))
    }

    /// The stored JSON and its decoded challenge.
    async fn load(&self, key: &str) -> Result<Option<(String, Challenge)>, PowError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(challenge) => Ok(Some((raw, challenge))),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable challenge");
                Ok(None)
            }
        }
    }

    /// Check a submitted solution and consume the challenge on success.
    ///
    /// Failed attempts leave the challenge in place so the client can retry
    /// until it expires.
    pub async fn verify_solution(
        &self,
        subject: &str,
        submitted_challenge: &str,
        solution: &str,
    ) -> Result<(), PowError> {
        let key = challenge_key(&self.config.purpose, subject);
        let (raw, stored) = self
            .load(&key)
            .await?
            .ok_or(PowError::ChallengeExpiredOrMissing)?;

        if stored.challenge != submitted_challenge {
            debug!(subject = %subject, "Submitted challenge does not match");
            return Err(PowError::ChallengeMismatch);
        }

        if !stored.is_solved_by(solution) {
            debug!(subject = %subject, difficulty = stored.difficulty, "Insufficient proof of work");
            return Err(PowError::InvalidSolution {
                difficulty: stored.difficulty,
            });
        }

        // Consumed or replaced since the read: the verified challenge is gone
        if !self.store.del_if_eq(&key, &raw).await? {
            debug!(subject = %subject, "Challenge consumed or replaced before use");
            return Err(PowError::ChallengeExpiredOrMissing);
        }

        info!(subject = %subject, challenge_id = %stored.challenge_id, "Proof of work verified");
        Ok(())
    }

    /// Boolean form of [`verify_solution`](Self::verify_solution).
    pub async fn is_valid_solution(&self, subject: &str, challenge: &str, solution: &str) -> bool {
        self.verify_solution(subject, challenge, solution).await.is_ok()
    }
}
