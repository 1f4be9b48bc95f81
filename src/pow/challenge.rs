//! Challenge records and the hash condition they impose.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Number of hex digits in a SHA-256 digest; no difficulty can exceed it.
pub const MAX_DIFFICULTY: u32 = 64;

/// A challenge as stored for its subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: Uuid,
    /// Random hex string the client must extend
    pub challenge: String,
    /// Required leading zero hex digits
    pub difficulty: u32,
    pub tier: String,
    pub issued_at: DateTime<Utc>,
}

impl Challenge {
    /// Generate a fresh random challenge.
    pub fn generate(difficulty: u32, tier: &str) -> Self {
        let nonce: [u8; 32] = rand::random();
        Self {
            challenge_id: Uuid::new_v4(),
            challenge: hex::encode(nonce),
            difficulty: difficulty.min(MAX_DIFFICULTY),
            tier: tier.to_string(),
            issued_at: Utc::now(),
        }
    }

    /// Whether `solution` satisfies this challenge.
    pub fn is_solved_by(&self, solution: &str) -> bool {
        meets_difficulty(&solution_hash(&self.challenge, solution), self.difficulty)
    }
}

/// What the client receives when a challenge is issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedChallenge {
    pub challenge: String,
    pub difficulty: u32,
    pub estimated_time_ms: u64,
}

/// Hex-encoded `SHA-256(challenge || solution)`.
pub fn solution_hash(challenge: &str, solution: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(challenge.as_bytes());
    hasher.update(solution.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a hex digest starts with `difficulty` zero characters.
pub fn meets_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    let required = difficulty as usize;
    hash_hex.len() >= required && hash_hex.bytes().take(required).all(|b| b == b'0')
}

/// Expected solve time in milliseconds at `hash_rate` hashes per second.
///
/// A uniform digest has a `16^-difficulty` chance of qualifying, so a
/// solver needs `16^difficulty` attempts on average.
pub fn estimate_solve_time_ms(difficulty: u32, hash_rate: u64) -> u64 {
    let attempts = 16f64.powi(difficulty.min(MAX_DIFFICULTY) as i32);
    let millis = attempts / hash_rate.max(1) as f64 * 1000.0;
    // Float to int casts saturate
    millis.ceil() as u64
}

/// Find a solution by brute force over an incrementing decimal nonce.
///
/// This is what a client does; the server only ever verifies.
pub fn solve(challenge: &str, difficulty: u32) -> String {
    let mut nonce: u64 = 0;
    loop {
        let candidate = nonce.to_string();
        if meets_difficulty(&solution_hash(challenge, &candidate), difficulty) {
            return candidate;
        }
        nonce += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solution_hash_known_vector() {
        // sha256("abc")
        assert_eq!(
            solution_hash("ab", "c"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("0000a1b2", 4));
        assert!(meets_difficulty("0000a1b2", 3));
        assert!(!meets_difficulty("000a1b2c", 4));
        assert!(meets_difficulty("ffff", 0));
        assert!(!meets_difficulty("00", 3));
    }

    #[test]
    fn test_generate() {
        let a = Challenge::generate(4, "free");
        let b = Challenge::generate(4, "free");
        assert_eq!(a.challenge.len(), 64);
        assert_ne!(a.challenge, b.challenge);
        assert_ne!(a.challenge_id, b.challenge_id);
        assert_eq!(Challenge::generate(99, "x").difficulty, MAX_DIFFICULTY);
    }

    #[test]
    fn test_solve_and_check() {
        let challenge = Challenge::generate(3, "free");
        let solution = solve(&challenge.challenge, 3);
        assert!(challenge.is_solved_by(&solution));
        assert!(solution_hash(&challenge.challenge, &solution).starts_with("000"));
    }

    #[test]
    fn test_estimate() {
        assert_eq!(estimate_solve_time_ms(0, 1_000_000), 1);
        assert_eq!(estimate_solve_time_ms(4, 1_000_000), 66);
        assert_eq!(estimate_solve_time_ms(5, 1_000_000), 1049);
        assert!(estimate_solve_time_ms(6, 1_000_000) > estimate_solve_time_ms(5, 1_000_000));
        assert_eq!(estimate_solve_time_ms(64, 1), u64::MAX);
    }

    #[test]
    fn test_issued_challenge_wire_format() {
        let issued = IssuedChallenge {
            challenge: "abc".to_string(),
            difficulty: 4,
            estimated_time_ms: 66,
        };
        let json = serde_json::to_value(&issued).unwrap();
        assert_eq!(json["challenge"], "abc");
        assert_eq!(json["difficulty"], 4);
        assert_eq!(json["estimatedTimeMs"], 66);
    }
}
