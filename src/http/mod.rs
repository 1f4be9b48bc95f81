//! HTTP surface over the rate limiter and the proof-of-work gate.

mod server;
mod service;

pub use server::HttpServer;
pub use service::{router, AppState, ChallengeRequest, CheckRequest, VerifyRequest, DEFAULT_TIER};
