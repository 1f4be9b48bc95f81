//! Bulwark - Layered Rate Limiting and Abuse Prevention
//!
//! This crate decides whether a subject may perform an operation. A cheap
//! in-process burst guard runs first, then a per-tier counter shared across
//! instances through Redis. Quota caps and proof-of-work challenges guard
//! the costliest mutations.

pub mod config;
pub mod error;
pub mod http;
pub mod pow;
pub mod ratelimit;
pub mod store;
