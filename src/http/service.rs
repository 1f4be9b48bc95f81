//! HTTP handlers for rate limit checks and proof-of-work challenges.

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::ErrorKind;
use crate::pow::{PowError, ProofOfWorkGate};
use crate::ratelimit::{RateLimitDecision, RateLimiterBackend};

/// Tier assumed when a request does not name one.
pub const DEFAULT_TIER: &str = "anonymous";

/// Shared handler state.
pub struct AppState<R: RateLimiterBackend> {
    pub rate_limiter: Arc<R>,
    pub pow: Arc<ProofOfWorkGate>,
}

// Derived Clone would require R: Clone
impl<R: RateLimiterBackend> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            rate_limiter: self.rate_limiter.clone(),
            pow: self.pow.clone(),
        }
    }
}

/// Build the service router.
pub fn router<R: RateLimiterBackend + 'static>(state: AppState<R>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/ratelimit/check", post(check_rate_limit::<R>))
        .route("/v1/challenges", post(issue_challenge::<R>))
        .route("/v1/challenges/verify", post(verify_solution::<R>))
        .with_state(state)
}

fn default_tier() -> String {
    DEFAULT_TIER.to_string()
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub subject: String,
    pub operation: String,
    #[serde(default = "default_tier")]
    pub tier: String,
}

#[derive(Debug, Serialize)]
struct CheckResponse {
    #[serde(flatten)]
    decision: RateLimitDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
}

#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub subject: String,
    #[serde(default = "default_tier")]
    pub tier: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub subject: String,
    pub challenge: String,
    pub solution: String,
}

#[derive(Debug, Serialize)]
struct VerifyResponse {
    verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
}

fn bad_request(message: &str) -> Response {
    let body = serde_json::json!({ "error": message });
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: impl ToString) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(name, value);
    }
}

fn rate_limit_headers(decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if !decision.is_unlimited() {
        insert_header(&mut headers, "x-ratelimit-limit", decision.limit);
        insert_header(&mut headers, "x-ratelimit-remaining", decision.remaining());
        insert_header(&mut headers, "x-ratelimit-reset", decision.reset_in_seconds);
    }
    if !decision.allowed {
        insert_header(&mut headers, "retry-after", decision.reset_in_seconds);
    }
    headers
}

async fn healthz() -> &'static str {
    "ok"
}

async fn check_rate_limit<R: RateLimiterBackend + 'static>(
    State(state): State<AppState<R>>,
    Json(req): Json<CheckRequest>,
) -> Response {
    if req.subject.is_empty() {
        warn!("Received rate limit request with empty subject");
        return bad_request("subject is required");
    }
    if req.operation.is_empty() {
        warn!("Received rate limit request with empty operation");
        return bad_request("operation is required");
    }

    let decision = state
        .rate_limiter
        .check_rate_limit(&req.subject, &req.operation, &req.tier)
        .await;

    let status = if decision.allowed {
        StatusCode::OK
    } else {
        StatusCode::TOO_MANY_REQUESTS
    };

    debug!(
        subject = %req.subject,
        operation = %req.operation,
        status = %status,
        layer = ?decision.deciding_layer,
        "Responding to rate limit check"
    );

    let body = CheckResponse {
        kind: decision.rejection_kind(),
        decision,
    };
    (status, rate_limit_headers(&decision), Json(body)).into_response()
}

async fn issue_challenge<R: RateLimiterBackend + 'static>(
    State(state): State<AppState<R>>,
    Json(req): Json<ChallengeRequest>,
) -> Response {
    if req.subject.is_empty() {
        return bad_request("subject is required");
    }

    match state.pow.issue_challenge(&req.subject, &req.tier).await {
        Ok(issued) => (StatusCode::OK, Json(issued)).into_response(),
        Err(e) => pow_error_response(e),
    }
}

async fn verify_solution<R: RateLimiterBackend + 'static>(
    State(state): State<AppState<R>>,
    Json(req): Json<VerifyRequest>,
) -> Response {
    if req.subject.is_empty() {
        return bad_request("subject is required");
    }

    match state
        .pow
        .verify_solution(&req.subject, &req.challenge, &req.solution)
        .await
    {
        Ok(()) => {
            let body = VerifyResponse {
                verified: true,
                kind: None,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => pow_error_response(e),
    }
}

fn pow_error_response(e: PowError) -> Response {
    let status = match &e {
        PowError::StoreUnavailable(cause) => {
            warn!(error = %cause, "Challenge store unavailable");
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => {
            info!(kind = %e.kind(), "Proof of work refused");
            StatusCode::FORBIDDEN
        }
    };
    let body = VerifyResponse {
        verified: false,
        kind: Some(e.kind()),
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PowConfig;
    use crate::ratelimit::DecidingLayer;
    use crate::store::testing::DownStore;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    /// Returns the same decision for every request.
    struct FixedBackend(RateLimitDecision);

    #[async_trait]
    impl RateLimiterBackend for FixedBackend {
        async fn check_rate_limit(&self, _: &str, _: &str, _: &str) -> RateLimitDecision {
            self.0
        }
    }

    fn decision(allowed: bool, layer: DecidingLayer) -> RateLimitDecision {
        RateLimitDecision {
            allowed,
            current_count: if allowed { 2 } else { 4 },
            limit: 3,
            reset_in_seconds: 42,
            deciding_layer: layer,
            degraded: false,
        }
    }

    fn app_with(decision: RateLimitDecision, pow: ProofOfWorkGate) -> Router {
        router(AppState {
            rate_limiter: Arc::new(FixedBackend(decision)),
            pow: Arc::new(pow),
        })
    }

    fn app(decision: RateLimitDecision) -> Router {
        let mut config = PowConfig::default();
        config.difficulty.insert("free".to_string(), 1);
        app_with(
            decision,
            ProofOfWorkGate::new(Arc::new(MemoryStore::new()), config),
        )
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = app(decision(true, DecidingLayer::Distributed))
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_allowed_check() {
        let request = post_json(
            "/v1/ratelimit/check",
            serde_json::json!({"subject": "u1", "operation": "domain-create", "tier": "free"}),
        );
        let response = app(decision(true, DecidingLayer::Distributed))
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "3");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "1");
        assert_eq!(response.headers()["x-ratelimit-reset"], "42");
        assert!(response.headers().get("retry-after").is_none());

        let body = json_body(response).await;
        assert_eq!(body["allowed"], true);
        assert_eq!(body["decidingLayer"], "distributed");
        assert!(body.get("kind").is_none());
    }

    #[tokio::test]
    async fn test_rejected_check() {
        let request = post_json(
            "/v1/ratelimit/check",
            serde_json::json!({"subject": "u1", "operation": "domain-create"}),
        );
        let response = app(decision(false, DecidingLayer::Burst))
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "42");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");

        let body = json_body(response).await;
        assert_eq!(body["allowed"], false);
        assert_eq!(body["kind"], "BURST_EXCEEDED");
        assert_eq!(body["decidingLayer"], "burst");
    }

    #[tokio::test]
    async fn test_tier_limit_kind() {
        let request = post_json(
            "/v1/ratelimit/check",
            serde_json::json!({"subject": "u1", "operation": "domain-create", "tier": "free"}),
        );
        let response = app(decision(false, DecidingLayer::Distributed))
            .oneshot(request)
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["kind"], "TIER_LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn test_unlimited_omits_limit_headers() {
        let request = post_json(
            "/v1/ratelimit/check",
            serde_json::json!({"subject": "u1", "operation": "domain-create", "tier": "enterprise"}),
        );
        let response = app(RateLimitDecision::unlimited(DecidingLayer::Distributed))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }

    #[tokio::test]
    async fn test_empty_subject_rejected() {
        let request = post_json(
            "/v1/ratelimit/check",
            serde_json::json!({"subject": "", "operation": "domain-create"}),
        );
        let response = app(decision(true, DecidingLayer::Distributed))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_empty_operation_rejected() {
        let request = post_json(
            "/v1/ratelimit/check",
            serde_json::json!({"subject": "u1", "operation": ""}),
        );
        let response = app(decision(true, DecidingLayer::Distributed))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_challenge_round_trip() {
        let app = app(decision(true, DecidingLayer::Distributed));

        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/challenges",
                serde_json::json!({"subject": "u1", "tier": "free"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let issued = json_body(response).await;
        assert_eq!(issued["difficulty"], 1);
        assert!(issued["estimatedTimeMs"].is_u64());

        let challenge = issued["challenge"].as_str().unwrap().to_string();
        let solution = crate::pow::solve(&challenge, 1);
        let verify = serde_json::json!({
            "subject": "u1",
            "challenge": challenge,
            "solution": solution,
        });

        let response = app
            .clone()
            .oneshot(post_json("/v1/challenges/verify", verify.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["verified"], true);

        let response = app
            .oneshot(post_json("/v1/challenges/verify", verify))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["verified"], false);
        assert_eq!(body["kind"], "CHALLENGE_EXPIRED_OR_MISSING");
    }

    #[tokio::test]
    async fn test_verify_store_outage() {
        let app = app_with(
            decision(true, DecidingLayer::Distributed),
            ProofOfWorkGate::new(Arc::new(DownStore::default()), PowConfig::default()),
        );
        let response = app
            .oneshot(post_json(
                "/v1/challenges/verify",
                serde_json::json!({"subject": "u1", "challenge": "abc", "solution": "1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["kind"], "STORE_UNAVAILABLE");
    }
}
