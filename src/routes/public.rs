use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Unauthenticated endpoints: liveness and the credential exchange.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers and orchestration.
        .route("/health", get(|| async { "ok" }))
        // POST /api/auth/register
        // Self-registration; the account is always a country member.
        .route("/api/auth/register", post(handlers::register))
        // POST /api/auth/login
        // Username and password for an access/refresh token pair.
        .route("/api/auth/login", post(handlers::login))
        // POST /api/auth/refresh
        // Refresh token for a fresh access token.
        .route("/api/auth/refresh", post(handlers::refresh))
}
