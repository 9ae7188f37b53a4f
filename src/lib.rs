use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};

use tower::{Layer, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    normalize_path::{NormalizePath, NormalizePathLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core building blocks: identity, rules, persistence.
pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod password;
pub mod permissions;
pub mod repository;

// Use cases and the HTTP surface on top of them.
pub mod handlers;
pub mod routes;
pub mod services;

use auth::{AuthUser, TokenService};
use password::PasswordPolicy;
use routes::{authenticated, public};
use services::{AuditService, ProjectService, UserService};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// AppState
///
/// The single, cloneable container shared by every request: the repository handle, the
/// token service, the configuration, and the services built on top of the repository.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: Postgres in production, in-memory in tests.
    pub repo: RepositoryState,
    pub tokens: TokenService,
    pub config: AppConfig,
    pub users: UserService,
    pub projects: ProjectService,
    pub audit: AuditService,
}

impl AppState {
    /// Wires the services to one repository using the given configuration.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        Self {
            tokens: TokenService::from_config(&config),
            users: UserService::new(
                repo.clone(),
                PasswordPolicy::new(config.password_min_length),
            ),
            projects: ProjectService::new(repo.clone()),
            audit: AuditService::new(repo.clone()),
            repo,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

// Lets extractors such as `AuthUser` pull only the pieces they need out of `AppState`.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for TokenService {
    fn from_ref(app_state: &AppState) -> TokenService {
        app_state.tokens.clone()
    }
}

/// require_caller
///
/// Rejects the request with 401 unless an `AuthUser` can be extracted, then tags the
/// surrounding `http_request` span with who is calling. Applied with `route_layer` so
/// unknown paths still answer 404 rather than 401.
async fn require_caller(caller: AuthUser, request: Request, next: Next) -> Response {
    let span = Span::current();
    span.record("caller_id", tracing::field::display(caller.id));
    span.record("caller_role", caller.role.as_str());
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tree, applies the authentication layer to protected routes and
/// wraps everything in the request-id, tracing and CORS layers.
///
/// Trailing slashes are handled by `create_app`, which wraps this router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_caller,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(http_request_span)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// create_app
///
/// The served application: the router wrapped in `NormalizePathLayer`, so `/api/projects/`
/// and `/api/projects` hit the same route. Path rewriting has to run before routing, so it
/// wraps the router from outside.
pub fn create_app(state: AppState) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(create_router(state))
}

/// http_request_span
///
/// Builds the `http_request` span for `TraceLayer`. The caller fields start empty and are
/// filled by `require_caller` on authenticated routes.
fn http_request_span(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = %request.method(),
        path = %request.uri().path(),
        req_id = %request_id,
        caller_id = tracing::field::Empty,
        caller_role = tracing::field::Empty,
    )
}
