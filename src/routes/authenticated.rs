use crate::{AppState, handlers};
use axum::{
    Router,
    routing::get,
};

/// Authenticated Router Module
///
/// Every route here sits behind the authentication layer added in `create_router`, so the
/// handlers always receive a resolved `AuthUser`. What that caller may see or change is
/// decided by the services, scoped by role and country.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Users ---
        // GET/POST /api/users
        // Scoped listing (members only see themselves) and admin-driven creation.
        .route(
            "/api/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        // GET /api/users/me
        .route("/api/users/me", get(handlers::me))
        // GET/PATCH /api/users/{id}
        .route(
            "/api/users/{id}",
            get(handlers::get_user).patch(handlers::update_user),
        )
        // --- Projects ---
        // GET/POST /api/projects
        .route(
            "/api/projects",
            get(handlers::list_projects).post(handlers::create_project),
        )
        // GET/PATCH/DELETE /api/projects/{id}
        // DELETE takes ?mode=soft|hard; hard deletion is reserved for super admins.
        .route(
            "/api/projects/{id}",
            get(handlers::get_project)
                .patch(handlers::update_project)
                .delete(handlers::delete_project),
        )
        // --- Audit Log ---
        // GET /api/audit-logs
        // Read-only. Entries are written by the services, never through the API.
        .route("/api/audit-logs", get(handlers::list_audit_logs))
        // GET /api/audit-logs/recent?limit=N
        .route("/api/audit-logs/recent", get(handlers::recent_audit_logs))
}
