use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthUser, TokenType},
    error::AppError,
    models::{
        AccessTokenResponse, AuditLogEntry, AuditLogFilter, CreateProjectRequest,
        CreateUserRequest, DeleteParams, IncludeDeleted, LoginRequest, Project, ProjectFilter,
        RecentParams, RefreshRequest, RegisterRequest, TokenPairResponse, UpdateProjectRequest,
        UpdateUserRequest, UserSummary,
    },
};

// --- Authentication ---

/// register
///
/// [Public Route] Self-registration. Always creates a country member.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserSummary>), AppError> {
    let user = state.users.register(payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// login
///
/// [Public Route] Exchanges username and password for an access/refresh token pair.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenPairResponse>, AppError> {
    let user = state
        .users
        .authenticate(&payload.username, &payload.password)
        .await?;
    tracing::info!(user_id = %user.id, "login succeeded");
    Ok(Json(state.tokens.issue_pair(&user)?))
}

/// refresh
///
/// [Public Route] Issues a new access token for a valid refresh token. The account is
/// re-read so that deactivated users and changed roles take effect immediately.
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AccessTokenResponse>, AppError> {
    let claims = state.tokens.validate(&payload.refresh, TokenType::Refresh)?;
    let user = state.users.active_user(claims.sub).await?;
    Ok(Json(AccessTokenResponse {
        access: state.tokens.issue_access(&user)?,
    }))
}

// --- Users ---

pub async fn list_users(
    caller: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    Ok(Json(state.users.list_users(&caller).await?))
}

pub async fn create_user(
    caller: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserSummary>), AppError> {
    let user = state.users.create_user(&caller, payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn me(
    caller: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserSummary>, AppError> {
    Ok(Json(state.users.me(&caller).await?))
}

pub async fn get_user(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserSummary>, AppError> {
    Ok(Json(state.users.get_user(&caller, id).await?))
}

pub async fn update_user(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserSummary>, AppError> {
    Ok(Json(state.users.update_user(&caller, id, payload).await?))
}

// --- Projects ---

/// list_projects
///
/// [Authenticated Route] Projects visible to the caller, newest first.
/// Query: `status`, `country` (super admins only), `created_by`, `include_deleted`.
pub async fn list_projects(
    caller: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<ProjectFilter>,
) -> Result<Json<Vec<Project>>, AppError> {
    Ok(Json(state.projects.list(&caller, filter).await?))
}

pub async fn create_project(
    caller: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    let project = state.projects.create(&caller, payload).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// get_project
///
/// [Authenticated Route] A project outside the caller's country answers 404, never 403.
pub async fn get_project(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<IncludeDeleted>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(
        state
            .projects
            .get(&caller, id, params.include_deleted)
            .await?,
    ))
}

/// update_project
///
/// [Authenticated Route] Partial update. Send `expected_version` to fail with 409 instead
/// of overwriting a concurrent change.
pub async fn update_project(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(state.projects.update(&caller, id, payload).await?))
}

/// delete_project
///
/// [Authenticated Route] `?mode=soft|hard`. Without a mode super admins hard delete and
/// country admins soft delete.
pub async fn delete_project(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<DeleteParams>,
) -> Result<StatusCode, AppError> {
    state.projects.delete(&caller, id, params.mode).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Audit Log (read-only) ---

pub async fn list_audit_logs(
    caller: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<AuditLogFilter>,
) -> Result<Json<Vec<AuditLogEntry>>, AppError> {
    Ok(Json(state.audit.list(&caller, filter).await?))
}

pub async fn recent_audit_logs(
    caller: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Result<Json<Vec<AuditLogEntry>>, AppError> {
    Ok(Json(state.audit.recent(&caller, params.limit).await?))
}
