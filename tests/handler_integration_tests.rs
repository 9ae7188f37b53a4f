mod common;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use common::{STRONG_PASSWORD, caller, cast, create_test_state, seed_project};
use country_projects::{
    AppError, InMemoryRepository,
    auth::TokenType,
    error::ApiErrorResponse,
    handlers,
    models::{
        CreateProjectRequest, DeleteMode, DeleteParams, IncludeDeleted, LoginRequest,
        ProjectFilter, RecentParams, RefreshRequest, RegisterRequest, Role, UpdateProjectRequest,
    },
};

async fn error_body(err: AppError) -> (StatusCode, ApiErrorResponse) {
    let response = err.into_response();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn registration() -> RegisterRequest {
    RegisterRequest {
        username: "john_doe".to_string(),
        email: "john@example.com".to_string(),
        password: STRONG_PASSWORD.to_string(),
        password_confirm: STRONG_PASSWORD.to_string(),
        country: "USA".to_string(),
    }
}

// --- Auth handlers ---

#[tokio::test]
async fn test_register_login_refresh_flow() {
    let state = create_test_state(InMemoryRepository::new());

    let (status, Json(user)) = handlers::register(State(state.clone()), Json(registration()))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user.role, Role::CountryMember);

    let Json(pair) = handlers::login(
        State(state.clone()),
        Json(LoginRequest {
            username: "john_doe".to_string(),
            password: STRONG_PASSWORD.to_string(),
        }),
    )
    .await
    .unwrap();

    let claims = state.tokens.validate(&pair.access, TokenType::Access).unwrap();
    assert_eq!(claims.sub, user.id);
    assert_eq!(claims.role, Role::CountryMember);
    assert_eq!(claims.country.as_deref(), Some("USA"));

    let Json(refreshed) = handlers::refresh(
        State(state.clone()),
        Json(RefreshRequest {
            refresh: pair.refresh.clone(),
        }),
    )
    .await
    .unwrap();
    assert!(state.tokens.validate(&refreshed.access, TokenType::Access).is_ok());

    // An access token cannot be used to refresh.
    let err = handlers::refresh(
        State(state),
        Json(RefreshRequest {
            refresh: pair.access,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_failure_is_401_with_code() {
    let state = create_test_state(InMemoryRepository::new());

    let err = handlers::login(
        State(state),
        Json(LoginRequest {
            username: "ghost".to_string(),
            password: "whatever".to_string(),
        }),
    )
    .await
    .unwrap_err();

    let (status, body) = error_body(err).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.error, "AUTHENTICATION_FAILED");
    assert!(body.details.is_none());
}

#[tokio::test]
async fn test_register_validation_error_body_is_field_keyed() {
    let state = create_test_state(InMemoryRepository::new());
    let payload = RegisterRequest {
        password_confirm: "nope".to_string(),
        ..registration()
    };

    let err = handlers::register(State(state), Json(payload))
        .await
        .unwrap_err();

    let (status, body) = error_body(err).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.error, "VALIDATION_ERROR");
    let details = body.details.expect("field errors are returned");
    assert!(details.contains("password_confirm"));
}

// --- Project handlers ---

#[tokio::test]
async fn test_create_project_returns_201() {
    let c = cast().await;

    let (status, Json(project)) = handlers::create_project(
        caller(&c.usa_member),
        State(c.state.clone()),
        Json(CreateProjectRequest {
            title: "Bridge".to_string(),
            ..Default::default()
        }),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(project.country, "USA");
}

#[tokio::test]
async fn test_get_project_across_countries_is_404() {
    let c = cast().await;
    let project = seed_project(&c.state.repo, "Texas Grid", "USA", &c.usa_admin).await;

    let err = handlers::get_project(
        caller(&c.uk_admin),
        State(c.state.clone()),
        Path(project.id),
        Query(IncludeDeleted::default()),
    )
    .await
    .unwrap_err();

    let (status, body) = error_body(err).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.error, "NOT_FOUND");
}

#[tokio::test]
async fn test_update_project_conflict_is_409() {
    let c = cast().await;
    let project = seed_project(&c.state.repo, "Texas Grid", "USA", &c.usa_admin).await;

    let err = handlers::update_project(
        caller(&c.usa_admin),
        State(c.state.clone()),
        Path(project.id),
        Json(UpdateProjectRequest {
            title: Some("New".to_string()),
            expected_version: Some(7),
            ..Default::default()
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_delete_project_statuses() {
    let c = cast().await;
    let project = seed_project(&c.state.repo, "Texas Grid", "USA", &c.usa_admin).await;

    let err = handlers::delete_project(
        caller(&c.usa_admin),
        State(c.state.clone()),
        Path(project.id),
        Query(DeleteParams {
            mode: Some(DeleteMode::Hard),
        }),
    )
    .await
    .unwrap_err();
    let (status, body) = error_body(err).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body.error, "PERMISSION_DENIED");

    let status = handlers::delete_project(
        caller(&c.usa_admin),
        State(c.state.clone()),
        Path(project.id),
        Query(DeleteParams::default()),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let Json(listed) = handlers::list_projects(
        caller(&c.usa_admin),
        State(c.state.clone()),
        Query(ProjectFilter::default()),
    )
    .await
    .unwrap();
    assert!(listed.is_empty());
}

// --- User & audit handlers ---

#[tokio::test]
async fn test_member_lists_only_self_and_me_matches() {
    let c = cast().await;

    let Json(users) = handlers::list_users(caller(&c.usa_member), State(c.state.clone()))
        .await
        .unwrap();
    assert_eq!(users.len(), 1);

    let Json(me) = handlers::me(caller(&c.usa_member), State(c.state.clone()))
        .await
        .unwrap();
    assert_eq!(users[0], me);
}

#[tokio::test]
async fn test_recent_audit_logs_handler() {
    let c = cast().await;
    seed_project(&c.state.repo, "One", "USA", &c.usa_admin).await;
    seed_project(&c.state.repo, "Two", "USA", &c.usa_admin).await;

    let Json(entries) = handlers::recent_audit_logs(
        caller(&c.usa_member),
        State(c.state.clone()),
        Query(RecentParams { limit: Some(1) }),
    )
    .await
    .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].changes["title"].new, serde_json::json!("Two"));
}
