#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use country_projects::{
    AppConfig, AppState, InMemoryRepository,
    audit::{self, Actor},
    auth::AuthUser,
    models::{Project, ProjectStatus, Role, User},
    repository::RepositoryState,
};
use uuid::Uuid;

pub const STRONG_PASSWORD: &str = "Tangerine-Harbor-Violin-93";

pub fn create_test_state(repo: InMemoryRepository) -> AppState {
    AppState::new(Arc::new(repo) as RepositoryState, AppConfig::default())
}

/// Inserts a user directly through a unit of work. The password hash is a placeholder
/// unless `password_hash` is given, so seeding stays fast.
pub async fn seed_user_with_hash(
    repo: &RepositoryState,
    username: &str,
    role: Role,
    country: Option<&str>,
    password_hash: &str,
) -> User {
    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password_hash: password_hash.to_string(),
        role,
        country: country.map(str::to_string),
        is_active: true,
        date_joined: Utc::now(),
    };
    let mut uow = repo.begin().await.unwrap();
    uow.insert_user(&user).await.unwrap();
    uow.commit().await.unwrap();
    user
}

pub async fn seed_user(
    repo: &RepositoryState,
    username: &str,
    role: Role,
    country: Option<&str>,
) -> User {
    seed_user_with_hash(repo, username, role, country, "$argon2id$placeholder").await
}

/// Inserts a project together with its CREATE audit entry.
pub async fn seed_project(repo: &RepositoryState, title: &str, country: &str, creator: &User) -> Project {
    let now = Utc::now();
    let project = Project {
        id: Uuid::new_v4(),
        title: title.to_string(),
        description: String::new(),
        status: ProjectStatus::Draft,
        country: country.to_string(),
        created_by: Some(creator.id),
        is_deleted: false,
        version: 1,
        created_at: now,
        updated_at: now,
    };
    let mut uow = repo.begin().await.unwrap();
    uow.insert_project(&project).await.unwrap();
    uow.insert_audit_entry(&audit::created(&Actor::from(creator), &project))
        .await
        .unwrap();
    uow.commit().await.unwrap();
    project
}

pub fn caller(user: &User) -> AuthUser {
    AuthUser::from(user)
}

/// The cast used by most scenarios: one super admin, an admin and a member in the USA,
/// and an admin in the UK.
pub struct Cast {
    pub state: AppState,
    pub root: User,
    pub usa_admin: User,
    pub usa_member: User,
    pub uk_admin: User,
}

pub async fn cast() -> Cast {
    cast_with(InMemoryRepository::new()).await
}

pub async fn cast_with(repo: InMemoryRepository) -> Cast {
    let state = create_test_state(repo);
    let root = seed_user(&state.repo, "root", Role::SuperAdmin, None).await;
    let usa_admin = seed_user(&state.repo, "usa_admin", Role::CountryAdmin, Some("USA")).await;
    let usa_member = seed_user(&state.repo, "usa_member", Role::CountryMember, Some("USA")).await;
    let uk_admin = seed_user(&state.repo, "uk_admin", Role::CountryAdmin, Some("UK")).await;
    Cast {
        state,
        root,
        usa_admin,
        usa_member,
        uk_admin,
    }
}
