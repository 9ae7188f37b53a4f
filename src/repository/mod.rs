use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{AuditAction, AuditLogEntry, Project, ProjectStatus, TargetType, User},
    permissions::Scope,
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// ProjectQuery
///
/// Fully resolved listing query. The scope has already been decided by the permission
/// evaluator; the repository only translates it into a filter.
#[derive(Debug, Clone)]
pub struct ProjectQuery {
    pub scope: Scope,
    pub status: Option<ProjectStatus>,
    pub created_by: Option<Uuid>,
    pub include_deleted: bool,
}

impl ProjectQuery {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            status: None,
            created_by: None,
            include_deleted: false,
        }
    }

    pub fn matches(&self, project: &Project) -> bool {
        self.scope.admits(Some(project.country.as_str()), project.id)
            && (self.include_deleted || !project.is_deleted)
            && self.status.is_none_or(|s| s == project.status)
            && self
                .created_by
                .is_none_or(|creator| project.created_by == Some(creator))
    }
}

/// AuditQuery
///
/// Resolved audit listing: scope by the entry's denormalized country plus optional
/// equality filters, newest first, optionally limited.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub scope: Scope,
    pub action: Option<AuditAction>,
    pub target_type: Option<TargetType>,
    pub target_id: Option<Uuid>,
    pub limit: Option<i64>,
}

impl AuditQuery {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            action: None,
            target_type: None,
            target_id: None,
            limit: None,
        }
    }

    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.scope.admits(entry.country.as_deref(), entry.target_id)
            && self.action.is_none_or(|a| a == entry.action)
            && self.target_type.is_none_or(|t| t == entry.target_type)
            && self.target_id.is_none_or(|id| id == entry.target_id)
    }
}

/// Repository Trait
///
/// Read access for queries plus `begin`, which opens a `UnitOfWork` for writes.
/// Handlers and services only see `Arc<dyn Repository>`, so Postgres and the in-memory
/// store are interchangeable.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Opens a transactional unit of work. Dropping it without `commit` rolls back.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError>;

    // --- Users ---
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError>;
    async fn list_users(&self, scope: &Scope) -> Result<Vec<User>, AppError>;
    async fn super_admin_exists(&self) -> Result<bool, AppError>;

    // --- Projects ---
    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, AppError>;
    async fn list_projects(&self, query: &ProjectQuery) -> Result<Vec<Project>, AppError>;

    // --- Audit (read-only) ---
    async fn list_audit_entries(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, AppError>;
}

/// UnitOfWork
///
/// One database transaction. Every mutation and the audit entry describing it go through
/// the same unit, so they commit or vanish together. There is intentionally no way to
/// update or delete an audit entry.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn username_taken(&mut self, username: &str) -> Result<bool, AppError>;
    async fn email_taken(&mut self, email: &str, exclude: Option<Uuid>) -> Result<bool, AppError>;
    async fn insert_user(&mut self, user: &User) -> Result<(), AppError>;
    /// Loads a user and locks the row until the unit ends.
    async fn lock_user(&mut self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn update_user(&mut self, user: &User) -> Result<(), AppError>;

    async fn insert_project(&mut self, project: &Project) -> Result<(), AppError>;
    /// Loads a project (deleted or not) and locks the row until the unit ends.
    async fn lock_project(&mut self, id: Uuid) -> Result<Option<Project>, AppError>;
    async fn update_project(&mut self, project: &Project) -> Result<(), AppError>;
    /// Returns false if no row was removed.
    async fn delete_project(&mut self, id: Uuid) -> Result<bool, AppError>;

    async fn insert_audit_entry(&mut self, entry: &AuditLogEntry) -> Result<(), AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}

/// RepositoryState
///
/// The shared handle stored in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;
