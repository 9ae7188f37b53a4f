use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{AuditQuery, ProjectQuery, Repository, UnitOfWork};
use crate::{
    error::{AppError, FieldErrors},
    models::{AuditLogEntry, Project, Role, User},
    permissions::Scope,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: Vec<User>,
    projects: Vec<Project>,
    audit: Vec<AuditLogEntry>,
}

/// InMemoryRepository
///
/// A process-local store with the same transactional contract as Postgres. A unit of work
/// holds the store's lock for its whole lifetime and writes to a private copy, which
/// replaces the shared state only on `commit`. Used by tests and local experiments.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
    fail_audit_writes: bool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle on the same data whose audit writes fail.
    pub fn with_failing_audit(&self) -> Self {
        Self {
            state: self.state.clone(),
            fail_audit_writes: true,
        }
    }
}

// Newest first; ties keep the later insertion first.
fn newest_first<T: Clone>(items: &[T], keep: impl Fn(&T) -> bool, key: impl Fn(&T) -> i64) -> Vec<T> {
    let mut selected: Vec<T> = items.iter().rev().filter(|item| keep(item)).cloned().collect();
    selected.sort_by_key(|item| std::cmp::Reverse(key(item)));
    selected
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            fail_audit_writes: self.fail_audit_writes,
        }))
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self, scope: &Scope) -> Result<Vec<User>, AppError> {
        let state = self.state.lock().await;
        Ok(newest_first(
            &state.users,
            |u| scope.admits(u.country.as_deref(), u.id),
            |u| u.date_joined.timestamp_micros(),
        ))
    }

    async fn super_admin_exists(&self) -> Result<bool, AppError> {
        let state = self.state.lock().await;
        Ok(state.users.iter().any(|u| u.role == Role::SuperAdmin))
    }

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, AppError> {
        let state = self.state.lock().await;
        Ok(state.projects.iter().find(|p| p.id == id).cloned())
    }

    async fn list_projects(&self, query: &ProjectQuery) -> Result<Vec<Project>, AppError> {
        let state = self.state.lock().await;
        Ok(newest_first(
            &state.projects,
            |p| query.matches(p),
            |p| p.created_at.timestamp_micros(),
        ))
    }

    async fn list_audit_entries(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, AppError> {
        let state = self.state.lock().await;
        let mut entries = newest_first(
            &state.audit,
            |e| query.matches(e),
            |e| e.timestamp.timestamp_micros(),
        );
        if let Some(limit) = query.limit {
            entries.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(entries)
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_audit_writes: bool,
}

impl MemoryUnitOfWork {
    fn check_unique(&self, user: &User) -> Result<(), AppError> {
        let others = self.working.users.iter().filter(|u| u.id != user.id);
        let mut errors = FieldErrors::new();
        for other in others {
            if other.username == user.username {
                errors.add("username", "A user with that username already exists.");
            }
            if other.email.eq_ignore_ascii_case(&user.email) {
                errors.add("email", "A user with that email already exists.");
            }
        }
        errors.into_result()
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn username_taken(&mut self, username: &str) -> Result<bool, AppError> {
        Ok(self.working.users.iter().any(|u| u.username == username))
    }

    async fn email_taken(&mut self, email: &str, exclude: Option<Uuid>) -> Result<bool, AppError> {
        Ok(self
            .working
            .users
            .iter()
            .any(|u| Some(u.id) != exclude && u.email.eq_ignore_ascii_case(email)))
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), AppError> {
        self.check_unique(user)?;
        self.working.users.push(user.clone());
        Ok(())
    }

    async fn lock_user(&mut self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.working.users.iter().find(|u| u.id == id).cloned())
    }

    async fn update_user(&mut self, user: &User) -> Result<(), AppError> {
        self.check_unique(user)?;
        if let Some(slot) = self.working.users.iter_mut().find(|u| u.id == user.id) {
            slot.email = user.email.clone();
            slot.country = user.country.clone();
            slot.is_active = user.is_active;
        }
        Ok(())
    }

    async fn insert_project(&mut self, project: &Project) -> Result<(), AppError> {
        self.working.projects.push(project.clone());
        Ok(())
    }

    async fn lock_project(&mut self, id: Uuid) -> Result<Option<Project>, AppError> {
        Ok(self.working.projects.iter().find(|p| p.id == id).cloned())
    }

    async fn update_project(&mut self, project: &Project) -> Result<(), AppError> {
        if let Some(slot) = self.working.projects.iter_mut().find(|p| p.id == project.id) {
            *slot = project.clone();
        }
        Ok(())
    }

    async fn delete_project(&mut self, id: Uuid) -> Result<bool, AppError> {
        let before = self.working.projects.len();
        self.working.projects.retain(|p| p.id != id);
        Ok(self.working.projects.len() < before)
    }

    async fn insert_audit_entry(&mut self, entry: &AuditLogEntry) -> Result<(), AppError> {
        if self.fail_audit_writes {
            return Err(AppError::internal("audit log is unavailable"));
        }
        self.working.audit.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryUnitOfWork {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::ProjectStatus;

    fn project(country: &str) -> Project {
        Project {
            id: Uuid::new_v4(),
            title: "Bridge".to_string(),
            description: String::new(),
            status: ProjectStatus::Draft,
            country: country.to_string(),
            created_by: None,
            is_deleted: false,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn uncommitted_work_is_discarded() {
        let repo = InMemoryRepository::new();
        let p = project("USA");

        {
            let mut uow = repo.begin().await.unwrap();
            uow.insert_project(&p).await.unwrap();
            // dropped without commit
        }
        assert!(repo.find_project(p.id).await.unwrap().is_none());

        let mut uow = repo.begin().await.unwrap();
        uow.insert_project(&p).await.unwrap();
        uow.commit().await.unwrap();
        assert_eq!(repo.find_project(p.id).await.unwrap(), Some(p));
    }

    #[tokio::test]
    async fn listing_respects_country_scope() {
        let repo = InMemoryRepository::new();
        let mut uow = repo.begin().await.unwrap();
        uow.insert_project(&project("USA")).await.unwrap();
        uow.insert_project(&project("UK")).await.unwrap();
        uow.commit().await.unwrap();

        let uk = repo
            .list_projects(&ProjectQuery::new(Scope::Country("UK".to_string())))
            .await
            .unwrap();
        assert_eq!(uk.len(), 1);
        assert_eq!(uk[0].country, "UK");

        let all = repo.list_projects(&ProjectQuery::new(Scope::All)).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
