use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use super::{permit, reveal};
use crate::{
    audit::{self, Actor},
    auth::AuthUser,
    error::{AppError, AppResult, FieldErrors},
    models::{
        CreateProjectRequest, DeleteMode, Project, ProjectFilter, Role, UpdateProjectRequest,
    },
    permissions::{Action, Scope, authorize, list_scope},
    repository::{ProjectQuery, RepositoryState, UnitOfWork},
};

/// ProjectService
///
/// Country-scoped project CRUD. Non-super callers only ever see and touch projects of
/// their own country; everything outside looks absent.
#[derive(Clone)]
pub struct ProjectService {
    repo: RepositoryState,
}

impl ProjectService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// create
    ///
    /// The country comes from the caller unless the caller is a super admin, who must name
    /// one explicitly.
    pub async fn create(&self, caller: &AuthUser, payload: CreateProjectRequest) -> AppResult<Project> {
        payload
            .validate()
            .map_err(|e| AppError::Validation(FieldErrors::from(e)))?;

        let country = match caller.role {
            Role::SuperAdmin => payload
                .country
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| AppError::validation("country", "This field is required."))?,
            _ => caller
                .country
                .clone()
                .ok_or_else(|| AppError::permission("account has no country assigned"))?,
        };
        permit(authorize(caller, Action::CreateProject, Some(country.as_str())))?;

        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            title: payload.title,
            description: payload.description,
            status: payload.status.unwrap_or_default(),
            country,
            created_by: Some(caller.id),
            is_deleted: false,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let mut uow = self.repo.begin().await?;
        uow.insert_project(&project).await?;
        uow.insert_audit_entry(&audit::created(&Actor::from(caller), &project))
            .await?;
        uow.commit().await?;

        tracing::info!(
            project_id = %project.id,
            country = %project.country,
            actor = %caller.id,
            "project created"
        );
        Ok(project)
    }

    /// list
    ///
    /// Newest first. `country` narrows a super admin's listing and is ignored for everyone
    /// else; `include_deleted` only takes effect for callers allowed to see deleted rows.
    pub async fn list(&self, caller: &AuthUser, filter: ProjectFilter) -> AppResult<Vec<Project>> {
        let mut scope = list_scope(caller, Action::ReadProject)
            .ok_or_else(|| AppError::permission("you may not list projects"))?;
        if let (Scope::All, Some(country)) = (&scope, filter.country) {
            scope = Scope::Country(country);
        }

        let mut query = ProjectQuery::new(scope);
        query.status = filter.status;
        query.created_by = filter.created_by;
        query.include_deleted = filter.include_deleted && caller.role.is_admin_tier();

        self.repo.list_projects(&query).await
    }

    pub async fn get(&self, caller: &AuthUser, id: Uuid, include_deleted: bool) -> AppResult<Project> {
        let project = self.repo.find_project(id).await?.ok_or(AppError::NotFound)?;
        reveal(authorize(caller, Action::ReadProject, Some(project.country.as_str())))?;

        if project.is_deleted {
            if !include_deleted {
                return Err(AppError::NotFound);
            }
            reveal(authorize(
                caller,
                Action::ViewDeletedProjects,
                Some(project.country.as_str()),
            ))?;
        }

        Ok(project)
    }

    /// update
    ///
    /// Applies only the fields present in the payload. When `expected_version` is sent the
    /// update fails with a conflict if someone else committed first; otherwise the last
    /// commit wins. An update that changes nothing writes nothing and is not audited.
    pub async fn update(
        &self,
        caller: &AuthUser,
        id: Uuid,
        payload: UpdateProjectRequest,
    ) -> AppResult<Project> {
        payload
            .validate()
            .map_err(|e| AppError::Validation(FieldErrors::from(e)))?;

        let mut uow = self.repo.begin().await?;
        let before = lock_live(&mut uow, caller, id).await?;
        permit(authorize(caller, Action::UpdateProject, Some(before.country.as_str())))?;

        if let Some(expected) = payload.expected_version {
            if expected != before.version {
                return Err(AppError::Conflict(format!(
                    "project was modified concurrently (expected version {expected}, current {})",
                    before.version
                )));
            }
        }

        let mut after = before.clone();
        if let Some(title) = payload.title {
            after.title = title;
        }
        if let Some(description) = payload.description {
            after.description = description;
        }
        if let Some(status) = payload.status {
            after.status = status;
        }

        let Some(entry) = audit::updated(&Actor::from(caller), &before, &after) else {
            tracing::debug!(project_id = %id, "update changed nothing");
            return Ok(before);
        };

        after.version += 1;
        after.updated_at = Utc::now();

        uow.update_project(&after).await?;
        uow.insert_audit_entry(&entry).await?;
        uow.commit().await?;

        tracing::info!(
            project_id = %after.id,
            version = after.version,
            actor = %caller.id,
            "project updated"
        );
        Ok(after)
    }

    /// Dispatches on the requested mode. Without one, super admins hard delete and
    /// everyone else soft deletes.
    pub async fn delete(&self, caller: &AuthUser, id: Uuid, mode: Option<DeleteMode>) -> AppResult<()> {
        let mode = mode.unwrap_or(match caller.role {
            Role::SuperAdmin => DeleteMode::Hard,
            _ => DeleteMode::Soft,
        });
        match mode {
            DeleteMode::Soft => self.soft_delete(caller, id).await.map(|_| ()),
            DeleteMode::Hard => self.hard_delete(caller, id).await,
        }
    }

    /// Marks the project deleted. Audited as an UPDATE of `is_deleted`.
    pub async fn soft_delete(&self, caller: &AuthUser, id: Uuid) -> AppResult<Project> {
        let mut uow = self.repo.begin().await?;
        let before = lock_live(&mut uow, caller, id).await?;
        permit(authorize(caller, Action::SoftDeleteProject, Some(before.country.as_str())))?;

        let mut after = before.clone();
        after.is_deleted = true;
        after.version += 1;
        after.updated_at = Utc::now();

        let entry = audit::updated(&Actor::from(caller), &before, &after)
            .ok_or_else(|| AppError::internal("soft delete produced an empty diff"))?;

        uow.update_project(&after).await?;
        uow.insert_audit_entry(&entry).await?;
        uow.commit().await?;

        tracing::info!(project_id = %id, actor = %caller.id, "project soft-deleted");
        Ok(after)
    }

    /// Removes the row for good, soft-deleted or not.
    pub async fn hard_delete(&self, caller: &AuthUser, id: Uuid) -> AppResult<()> {
        let mut uow = self.repo.begin().await?;
        let project = uow.lock_project(id).await?.ok_or(AppError::NotFound)?;
        reveal(authorize(caller, Action::ReadProject, Some(project.country.as_str())))?;
        permit(authorize(caller, Action::HardDeleteProject, Some(project.country.as_str())))?;

        if !uow.delete_project(id).await? {
            return Err(AppError::NotFound);
        }
        uow.insert_audit_entry(&audit::deleted(&Actor::from(caller), &project))
            .await?;
        uow.commit().await?;

        tracing::info!(project_id = %id, actor = %caller.id, "project permanently deleted");
        Ok(())
    }
}

/// Locks a project that is visible to the caller and not soft-deleted.
async fn lock_live(uow: &mut Box<dyn UnitOfWork>, caller: &AuthUser, id: Uuid) -> AppResult<Project> {
    let project = uow.lock_project(id).await?.ok_or(AppError::NotFound)?;
    reveal(authorize(caller, Action::ReadProject, Some(project.country.as_str())))?;
    if project.is_deleted {
        return Err(AppError::NotFound);
    }
    Ok(project)
}
