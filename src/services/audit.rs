use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{AuditLogEntry, AuditLogFilter, Role, TargetType},
    permissions::{Action, list_scope},
    repository::{AuditQuery, RepositoryState},
};

pub const DEFAULT_RECENT_LIMIT: usize = 20;
pub const MAX_RECENT_LIMIT: usize = 100;

/// AuditService
///
/// Read side of the audit trail. Entries are written by the other services inside their
/// own units of work; this service has no way to change them.
#[derive(Clone)]
pub struct AuditService {
    repo: RepositoryState,
}

impl AuditService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    pub async fn list(&self, caller: &AuthUser, filter: AuditLogFilter) -> AppResult<Vec<AuditLogEntry>> {
        let mut query = scoped_query(caller)?;
        query.action = filter.action;
        query.target_id = filter.target_id;
        match (query.target_type, filter.target_type) {
            // Members asking for user entries get nothing.
            (Some(forced), Some(requested)) if forced != requested => return Ok(Vec::new()),
            (None, requested) => query.target_type = requested,
            _ => {}
        }

        self.repo.list_audit_entries(&query).await
    }

    /// The latest entries under the same scoping as `list`, 20 by default and never more
    /// than 100.
    pub async fn recent(&self, caller: &AuthUser, limit: Option<usize>) -> AppResult<Vec<AuditLogEntry>> {
        let mut query = scoped_query(caller)?;
        let limit = limit.unwrap_or(DEFAULT_RECENT_LIMIT).min(MAX_RECENT_LIMIT);
        query.limit = Some(limit as i64);

        self.repo.list_audit_entries(&query).await
    }
}

// Country scope for everyone but super admins; members additionally only see projects.
fn scoped_query(caller: &AuthUser) -> AppResult<AuditQuery> {
    let scope = list_scope(caller, Action::ReadAuditLog)
        .ok_or_else(|| AppError::permission("you may not read the audit log"))?;
    let mut query = AuditQuery::new(scope);
    if caller.role == Role::CountryMember {
        query.target_type = Some(TargetType::Project);
    }
    Ok(query)
}
