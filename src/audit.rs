use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    models::{AuditAction, AuditLogEntry, FieldChange, Project, TargetType, User},
};

/// Audited
///
/// Implemented by every entity whose mutations are recorded. `audit_fields` is the set of
/// tracked columns; diffs and snapshots are computed over exactly these keys.
pub trait Audited {
    const TARGET: TargetType;

    fn audit_id(&self) -> Uuid;
    fn audit_country(&self) -> Option<String>;
    fn audit_fields(&self) -> BTreeMap<&'static str, Value>;
}

impl Audited for Project {
    const TARGET: TargetType = TargetType::Project;

    fn audit_id(&self) -> Uuid {
        self.id
    }

    fn audit_country(&self) -> Option<String> {
        Some(self.country.clone())
    }

    fn audit_fields(&self) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([
            ("title", json!(self.title)),
            ("description", json!(self.description)),
            ("status", json!(self.status)),
            ("country", json!(self.country)),
            ("created_by", json!(self.created_by)),
            ("is_deleted", json!(self.is_deleted)),
        ])
    }
}

impl Audited for User {
    const TARGET: TargetType = TargetType::User;

    fn audit_id(&self) -> Uuid {
        self.id
    }

    fn audit_country(&self) -> Option<String> {
        self.country.clone()
    }

    // The password hash is deliberately not a tracked field.
    fn audit_fields(&self) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([
            ("username", json!(self.username)),
            ("email", json!(self.email)),
            ("role", json!(self.role)),
            ("country", json!(self.country)),
            ("is_active", json!(self.is_active)),
        ])
    }
}

/// Field-level diff between two states of the same entity. Only keys whose value changed
/// are present.
pub fn diff<T: Audited>(before: &T, after: &T) -> BTreeMap<String, FieldChange> {
    let old = before.audit_fields();
    let new = after.audit_fields();

    new.into_iter()
        .filter_map(|(field, new_value)| {
            let old_value = old.get(field).cloned().unwrap_or(Value::Null);
            (old_value != new_value).then(|| {
                (
                    field.to_string(),
                    FieldChange {
                        old: old_value,
                        new: new_value,
                    },
                )
            })
        })
        .collect()
}

fn snapshot<T: Audited>(entity: &T, created: bool) -> BTreeMap<String, FieldChange> {
    entity
        .audit_fields()
        .into_iter()
        .map(|(field, value)| {
            let change = if created {
                FieldChange {
                    old: Value::Null,
                    new: value,
                }
            } else {
                FieldChange {
                    old: value,
                    new: Value::Null,
                }
            };
            (field.to_string(), change)
        })
        .collect()
}

/// Actor recorded on an entry: the authenticated caller, or none for system actions.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub id: Option<Uuid>,
    pub username: Option<String>,
}

impl Actor {
    pub fn system() -> Self {
        Self::default()
    }
}

impl From<&AuthUser> for Actor {
    fn from(caller: &AuthUser) -> Self {
        Self {
            id: Some(caller.id),
            username: Some(caller.username.clone()),
        }
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            id: Some(user.id),
            username: Some(user.username.clone()),
        }
    }
}

fn entry<T: Audited>(
    actor: &Actor,
    action: AuditAction,
    target: &T,
    changes: BTreeMap<String, FieldChange>,
) -> AuditLogEntry {
    AuditLogEntry {
        id: Uuid::new_v4(),
        actor_id: actor.id,
        actor_username: actor.username.clone(),
        action,
        target_type: T::TARGET,
        target_id: target.audit_id(),
        country: target.audit_country(),
        changes,
        timestamp: Utc::now(),
    }
}

/// CREATE entry carrying the full initial field set.
pub fn created<T: Audited>(actor: &Actor, target: &T) -> AuditLogEntry {
    entry(actor, AuditAction::Create, target, snapshot(target, true))
}

/// UPDATE entry with the changed fields, or `None` when nothing changed.
pub fn updated<T: Audited>(actor: &Actor, before: &T, after: &T) -> Option<AuditLogEntry> {
    let changes = diff(before, after);
    if changes.is_empty() {
        return None;
    }
    // Scope by the country the target had before the change, so the previous owner keeps
    // the trail of a record that moved away.
    let mut record = entry(actor, AuditAction::Update, after, changes);
    record.country = before.audit_country();
    Some(record)
}

/// DELETE entry carrying the final field set.
pub fn deleted<T: Audited>(actor: &Actor, target: &T) -> AuditLogEntry {
    entry(actor, AuditAction::Delete, target, snapshot(target, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectStatus;

    fn project() -> Project {
        Project {
            id: Uuid::new_v4(),
            title: "Water Survey".to_string(),
            description: "Wells".to_string(),
            status: ProjectStatus::Draft,
            country: "USA".to_string(),
            created_by: None,
            is_deleted: false,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn diff_only_contains_changed_fields() {
        let before = project();
        let mut after = before.clone();
        after.title = "Water Survey II".to_string();
        after.status = ProjectStatus::Active;
        // Untracked bookkeeping fields never show up.
        after.version = 2;
        after.updated_at = Utc::now();

        let changes = diff(&before, &after);

        assert_eq!(changes.len(), 2);
        assert_eq!(changes["title"].old, json!("Water Survey"));
        assert_eq!(changes["title"].new, json!("Water Survey II"));
        assert_eq!(changes["status"].new, json!("active"));
    }

    #[test]
    fn identical_states_produce_no_update_entry() {
        let p = project();
        assert!(updated(&Actor::system(), &p, &p.clone()).is_none());
    }

    #[test]
    fn created_entry_snapshots_every_tracked_field() {
        let p = project();
        let record = created(&Actor::system(), &p);

        assert_eq!(record.action, AuditAction::Create);
        assert_eq!(record.target_type, TargetType::Project);
        assert_eq!(record.country.as_deref(), Some("USA"));
        assert_eq!(record.changes.len(), p.audit_fields().len());
        assert!(record.changes.values().all(|c| c.old.is_null()));
    }
}
