//! Role/country permission rules.
//!
//! A pure rule table: no I/O, no panics, no knowledge of storage. Services ask
//! [`authorize`] before touching a row and [`list_scope`] before building a listing query.

use uuid::Uuid;

use crate::{auth::AuthUser, models::Role};

/// Action
///
/// Everything a caller can attempt. `CreateUser` and `UpdateUser` carry the role of the
/// target account because the rule depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateUser(Role),
    ReadUser,
    UpdateUser(Role),
    CreateProject,
    ReadProject,
    UpdateProject,
    SoftDeleteProject,
    HardDeleteProject,
    ViewDeletedProjects,
    ReadAuditLog,
}

/// Scope
///
/// Query-filter directive returned when there is no single target to check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Country(String),
    /// Only the caller's own record.
    Subject(Uuid),
}

impl Scope {
    /// Whether a record with the given country (and id, for subject scopes) is inside.
    pub fn admits(&self, country: Option<&str>, id: Uuid) -> bool {
        match self {
            Scope::All => true,
            Scope::Country(c) => country == Some(c.as_str()),
            Scope::Subject(subject) => *subject == id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
    Filter(Scope),
}

/// authorize
///
/// Decides whether `caller` may perform `action` on a target owned by `target_country`.
///
/// With `target_country = None` (a listing with no single target) the answer is a
/// `Decision::Filter` naming the rows the caller may see, or `Deny` if the action is not
/// available to the caller at all.
pub fn authorize(caller: &AuthUser, action: Action, target_country: Option<&str>) -> Decision {
    if caller.role == Role::SuperAdmin {
        return match target_country {
            Some(_) => Decision::Allow,
            None => Decision::Filter(Scope::All),
        };
    }

    // Country admins and members without a country violate the user invariant.
    let Some(own_country) = caller.country.as_deref() else {
        return Decision::Deny("account has no country assigned");
    };

    if !role_permits(caller.role, action) {
        return Decision::Deny(denial_reason(caller.role, action));
    }

    match target_country {
        None => Decision::Filter(listing_scope(caller, action, own_country)),
        Some(target) if target == own_country => Decision::Allow,
        Some(_) => Decision::Deny("resource belongs to another country"),
    }
}

/// Shorthand for listing endpoints: the scope, or `None` if the caller may not list at all.
pub fn list_scope(caller: &AuthUser, action: Action) -> Option<Scope> {
    match authorize(caller, action, None) {
        Decision::Filter(scope) => Some(scope),
        Decision::Allow => Some(Scope::All),
        Decision::Deny(_) => None,
    }
}

// Per-role rule table for non-super roles (super admins short-circuit above).
fn role_permits(role: Role, action: Action) -> bool {
    match (role, action) {
        (Role::SuperAdmin, _) => true,

        (Role::CountryAdmin, Action::CreateUser(target))
        | (Role::CountryAdmin, Action::UpdateUser(target)) => target == Role::CountryMember,
        (Role::CountryAdmin, Action::HardDeleteProject) => false,
        (Role::CountryAdmin, _) => true,

        (Role::CountryMember, Action::CreateProject)
        | (Role::CountryMember, Action::ReadProject)
        | (Role::CountryMember, Action::UpdateProject)
        | (Role::CountryMember, Action::ReadAuditLog) => true,
        // Listing users reduces to the member's own profile, see `listing_scope`.
        (Role::CountryMember, Action::ReadUser) => true,
        (Role::CountryMember, _) => false,
    }
}

fn listing_scope(caller: &AuthUser, action: Action, own_country: &str) -> Scope {
    match (caller.role, action) {
        (Role::CountryMember, Action::ReadUser) => Scope::Subject(caller.id),
        _ => Scope::Country(own_country.to_string()),
    }
}

fn denial_reason(role: Role, action: Action) -> &'static str {
    match (role, action) {
        (_, Action::HardDeleteProject) => "only super admins may permanently delete projects",
        (Role::CountryAdmin, Action::CreateUser(_)) => {
            "country admins may only create country members"
        }
        (Role::CountryAdmin, Action::UpdateUser(_)) => {
            "country admins may only change country members"
        }
        (Role::CountryMember, Action::CreateUser(_))
        | (Role::CountryMember, Action::UpdateUser(_)) => "country members cannot manage users",
        (Role::CountryMember, Action::SoftDeleteProject) => "country members cannot delete projects",
        (Role::CountryMember, Action::ViewDeletedProjects) => {
            "country members cannot view deleted projects"
        }
        _ => "action not permitted for this role",
    }
}
