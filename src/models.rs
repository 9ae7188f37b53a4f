use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;
use validator::Validate;

// --- Enumerations ---

/// Role
///
/// The fixed three-tier hierarchy. Stored as its snake_case name in the `users.role` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    SuperAdmin,
    CountryAdmin,
    #[default]
    CountryMember,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::CountryAdmin => "country_admin",
            Role::CountryMember => "country_member",
        }
    }

    /// Super admins and country admins.
    pub fn is_admin_tier(&self) -> bool {
        matches!(self, Role::SuperAdmin | Role::CountryAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Role::SuperAdmin),
            "country_admin" => Ok(Role::CountryAdmin),
            "country_member" => Ok(Role::CountryMember),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// ProjectStatus
///
/// Lifecycle label of a project. New variants can be appended without a schema change
/// because the column is plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ProjectStatus {
    #[default]
    Draft,
    Active,
    Completed,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Active => "active",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Archived => "archived",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ProjectStatus::Draft),
            "active" => Ok(ProjectStatus::Active),
            "completed" => Ok(ProjectStatus::Completed),
            "archived" => Ok(ProjectStatus::Archived),
            other => Err(format!("unknown project status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(AuditAction::Create),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            other => Err(format!("unknown audit action '{other}'")),
        }
    }
}

/// TargetType
///
/// Which kind of entity an audit entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum TargetType {
    Project,
    User,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Project => "Project",
            TargetType::User => "User",
        }
    }
}

impl FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Project" => Ok(TargetType::Project),
            "User" => Ok(TargetType::User),
            other => Err(format!("unknown target type '{other}'")),
        }
    }
}

// --- Core Records (Mapped to Database) ---

/// User
///
/// The credential store record. The password hash never leaves the service layer;
/// responses are built from `UserSummary`.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    // Required for country admins and members, ignored for super admins.
    pub country: Option<String>,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

/// UserSummary
///
/// Public view of a user (register, create, list and profile responses).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub country: Option<String>,
    pub is_active: bool,
    #[ts(type = "string")]
    pub date_joined: DateTime<Utc>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            country: user.country.clone(),
            is_active: user.is_active,
            date_joined: user.date_joined,
        }
    }
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        UserSummary::from(&user)
    }
}

/// Project
///
/// A country-owned record. `is_deleted` marks a soft delete; `version` increments on
/// every committed change and backs the optional optimistic check on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: ProjectStatus,
    pub country: String,
    // Weak reference: lookup only, survives the creator's deactivation.
    pub created_by: Option<Uuid>,
    pub is_deleted: bool,
    pub version: i32,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// FieldChange
///
/// One entry of an audit diff. `old` is null for creations, `new` is null for deletions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FieldChange {
    pub old: serde_json::Value,
    pub new: serde_json::Value,
}

/// AuditLogEntry
///
/// Immutable record of one mutation. `country` is the target's country at the time of
/// the mutation and drives read scoping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub actor_username: Option<String>,
    pub action: AuditAction,
    pub target_type: TargetType,
    pub target_id: Uuid,
    pub country: Option<String>,
    pub changes: BTreeMap<String, FieldChange>,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Public self-registration (POST /api/auth/register/). Always yields a country member.
#[derive(Debug, Clone, Serialize, Deserialize, TS, Validate, Default)]
#[ts(export)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 150, message = "Username must be 1-150 characters"))]
    pub username: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    pub password_confirm: String,
    #[validate(length(min = 1, max = 100, message = "Country must be 1-100 characters"))]
    pub country: String,
}

/// CreateUserRequest
///
/// Admin-driven account creation (POST /api/users/).
#[derive(Debug, Clone, Serialize, Deserialize, TS, Validate)]
#[ts(export)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 150, message = "Username must be 1-150 characters"))]
    pub username: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    pub password_confirm: String,
    pub role: Role,
    #[validate(length(min = 1, max = 100, message = "Country must be 1-100 characters"))]
    #[serde(default)]
    pub country: Option<String>,
}

/// UpdateUserRequest
///
/// Partial user update (PATCH /api/users/{id}/). Only present fields are applied.
#[derive(Debug, Clone, Serialize, Deserialize, TS, Validate, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "Enter a valid email address"))]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 100, message = "Country must be 1-100 characters"))]
    pub country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// TokenPairResponse
///
/// Login response: a short-lived access token and a longer-lived refresh token.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TokenPairResponse {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AccessTokenResponse {
    pub access: String,
}

/// CreateProjectRequest
///
/// Input payload for POST /api/projects/. `country` is honoured only for super admins;
/// everyone else gets their own country.
#[derive(Debug, Clone, Serialize, Deserialize, TS, Validate, Default)]
#[ts(export)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub country: Option<String>,
}

/// UpdateProjectRequest
///
/// Partial update payload (PATCH /api/projects/{id}/).
///
/// All fields are `Option<T>` with `skip_serializing_if`, so only provided fields travel
/// and only provided fields are applied. `expected_version`, when present, turns the
/// update into a compare-and-set.
#[derive(Debug, Clone, Serialize, Deserialize, TS, Validate, Default)]
#[ts(export)]
pub struct UpdateProjectRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<i32>,
}

// --- Query Parameters ---

/// ProjectFilter
///
/// Query parameters of GET /api/projects/. `country` is only honoured for super admins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub country: Option<String>,
    pub created_by: Option<Uuid>,
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeDeleted {
    #[serde(default)]
    pub include_deleted: bool,
}

/// DeleteMode
///
/// Query parameter of DELETE /api/projects/{id}/. When absent, super admins hard delete
/// and everyone else soft deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    Soft,
    Hard,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteParams {
    pub mode: Option<DeleteMode>,
}

/// AuditLogFilter
///
/// Query parameters of GET /api/audit-logs/.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLogFilter {
    pub action: Option<AuditAction>,
    pub target_type: Option<TargetType>,
    pub target_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecentParams {
    pub limit: Option<usize>,
}
