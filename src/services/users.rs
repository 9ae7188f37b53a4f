use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use super::{permit, reveal};
use crate::{
    audit::{self, Actor},
    auth::AuthUser,
    config::BootstrapAdmin,
    error::{AppError, AppResult, FieldErrors},
    models::{CreateUserRequest, RegisterRequest, Role, UpdateUserRequest, User, UserSummary},
    password::{PasswordPolicy, hash_password, verify_password},
    permissions::{Action, Decision, Scope, authorize, list_scope},
    repository::RepositoryState,
};

const INVALID_CREDENTIALS: &str = "No active account found with the given credentials";

/// Fields shared by every account-creating payload.
struct NewAccount<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
    password_confirm: &'a str,
}

impl NewAccount<'_> {
    fn check(&self, policy: &PasswordPolicy) -> FieldErrors {
        let mut errors = FieldErrors::new();

        let valid_chars = self
            .username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
        if !valid_chars {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }

        if self.password != self.password_confirm {
            errors.add("password_confirm", "Passwords do not match.");
        }

        errors.merge(policy.check(self.password, self.username, self.email));
        errors
    }
}

/// UserService
///
/// Registration, admin-driven account management and credential checks.
#[derive(Clone)]
pub struct UserService {
    repo: RepositoryState,
    policy: PasswordPolicy,
}

impl UserService {
    pub fn new(repo: RepositoryState, policy: PasswordPolicy) -> Self {
        Self { repo, policy }
    }

    /// register
    ///
    /// Public self-registration. The new account is always a country member.
    pub async fn register(&self, payload: RegisterRequest) -> AppResult<UserSummary> {
        let mut errors = payload
            .validate()
            .err()
            .map(FieldErrors::from)
            .unwrap_or_default();
        errors.merge(
            NewAccount {
                username: &payload.username,
                email: &payload.email,
                password: &payload.password,
                password_confirm: &payload.password_confirm,
            }
            .check(&self.policy),
        );
        errors.into_result()?;

        let user = build_user(
            &payload.username,
            &payload.email,
            &payload.password,
            Role::CountryMember,
            Some(payload.country),
        )?;

        // A self-registration is performed by the account itself.
        let actor = Actor::from(&user);
        self.insert_account(&actor, &user).await?;

        tracing::info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(UserSummary::from(user))
    }

    /// create_user
    ///
    /// Super admins may create any role; country admins only members of their own country.
    /// A country admin who omits the country gets their own.
    pub async fn create_user(
        &self,
        caller: &AuthUser,
        payload: CreateUserRequest,
    ) -> AppResult<UserSummary> {
        let target_country = payload.country.clone().or_else(|| {
            (caller.role != Role::SuperAdmin)
                .then(|| caller.country.clone())
                .flatten()
        });
        permit(authorize(
            caller,
            Action::CreateUser(payload.role),
            target_country.as_deref(),
        ))?;

        let mut errors = payload
            .validate()
            .err()
            .map(FieldErrors::from)
            .unwrap_or_default();
        if payload.role != Role::SuperAdmin && target_country.is_none() {
            errors.add(
                "country",
                "This field is required for country admins and members.",
            );
        }
        errors.merge(
            NewAccount {
                username: &payload.username,
                email: &payload.email,
                password: &payload.password,
                password_confirm: &payload.password_confirm,
            }
            .check(&self.policy),
        );
        errors.into_result()?;

        let user = build_user(
            &payload.username,
            &payload.email,
            &payload.password,
            payload.role,
            target_country,
        )?;
        self.insert_account(&Actor::from(caller), &user).await?;

        tracing::info!(
            user_id = %user.id,
            role = %user.role,
            created_by = %caller.id,
            "user created"
        );
        Ok(UserSummary::from(user))
    }

    /// Newest accounts first, reduced to the caller's scope.
    pub async fn list_users(&self, caller: &AuthUser) -> AppResult<Vec<UserSummary>> {
        let scope = list_scope(caller, Action::ReadUser)
            .ok_or_else(|| AppError::permission("you may not list users"))?;
        let users = self.repo.list_users(&scope).await?;
        Ok(users
            .iter()
            .filter(|user| visible_to(caller, &scope, user))
            .map(UserSummary::from)
            .collect())
    }

    pub async fn get_user(&self, caller: &AuthUser, id: Uuid) -> AppResult<UserSummary> {
        let user = self.repo.find_user(id).await?.ok_or(AppError::NotFound)?;
        ensure_visible(caller, &user)?;
        Ok(UserSummary::from(user))
    }

    pub async fn me(&self, caller: &AuthUser) -> AppResult<UserSummary> {
        let user = self
            .repo
            .find_user(caller.id)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(UserSummary::from(user))
    }

    /// update_user
    ///
    /// Partial update of email, country and active flag. Deactivation is the only way an
    /// account is removed. A change that alters nothing writes nothing.
    pub async fn update_user(
        &self,
        caller: &AuthUser,
        id: Uuid,
        payload: UpdateUserRequest,
    ) -> AppResult<UserSummary> {
        payload
            .validate()
            .map_err(|e| AppError::Validation(FieldErrors::from(e)))?;

        let mut uow = self.repo.begin().await?;
        let before = uow.lock_user(id).await?.ok_or(AppError::NotFound)?;
        ensure_visible(caller, &before)?;

        let action = Action::UpdateUser(before.role);
        let decision = match before.country.as_deref() {
            Some(country) => authorize(caller, action, Some(country)),
            None if caller.role == Role::SuperAdmin => Decision::Allow,
            None => Decision::Deny("resource belongs to another country"),
        };
        permit(decision)?;

        let mut after = before.clone();
        if let Some(email) = payload.email {
            if uow.email_taken(&email, Some(id)).await? {
                return Err(AppError::validation(
                    "email",
                    "A user with that email already exists.",
                ));
            }
            after.email = email;
        }
        // A super admin's country is never stored.
        if let Some(country) = payload.country.filter(|_| before.role != Role::SuperAdmin) {
            if country != before.country.as_deref().unwrap_or_default() {
                permit(authorize(caller, action, Some(country.as_str())))?;
            }
            after.country = Some(country);
        }
        if let Some(is_active) = payload.is_active {
            if !is_active && after.id == caller.id {
                return Err(AppError::validation(
                    "is_active",
                    "You cannot deactivate your own account.",
                ));
            }
            after.is_active = is_active;
        }

        let Some(entry) = audit::updated(&Actor::from(caller), &before, &after) else {
            return Ok(UserSummary::from(before));
        };

        uow.update_user(&after).await?;
        uow.insert_audit_entry(&entry).await?;
        uow.commit().await?;

        tracing::info!(
            user_id = %after.id,
            actor = %caller.id,
            fields = ?entry.changes.keys().collect::<Vec<_>>(),
            "user updated"
        );
        Ok(UserSummary::from(after))
    }

    /// authenticate
    ///
    /// Unknown user, wrong password and deactivated account all fail with the same message.
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<User> {
        let Some(user) = self.repo.find_user_by_username(username).await? else {
            tracing::warn!(username, "login for unknown user");
            return Err(AppError::authentication(INVALID_CREDENTIALS));
        };

        if !verify_password(password, &user.password_hash)? || !user.is_active {
            tracing::warn!(user_id = %user.id, "rejected login");
            return Err(AppError::authentication(INVALID_CREDENTIALS));
        }

        Ok(user)
    }

    /// Looks up the account behind a refresh token; it must still exist and be active.
    pub async fn active_user(&self, id: Uuid) -> AppResult<User> {
        match self.repo.find_user(id).await? {
            Some(user) if user.is_active => Ok(user),
            _ => Err(AppError::authentication(INVALID_CREDENTIALS)),
        }
    }

    /// ensure_super_admin
    ///
    /// Creates the configured super admin unless one already exists. Returns whether an
    /// account was created.
    pub async fn ensure_super_admin(&self, bootstrap: &BootstrapAdmin) -> AppResult<bool> {
        if self.repo.super_admin_exists().await? {
            return Ok(false);
        }

        NewAccount {
            username: &bootstrap.username,
            email: &bootstrap.email,
            password: &bootstrap.password,
            password_confirm: &bootstrap.password,
        }
        .check(&self.policy)
        .into_result()?;

        let user = build_user(
            &bootstrap.username,
            &bootstrap.email,
            &bootstrap.password,
            Role::SuperAdmin,
            None,
        )?;
        self.insert_account(&Actor::system(), &user).await?;

        tracing::info!(user_id = %user.id, username = %user.username, "super admin provisioned");
        Ok(true)
    }

    async fn insert_account(&self, actor: &Actor, user: &User) -> AppResult<()> {
        let mut uow = self.repo.begin().await?;

        let mut errors = FieldErrors::new();
        if uow.username_taken(&user.username).await? {
            errors.add("username", "A user with that username already exists.");
        }
        if uow.email_taken(&user.email, None).await? {
            errors.add("email", "A user with that email already exists.");
        }
        errors.into_result()?;

        uow.insert_user(user).await?;
        uow.insert_audit_entry(&audit::created(actor, user)).await?;
        uow.commit().await
    }
}

fn build_user(
    username: &str,
    email: &str,
    password: &str,
    role: Role,
    country: Option<String>,
) -> AppResult<User> {
    Ok(User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: email.to_string(),
        password_hash: hash_password(password)?,
        role,
        country: country.filter(|_| role != Role::SuperAdmin),
        is_active: true,
        date_joined: Utc::now(),
    })
}

// Super admin accounts sit outside every country and only other super admins see them.
fn visible_to(caller: &AuthUser, scope: &Scope, user: &User) -> bool {
    scope.admits(user.country.as_deref(), user.id)
        && (caller.role == Role::SuperAdmin || user.role != Role::SuperAdmin)
}

fn ensure_visible(caller: &AuthUser, user: &User) -> AppResult<()> {
    let visible = list_scope(caller, Action::ReadUser)
        .is_some_and(|scope| visible_to(caller, &scope, user));
    reveal(if visible {
        Decision::Allow
    } else {
        Decision::Deny("user is outside the caller's scope")
    })
}
