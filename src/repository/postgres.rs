use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction, types::Json};
use uuid::Uuid;

use super::{AuditQuery, ProjectQuery, Repository, UnitOfWork};
use crate::{
    error::{AppError, FieldErrors},
    models::{AuditLogEntry, FieldChange, Project, User},
    permissions::Scope,
};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, country, is_active, date_joined";
const PROJECT_COLUMNS: &str = "id, title, description, status, country, created_by, is_deleted, \
     version, created_at, updated_at";
const AUDIT_COLUMNS: &str = "id, actor_id, actor_username, action, target_type, target_id, \
     country, changes, recorded_at";

// --- Row Mapping ---
// Enum columns are plain text; rows are read as strings and parsed into the domain types.

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    country: Option<String>,
    is_active: bool,
    date_joined: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role.parse().map_err(AppError::Internal)?,
            country: row.country,
            is_active: row.is_active,
            date_joined: row.date_joined,
        })
    }
}

#[derive(FromRow)]
struct ProjectRow {
    id: Uuid,
    title: String,
    description: String,
    status: String,
    country: String,
    created_by: Option<Uuid>,
    is_deleted: bool,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProjectRow> for Project {
    type Error = AppError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        Ok(Project {
            id: row.id,
            title: row.title,
            description: row.description,
            status: row.status.parse().map_err(AppError::Internal)?,
            country: row.country,
            created_by: row.created_by,
            is_deleted: row.is_deleted,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AuditRow {
    id: Uuid,
    actor_id: Option<Uuid>,
    actor_username: Option<String>,
    action: String,
    target_type: String,
    target_id: Uuid,
    country: Option<String>,
    changes: Json<BTreeMap<String, FieldChange>>,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = AppError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditLogEntry {
            id: row.id,
            actor_id: row.actor_id,
            actor_username: row.actor_username,
            action: row.action.parse().map_err(AppError::Internal)?,
            target_type: row.target_type.parse().map_err(AppError::Internal)?,
            target_id: row.target_id,
            country: row.country,
            changes: row.changes.0,
            timestamp: row.recorded_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, AppError>
where
    T: TryFrom<R, Error = AppError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Appends the scope as a WHERE fragment. The base query must already contain a WHERE.
fn push_scope(builder: &mut QueryBuilder<'_, Postgres>, scope: &Scope) {
    match scope {
        Scope::All => {}
        Scope::Country(country) => {
            builder.push(" AND country = ");
            builder.push_bind(country.clone());
        }
        Scope::Subject(id) => {
            builder.push(" AND id = ");
            builder.push_bind(*id);
        }
    }
}

/// Translates unique-constraint violations on `users` into field errors.
fn map_user_write_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some(c) if c.contains("email") => "email",
                _ => "username",
            };
            return AppError::Validation(FieldErrors::single(
                field,
                format!("A user with that {field} already exists."),
            ));
        }
    }
    AppError::Database(err)
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// All queries are runtime-checked and parameterized through `QueryBuilder` or `bind`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations in `migrations/`.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::internal(format!("migration failed: {e}")))
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    /// list_users
    ///
    /// Newest accounts first.
    async fn list_users(&self, scope: &Scope) -> Result<Vec<User>, AppError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE TRUE"));
        push_scope(&mut builder, scope);
        builder.push(" ORDER BY date_joined DESC");

        let rows = builder
            .build_query_as::<UserRow>()
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn super_admin_exists(&self) -> Result<bool, AppError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE role = 'super_admin')")
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>, AppError> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Project::try_from)
            .transpose()
    }

    /// list_projects
    ///
    /// Builds the scoped, filtered listing with `QueryBuilder` so every user-supplied value
    /// is a bound parameter. Soft-deleted rows are excluded unless explicitly requested.
    async fn list_projects(&self, query: &ProjectQuery) -> Result<Vec<Project>, AppError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE TRUE"));
        push_scope(&mut builder, &query.scope);

        if !query.include_deleted {
            builder.push(" AND is_deleted = FALSE");
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(creator) = query.created_by {
            builder.push(" AND created_by = ");
            builder.push_bind(creator);
        }

        builder.push(" ORDER BY created_at DESC");

        let rows = builder
            .build_query_as::<ProjectRow>()
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn list_audit_entries(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, AppError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {AUDIT_COLUMNS} FROM audit_logs WHERE TRUE"));

        match &query.scope {
            Scope::All => {}
            Scope::Country(country) => {
                builder.push(" AND country = ");
                builder.push_bind(country.clone());
            }
            Scope::Subject(id) => {
                builder.push(" AND target_id = ");
                builder.push_bind(*id);
            }
        }
        if let Some(action) = query.action {
            builder.push(" AND action = ");
            builder.push_bind(action.as_str());
        }
        if let Some(target_type) = query.target_type {
            builder.push(" AND target_type = ");
            builder.push_bind(target_type.as_str());
        }
        if let Some(target_id) = query.target_id {
            builder.push(" AND target_id = ");
            builder.push_bind(target_id);
        }

        builder.push(" ORDER BY recorded_at DESC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }

        let rows = builder
            .build_query_as::<AuditRow>()
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }
}

/// PgUnitOfWork
///
/// Wraps a live `sqlx::Transaction`. Dropping it without `commit` makes sqlx roll back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn username_taken(&mut self, username: &str) -> Result<bool, AppError> {
        let taken: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(taken)
    }

    async fn email_taken(&mut self, email: &str, exclude: Option<Uuid>) -> Result<bool, AppError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE lower(email) = lower($1) AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(email)
        .bind(exclude)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(taken)
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, role, country, is_active, date_joined) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.country)
        .bind(user.is_active)
        .bind(user.date_joined)
        .execute(&mut *self.tx)
        .await
        .map_err(map_user_write_error)?;
        Ok(())
    }

    async fn lock_user(&mut self, id: Uuid) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn update_user(&mut self, user: &User) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET email = $2, country = $3, is_active = $4 WHERE id = $1")
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.country)
            .bind(user.is_active)
            .execute(&mut *self.tx)
            .await
            .map_err(map_user_write_error)?;
        Ok(())
    }

    async fn insert_project(&mut self, project: &Project) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO projects (id, title, description, status, country, created_by, is_deleted, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(project.id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(project.status.as_str())
        .bind(&project.country)
        .bind(project.created_by)
        .bind(project.is_deleted)
        .bind(project.version)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_project(&mut self, id: Uuid) -> Result<Option<Project>, AppError> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Project::try_from)
            .transpose()
    }

    async fn update_project(&mut self, project: &Project) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE projects SET title = $2, description = $3, status = $4, is_deleted = $5, \
             version = $6, updated_at = $7 WHERE id = $1",
        )
        .bind(project.id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(project.status.as_str())
        .bind(project.is_deleted)
        .bind(project.version)
        .bind(project.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_project(&mut self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_audit_entry(&mut self, entry: &AuditLogEntry) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO audit_logs (id, actor_id, actor_username, action, target_type, target_id, country, changes, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entry.id)
        .bind(entry.actor_id)
        .bind(&entry.actor_username)
        .bind(entry.action.as_str())
        .bind(entry.target_type.as_str())
        .bind(entry.target_id)
        .bind(&entry.country)
        .bind(Json(&entry.changes))
        .bind(entry.timestamp)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}
