//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of
//! the `CvStore` and `AccountStore` ports from the `core` crate. It handles all
//! interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cv_builder_core::domain::{
    AdminStats, CvPayload, CvRecord, NewRecord, RecordScope, RecordSummary, RecordUpdate, User,
    UserAccount, UserCredentials,
};
use cv_builder_core::ports::{AccountStore, CvStore, PortError, PortResult};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

const CV_COLUMNS: &str =
    "id, user_id, name, title, company, template_id, cv_data, created_at, updated_at";
const SUMMARY_COLUMNS: &str = "id, user_id, name, title, company, created_at, updated_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: Option<String>,
    is_admin: bool,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            email: self.email,
            is_admin: self.is_admin,
        }
    }
}

#[derive(FromRow)]
struct AccountRecord {
    user_id: Uuid,
    email: Option<String>,
    is_admin: bool,
    created_at: DateTime<Utc>,
}
impl AccountRecord {
    fn to_domain(self) -> UserAccount {
        UserAccount {
            user_id: self.user_id,
            email: self.email,
            is_admin: self.is_admin,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct StatsRecord {
    total_users: i64,
    total_cvs: i64,
    recent_cvs: i64,
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct CvRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    title: String,
    company: String,
    template_id: String,
    cv_data: Json<CvPayload>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl CvRow {
    fn to_domain(self) -> CvRecord {
        CvRecord {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            title: self.title,
            company: self.company,
            template_id: self.template_id,
            cv_data: self.cv_data.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct SummaryRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    title: String,
    company: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl SummaryRow {
    fn to_domain(self) -> RecordSummary {
        RecordSummary {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            title: self.title,
            company: self.company,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Maps a unique-constraint violation on insert to `Conflict`.
fn insert_error(e: sqlx::Error, what: impl FnOnce() -> String) -> PortError {
    if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
        PortError::Conflict(what())
    } else {
        unexpected(e)
    }
}

/// The owner a scoped query is restricted to; `None` lifts the restriction.
fn owner_filter(scope: RecordScope) -> Option<Uuid> {
    match scope {
        RecordScope::Owner(user_id) => Some(user_id),
        RecordScope::Admin => None,
    }
}

/// Wraps a search term for ILIKE, treating `%`, `_` and `\` literally.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

//=========================================================================================
// `CvStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CvStore for DbAdapter {
    async fn create_record(&self, record: NewRecord) -> PortResult<CvRecord> {
        let sql = format!(
            "INSERT INTO cvs (id, user_id, name, title, company, template_id, cv_data) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            CV_COLUMNS
        );
        let row = sqlx::query_as::<_, CvRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(record.user_id)
            .bind(&record.name)
            .bind(&record.title)
            .bind(&record.company)
            .bind(&record.template_id)
            .bind(Json(&record.cv_data))
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(row.to_domain())
    }

    async fn update_record(
        &self,
        id: Uuid,
        update: RecordUpdate,
        scope: RecordScope,
    ) -> PortResult<CvRecord> {
        let sql = format!(
            "UPDATE cvs SET name = $1, title = $2, company = $3, cv_data = $4, updated_at = NOW() \
             WHERE id = $5 AND ($6::uuid IS NULL OR user_id = $6) RETURNING {}",
            CV_COLUMNS
        );
        let row = sqlx::query_as::<_, CvRow>(&sql)
            .bind(&update.name)
            .bind(&update.title)
            .bind(&update.company)
            .bind(Json(&update.cv_data))
            .bind(id)
            .bind(owner_filter(scope))
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("CV {} not found", id)))?;
        Ok(row.to_domain())
    }

    async fn get_record(&self, id: Uuid, scope: RecordScope) -> PortResult<CvRecord> {
        let sql = format!(
            "SELECT {} FROM cvs WHERE id = $1 AND ($2::uuid IS NULL OR user_id = $2)",
            CV_COLUMNS
        );
        let row = sqlx::query_as::<_, CvRow>(&sql)
            .bind(id)
            .bind(owner_filter(scope))
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("CV {} not found", id)))?;
        Ok(row.to_domain())
    }

    async fn list_records(&self, user_id: Uuid) -> PortResult<Vec<RecordSummary>> {
        let sql = format!(
            "SELECT {} FROM cvs WHERE user_id = $1 ORDER BY updated_at DESC",
            SUMMARY_COLUMNS
        );
        let rows = sqlx::query_as::<_, SummaryRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn search_records(&self, user_id: Uuid, term: &str) -> PortResult<Vec<RecordSummary>> {
        let sql = format!(
            "SELECT {} FROM cvs WHERE user_id = $1 \
             AND (name ILIKE $2 OR title ILIKE $2 OR company ILIKE $2) \
             ORDER BY updated_at DESC",
            SUMMARY_COLUMNS
        );
        let rows = sqlx::query_as::<_, SummaryRow>(&sql)
            .bind(user_id)
            .bind(like_pattern(term))
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        debug!(user_id = %user_id, matches = rows.len(), "CV search complete");
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_all_records(&self) -> PortResult<Vec<RecordSummary>> {
        let sql = format!("SELECT {} FROM cvs ORDER BY updated_at DESC", SUMMARY_COLUMNS);
        let rows = sqlx::query_as::<_, SummaryRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_record(&self, id: Uuid, scope: RecordScope) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM cvs WHERE id = $1 AND ($2::uuid IS NULL OR user_id = $2)")
            .bind(id)
            .bind(owner_filter(scope))
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("CV {} not found", id)));
        }
        Ok(())
    }
}

//=========================================================================================
// `AccountStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccountStore for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3) \
             RETURNING user_id, email, is_admin",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| insert_error(e, || format!("An account for {} already exists", email)))?;
        Ok(record.to_domain())
    }
    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password FROM users \
             WHERE email = $1 AND hashed_password IS NOT NULL",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => PortError::Unexpected(e.to_string()),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email, is_admin FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => PortError::Unexpected(e.to_string()),
        })?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        user_id.ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn list_users(&self) -> PortResult<Vec<UserAccount>> {
        let rows = sqlx::query_as::<_, AccountRecord>(
            "SELECT user_id, email, is_admin, created_at FROM users ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        // CVs and auth sessions go with the user via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn set_admin(&self, user_id: Uuid, is_admin: bool) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "UPDATE users SET is_admin = $1 WHERE user_id = $2 RETURNING user_id, email, is_admin",
        )
        .bind(is_admin)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn admin_stats(&self, since: DateTime<Utc>) -> PortResult<AdminStats> {
        let row = sqlx::query_as::<_, StatsRecord>(
            "SELECT (SELECT COUNT(*) FROM users) AS total_users, \
                    (SELECT COUNT(*) FROM cvs) AS total_cvs, \
                    (SELECT COUNT(*) FROM cvs WHERE created_at > $1) AS recent_cvs",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(AdminStats {
            total_users: row.total_users,
            total_cvs: row.total_cvs,
            recent_cvs: row.recent_cvs,
        })
    }
}
