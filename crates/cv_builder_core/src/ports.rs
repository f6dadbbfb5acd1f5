//! crates/cv_builder_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! auto-save engine to be independent of the concrete auth provider, database
//! and upload storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

use crate::domain::{
    AdminStats, AuthEvent, CvRecord, NewRecord, PendingImage, RecordScope, RecordSummary,
    RecordUpdate, User, UserAccount, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Stream of auth state notifications. Dropping it unsubscribes.
pub type AuthEventStream = Pin<Box<dyn Stream<Item = AuthEvent> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Live lookup of the signed-in user. `Ok(None)` when nobody is signed in.
    async fn current_user(&self) -> PortResult<Option<User>>;

    /// Subscribes to sign-in / sign-out notifications.
    fn auth_state_changes(&self) -> AuthEventStream;
}

#[async_trait]
pub trait CvStore: Send + Sync {
    /// Inserts a new record. Calling this twice creates two records.
    async fn create_record(&self, record: NewRecord) -> PortResult<CvRecord>;

    /// Updates a record, failing with `NotFound` when `id` is outside `scope`.
    async fn update_record(
        &self,
        id: Uuid,
        update: RecordUpdate,
        scope: RecordScope,
    ) -> PortResult<CvRecord>;

    async fn get_record(&self, id: Uuid, scope: RecordScope) -> PortResult<CvRecord>;

    /// A user's records, newest first.
    async fn list_records(&self, user_id: Uuid) -> PortResult<Vec<RecordSummary>>;

    /// Case-insensitive match on name, title or company within a user's records.
    async fn search_records(&self, user_id: Uuid, term: &str) -> PortResult<Vec<RecordSummary>>;

    /// Every record in the system, for the admin listing.
    async fn list_all_records(&self) -> PortResult<Vec<RecordSummary>>;

    async fn delete_record(&self, id: Uuid, scope: RecordScope) -> PortResult<()>;
}

#[async_trait]
pub trait AttachmentReader: Send + Sync {
    /// Reads the raw bytes behind a staged upload.
    async fn read_pending(&self, image: &PendingImage) -> PortResult<Vec<u8>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Returns the owning user id of an unexpired auth session.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Administration ---

    /// Every account, newest first.
    async fn list_users(&self) -> PortResult<Vec<UserAccount>>;

    /// Removes an account together with its CVs and login sessions.
    async fn delete_user(&self, user_id: Uuid) -> PortResult<()>;

    async fn set_admin(&self, user_id: Uuid, is_admin: bool) -> PortResult<User>;

    /// Account and CV counts; `recent_cvs` counts CVs created after `since`.
    async fn admin_stats(&self, since: DateTime<Utc>) -> PortResult<AdminStats>;
}
