//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-request auth context.

use crate::adapters::{AuthEventHub, CookieSessionAuth, FsAttachmentStore};
use crate::config::Config;
use crate::error::ApiError;
use cv_builder_core::autosave::EditorServices;
use cv_builder_core::domain::User;
use cv_builder_core::ports::{AccountStore, CvStore};
use std::sync::Arc;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cvs: Arc<dyn CvStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub auth_events: AuthEventHub,
    pub config: Arc<Config>,
}

impl AppState {
    /// Upload area of one user.
    pub fn uploads_for(&self, user_id: Uuid) -> FsAttachmentStore {
        FsAttachmentStore::for_user(&self.config.upload_dir, user_id)
    }

    /// The collaborators of an editor opened with `auth`.
    pub fn editor_services(&self, auth: &AuthContext) -> EditorServices {
        EditorServices {
            auth: Arc::new(CookieSessionAuth::new(
                self.accounts.clone(),
                self.auth_events.clone(),
                auth.user_id,
                auth.auth_session_id.clone(),
            )),
            store: self.cvs.clone(),
            attachments: Arc::new(self.uploads_for(auth.user_id)),
        }
    }
}

//=========================================================================================
// AuthContext (Specific to One Request)
//=========================================================================================

/// Who made the request, as established by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub auth_session_id: String,
}

impl AuthContext {
    /// Loads the full user record, including the admin flag.
    pub async fn user(&self, state: &AppState) -> Result<User, ApiError> {
        Ok(state.accounts.get_user(self.user_id).await?)
    }
}
