//! services/api/src/adapters/auth.rs
//!
//! Cookie-session implementation of the `AuthService` port. Login and logout
//! handlers publish to an `AuthEventHub`; every open editor connection follows
//! the hub through its own `CookieSessionAuth`.

use async_trait::async_trait;
use cv_builder_core::domain::{AuthEvent, User};
use cv_builder_core::ports::{AccountStore, AuthEventStream, AuthService, PortError, PortResult};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

const HUB_CAPACITY: usize = 64;

/// A sign-in or sign-out of one browser login session.
#[derive(Debug, Clone)]
pub struct AuthNotice {
    pub user_id: Uuid,
    pub auth_session_id: String,
    pub event: AuthEvent,
}

/// Process-wide fan-out of auth notices.
#[derive(Clone)]
pub struct AuthEventHub {
    tx: broadcast::Sender<AuthNotice>,
}

impl AuthEventHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    pub fn signed_in(&self, user: User, auth_session_id: &str) {
        self.publish(AuthNotice {
            user_id: user.user_id,
            auth_session_id: auth_session_id.to_string(),
            event: AuthEvent::SignedIn(user),
        });
    }

    pub fn signed_out(&self, user_id: Uuid, auth_session_id: &str) {
        self.publish(AuthNotice {
            user_id,
            auth_session_id: auth_session_id.to_string(),
            event: AuthEvent::SignedOut,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthNotice> {
        self.tx.subscribe()
    }

    fn publish(&self, notice: AuthNotice) {
        // No receivers simply means no editor is open.
        let _ = self.tx.send(notice);
    }
}

impl Default for AuthEventHub {
    fn default() -> Self {
        Self::new()
    }
}

/// The auth view of one editor connection: one user, one login session.
pub struct CookieSessionAuth {
    accounts: Arc<dyn AccountStore>,
    hub: AuthEventHub,
    user_id: Uuid,
    auth_session_id: Arc<Mutex<String>>,
}

impl CookieSessionAuth {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        hub: AuthEventHub,
        user_id: Uuid,
        auth_session_id: impl Into<String>,
    ) -> Self {
        Self {
            accounts,
            hub,
            user_id,
            auth_session_id: Arc::new(Mutex::new(auth_session_id.into())),
        }
    }

    fn session_id(&self) -> PortResult<String> {
        self.auth_session_id
            .lock()
            .map(|id| id.clone())
            .map_err(|_| PortError::Unexpected("auth session lock poisoned".to_string()))
    }
}

#[async_trait]
impl AuthService for CookieSessionAuth {
    async fn current_user(&self) -> PortResult<Option<User>> {
        let session_id = self.session_id()?;
        match self.accounts.validate_auth_session(&session_id).await {
            Ok(user_id) if user_id == self.user_id => {}
            Ok(_) | Err(PortError::Unauthorized) | Err(PortError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        }
        match self.accounts.get_user(self.user_id).await {
            Ok(user) => Ok(Some(user)),
            Err(PortError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Notices for this user only. A sign-out counts when it ends the session
    /// this connection is using; a sign-in switches the connection over to the
    /// new login session.
    fn auth_state_changes(&self) -> AuthEventStream {
        let mut rx = self.hub.subscribe();
        let user_id = self.user_id;
        let current = self.auth_session_id.clone();
        Box::pin(async_stream::stream! {
            loop {
                let notice = match rx.recv().await {
                    Ok(notice) => notice,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth notices dropped for a slow editor");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if notice.user_id != user_id {
                    continue;
                }
                let applies = match current.lock() {
                    Ok(mut session_id) => match &notice.event {
                        AuthEvent::SignedIn(_) => {
                            debug!(user_id = %user_id, "Editor adopting new login session");
                            *session_id = notice.auth_session_id.clone();
                            true
                        }
                        AuthEvent::SignedOut => *session_id == notice.auth_session_id,
                    },
                    Err(_) => break,
                };
                if applies {
                    yield notice.event;
                }
            }
        })
    }
}
