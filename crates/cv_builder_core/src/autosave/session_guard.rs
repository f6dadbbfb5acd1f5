//! crates/cv_builder_core/src/autosave/session_guard.rs
//!
//! Gates every save attempt behind a live authentication check and mirrors the
//! result in a cached flag that the scheduler watches to pause and resume.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{AuthEvent, User};
use crate::ports::AuthService;

#[derive(Clone)]
pub struct SessionGuard {
    auth: Arc<dyn AuthService>,
    live: Arc<watch::Sender<bool>>,
}

impl SessionGuard {
    /// Creates a guard that considers the session absent until checked.
    pub fn new(auth: Arc<dyn AuthService>) -> Self {
        let (live, _rx) = watch::channel(false);
        Self {
            auth,
            live: Arc::new(live),
        }
    }

    /// The cached flag. May be stale; use `ensure_live` before writing.
    pub fn is_live(&self) -> bool {
        *self.live.borrow()
    }

    pub fn live_changes(&self) -> watch::Receiver<bool> {
        self.live.subscribe()
    }

    /// Asks the auth collaborator who is signed in right now.
    ///
    /// A missing user or a failed lookup both count as "not live" and flip the
    /// cached flag, which pauses the scheduler.
    pub async fn ensure_live(&self) -> Option<User> {
        match self.auth.current_user().await {
            Ok(Some(user)) => {
                self.set_live(true);
                Some(user)
            }
            Ok(None) => {
                info!("No authenticated user found");
                self.set_live(false);
                None
            }
            Err(e) => {
                warn!("Authentication check failed: {}", e);
                self.set_live(false);
                None
            }
        }
    }

    /// Re-reads the session, e.g. when an editor mounts.
    pub async fn refresh(&self) -> bool {
        self.ensure_live().await.is_some()
    }

    /// Follows auth notifications until `shutdown` fires or the stream ends.
    pub fn watch_auth_events(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let mut events = self.auth.auth_state_changes();
        let guard = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.next() => match event {
                        Some(AuthEvent::SignedIn(user)) => {
                            debug!(user_id = %user.user_id, "Auth state changed: signed in");
                            guard.set_live(true);
                        }
                        Some(AuthEvent::SignedOut) => {
                            debug!("Auth state changed: signed out");
                            guard.set_live(false);
                        }
                        None => break,
                    },
                }
            }
        })
    }

    fn set_live(&self, live: bool) {
        self.live.send_if_modified(|current| {
            let changed = *current != live;
            *current = live;
            changed
        });
    }
}
