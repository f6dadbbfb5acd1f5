//! crates/cv_builder_core/src/autosave/status.rs
//!
//! The save indicator shown by the editor. Transitions are a pure function of
//! the outcomes reported by the other components; the reporter only adds the
//! timed reverts for the transient `Saved` and `Failed` states.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SaveStatus {
    Idle,
    Dirty,
    Saving,
    Saved,
    Failed { message: String },
    Unauthenticated,
}

/// Something another component observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Changed,
    SaveStarted,
    SaveSucceeded,
    SaveFailed(String),
    AuthLost,
    AuthRestored { dirty: bool },
    DisplayElapsed { dirty: bool },
    Reset,
}

impl SaveStatus {
    pub fn apply(self, event: StatusEvent) -> SaveStatus {
        use SaveStatus::*;
        match (self, event) {
            (Unauthenticated, StatusEvent::Reset) => Unauthenticated,
            (_, StatusEvent::Reset) => Idle,
            (_, StatusEvent::AuthLost) => Unauthenticated,
            (Unauthenticated, StatusEvent::AuthRestored { dirty }) => {
                if dirty {
                    Dirty
                } else {
                    Idle
                }
            }
            (Unauthenticated, _) => Unauthenticated,
            (current, StatusEvent::AuthRestored { .. }) => current,
            (Saving, StatusEvent::Changed) => Saving,
            (_, StatusEvent::Changed) => Dirty,
            (_, StatusEvent::SaveStarted) => Saving,
            (_, StatusEvent::SaveSucceeded) => Saved,
            (_, StatusEvent::SaveFailed(message)) => Failed { message },
            (Saved, StatusEvent::DisplayElapsed { dirty }) => {
                if dirty {
                    Dirty
                } else {
                    Idle
                }
            }
            (Failed { .. }, StatusEvent::DisplayElapsed { .. }) => Dirty,
            (current, StatusEvent::DisplayElapsed { .. }) => current,
        }
    }

    fn is_transient(&self) -> bool {
        matches!(self, SaveStatus::Saved | SaveStatus::Failed { .. })
    }
}

/// What the host view renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub status: SaveStatus,
    pub has_unsaved_changes: bool,
    pub record_id: Option<Uuid>,
}

impl Default for StatusView {
    fn default() -> Self {
        Self {
            status: SaveStatus::Idle,
            has_unsaved_changes: false,
            record_id: None,
        }
    }
}

struct Inner {
    tx: watch::Sender<StatusView>,
    generation: AtomicU64,
    saved_display: Duration,
    failed_display: Duration,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct StatusReporter {
    inner: Arc<Inner>,
}

impl StatusReporter {
    pub fn new(saved_display: Duration, failed_display: Duration) -> Self {
        let (tx, _rx) = watch::channel(StatusView::default());
        Self {
            inner: Arc::new(Inner {
                tx,
                generation: AtomicU64::new(0),
                saved_display,
                failed_display,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusView> {
        self.inner.tx.subscribe()
    }

    pub fn view(&self) -> StatusView {
        self.inner.tx.borrow().clone()
    }

    pub fn status(&self) -> SaveStatus {
        self.inner.tx.borrow().status.clone()
    }

    /// Applies `event` and schedules the revert of transient states.
    pub fn apply(&self, event: StatusEvent) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut next = SaveStatus::Idle;
        self.inner.tx.send_modify(|view| {
            view.status = view.status.clone().apply(event);
            next = view.status.clone();
        });

        if next.is_transient() {
            let window = match next {
                SaveStatus::Saved => self.inner.saved_display,
                _ => self.inner.failed_display,
            };
            self.schedule_revert(generation, window);
        }
    }

    pub fn set_unsaved(&self, has_unsaved_changes: bool) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.tx.send_if_modified(|view| {
            let changed = view.has_unsaved_changes != has_unsaved_changes;
            view.has_unsaved_changes = has_unsaved_changes;
            changed
        });
    }

    pub fn set_record_id(&self, record_id: Option<Uuid>) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.tx.send_if_modified(|view| {
            let changed = view.record_id != record_id;
            view.record_id = record_id;
            changed
        });
    }

    /// Freezes the view; later events are ignored.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    fn schedule_revert(&self, generation: u64, window: Duration) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = inner.shutdown.cancelled() => {}
                _ = tokio::time::sleep(window) => {
                    // Any event since the transient state was entered supersedes the revert.
                    if inner.generation.load(Ordering::SeqCst) == generation {
                        inner.tx.send_modify(|view| {
                            let dirty = view.has_unsaved_changes;
                            view.status = view.status.clone().apply(StatusEvent::DisplayElapsed { dirty });
                        });
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_cycle_transitions() {
        let status = SaveStatus::Idle
            .apply(StatusEvent::Changed)
            .apply(StatusEvent::SaveStarted);
        assert_eq!(status, SaveStatus::Saving);
        let status = status.apply(StatusEvent::SaveSucceeded);
        assert_eq!(status, SaveStatus::Saved);
        assert_eq!(
            status.apply(StatusEvent::DisplayElapsed { dirty: false }),
            SaveStatus::Idle
        );
    }

    #[test]
    fn failure_reverts_to_dirty() {
        let status = SaveStatus::Saving.apply(StatusEvent::SaveFailed("boom".into()));
        assert_eq!(
            status,
            SaveStatus::Failed {
                message: "boom".into()
            }
        );
        assert_eq!(
            status.apply(StatusEvent::DisplayElapsed { dirty: false }),
            SaveStatus::Dirty
        );
    }

    #[test]
    fn reset_does_not_hide_a_lost_session() {
        assert_eq!(
            SaveStatus::Unauthenticated.apply(StatusEvent::Reset),
            SaveStatus::Unauthenticated
        );
        assert_eq!(SaveStatus::Dirty.apply(StatusEvent::Reset), SaveStatus::Idle);
    }

    #[test]
    fn edits_during_flush_keep_saving() {
        assert_eq!(
            SaveStatus::Saving.apply(StatusEvent::Changed),
            SaveStatus::Saving
        );
    }

    #[test]
    fn unauthenticated_is_sticky_until_restored() {
        let status = SaveStatus::Dirty.apply(StatusEvent::AuthLost);
        assert_eq!(status.clone().apply(StatusEvent::Changed), SaveStatus::Unauthenticated);
        assert_eq!(
            status.apply(StatusEvent::AuthRestored { dirty: true }),
            SaveStatus::Dirty
        );
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn saved_reverts_after_window() {
        let reporter = StatusReporter::new(Duration::from_secs(2), Duration::from_secs(5));
        reporter.apply(StatusEvent::SaveStarted);
        reporter.apply(StatusEvent::SaveSucceeded);
        assert_eq!(reporter.status(), SaveStatus::Saved);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(reporter.status(), SaveStatus::Idle);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn later_event_cancels_revert() {
        let reporter = StatusReporter::new(Duration::from_secs(2), Duration::from_secs(5));
        reporter.apply(StatusEvent::SaveFailed("offline".into()));
        reporter.apply(StatusEvent::SaveStarted);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(reporter.status(), SaveStatus::Saving);
    }

    #[tokio::test]
    async fn shutdown_freezes_view() {
        let reporter = StatusReporter::new(Duration::from_secs(2), Duration::from_secs(5));
        reporter.shutdown();
        reporter.apply(StatusEvent::Changed);
        assert_eq!(reporter.status(), SaveStatus::Idle);
    }
}
