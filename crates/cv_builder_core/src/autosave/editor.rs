//! crates/cv_builder_core/src/autosave/editor.rs
//!
//! One editing session: wires the form store, the session guard, the
//! persistence adapter, the scheduler and the status reporter together and
//! exposes the surface the host view talks to.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::change_tracker::{is_dirty, SaveSnapshot};
use super::config::AutoSaveConfig;
use super::error::{SaveError, SaveOutcome, SaveResult, SkipReason};
use super::persistence::{Draft, PersistenceAdapter};
use super::scheduler::{IntervalTicks, SaveCycle, SaveScheduler, TickSource};
use super::session_guard::SessionGuard;
use super::status::{SaveStatus, StatusEvent, StatusReporter, StatusView};
use crate::domain::{Document, RecordScope};
use crate::ports::{AttachmentReader, AuthService, CvStore, PortError};

/// The collaborators an editor session talks to.
#[derive(Clone)]
pub struct EditorServices {
    pub auth: Arc<dyn AuthService>,
    pub store: Arc<dyn CvStore>,
    pub attachments: Arc<dyn AttachmentReader>,
}

/// Draft plus a counter bumped whenever the session switches documents, so a
/// flush that started for the previous document cannot land on the new one.
struct DraftState {
    draft: Draft,
    epoch: u64,
}

struct EditorInner {
    form: watch::Receiver<Document>,
    guard: SessionGuard,
    persistence: PersistenceAdapter,
    reporter: StatusReporter,
    state: Mutex<DraftState>,
    in_flight: AtomicBool,
    closed: CancellationToken,
}

/// Releases the in-flight flag when the cycle holding it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl EditorInner {
    async fn run_cycle(&self) -> SaveResult {
        if self.closed.is_cancelled() {
            return Ok(SaveOutcome::Skipped(SkipReason::Closed));
        }
        let Some(_flight) = InFlight::acquire(&self.in_flight) else {
            return Ok(SaveOutcome::Skipped(SkipReason::InFlight));
        };

        let user = tokio::select! {
            _ = self.closed.cancelled() => return Ok(SaveOutcome::Skipped(SkipReason::Closed)),
            user = self.guard.ensure_live() => user,
        };
        let Some(user) = user else {
            self.reporter.apply(StatusEvent::AuthLost);
            return Err(SaveError::AuthRequired);
        };

        // Form and draft are read under the same lock that document switches
        // hold, so a cycle never pairs one document with another's draft.
        let (document, draft, epoch) = {
            let state = self.state.lock().await;
            let document = self.form.borrow().clone();
            (document, state.draft.clone(), state.epoch)
        };
        if !document.has_name() {
            debug!("Auto-save skipped - no name provided");
            return Ok(SaveOutcome::Skipped(SkipReason::MissingName));
        }
        if !is_dirty(&document, draft.snapshot()) {
            debug!("Auto-save skipped - no changes since last save");
            return Ok(SaveOutcome::Skipped(SkipReason::Unchanged));
        }
        if self.closed.is_cancelled() {
            return Ok(SaveOutcome::Skipped(SkipReason::Closed));
        }

        self.reporter.apply(StatusEvent::SaveStarted);
        let result = self.persistence.flush(&draft, &document, &user).await;

        if self.closed.is_cancelled() {
            debug!("Editor closed during save - discarding result");
            return result.map(|flushed| SaveOutcome::Saved(flushed.record.id));
        }

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            debug!("Editor switched documents during save - discarding result");
            return result.map(|flushed| SaveOutcome::Saved(flushed.record.id));
        }

        match result {
            Ok(flushed) => {
                let record_id = flushed.record.id;
                state.draft = flushed.draft;
                let still_dirty = is_dirty(&self.form.borrow(), state.draft.snapshot());
                drop(state);

                info!(record_id = %record_id, "CV auto-saved");
                self.reporter.set_record_id(Some(record_id));
                self.reporter.set_unsaved(still_dirty);
                self.reporter.apply(StatusEvent::SaveSucceeded);
                Ok(SaveOutcome::Saved(record_id))
            }
            Err(e) => {
                drop(state);
                warn!("Auto-save failed: {}", e);
                self.reporter.apply(StatusEvent::SaveFailed(e.to_string()));
                Err(e)
            }
        }
    }

    fn on_form_changed(&self, dirty: bool) {
        self.reporter.set_unsaved(dirty);
        if dirty {
            self.reporter.apply(StatusEvent::Changed);
        }
    }

    fn on_live_changed(&self, live: bool) {
        if live {
            let dirty = self.reporter.view().has_unsaved_changes;
            self.reporter.apply(StatusEvent::AuthRestored { dirty });
        } else {
            self.reporter.apply(StatusEvent::AuthLost);
        }
    }
}

#[async_trait]
impl SaveCycle for EditorInner {
    fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    async fn run_scheduled(&self) {
        match self.run_cycle().await {
            Ok(SaveOutcome::Saved(id)) => debug!(record_id = %id, "Scheduled save complete"),
            Ok(SaveOutcome::Skipped(reason)) => debug!(?reason, "Scheduled save skipped"),
            Err(e) => debug!("Scheduled save did not complete: {}", e),
        }
    }
}

//=========================================================================================
// The Host-Facing Session
//=========================================================================================

pub struct EditorSession {
    inner: Arc<EditorInner>,
    scheduler: SaveScheduler,
}

impl EditorSession {
    /// Mounts an editor over `form` with the production timer.
    pub async fn start(
        form: watch::Receiver<Document>,
        services: EditorServices,
        config: AutoSaveConfig,
    ) -> Self {
        let ticks = Box::new(IntervalTicks::new(config.interval));
        Self::start_with_ticks(form, services, config, ticks).await
    }

    /// Mounts an editor driven by a custom tick source.
    pub async fn start_with_ticks(
        form: watch::Receiver<Document>,
        services: EditorServices,
        config: AutoSaveConfig,
        ticks: Box<dyn TickSource>,
    ) -> Self {
        let closed = CancellationToken::new();
        let guard = SessionGuard::new(services.auth.clone());
        let persistence = PersistenceAdapter::new(
            services.store,
            services.attachments,
            config.template_id.clone(),
            config.flush_timeout,
        );
        let reporter = StatusReporter::new(config.saved_display, config.failed_display);

        let inner = Arc::new(EditorInner {
            form: form.clone(),
            guard: guard.clone(),
            persistence,
            reporter,
            state: Mutex::new(DraftState {
                draft: Draft::new(),
                epoch: 0,
            }),
            in_flight: AtomicBool::new(false),
            closed: closed.clone(),
        });

        if !guard.refresh().await {
            inner.reporter.apply(StatusEvent::AuthLost);
        }
        guard.watch_auth_events(closed.clone());
        spawn_live_watcher(inner.clone(), guard.live_changes());
        spawn_form_watcher(inner.clone(), form);

        let scheduler = SaveScheduler::start(inner.clone(), guard.live_changes(), ticks, &closed);

        Self { inner, scheduler }
    }

    pub fn status(&self) -> SaveStatus {
        self.inner.reporter.status()
    }

    pub fn view(&self) -> StatusView {
        self.inner.reporter.view()
    }

    /// Status updates for the host view.
    pub fn subscribe(&self) -> watch::Receiver<StatusView> {
        self.inner.reporter.subscribe()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.inner.reporter.view().has_unsaved_changes
    }

    pub fn record_id(&self) -> Option<Uuid> {
        self.inner.reporter.view().record_id
    }

    pub fn is_scheduler_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Flags the document as edited without waiting for a store notification.
    pub fn mark_changed(&self) {
        self.inner.on_form_changed(true);
    }

    /// Runs a save cycle now. Errors are reported to the status view and
    /// returned to the caller.
    pub async fn manual_save(&self) -> SaveResult {
        self.inner.run_cycle().await
    }

    /// Opens an existing record for editing and adopts its identity.
    ///
    /// The loaded document is written into `form` in the same step that
    /// switches the draft.
    pub async fn load_record(
        &self,
        id: Uuid,
        form: &watch::Sender<Document>,
    ) -> Result<Document, SaveError> {
        let Some(user) = self.inner.guard.ensure_live().await else {
            self.inner.reporter.apply(StatusEvent::AuthLost);
            return Err(SaveError::AuthRequired);
        };

        let record = self
            .inner
            .persistence
            .store()
            .get_record(id, RecordScope::for_user(&user))
            .await?;
        let document = Document::from_payload(&record.cv_data);
        let snapshot = SaveSnapshot::of_stored(&document)
            .map_err(|e| PortError::Unexpected(format!("Failed to serialize document: {}", e)))?;

        {
            let mut state = self.inner.state.lock().await;
            state.epoch += 1;
            state.draft = Draft::loaded(record.id, snapshot);
            form.send_replace(document.clone());
        }
        info!(record_id = %record.id, "CV loaded");
        self.inner.reporter.set_record_id(Some(record.id));
        self.inner.reporter.set_unsaved(false);
        self.inner.reporter.apply(StatusEvent::Reset);
        Ok(document)
    }

    /// Forgets the current record and clears `form`, so the next save creates
    /// a new one.
    pub async fn start_new_session(&self, form: &watch::Sender<Document>) {
        {
            let mut state = self.inner.state.lock().await;
            state.epoch += 1;
            state.draft = Draft::new();
            form.send_replace(Document::default());
        }
        self.inner.reporter.set_record_id(None);
        self.inner.reporter.set_unsaved(false);
        self.inner.reporter.apply(StatusEvent::Reset);
    }

    /// Tears the session down. A save already in flight finishes but its
    /// result is not applied.
    pub fn close(&mut self) {
        self.inner.closed.cancel();
        self.scheduler.stop();
        self.inner.reporter.shutdown();
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_live_watcher(inner: Arc<EditorInner>, mut live: watch::Receiver<bool>) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = inner.closed.cancelled() => break,
                changed = live.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let is_live = *live.borrow_and_update();
                    inner.on_live_changed(is_live);
                }
            }
        }
    });
}

fn spawn_form_watcher(inner: Arc<EditorInner>, mut form: watch::Receiver<Document>) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = inner.closed.cancelled() => break,
                changed = form.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let dirty = {
                        let state = inner.state.lock().await;
                        let document = form.borrow_and_update().clone();
                        is_dirty(&document, state.draft.snapshot())
                    };
                    inner.on_form_changed(dirty);
                }
            }
        }
    });
}
