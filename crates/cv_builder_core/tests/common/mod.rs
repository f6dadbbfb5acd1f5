//! In-memory collaborators for driving an editor session in tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use cv_builder_core::autosave::{AutoSaveConfig, EditorServices, EditorSession, TickSource};
use cv_builder_core::domain::{
    AuthEvent, CvRecord, Document, NewRecord, PendingImage, RecordScope, RecordSummary,
    RecordUpdate, User,
};
use cv_builder_core::ports::{
    AttachmentReader, AuthEventStream, AuthService, CvStore, PortError, PortResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, watch, Semaphore};
use uuid::Uuid;

//=========================================================================================
// Auth
//=========================================================================================

pub struct FakeAuth {
    user: Mutex<Option<User>>,
    events: broadcast::Sender<AuthEvent>,
    hold: Mutex<Option<Arc<Semaphore>>>,
    pub lookups: AtomicUsize,
}

impl FakeAuth {
    pub fn signed_in(user: User) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            user: Mutex::new(Some(user)),
            events,
            hold: Mutex::new(None),
            lookups: AtomicUsize::new(0),
        })
    }

    /// The session silently expires: no notification is sent.
    pub fn expire(&self) {
        *self.user.lock().unwrap() = None;
    }

    pub fn sign_out(&self) {
        *self.user.lock().unwrap() = None;
        let _ = self.events.send(AuthEvent::SignedOut);
    }

    /// Later lookups wait for a permit from the returned semaphore.
    pub fn hold_lookups(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.hold.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn sign_in(&self, user: User) {
        *self.user.lock().unwrap() = Some(user.clone());
        let _ = self.events.send(AuthEvent::SignedIn(user));
    }
}

#[async_trait]
impl AuthService for FakeAuth {
    async fn current_user(&self) -> PortResult<Option<User>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let hold = self.hold.lock().unwrap().clone();
        if let Some(gate) = hold {
            gate.acquire()
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .forget();
        }
        Ok(self.user.lock().unwrap().clone())
    }

    fn auth_state_changes(&self) -> AuthEventStream {
        let rx = self.events.subscribe();
        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }))
    }
}

pub fn user() -> User {
    User {
        user_id: Uuid::new_v4(),
        email: Some("jane@example.com".into()),
        is_admin: false,
    }
}

pub fn admin() -> User {
    User {
        user_id: Uuid::new_v4(),
        email: Some("admin@example.com".into()),
        is_admin: true,
    }
}

//=========================================================================================
// Storage
//=========================================================================================

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<Uuid, CvRecord>>,
    pub creates: Mutex<Vec<NewRecord>>,
    pub updates: Mutex<Vec<(Uuid, RecordUpdate, RecordScope)>>,
    pub fail_next_write: AtomicBool,
    gate: Option<Arc<Semaphore>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every write waits for a permit from the returned semaphore.
    pub fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let store = Arc::new(Self {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        (store, gate)
    }

    pub fn insert(&self, record: CvRecord) {
        self.records.lock().unwrap().insert(record.id, record);
    }

    pub fn create_count(&self) -> usize {
        self.creates.lock().unwrap().len()
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn record(&self, id: Uuid) -> Option<CvRecord> {
        self.records.lock().unwrap().get(&id).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    async fn pass_gate(&self) -> PortResult<()> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .forget();
        }
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(PortError::Unexpected("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CvStore for MemoryStore {
    async fn create_record(&self, record: NewRecord) -> PortResult<CvRecord> {
        self.creates.lock().unwrap().push(record.clone());
        self.pass_gate().await?;
        let now = Utc::now();
        let stored = CvRecord {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            name: record.name,
            title: record.title,
            company: record.company,
            template_id: record.template_id,
            cv_data: record.cv_data,
            created_at: now,
            updated_at: now,
        };
        self.insert(stored.clone());
        Ok(stored)
    }

    async fn update_record(
        &self,
        id: Uuid,
        update: RecordUpdate,
        scope: RecordScope,
    ) -> PortResult<CvRecord> {
        self.updates.lock().unwrap().push((id, update.clone(), scope));
        self.pass_gate().await?;
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(&id)
            .filter(|r| scope.permits(r.user_id))
            .ok_or_else(|| PortError::NotFound(format!("CV {} not found", id)))?;
        record.name = update.name;
        record.title = update.title;
        record.company = update.company;
        record.cv_data = update.cv_data;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn get_record(&self, id: Uuid, scope: RecordScope) -> PortResult<CvRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&id)
            .filter(|r| scope.permits(r.user_id))
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("CV {} not found", id)))
    }

    async fn list_records(&self, user_id: Uuid) -> PortResult<Vec<RecordSummary>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.user_id == user_id)
            .map(RecordSummary::from)
            .collect())
    }

    async fn search_records(&self, user_id: Uuid, term: &str) -> PortResult<Vec<RecordSummary>> {
        let term = term.to_lowercase();
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.user_id == user_id && r.name.to_lowercase().contains(&term))
            .map(RecordSummary::from)
            .collect())
    }

    async fn list_all_records(&self) -> PortResult<Vec<RecordSummary>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .map(RecordSummary::from)
            .collect())
    }

    async fn delete_record(&self, id: Uuid, scope: RecordScope) -> PortResult<()> {
        let mut records = self.records.lock().unwrap();
        match records.get(&id) {
            Some(r) if scope.permits(r.user_id) => {
                records.remove(&id);
                Ok(())
            }
            _ => Err(PortError::NotFound(format!("CV {} not found", id))),
        }
    }
}

//=========================================================================================
// Uploads
//=========================================================================================

#[derive(Default)]
pub struct MemoryUploads {
    files: Mutex<HashMap<Uuid, Vec<u8>>>,
    pub reads: AtomicUsize,
}

impl MemoryUploads {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stage(&self, name: &str, bytes: &[u8]) -> PendingImage {
        let upload_id = Uuid::new_v4();
        self.files.lock().unwrap().insert(upload_id, bytes.to_vec());
        PendingImage {
            upload_id,
            name: name.into(),
            mime_type: "image/png".into(),
            size: bytes.len() as u64,
        }
    }
}

#[async_trait]
impl AttachmentReader for MemoryUploads {
    async fn read_pending(&self, image: &PendingImage) -> PortResult<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .get(&image.upload_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Upload {} not found", image.upload_id)))
    }
}

//=========================================================================================
// Ticks and Harness
//=========================================================================================

pub struct ManualTicks(mpsc::UnboundedReceiver<()>);

#[async_trait]
impl TickSource for ManualTicks {
    async fn tick(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct Harness {
    pub form: watch::Sender<Document>,
    pub session: EditorSession,
    pub auth: Arc<FakeAuth>,
    pub store: Arc<MemoryStore>,
    pub uploads: Arc<MemoryUploads>,
    ticks: mpsc::UnboundedSender<()>,
}

impl Harness {
    pub async fn start(auth: Arc<FakeAuth>, store: Arc<MemoryStore>) -> Self {
        let uploads = MemoryUploads::new();
        let (form, form_rx) = watch::channel(Document::default());
        let (ticks, tick_rx) = mpsc::unbounded_channel();
        let services = EditorServices {
            auth: auth.clone(),
            store: store.clone(),
            attachments: uploads.clone(),
        };
        let session = EditorSession::start_with_ticks(
            form_rx,
            services,
            AutoSaveConfig::default(),
            Box::new(ManualTicks(tick_rx)),
        )
        .await;
        Self {
            form,
            session,
            auth,
            store,
            uploads,
            ticks,
        }
    }

    pub fn edit(&self, f: impl FnOnce(&mut Document)) {
        self.form.send_modify(f);
    }

    /// Fires one scheduler tick and lets the resulting cycle run.
    pub async fn tick(&self) {
        let _ = self.ticks.send(());
        settle().await;
    }
}

/// Lets spawned tasks on the current-thread runtime run to their next await.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
