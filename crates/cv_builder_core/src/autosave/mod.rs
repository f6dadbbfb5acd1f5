//! crates/cv_builder_core/src/autosave/mod.rs
//!
//! The auto-save / draft-reconciliation engine.

pub mod change_tracker;
pub mod config;
pub mod editor;
pub mod error;
pub mod persistence;
pub mod scheduler;
pub mod session_guard;
pub mod status;

pub use change_tracker::{is_dirty, ImageMarker, SaveSnapshot};
pub use config::AutoSaveConfig;
pub use editor::{EditorServices, EditorSession};
pub use error::{SaveError, SaveOutcome, SaveResult, SkipReason};
pub use persistence::{build_payload, encode_image, Draft, Flushed, PersistenceAdapter};
pub use scheduler::{IntervalTicks, SaveCycle, SaveScheduler, TickSource};
pub use session_guard::SessionGuard;
pub use status::{SaveStatus, StatusEvent, StatusReporter, StatusView};
