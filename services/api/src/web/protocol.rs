//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser-side CV editor
//! and the API server.

use cv_builder_core::autosave::{SaveOutcome, SkipReason, StatusView};
use cv_builder_core::domain::Document;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Replaces the server's copy of the form with the editor's current state.
    UpdateDocument { document: Document },

    /// The user pressed "Save".
    ManualSave,

    /// Opens an existing CV for editing.
    LoadRecord { record_id: Uuid },

    /// Starts a blank CV; the next save creates a new record.
    NewSession,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The save indicator changed.
    Status { view: StatusView },

    /// A record was opened; the editor should show `document`.
    RecordLoaded { record_id: Uuid, document: Document },

    /// Answer to a `manual_save`.
    SaveResult {
        saved: bool,
        record_id: Option<Uuid>,
        skipped: Option<&'static str>,
    },

    /// Reports an error the client should display.
    Error { message: String },
}

impl ServerMessage {
    pub fn save_result(outcome: SaveOutcome) -> Self {
        match outcome {
            SaveOutcome::Saved(record_id) => ServerMessage::SaveResult {
                saved: true,
                record_id: Some(record_id),
                skipped: None,
            },
            SaveOutcome::Skipped(reason) => ServerMessage::SaveResult {
                saved: false,
                record_id: None,
                skipped: Some(skip_label(reason)),
            },
        }
    }
}

fn skip_label(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::MissingName => "missing_name",
        SkipReason::Unchanged => "unchanged",
        SkipReason::InFlight => "in_flight",
        SkipReason::Closed => "closed",
    }
}
