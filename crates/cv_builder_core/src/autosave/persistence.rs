//! crates/cv_builder_core/src/autosave/persistence.rs
//!
//! Turns an in-memory document into a stored record. The adapter owns no
//! mutable state: the caller hands in its current `Draft` and receives the
//! next one only when the write succeeded, so the snapshot and the record
//! identity can never be half-updated.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::change_tracker::{ImageMarker, SaveSnapshot};
use super::error::SaveError;
use crate::domain::{
    CvPayload, CvRecord, Document, EducationEntry, EncodedImage, ExperienceEntry, NewRecord,
    OtherInfoEntry, PendingImage, PersonalInfo, ProfileImage, RecordScope, User, CustomSection,
};
use crate::ports::{AttachmentReader, CvStore, PortError};

const FALLBACK_MIME: &str = "application/octet-stream";

//=========================================================================================
// Draft: the single-owner persistence state of one editing session
//=========================================================================================

/// Record identity and last-written snapshot for one editing session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    record_id: Option<Uuid>,
    snapshot: Option<SaveSnapshot>,
}

impl Draft {
    /// A draft that has never been written.
    pub fn new() -> Self {
        Self::default()
    }

    /// A draft backed by an existing record whose stored state is `snapshot`.
    pub fn loaded(record_id: Uuid, snapshot: SaveSnapshot) -> Self {
        Self {
            record_id: Some(record_id),
            snapshot: Some(snapshot),
        }
    }

    pub fn record_id(&self) -> Option<Uuid> {
        self.record_id
    }

    pub fn snapshot(&self) -> Option<&SaveSnapshot> {
        self.snapshot.as_ref()
    }
}

/// A successful flush: the draft to adopt and the record as stored.
#[derive(Debug, Clone)]
pub struct Flushed {
    pub draft: Draft,
    pub record: CvRecord,
}

//=========================================================================================
// The Adapter
//=========================================================================================

#[derive(Clone)]
pub struct PersistenceAdapter {
    store: Arc<dyn CvStore>,
    attachments: Arc<dyn AttachmentReader>,
    template_id: String,
    flush_timeout: Duration,
}

impl PersistenceAdapter {
    pub fn new(
        store: Arc<dyn CvStore>,
        attachments: Arc<dyn AttachmentReader>,
        template_id: impl Into<String>,
        flush_timeout: Duration,
    ) -> Self {
        Self {
            store,
            attachments,
            template_id: template_id.into(),
            flush_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn CvStore> {
        &self.store
    }

    /// Writes `document` on behalf of `user`, creating the record if `draft`
    /// has no identity yet. `draft` itself is never modified.
    pub async fn flush(
        &self,
        draft: &Draft,
        document: &Document,
        user: &User,
    ) -> Result<Flushed, SaveError> {
        match tokio::time::timeout(self.flush_timeout, self.write(draft, document, user)).await {
            Ok(result) => result,
            Err(_) => Err(SaveError::Timeout(self.flush_timeout)),
        }
    }

    async fn write(
        &self,
        draft: &Draft,
        document: &Document,
        user: &User,
    ) -> Result<Flushed, SaveError> {
        let (stored_image, marker) = self.resolve_image(document.profile_image.as_ref()).await?;
        let snapshot = SaveSnapshot::capture(document, marker)
            .map_err(|e| PortError::Unexpected(format!("Failed to serialize document: {}", e)))?;
        let record = build_record(document, stored_image, user.user_id, &self.template_id);

        let saved = match draft.record_id {
            Some(id) => {
                debug!(record_id = %id, "Updating existing CV");
                self.store
                    .update_record(id, record.into_update(), RecordScope::for_user(user))
                    .await?
            }
            None => {
                debug!("Creating new CV");
                let created = self.store.create_record(record).await?;
                info!(record_id = %created.id, "New CV created");
                created
            }
        };

        Ok(Flushed {
            draft: Draft {
                record_id: Some(saved.id),
                snapshot: Some(snapshot),
            },
            record: saved,
        })
    }

    /// Produces the stored form of the profile image and the marker describing it.
    async fn resolve_image(
        &self,
        image: Option<&ProfileImage>,
    ) -> Result<(Option<EncodedImage>, ImageMarker), SaveError> {
        match image {
            None => Ok((None, ImageMarker::default())),
            Some(ProfileImage::Encoded(encoded)) => Ok((
                Some(encoded.clone()),
                ImageMarker {
                    data: Some(encoded.data.clone()),
                    source_upload: None,
                },
            )),
            Some(ProfileImage::Pending(pending)) => {
                let bytes = self
                    .attachments
                    .read_pending(pending)
                    .await
                    .map_err(|e| SaveError::Encoding(e.to_string()))?;
                let encoded = encode_image(pending, &bytes);
                let marker = ImageMarker {
                    data: Some(encoded.data.clone()),
                    source_upload: Some(pending.upload_id),
                };
                Ok((Some(encoded), marker))
            }
        }
    }
}

//=========================================================================================
// Payload Mapping
//=========================================================================================

/// Encodes raw image bytes as a data URL tuple.
pub fn encode_image(pending: &PendingImage, bytes: &[u8]) -> EncodedImage {
    let mime_type = if pending.mime_type.trim().is_empty() {
        FALLBACK_MIME.to_string()
    } else {
        pending.mime_type.clone()
    };
    let data = format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes));
    EncodedImage {
        name: pending.name.clone(),
        mime_type,
        size: bytes.len() as u64,
        data,
    }
}

/// Maps the document into the stored payload, dropping blank list entries.
pub fn build_payload(document: &Document, profile_image: Option<EncodedImage>) -> CvPayload {
    CvPayload {
        personal_info: PersonalInfo {
            name: document.name.clone(),
            position: document.position.clone(),
            phone: document.phone.clone(),
            email: document.email.clone(),
            address: document.address.clone(),
        },
        professional_summary: document.professional_summary.clone(),
        education: document
            .education
            .iter()
            .filter(|e| !is_blank_education(e))
            .cloned()
            .collect(),
        experience: document
            .experience
            .iter()
            .filter(|e| !is_blank_experience(e))
            .cloned()
            .collect(),
        skills: compact(&document.skills),
        certifications: compact(&document.certifications),
        languages: compact(&document.languages),
        hobbies: compact(&document.hobbies),
        other_info: document
            .other_info
            .iter()
            .filter(|e| !is_blank_other_info(e))
            .cloned()
            .collect(),
        custom_section: CustomSection {
            heading: document.custom_section.heading.clone(),
            details: compact(&document.custom_section.details),
        },
        references: compact(&document.references),
        profile_image,
    }
}

fn build_record(
    document: &Document,
    profile_image: Option<EncodedImage>,
    user_id: Uuid,
    template_id: &str,
) -> NewRecord {
    let company = document
        .experience
        .iter()
        .map(|e| e.company.trim())
        .find(|c| !c.is_empty())
        .unwrap_or_default()
        .to_string();

    NewRecord {
        user_id,
        name: document.name.trim().to_string(),
        title: document.position.trim().to_string(),
        company,
        template_id: template_id.to_string(),
        cv_data: build_payload(document, profile_image),
    }
}

fn compact(items: &[String]) -> Vec<String> {
    items
        .iter()
        .filter(|s| !s.trim().is_empty())
        .cloned()
        .collect()
}

fn is_blank_education(entry: &EducationEntry) -> bool {
    [&entry.degree, &entry.board, &entry.year, &entry.marks]
        .iter()
        .all(|s| s.trim().is_empty())
}

fn is_blank_experience(entry: &ExperienceEntry) -> bool {
    [
        &entry.job_title,
        &entry.company,
        &entry.duration,
        &entry.job_details,
    ]
    .iter()
    .all(|s| s.trim().is_empty())
}

fn is_blank_other_info(entry: &OtherInfoEntry) -> bool {
    entry.label.trim().is_empty() && entry.value.trim().is_empty()
}
