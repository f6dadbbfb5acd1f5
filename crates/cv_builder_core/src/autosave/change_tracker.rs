//! crates/cv_builder_core/src/autosave/change_tracker.rs
//!
//! Decides whether the document in the form store differs from what was last
//! written. Text fields and the profile image are compared separately: the
//! image is either a staged upload handle (which says nothing about content)
//! or an encoded data URL, so it cannot take part in a plain deep-equality.

use serde_json::Value;
use uuid::Uuid;

use crate::domain::{Document, ProfileImage};

const IMAGE_FIELD: &str = "profile_image";

/// Marker for the image that was part of the last successful write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMarker {
    /// The encoded data URL that was stored, if any.
    pub data: Option<String>,
    /// The staged upload the stored data was encoded from, if it came from one.
    pub source_upload: Option<Uuid>,
}

/// The last successfully persisted state of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveSnapshot {
    body: Value,
    image: ImageMarker,
}

impl SaveSnapshot {
    /// Captures `document` as written, with `image` describing what was stored
    /// for the profile picture.
    pub fn capture(document: &Document, image: ImageMarker) -> Result<Self, serde_json::Error> {
        Ok(Self {
            body: comparable_body(document)?,
            image,
        })
    }

    /// Captures a document whose image is already in stored form, e.g. one
    /// just loaded from the backend.
    pub fn of_stored(document: &Document) -> Result<Self, serde_json::Error> {
        let image = match &document.profile_image {
            Some(ProfileImage::Encoded(encoded)) => ImageMarker {
                data: Some(encoded.data.clone()),
                source_upload: None,
            },
            _ => ImageMarker::default(),
        };
        Self::capture(document, image)
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn image(&self) -> &ImageMarker {
        &self.image
    }
}

/// Serializes everything except the profile image.
fn comparable_body(document: &Document) -> Result<Value, serde_json::Error> {
    let mut value = serde_json::to_value(document)?;
    if let Value::Object(fields) = &mut value {
        fields.remove(IMAGE_FIELD);
    }
    Ok(value)
}

/// Returns true when `current` has changes that `last` does not cover.
///
/// Without a snapshot every document is dirty except the blank one a fresh
/// session starts from.
pub fn is_dirty(current: &Document, last: Option<&SaveSnapshot>) -> bool {
    let Some(last) = last else {
        return !current.is_blank();
    };
    body_changed(current, last) || image_changed(current.profile_image.as_ref(), &last.image)
}

fn body_changed(current: &Document, last: &SaveSnapshot) -> bool {
    match comparable_body(current) {
        Ok(body) => body != last.body,
        Err(e) => {
            tracing::warn!("Failed to serialize document for change detection: {}", e);
            true
        }
    }
}

fn image_changed(current: Option<&ProfileImage>, last: &ImageMarker) -> bool {
    match current {
        None => last.data.is_some(),
        Some(ProfileImage::Pending(pending)) => last.source_upload != Some(pending.upload_id),
        Some(ProfileImage::Encoded(encoded)) => last.data.as_deref() != Some(encoded.data.as_str()),
    }
}
