//! crates/cv_builder_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or transport, but they are
//! serde-serializable because the CV payload is stored as a JSON document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Template assigned to records created by the editor.
pub const DEFAULT_TEMPLATE_ID: &str = "template1";

//=========================================================================================
// The Document Being Edited
//=========================================================================================

/// The CV as held by the form state store while it is being edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    pub name: String,
    pub position: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub professional_summary: String,
    pub education: Vec<EducationEntry>,
    pub experience: Vec<ExperienceEntry>,
    pub skills: Vec<String>,
    pub certifications: Vec<String>,
    pub languages: Vec<String>,
    pub hobbies: Vec<String>,
    pub other_info: Vec<OtherInfoEntry>,
    pub custom_section: CustomSection,
    pub references: Vec<String>,
    pub profile_image: Option<ProfileImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EducationEntry {
    pub degree: String,
    pub board: String,
    pub year: String,
    pub marks: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceEntry {
    pub job_title: String,
    pub company: String,
    pub duration: String,
    pub job_details: String,
}

/// A free-form label/value pair from the "other information" section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtherInfoEntry {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomSection {
    pub heading: String,
    pub details: Vec<String>,
}

/// The profile picture attached to a CV.
///
/// A freshly picked file is only a handle to a staged upload; it becomes an
/// `Encoded` tuple once the persistence adapter has read and base64-encoded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileImage {
    Pending(PendingImage),
    Encoded(EncodedImage),
}

/// A staged upload that has not been encoded yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingImage {
    pub upload_id: Uuid,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

/// An image ready for storage. `data` is a `data:<mime>;base64,...` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    pub data: String,
}

impl Document {
    /// Whether the primary name field holds anything besides whitespace.
    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }

    /// Nothing has been entered yet.
    pub fn is_blank(&self) -> bool {
        *self == Document::default()
    }

    /// Rebuilds an editable document from a stored payload.
    pub fn from_payload(payload: &CvPayload) -> Self {
        let info = &payload.personal_info;
        Self {
            name: info.name.clone(),
            position: info.position.clone(),
            phone: info.phone.clone(),
            email: info.email.clone(),
            address: info.address.clone(),
            professional_summary: payload.professional_summary.clone(),
            education: payload.education.clone(),
            experience: payload.experience.clone(),
            skills: payload.skills.clone(),
            certifications: payload.certifications.clone(),
            languages: payload.languages.clone(),
            hobbies: payload.hobbies.clone(),
            other_info: payload.other_info.clone(),
            custom_section: payload.custom_section.clone(),
            references: payload.references.clone(),
            profile_image: payload.profile_image.clone().map(ProfileImage::Encoded),
        }
    }
}

//=========================================================================================
// The Stored Record
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalInfo {
    pub name: String,
    pub position: String,
    pub phone: String,
    pub email: String,
    pub address: String,
}

/// The structured JSON payload stored with every CV record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CvPayload {
    pub personal_info: PersonalInfo,
    pub professional_summary: String,
    pub education: Vec<EducationEntry>,
    pub experience: Vec<ExperienceEntry>,
    pub skills: Vec<String>,
    pub certifications: Vec<String>,
    pub languages: Vec<String>,
    pub hobbies: Vec<String>,
    pub other_info: Vec<OtherInfoEntry>,
    pub custom_section: CustomSection,
    pub references: Vec<String>,
    pub profile_image: Option<EncodedImage>,
}

/// A CV as stored by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CvRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub title: String,
    pub company: String,
    pub template_id: String,
    pub cv_data: CvPayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a record that has no identity yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub user_id: Uuid,
    pub name: String,
    pub title: String,
    pub company: String,
    pub template_id: String,
    pub cv_data: CvPayload,
}

/// The mutable columns of an existing record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub name: String,
    pub title: String,
    pub company: String,
    pub cv_data: CvPayload,
}

impl NewRecord {
    pub fn into_update(self) -> RecordUpdate {
        RecordUpdate {
            name: self.name,
            title: self.title,
            company: self.company,
            cv_data: self.cv_data,
        }
    }
}

/// Lightweight listing row: the denormalized columns without the payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub title: String,
    pub company: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&CvRecord> for RecordSummary {
    fn from(record: &CvRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            name: record.name.clone(),
            title: record.title.clone(),
            company: record.company.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Which rows a read or write is allowed to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordScope {
    /// Only rows owned by this user.
    Owner(Uuid),
    /// Any row. Only granted to users verified as admins.
    Admin,
}

impl RecordScope {
    /// The widest scope the given user is entitled to.
    pub fn for_user(user: &User) -> Self {
        if user.is_admin {
            RecordScope::Admin
        } else {
            RecordScope::Owner(user.user_id)
        }
    }

    pub fn permits(&self, owner: Uuid) -> bool {
        match self {
            RecordScope::Owner(user_id) => *user_id == owner,
            RecordScope::Admin => true,
        }
    }
}

//=========================================================================================
// Accounts and Sessions
//=========================================================================================

// Represents a user - used throughout app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub is_admin: bool,
}

/// An account as listed on the admin panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Headline numbers for the admin panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdminStats {
    pub total_users: i64,
    pub total_cvs: i64,
    /// CVs created after the cutoff the stats were requested with.
    pub recent_cvs: i64,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// An asynchronous change in authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(User),
    SignedOut,
}
