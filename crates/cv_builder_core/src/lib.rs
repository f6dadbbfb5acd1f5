pub mod autosave;
pub mod domain;
pub mod ports;

pub use autosave::{AutoSaveConfig, EditorServices, EditorSession, SaveError, SaveOutcome, SaveStatus, StatusView};
pub use domain::{
    AdminStats, AuthEvent, AuthSession, CvPayload, CvRecord, Document, EncodedImage, PendingImage,
    ProfileImage, RecordScope, RecordSummary, User, UserAccount, UserCredentials,
};
pub use ports::{AccountStore, AttachmentReader, AuthService, CvStore, PortError, PortResult};
