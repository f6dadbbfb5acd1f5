pub mod attachments;
pub mod auth;
pub mod db;

pub use attachments::FsAttachmentStore;
pub use auth::{AuthEventHub, AuthNotice, CookieSessionAuth};
pub use db::DbAdapter;
