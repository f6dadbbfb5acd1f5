pub mod admin;
pub mod auth;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the handlers the binary mounts on the router.
pub use middleware::require_auth;
pub use admin::{
    admin_delete_user_handler, admin_list_cvs_handler, admin_list_users_handler,
    admin_set_role_handler, admin_stats_handler,
};
pub use rest::{
    delete_cv_handler, get_cv_handler, list_cvs_handler, search_cvs_handler,
    upload_image_handler,
};
pub use ws_handler::editor_ws_handler;
