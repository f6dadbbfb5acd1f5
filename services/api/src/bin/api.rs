//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{AuthEventHub, DbAdapter},
    config::{Config, ConfigError},
    error::ApiError,
    web::{
        admin_delete_user_handler, admin_list_cvs_handler, admin_list_users_handler,
        admin_set_role_handler, admin_stats_handler,
        auth::{login_handler, logout_handler, me_handler, signup_handler},
        delete_cv_handler, editor_ws_handler, get_cv_handler, list_cvs_handler,
        require_auth, rest::ApiDoc, search_cvs_handler, state::AppState, upload_image_handler,
    },
};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    info!("Staging uploads in {}", config.upload_dir.display());

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        cvs: db_adapter.clone(),
        accounts: db_adapter,
        auth_events: AuthEventHub::new(),
        config: config.clone(),
    });

    let origin = config.allowed_origin.parse::<HeaderValue>().map_err(|e| {
        ConfigError::InvalidValue("ALLOWED_ORIGIN".to_string(), e.to_string())
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 4. Create the Web Router ---
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    let protected_routes = Router::new()
        .route("/auth/me", get(me_handler))
        .route("/cvs", get(list_cvs_handler))
        .route("/cvs/search", get(search_cvs_handler))
        .route("/cvs/{id}", get(get_cv_handler).delete(delete_cv_handler))
        .route("/admin/cvs", get(admin_list_cvs_handler))
        .route("/admin/users", get(admin_list_users_handler))
        .route("/admin/users/{id}", delete(admin_delete_user_handler))
        .route("/admin/users/{id}/admin", post(admin_set_role_handler))
        .route("/admin/stats", get(admin_stats_handler))
        .route("/uploads", post(upload_image_handler))
        .route("/editor", get(editor_ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(app_state);

    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
