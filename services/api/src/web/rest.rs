//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::admin::{AdminStatsResponse, SetAdminRequest, UserAccountResponse};
use crate::web::auth::{AuthResponse, LoginRequest, SignupRequest};
use crate::web::state::{AppState, AuthContext};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use cv_builder_core::domain::{CvPayload, CvRecord, PendingImage, RecordScope, RecordSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        crate::web::auth::me_handler,
        list_cvs_handler,
        search_cvs_handler,
        get_cv_handler,
        delete_cv_handler,
        upload_image_handler,
        crate::web::admin::admin_list_cvs_handler,
        crate::web::admin::admin_list_users_handler,
        crate::web::admin::admin_delete_user_handler,
        crate::web::admin::admin_set_role_handler,
        crate::web::admin::admin_stats_handler,
    ),
    components(
        schemas(
            SignupRequest,
            LoginRequest,
            AuthResponse,
            CvSummaryResponse,
            CvResponse,
            UploadResponse,
            UserAccountResponse,
            SetAdminRequest,
            AdminStatsResponse
        )
    ),
    tags(
        (name = "CV Builder API", description = "CV records, accounts, administration and profile image uploads.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A CV as shown in listings.
#[derive(Serialize, ToSchema)]
pub struct CvSummaryResponse {
    id: Uuid,
    user_id: Uuid,
    name: String,
    title: String,
    company: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RecordSummary> for CvSummaryResponse {
    fn from(s: RecordSummary) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            name: s.name,
            title: s.title,
            company: s.company,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// A full CV record including its structured payload.
#[derive(Serialize, ToSchema)]
pub struct CvResponse {
    id: Uuid,
    user_id: Uuid,
    name: String,
    title: String,
    company: String,
    template_id: String,
    #[schema(value_type = Object)]
    cv_data: CvPayload,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CvRecord> for CvResponse {
    fn from(r: CvRecord) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            name: r.name,
            title: r.title,
            company: r.company,
            template_id: r.template_id,
            cv_data: r.cv_data,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Handle for a staged profile image. The editor places it in the document as
/// `{"kind": "pending", ...}` and the next save encodes it.
#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    upload_id: Uuid,
    name: String,
    mime_type: String,
    size: u64,
}

impl From<PendingImage> for UploadResponse {
    fn from(p: PendingImage) -> Self {
        Self {
            upload_id: p.upload_id,
            name: p.name,
            mime_type: p.mime_type,
            size: p.size,
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Matched case-insensitively against name, title and company.
    #[serde(default)]
    q: String,
}

pub(crate) fn summaries(rows: Vec<RecordSummary>) -> Json<Vec<CvSummaryResponse>> {
    Json(rows.into_iter().map(CvSummaryResponse::from).collect())
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List the signed-in user's CVs, most recently updated first.
#[utoipa::path(
    get,
    path = "/cvs",
    responses(
        (status = 200, description = "The user's CVs", body = [CvSummaryResponse]),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn list_cvs_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<CvSummaryResponse>>, ApiError> {
    Ok(summaries(state.cvs.list_records(auth.user_id).await?))
}

/// Search the signed-in user's CVs.
#[utoipa::path(
    get,
    path = "/cvs/search",
    params(SearchParams),
    responses(
        (status = 200, description = "Matching CVs", body = [CvSummaryResponse]),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn search_cvs_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<CvSummaryResponse>>, ApiError> {
    let rows = if params.q.trim().is_empty() {
        state.cvs.list_records(auth.user_id).await?
    } else {
        state.cvs.search_records(auth.user_id, &params.q).await?
    };
    Ok(summaries(rows))
}

/// Fetch one CV. Admins may fetch any CV.
#[utoipa::path(
    get,
    path = "/cvs/{id}",
    params(("id" = Uuid, Path, description = "The CV id.")),
    responses(
        (status = 200, description = "The CV", body = CvResponse),
        (status = 404, description = "No such CV for this user")
    )
)]
pub async fn get_cv_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<CvResponse>, ApiError> {
    let user = auth.user(&state).await?;
    let record = state.cvs.get_record(id, RecordScope::for_user(&user)).await?;
    Ok(Json(CvResponse::from(record)))
}

/// Delete one CV. Admins may delete any CV.
#[utoipa::path(
    delete,
    path = "/cvs/{id}",
    params(("id" = Uuid, Path, description = "The CV id.")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such CV for this user")
    )
)]
pub async fn delete_cv_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user = auth.user(&state).await?;
    state.cvs.delete_record(id, RecordScope::for_user(&user)).await?;
    info!(record_id = %id, user_id = %user.user_id, "CV deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Stage a profile image for the editor.
///
/// Accepts a multipart/form-data request with a single image part.
#[utoipa::path(
    post,
    path = "/uploads",
    request_body(content_type = "multipart/form-data", description = "The image to stage."),
    responses(
        (status = 201, description = "Image staged", body = UploadResponse),
        (status = 400, description = "Missing or non-image file")
    )
)]
pub async fn upload_image_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart data: {}", e)))?
        .ok_or_else(|| ApiError::BadRequest("Multipart form must include a file".to_string()))?;

    let name = field.file_name().unwrap_or("profile-image").to_string();
    let mime_type = field.content_type().unwrap_or_default().to_string();
    if !mime_type.starts_with("image/") {
        return Err(ApiError::BadRequest(format!(
            "Expected an image upload, got '{}'",
            mime_type
        )));
    }
    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read file bytes: {}", e)))?;

    let pending = state
        .uploads_for(auth.user_id)
        .stage(&name, &mime_type, data)
        .await?;
    Ok((StatusCode::CREATED, Json(UploadResponse::from(pending))))
}
