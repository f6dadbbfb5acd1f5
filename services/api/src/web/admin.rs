//! services/api/src/web/admin.rs
//!
//! Admin panel endpoints: every CV, every account, role changes and the
//! headline counts. All of them answer 403 unless the caller is an admin.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::{DateTime, Duration, Utc};
use cv_builder_core::domain::{AdminStats, User, UserAccount};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::auth::AuthResponse;
use crate::web::rest::{summaries, CvSummaryResponse};
use crate::web::state::{AppState, AuthContext};

/// CVs created within this many days count as recent.
const RECENT_CV_DAYS: i64 = 7;

#[derive(Serialize, ToSchema)]
pub struct UserAccountResponse {
    user_id: Uuid,
    email: Option<String>,
    is_admin: bool,
    created_at: DateTime<Utc>,
}

impl From<UserAccount> for UserAccountResponse {
    fn from(a: UserAccount) -> Self {
        Self {
            user_id: a.user_id,
            email: a.email,
            is_admin: a.is_admin,
            created_at: a.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SetAdminRequest {
    pub is_admin: bool,
}

#[derive(Serialize, ToSchema)]
pub struct AdminStatsResponse {
    total_users: i64,
    total_cvs: i64,
    /// CVs created in the last seven days.
    recent_cvs: i64,
}

impl From<AdminStats> for AdminStatsResponse {
    fn from(s: AdminStats) -> Self {
        Self {
            total_users: s.total_users,
            total_cvs: s.total_cvs,
            recent_cvs: s.recent_cvs,
        }
    }
}

async fn require_admin(state: &AppState, auth: &AuthContext) -> Result<User, ApiError> {
    let user = auth.user(state).await?;
    if !user.is_admin {
        return Err(ApiError::Forbidden);
    }
    Ok(user)
}

//=========================================================================================
// Handlers
//=========================================================================================

/// List every CV in the system.
#[utoipa::path(
    get,
    path = "/admin/cvs",
    responses(
        (status = 200, description = "All CVs", body = [CvSummaryResponse]),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn admin_list_cvs_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<CvSummaryResponse>>, ApiError> {
    require_admin(&state, &auth).await?;
    Ok(summaries(state.cvs.list_all_records().await?))
}

/// List every account, newest first.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "All accounts", body = [UserAccountResponse]),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn admin_list_users_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<UserAccountResponse>>, ApiError> {
    require_admin(&state, &auth).await?;
    let users = state.accounts.list_users().await?;
    Ok(Json(users.into_iter().map(UserAccountResponse::from).collect()))
}

/// Delete an account along with its CVs.
#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    params(("id" = Uuid, Path, description = "The account id.")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Admins cannot delete themselves"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "No such account")
    )
)]
pub async fn admin_delete_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let admin = require_admin(&state, &auth).await?;
    if admin.user_id == user_id {
        return Err(ApiError::BadRequest(
            "Admins cannot delete their own account".to_string(),
        ));
    }
    state.accounts.delete_user(user_id).await?;
    info!(user_id = %user_id, admin_id = %admin.user_id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Grant or revoke admin rights.
#[utoipa::path(
    post,
    path = "/admin/users/{id}/admin",
    params(("id" = Uuid, Path, description = "The account id.")),
    request_body = SetAdminRequest,
    responses(
        (status = 200, description = "Updated account", body = AuthResponse),
        (status = 400, description = "Admins cannot revoke their own rights"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "No such account")
    )
)]
pub async fn admin_set_role_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SetAdminRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let admin = require_admin(&state, &auth).await?;
    if admin.user_id == user_id && !req.is_admin {
        return Err(ApiError::BadRequest(
            "Admins cannot revoke their own admin rights".to_string(),
        ));
    }
    let user = state.accounts.set_admin(user_id, req.is_admin).await?;
    info!(user_id = %user_id, is_admin = req.is_admin, "Admin rights changed");
    Ok(Json(AuthResponse::from(user)))
}

/// Account and CV counts.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses(
        (status = 200, description = "Headline counts", body = AdminStatsResponse),
        (status = 403, description = "Caller is not an admin")
    )
)]
pub async fn admin_stats_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<AdminStatsResponse>, ApiError> {
    require_admin(&state, &auth).await?;
    let since = Utc::now() - Duration::days(RECENT_CV_DAYS);
    let stats = state.accounts.admin_stats(since).await?;
    Ok(Json(AdminStatsResponse::from(stats)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AuthEventHub;
    use crate::config::Config;
    use async_trait::async_trait;
    use cv_builder_core::domain::{
        CvRecord, NewRecord, RecordScope, RecordSummary, RecordUpdate, UserCredentials,
    };
    use cv_builder_core::ports::{AccountStore, CvStore, PortError, PortResult};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Accounts {
        users: Mutex<Vec<UserAccount>>,
        stats_since: Mutex<Option<DateTime<Utc>>>,
    }

    impl Accounts {
        fn add(&self, is_admin: bool) -> Uuid {
            let user_id = Uuid::new_v4();
            self.users.lock().unwrap().push(UserAccount {
                user_id,
                email: Some(format!("{}@example.com", user_id)),
                is_admin,
                created_at: Utc::now(),
            });
            user_id
        }

        fn find(&self, user_id: Uuid) -> Option<UserAccount> {
            self.users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.user_id == user_id)
                .cloned()
        }
    }

    fn as_user(account: UserAccount) -> User {
        User {
            user_id: account.user_id,
            email: account.email,
            is_admin: account.is_admin,
        }
    }

    #[async_trait]
    impl AccountStore for Accounts {
        async fn create_user_with_email(&self, _: &str, _: &str) -> PortResult<User> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
            Err(PortError::NotFound(email.to_string()))
        }

        async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
            self.find(user_id)
                .map(as_user)
                .ok_or_else(|| PortError::NotFound(user_id.to_string()))
        }

        async fn create_auth_session(&self, _: &str, _: Uuid, _: DateTime<Utc>) -> PortResult<()> {
            Ok(())
        }

        async fn validate_auth_session(&self, _: &str) -> PortResult<Uuid> {
            Err(PortError::Unauthorized)
        }

        async fn delete_auth_session(&self, _: &str) -> PortResult<()> {
            Ok(())
        }

        async fn list_users(&self) -> PortResult<Vec<UserAccount>> {
            Ok(self.users.lock().unwrap().clone())
        }

        async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
            let mut users = self.users.lock().unwrap();
            let before = users.len();
            users.retain(|u| u.user_id != user_id);
            if users.len() == before {
                return Err(PortError::NotFound(user_id.to_string()));
            }
            Ok(())
        }

        async fn set_admin(&self, user_id: Uuid, is_admin: bool) -> PortResult<User> {
            let mut users = self.users.lock().unwrap();
            let account = users
                .iter_mut()
                .find(|u| u.user_id == user_id)
                .ok_or_else(|| PortError::NotFound(user_id.to_string()))?;
            account.is_admin = is_admin;
            Ok(as_user(account.clone()))
        }

        async fn admin_stats(&self, since: DateTime<Utc>) -> PortResult<AdminStats> {
            *self.stats_since.lock().unwrap() = Some(since);
            Ok(AdminStats {
                total_users: self.users.lock().unwrap().len() as i64,
                total_cvs: 3,
                recent_cvs: 1,
            })
        }
    }

    struct NoCvs;

    #[async_trait]
    impl CvStore for NoCvs {
        async fn create_record(&self, _: NewRecord) -> PortResult<CvRecord> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn update_record(&self, id: Uuid, _: RecordUpdate, _: RecordScope) -> PortResult<CvRecord> {
            Err(PortError::NotFound(id.to_string()))
        }

        async fn get_record(&self, id: Uuid, _: RecordScope) -> PortResult<CvRecord> {
            Err(PortError::NotFound(id.to_string()))
        }

        async fn list_records(&self, _: Uuid) -> PortResult<Vec<RecordSummary>> {
            Ok(Vec::new())
        }

        async fn search_records(&self, _: Uuid, _: &str) -> PortResult<Vec<RecordSummary>> {
            Ok(Vec::new())
        }

        async fn list_all_records(&self) -> PortResult<Vec<RecordSummary>> {
            Ok(Vec::new())
        }

        async fn delete_record(&self, id: Uuid, _: RecordScope) -> PortResult<()> {
            Err(PortError::NotFound(id.to_string()))
        }
    }

    fn app(accounts: Arc<Accounts>) -> Arc<AppState> {
        let config = Config::from_lookup(|key| {
            (key == "DATABASE_URL").then(|| "postgres://localhost/cv".to_string())
        })
        .unwrap();
        Arc::new(AppState {
            cvs: Arc::new(NoCvs),
            accounts,
            auth_events: AuthEventHub::new(),
            config: Arc::new(config),
        })
    }

    fn caller(user_id: Uuid) -> Extension<AuthContext> {
        Extension(AuthContext {
            user_id,
            auth_session_id: "s1".into(),
        })
    }

    #[tokio::test]
    async fn non_admins_are_forbidden() {
        let accounts = Arc::new(Accounts::default());
        let jane = accounts.add(false);
        let state = app(accounts);

        let users = admin_list_users_handler(State(state.clone()), caller(jane)).await;
        assert!(matches!(users, Err(ApiError::Forbidden)));
        let stats = admin_stats_handler(State(state.clone()), caller(jane)).await;
        assert!(matches!(stats, Err(ApiError::Forbidden)));
        let cvs = admin_list_cvs_handler(State(state), caller(jane)).await;
        assert!(matches!(cvs, Err(ApiError::Forbidden)));
    }

    #[tokio::test]
    async fn admin_promotes_and_deletes_users() {
        let accounts = Arc::new(Accounts::default());
        let admin = accounts.add(true);
        let jane = accounts.add(false);
        let state = app(accounts.clone());

        let Json(listed) = admin_list_users_handler(State(state.clone()), caller(admin))
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);

        let Json(updated) = admin_set_role_handler(
            State(state.clone()),
            caller(admin),
            Path(jane),
            Json(SetAdminRequest { is_admin: true }),
        )
        .await
        .unwrap();
        assert!(updated.is_admin);
        assert!(accounts.find(jane).unwrap().is_admin);

        let status = admin_delete_user_handler(State(state.clone()), caller(admin), Path(jane))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(accounts.find(jane).is_none());

        let again = admin_delete_user_handler(State(state), caller(admin), Path(jane)).await;
        assert!(matches!(again, Err(ApiError::Port(PortError::NotFound(_)))));
    }

    #[tokio::test]
    async fn admins_cannot_remove_themselves() {
        let accounts = Arc::new(Accounts::default());
        let admin = accounts.add(true);
        let state = app(accounts.clone());

        let deleted = admin_delete_user_handler(State(state.clone()), caller(admin), Path(admin)).await;
        assert!(matches!(deleted, Err(ApiError::BadRequest(_))));
        let demoted = admin_set_role_handler(
            State(state),
            caller(admin),
            Path(admin),
            Json(SetAdminRequest { is_admin: false }),
        )
        .await;
        assert!(matches!(demoted, Err(ApiError::BadRequest(_))));
        assert!(accounts.find(admin).unwrap().is_admin);
    }

    #[tokio::test]
    async fn stats_count_the_last_week() {
        let accounts = Arc::new(Accounts::default());
        let admin = accounts.add(true);
        let state = app(accounts.clone());

        let before = Utc::now();
        let Json(stats) = admin_stats_handler(State(state), caller(admin)).await.unwrap();
        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.total_cvs, 3);
        assert_eq!(stats.recent_cvs, 1);

        let since = accounts.stats_since.lock().unwrap().unwrap();
        let window = before - since;
        assert!(window <= Duration::days(RECENT_CV_DAYS));
        assert!(window > Duration::days(RECENT_CV_DAYS) - Duration::minutes(1));
    }
}
