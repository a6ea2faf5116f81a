use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::SessionUser;
use crate::config::Config;
use crate::error::ApiError;
use crate::mailer::Mailer;
use crate::models::User;
use crate::moderation::ContentModerator;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::{ContactRepo, RepoError, Repo};
use crate::session::SessionStore;

pub mod auth;
pub mod contact;
pub mod forum;
pub mod notifications;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(64 * 1024)
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .route("/api/health", web::get().to(health))
    .service(web::scope("/api/auth").configure(auth::config))
    .service(web::scope("/api/forum").configure(forum::config))
    .service(web::scope("/api/contact").configure(contact::config))
    .service(web::scope("/api/notifications").configure(notifications::config));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    /// Secondary store holding the mirrored contact forms the admin panel reads.
    pub admin_contacts: Arc<dyn ContactRepo>,
    pub sessions: SessionStore,
    pub mailer: Arc<dyn Mailer>,
    pub moderator: ContentModerator,
    pub config: Arc<Config>,
    pub rate_limiter: Option<RateLimiterFacade>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { message: msg.into() }
    }
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

/// The account behind the session. A session outliving its user reads as signed out.
pub(crate) async fn current_user(
    state: &AppState,
    session: &SessionUser,
) -> Result<User, ApiError> {
    match state.repo.get_user(session.user_id).await {
        Ok(u) => Ok(u),
        Err(RepoError::NotFound) => Err(ApiError::Unauthorized("Authentication required".into())),
        Err(e) => Err(e.into()),
    }
}

/// Like [`current_user`], but banned members are refused.
pub(crate) async fn active_user(state: &AppState, session: &SessionUser) -> Result<User, ApiError> {
    let user = current_user(state, session).await?;
    if user.is_banned {
        return Err(ApiError::Forbidden("Your account has been banned".into()));
    }
    Ok(user)
}

pub(crate) fn client_ip(req: &HttpRequest) -> String {
    req.connection_info().realip_remote_addr().unwrap_or("unknown").to_string()
}

pub(crate) fn check_rate(
    state: &AppState,
    allow: impl FnOnce(&RateLimiterFacade) -> bool,
) -> Result<(), ApiError> {
    match &state.rate_limiter {
        Some(rl) if !allow(rl) => Err(ApiError::TooManyRequests),
        _ => Ok(()),
    }
}

pub(crate) fn frontend_link(state: &AppState, path: &str) -> String {
    format!("{}{path}", state.config.frontend_url.trim_end_matches('/'))
}
