use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::AppState;
use crate::auth::SessionUser;
use crate::error::ApiError;
use crate::models::{Id, Notification, NotificationQuery};

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(list))
        .route("/unread-count", web::get().to(unread_count))
        .route("/read-all", web::post().to(read_all))
        .route("/{id}/read", web::post().to(read_one));
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    pub unread_only: Option<bool>,
    /// Only notifications created after this instant (RFC 3339).
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    pub unread_count: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadAllResponse {
    pub updated: u64,
}

#[utoipa::path(
    get,
    path = "/api/notifications",
    params(ListParams),
    responses(
        (status = 200, description = "Newest notifications first", body = NotificationList),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn list(
    session: SessionUser,
    data: web::Data<AppState>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse, ApiError> {
    let q = NotificationQuery {
        unread_only: params.unread_only.unwrap_or(false),
        since: params.since,
        limit: params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
    };
    let notifications = data.repo.list_notifications(session.user_id, &q).await?;
    let unread_count = data.repo.count_unread(session.user_id).await?;
    Ok(HttpResponse::Ok().json(NotificationList { notifications, unread_count }))
}

#[utoipa::path(
    get,
    path = "/api/notifications/unread-count",
    responses(
        (status = 200, description = "Unread notifications", body = UnreadCount),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn unread_count(
    session: SessionUser,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let unread_count = data.repo.count_unread(session.user_id).await?;
    Ok(HttpResponse::Ok().json(UnreadCount { unread_count }))
}

#[utoipa::path(
    post,
    path = "/api/notifications/{id}/read",
    params(("id" = Id, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Marked read", body = Notification),
        (status = 404, description = "Not one of yours")
    )
)]
pub async fn read_one(
    session: SessionUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let n = data.repo.mark_read(session.user_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(n))
}

#[utoipa::path(
    post,
    path = "/api/notifications/read-all",
    responses(
        (status = 200, description = "Everything marked read", body = ReadAllResponse),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn read_all(
    session: SessionUser,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let updated = data.repo.mark_all_read(session.user_id).await?;
    Ok(HttpResponse::Ok().json(ReadAllResponse { updated }))
}
