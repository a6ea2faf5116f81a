use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::{check_rate, client_ip, frontend_link, AppState};
use crate::auth::{Role, SessionUser};
use crate::error::ApiError;
use crate::mailer;
use crate::models::{ContactFilter, ContactUpdate, Id, Intent, NewContact};
use crate::require_role;
use crate::templates;


pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::post().to(submit))
            .route(web::get().to(list)),
    )
    .service(
        web::resource("/{id}")
            .route(web::get().to(get_one))
            .route(web::patch().to(update)),
    )
    .route("/{id}/reply", web::post().to(reply));
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitResponse {
    pub message: String,
    pub id: Id,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    pub intent: Option<Intent>,
    /// Only forms not yet opened by an admin.
    pub unread: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ReplyRequest {
    #[validate(length(min = 1, max = 10000, message = "Reply must be 1-10000 characters"))]
    pub message: String,
}

/// Trims the submission in place, then checks it.
fn normalize(new: &mut NewContact) -> Result<(), ApiError> {
    new.name = new.name.trim().to_string();
    new.email = new.email.trim().to_string();
    new.message = new.message.trim().to_string();
    new.organization = new
        .organization
        .take()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty());
    new.validate()?;
    Ok(())
}

/// Applies an admin change to the main store's copy; the admin store is authoritative.
async fn sync_main(data: &AppState, id: Id, upd: ContactUpdate) {
    if let Err(e) = data.repo.update_contact(id, upd).await {
        warn!(contact_id = id, "main store contact update failed: {e}");
    }
}

#[utoipa::path(
    post,
    path = "/api/contact",
    request_body = NewContact,
    responses(
        (status = 201, description = "Submission stored", body = SubmitResponse),
        (status = 400, description = "Invalid input"),
        (status = 429, description = "Too many submissions")
    )
)]
pub async fn submit(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<NewContact>,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, |rl| rl.allow_contact(&client_ip(&req)))?;
    let mut new = payload.into_inner();
    normalize(&mut new)?;
    let form = data.repo.create_contact(new).await?;
    if let Err(e) = data.admin_contacts.mirror_contact(&form).await {
        error!(contact_id = form.id, "mirroring contact form to admin store failed: {e}");
    }
    match &data.config.email.admin_email {
        Some(admin) => {
            let link = frontend_link(&data, &format!("/admin/contacts/{}", form.id));
            mailer::dispatch(data.mailer.clone(), templates::contact_alert(admin, &form, &link));
        }
        None => info!(contact_id = form.id, "ADMIN_EMAIL unset; skipping contact alert"),
    }
    info!(contact_id = form.id, intent = form.intent.as_str(), "contact form received");
    Ok(HttpResponse::Created().json(SubmitResponse {
        message: "Thanks for reaching out. We'll be in touch soon.".into(),
        id: form.id,
    }))
}

#[utoipa::path(
    get,
    path = "/api/contact",
    params(ListParams),
    responses(
        (status = 200, description = "Contact forms, newest first", body = [ContactForm]),
        (status = 403, description = "Admins only")
    )
)]
pub async fn list(
    session: SessionUser,
    data: web::Data<AppState>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse, ApiError> {
    require_role!(session, Role::Admin);
    let filter = ContactFilter {
        intent: params.intent,
        unread_only: params.unread.unwrap_or(false),
    };
    Ok(HttpResponse::Ok().json(data.admin_contacts.list_contacts(&filter).await?))
}

#[utoipa::path(
    get,
    path = "/api/contact/{id}",
    params(("id" = Id, Path, description = "Contact form id")),
    responses(
        (status = 200, description = "The form, now marked read", body = ContactForm),
        (status = 403, description = "Admins only"),
        (status = 404, description = "No such form")
    )
)]
pub async fn get_one(
    session: SessionUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    require_role!(session, Role::Admin);
    let id = path.into_inner();
    let mut form = data.admin_contacts.get_contact(id).await?;
    if !form.is_read {
        let read = || ContactUpdate { is_read: Some(true), ..ContactUpdate::default() };
        form = data.admin_contacts.update_contact(id, read()).await?;
        sync_main(&data, id, read()).await;
    }
    Ok(HttpResponse::Ok().json(form))
}

#[utoipa::path(
    patch,
    path = "/api/contact/{id}",
    request_body = ContactUpdate,
    params(("id" = Id, Path, description = "Contact form id")),
    responses(
        (status = 200, description = "Flags updated", body = ContactForm),
        (status = 403, description = "Admins only"),
        (status = 404, description = "No such form")
    )
)]
pub async fn update(
    session: SessionUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ContactUpdate>,
) -> Result<HttpResponse, ApiError> {
    require_role!(session, Role::Admin);
    let id = path.into_inner();
    let upd = payload.into_inner();
    let form = data.admin_contacts.update_contact(id, upd.clone()).await?;
    sync_main(&data, id, upd).await;
    Ok(HttpResponse::Ok().json(form))
}

#[utoipa::path(
    post,
    path = "/api/contact/{id}/reply",
    request_body = ReplyRequest,
    params(("id" = Id, Path, description = "Contact form id")),
    responses(
        (status = 200, description = "Reply sent and recorded", body = ContactForm),
        (status = 400, description = "Empty reply"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "No such form"),
        (status = 502, description = "Email provider failed")
    )
)]
pub async fn reply(
    session: SessionUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ReplyRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role!(session, Role::Admin);
    let id = path.into_inner();
    let mut req = payload.into_inner();
    req.message = req.message.trim().to_string();
    req.validate()?;
    let message = req.message;
    let form = data.admin_contacts.get_contact(id).await?;
    data.mailer.send(templates::contact_reply(&form, &message)).await.map_err(|e| {
        error!(contact_id = id, "contact reply email failed: {e}");
        ApiError::BadGateway("Failed to send reply email".into())
    })?;
    let replied = || ContactUpdate {
        is_read: Some(true),
        is_replied: Some(true),
        reply_message: Some(message.clone()),
    };
    let form = data.admin_contacts.update_contact(id, replied()).await?;
    sync_main(&data, id, replied()).await;
    info!(contact_id = id, by = session.user_id, "contact form answered");
    Ok(HttpResponse::Ok().json(form))
}
