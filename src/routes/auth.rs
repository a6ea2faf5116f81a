use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

use super::{
    active_user, check_rate, client_ip, current_user, frontend_link, AppState, MessageResponse,
};
use crate::auth::{
    hash_password, issue_verification_token, random_token, token_digest, username_seed,
    valid_username, verify_password, SessionUser, USERNAME_RE,
};
use crate::config::GoogleConfig;
use crate::error::ApiError;
use crate::mailer;
use crate::models::{AuthProvider, NewUser, UpdateProfile, User, UserView};
use crate::repo::RepoError;
use crate::session::{clear_cookie, session_cookie};
use crate::templates;

const OAUTH_STATE_COOKIE: &str = "medicoz.oauth_state";
const MAX_BIO: usize = 500;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/signup", web::post().to(signup))
        .route("/login", web::post().to(login))
        .route("/logout", web::post().to(logout))
        .route("/me", web::get().to(me))
        .route("/profile", web::patch().to(update_profile))
        .route("/verify-email", web::post().to(verify_email))
        .route("/resend-verification", web::post().to(resend_verification))
        .route("/google", web::get().to(google_login))
        .route("/google/callback", web::get().to(google_callback));
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SignupRequest {
    #[validate(regex(
        path = *USERNAME_RE,
        message = "Username must be 3-30 characters of letters, numbers or underscores"
    ))]
    pub username: String,
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

/// Either `email` or `username` identifies the account.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserView,
}

fn signed_in(state: &AppState, status: actix_web::http::StatusCode, user: &User) -> HttpResponse {
    let token = state.sessions.create(user.id, user.role);
    HttpResponse::build(status)
        .cookie(session_cookie(&state.config, token))
        .json(AuthResponse { user: user.into() })
}

fn send_verification(state: &AppState, user: &User, token: &str) {
    let link = frontend_link(state, &format!("/verify-email?token={token}"));
    let email = templates::verification(&user.email, &user.username, &link);
    mailer::dispatch(state.mailer.clone(), email);
}

#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created and signed in", body = AuthResponse),
        (status = 400, description = "Invalid input or duplicate email/username"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn signup(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<SignupRequest>,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, |rl| rl.allow_auth(&client_ip(&req)))?;
    let mut req = payload.into_inner();
    req.username = req.username.trim().to_string();
    req.email = req.email.trim().to_lowercase();
    req.validate()?;
    let SignupRequest { username, email, password } = req;
    let password_hash = hash_password(password, data.config.bcrypt_cost).await?;
    let user = data
        .repo
        .create_user(NewUser {
            username,
            email,
            password_hash: Some(password_hash),
            auth_provider: AuthProvider::Local,
            oauth_id: None,
            avatar_url: None,
            is_verified: false,
        })
        .await?;
    let (token, digest, expires_at) = issue_verification_token();
    data.repo.set_verification(user.id, &digest, expires_at).await?;
    send_verification(&data, &user, &token);
    info!(user_id = user.id, "account created");
    Ok(signed_in(&data, actix_web::http::StatusCode::CREATED, &user))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account banned")
    )
)]
pub async fn login(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    check_rate(&data, |rl| rl.allow_auth(&client_ip(&req)))?;
    let LoginRequest { email, username, password } = payload.into_inner();
    let found = match (email, username) {
        (Some(e), _) => data.repo.find_user_by_email(&e.trim().to_lowercase()).await?,
        (None, Some(u)) => data.repo.find_user_by_username(u.trim()).await?,
        (None, None) => return Err(ApiError::BadRequest("Email or username is required".into())),
    };
    let invalid = || ApiError::Unauthorized("Invalid credentials".into());
    let user = found.ok_or_else(invalid)?;
    let Some(hash) = user.password_hash.clone() else {
        return Err(ApiError::Unauthorized("This account uses Google sign-in".into()));
    };
    if !verify_password(password, hash).await? {
        return Err(invalid());
    }
    if user.is_banned {
        return Err(ApiError::Forbidden("Your account has been banned".into()));
    }
    Ok(signed_in(&data, actix_web::http::StatusCode::OK, &user))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 200, description = "Session ended", body = MessageResponse))
)]
pub async fn logout(req: HttpRequest, data: web::Data<AppState>) -> HttpResponse {
    if let Some(c) = req.cookie(&data.config.cookie_name) {
        data.sessions.destroy(c.value());
    }
    HttpResponse::Ok()
        .cookie(clear_cookie(&data.config))
        .json(MessageResponse::new("Logged out"))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Signed-in account", body = AuthResponse),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn me(session: SessionUser, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = current_user(&data, &session).await?;
    Ok(HttpResponse::Ok().json(AuthResponse { user: (&user).into() }))
}

#[utoipa::path(
    patch,
    path = "/api/auth/profile",
    request_body = UpdateProfile,
    responses(
        (status = 200, description = "Profile updated", body = AuthResponse),
        (status = 400, description = "Invalid input or username taken"),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn update_profile(
    session: SessionUser,
    data: web::Data<AppState>,
    payload: web::Json<UpdateProfile>,
) -> Result<HttpResponse, ApiError> {
    let mut upd = payload.into_inner();
    if let Some(name) = upd.username.as_mut() {
        *name = name.trim().to_string();
        if !valid_username(name) {
            return Err(ApiError::BadRequest(
                "Username must be 3-30 characters of letters, numbers or underscores".into(),
            ));
        }
    }
    if upd.bio.as_ref().map(|b| b.chars().count() > MAX_BIO).unwrap_or(false) {
        return Err(ApiError::BadRequest("Bio must be at most 500 characters".into()));
    }
    if let Some(url) = upd.avatar_url.as_deref() {
        if !url.is_empty() && !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ApiError::BadRequest("Avatar must be an http(s) URL".into()));
        }
    }
    let user = data.repo.update_profile(session.user_id, upd).await?;
    Ok(HttpResponse::Ok().json(AuthResponse { user: (&user).into() }))
}

#[utoipa::path(
    post,
    path = "/api/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = AuthResponse),
        (status = 400, description = "Unknown, used or expired token")
    )
)]
pub async fn verify_email(
    data: web::Data<AppState>,
    payload: web::Json<VerifyEmailRequest>,
) -> Result<HttpResponse, ApiError> {
    let invalid = || ApiError::BadRequest("Invalid or expired verification token".into());
    let user = data
        .repo
        .find_user_by_verification(&token_digest(payload.token.trim()))
        .await?
        .ok_or_else(invalid)?;
    if user.verification_expires_at.map(|t| t <= Utc::now()).unwrap_or(true) {
        return Err(invalid());
    }
    let user = data.repo.mark_verified(user.id).await?;
    info!(user_id = user.id, "email verified");
    Ok(HttpResponse::Ok().json(AuthResponse { user: (&user).into() }))
}

#[utoipa::path(
    post,
    path = "/api/auth/resend-verification",
    responses(
        (status = 200, description = "A new link was sent", body = MessageResponse),
        (status = 400, description = "Already verified"),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn resend_verification(
    session: SessionUser,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let user = active_user(&data, &session).await?;
    if user.is_verified {
        return Err(ApiError::BadRequest("Email already verified".into()));
    }
    let (token, digest, expires_at) = issue_verification_token();
    data.repo.set_verification(user.id, &digest, expires_at).await?;
    send_verification(&data, &user, &token);
    Ok(HttpResponse::Ok().json(MessageResponse::new("Verification email sent")))
}

fn google(data: &AppState) -> Result<&GoogleConfig, ApiError> {
    data.config
        .google
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Google sign-in is not configured".into()))
}

#[utoipa::path(
    get,
    path = "/api/auth/google",
    responses(
        (status = 302, description = "Redirect to Google consent screen"),
        (status = 503, description = "Google sign-in not configured")
    )
)]
pub async fn google_login(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let g = google(&data)?;
    let state = random_token();
    let url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&prompt=select_account",
        g.auth_url,
        urlencoding::encode(&g.client_id),
        urlencoding::encode(&g.redirect_uri),
        urlencoding::encode("openid email profile"),
        state
    );
    let cookie = Cookie::build(OAUTH_STATE_COOKIE, state)
        .path("/api/auth/google")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(data.config.cookie_secure)
        .max_age(CookieDuration::minutes(10))
        .finish();
    Ok(HttpResponse::Found().insert_header(("Location", url)).cookie(cookie).finish())
}

#[derive(Debug, Deserialize)]
pub struct GoogleCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct GoogleToken {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleProfile {
    sub: String,
    email: String,
    name: Option<String>,
    picture: Option<String>,
}

async fn fetch_google_profile(g: &GoogleConfig, code: &str) -> Result<GoogleProfile, ApiError> {
    let upstream = |e: reqwest::Error| {
        warn!("google oauth exchange failed: {e}");
        ApiError::BadGateway("Google sign-in failed".into())
    };
    let client = reqwest::Client::new();
    let token = client
        .post(&g.token_url)
        .form(&[
            ("code", code),
            ("client_id", g.client_id.as_str()),
            ("client_secret", g.client_secret.as_str()),
            ("redirect_uri", g.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(upstream)?
        .json::<GoogleToken>()
        .await
        .map_err(upstream)?;
    client
        .get(&g.userinfo_url)
        .bearer_auth(token.access_token)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(upstream)?
        .json::<GoogleProfile>()
        .await
        .map_err(upstream)
}

/// Finds the account for a Google profile, creating one with a free username.
async fn user_for_profile(data: &AppState, profile: GoogleProfile) -> Result<User, ApiError> {
    let email = profile.email.trim().to_lowercase();
    if let Some(user) = data.repo.find_user_by_email(&email).await? {
        if user.oauth_id.as_deref() == Some(profile.sub.as_str()) && user.is_verified {
            return Ok(user);
        }
        return Ok(data.repo.link_oauth(user.id, &profile.sub).await?);
    }
    let seed = username_seed(profile.name.as_deref(), &email);
    for attempt in 0..20 {
        let candidate = if attempt == 0 {
            seed.clone()
        } else {
            let suffix = rand::thread_rng().gen_range(1000..10000).to_string();
            format!("{}{suffix}", seed.chars().take(30 - suffix.len()).collect::<String>())
        };
        let created = data
            .repo
            .create_user(NewUser {
                username: candidate,
                email: email.clone(),
                password_hash: None,
                auth_provider: AuthProvider::Google,
                oauth_id: Some(profile.sub.clone()),
                avatar_url: profile.picture.clone(),
                is_verified: true,
            })
            .await;
        match created {
            Ok(user) => {
                info!(user_id = user.id, "account created via google");
                return Ok(user);
            }
            Err(RepoError::Conflict(msg)) if msg.contains("Username") => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::Internal)
}

#[utoipa::path(
    get,
    path = "/api/auth/google/callback",
    responses(
        (status = 302, description = "Signed in, redirect to the forum"),
        (status = 400, description = "State mismatch or consent denied"),
        (status = 502, description = "Google did not answer"),
        (status = 503, description = "Google sign-in not configured")
    )
)]
pub async fn google_callback(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<GoogleCallback>,
) -> Result<HttpResponse, ApiError> {
    let g = google(&data)?;
    let query = query.into_inner();
    if let Some(err) = query.error {
        return Err(ApiError::BadRequest(format!("Google sign-in was cancelled: {err}")));
    }
    let expected = req.cookie(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    match (expected, query.state) {
        (Some(a), Some(b)) if !a.is_empty() && a == b => {}
        _ => return Err(ApiError::BadRequest("OAuth state mismatch".into())),
    }
    let code = query.code.ok_or_else(|| ApiError::BadRequest("Missing authorization code".into()))?;
    let profile = fetch_google_profile(g, &code).await?;
    let user = user_for_profile(&data, profile).await?;
    if user.is_banned {
        return Err(ApiError::Forbidden("Your account has been banned".into()));
    }
    let token = data.sessions.create(user.id, user.role);
    let mut expire_state = Cookie::build(OAUTH_STATE_COOKIE, "").path("/api/auth/google").finish();
    expire_state.make_removal();
    Ok(HttpResponse::Found()
        .insert_header(("Location", frontend_link(&data, "/xxperiment")))
        .cookie(session_cookie(&data.config, token))
        .cookie(expire_state)
        .finish())
}
