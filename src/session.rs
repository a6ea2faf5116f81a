use std::sync::Arc;

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::auth::{random_token, Role};
use crate::config::Config;
use crate::models::Id;

#[derive(Debug, Clone)]
pub struct SessionData {
    pub user_id: Id,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

/// Server-side session table. The cookie only carries the opaque key.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, SessionData>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl_days: i64) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn create(&self, user_id: Id, role: Role) -> String {
        let token = random_token();
        self.sessions.insert(
            token.clone(),
            SessionData {
                user_id,
                role,
                expires_at: Utc::now() + self.ttl,
            },
        );
        token
    }

    /// Looks up a live session, dropping it if it has expired.
    pub fn get(&self, token: &str) -> Option<SessionData> {
        let session = self.sessions.get(token)?.clone();
        if session.expires_at <= Utc::now() {
            self.sessions.remove(token);
            return None;
        }
        Some(session)
    }

    pub fn destroy(&self, token: &str) {
        self.sessions.remove(token);
    }

    /// Ends every session of a user (ban, role change).
    pub fn destroy_for_user(&self, user_id: Id) {
        self.sessions.retain(|_, s| s.user_id != user_id);
    }

    pub fn purge_expired(&self) -> usize {
        let before = self.sessions.len();
        let now = Utc::now();
        self.sessions.retain(|_, s| s.expires_at > now);
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[doc(hidden)]
    pub fn expire_now(&self, token: &str) {
        if let Some(mut s) = self.sessions.get_mut(token) {
            s.expires_at = Utc::now() - Duration::seconds(1);
        }
    }
}

pub fn session_cookie(cfg: &Config, token: String) -> Cookie<'static> {
    Cookie::build(cfg.cookie_name.clone(), token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(cfg.cookie_secure)
        .max_age(CookieDuration::days(cfg.session_ttl_days))
        .finish()
}

pub fn clear_cookie(cfg: &Config) -> Cookie<'static> {
    Cookie::build(cfg.cookie_name.clone(), "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(cfg.cookie_secure)
        .max_age(CookieDuration::ZERO)
        .finish()
}
