use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::{ready, Ready};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::Id;
use crate::routes::AppState;

/// How long an email-verification link stays valid.
pub const VERIFICATION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Some(Role::User),
            "moderator" => Some(Role::Moderator),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn can_moderate(&self) -> bool {
        matches!(self, Role::Moderator | Role::Admin)
    }
}

/// Identity attached to a request through the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: Id,
    pub role: Role,
}

impl FromRequest for SessionUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, _pl: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            return ready(Err(ApiError::Internal));
        };
        let Some(cookie) = req.cookie(&state.config.cookie_name) else {
            return ready(Err(ApiError::Unauthorized("Authentication required".into())));
        };
        match state.sessions.get(cookie.value()) {
            Some(session) => ready(Ok(SessionUser {
                user_id: session.user_id,
                role: session.role,
            })),
            None => ready(Err(ApiError::Unauthorized("Session expired".into()))),
        }
    }
}

/// Helper macro for role-guarding handlers.
#[macro_export]
macro_rules! require_role {
    ($user:expr, $role:pat) => {
        if !matches!($user.role, $role) {
            return Err($crate::error::ApiError::Forbidden("Insufficient role".into()));
        }
    };
}

/// bcrypt hash, run off the async workers.
pub async fn hash_password(password: String, cost: u32) -> Result<String, ApiError> {
    web::block(move || bcrypt::hash(password, cost))
        .await
        .map_err(|_| ApiError::Internal)?
        .map_err(|e| {
            tracing::error!("bcrypt hash failed: {e}");
            ApiError::Internal
        })
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    web::block(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|_| ApiError::Internal)?
        .map_err(|e| {
            tracing::error!("bcrypt verify failed: {e}");
            ApiError::Internal
        })
}

/// 256 bits of randomness, hex encoded.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Only the digest of a verification token is stored.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// A fresh verification token: `(plaintext for the email, digest to store, expiry)`.
pub fn issue_verification_token() -> (String, String, DateTime<Utc>) {
    let token = random_token();
    let digest = token_digest(&token);
    (token, digest, Utc::now() + Duration::hours(VERIFICATION_TTL_HOURS))
}

/// 3-30 letters, digits or underscores.
pub static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{3,30}$").expect("username regex"));

pub fn valid_username(name: &str) -> bool {
    USERNAME_RE.is_match(name)
}

/// Turns an OAuth display name or email into a username candidate.
pub fn username_seed(name: Option<&str>, email: &str) -> String {
    let raw = name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or("member"));
    let mut seed: String = raw
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() {
                Some(c.to_ascii_lowercase())
            } else if c == ' ' || c == '.' || c == '-' || c == '_' {
                Some('_')
            } else {
                None
            }
        })
        .take(24)
        .collect();
    while seed.chars().count() < 3 {
        seed.push('_');
    }
    seed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        assert!(valid_username("dr_who42"));
        assert!(!valid_username("ab"));
        assert!(!valid_username("has space"));
        assert!(!valid_username(&"x".repeat(31)));
    }

    #[test]
    fn verification_token_digest_matches() {
        let (token, digest, expires) = issue_verification_token();
        assert_eq!(token.len(), 64);
        assert_eq!(token_digest(&token), digest);
        assert_ne!(token, digest);
        assert!(expires > Utc::now() + Duration::hours(23));
    }

    #[test]
    fn username_seed_from_name_or_email() {
        assert_eq!(username_seed(Some("Ada Lovelace"), "x@y.com"), "ada_lovelace");
        assert_eq!(username_seed(None, "jo@y.com"), "jo_");
        assert_eq!(username_seed(Some("  "), "grace.h@y.com"), "grace_h");
    }
}
