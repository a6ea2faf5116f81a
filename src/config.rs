use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

/// Runtime configuration, read once at boot from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub frontend_url: String,
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub session_ttl_days: i64,
    pub bcrypt_cost: u32,
    pub data_dir: String,
    pub admin_data_dir: String,
    pub database_url: Option<String>,
    pub admin_database_url: Option<String>,
    pub google: Option<GoogleConfig>,
    pub email: EmailConfig,
    pub episodes_file: Option<String>,
    pub enable_hsts: bool,
}

#[derive(Clone, Debug)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub from: String,
    pub admin_email: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.resend.com".into(),
            from: "The XXperiment <noreply@medicoz.in>".into(),
            admin_email: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 8080,
            frontend_url: "http://localhost:5173".into(),
            cookie_name: "medicoz.sid".into(),
            cookie_secure: false,
            session_ttl_days: 7,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            data_dir: "data".into(),
            admin_data_dir: "data/admin".into(),
            database_url: None,
            admin_database_url: None,
            google: None,
            email: EmailConfig::default(),
            episodes_file: None,
            enable_hsts: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let google = match (opt("GOOGLE_CLIENT_ID"), opt("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GoogleConfig {
                client_id,
                client_secret,
                redirect_uri: string_or(
                    "GOOGLE_REDIRECT_URI",
                    "http://localhost:8080/api/auth/google/callback",
                ),
                auth_url: string_or(
                    "GOOGLE_AUTH_URL",
                    "https://accounts.google.com/o/oauth2/v2/auth",
                ),
                token_url: string_or("GOOGLE_TOKEN_URL", "https://oauth2.googleapis.com/token"),
                userinfo_url: string_or(
                    "GOOGLE_USERINFO_URL",
                    "https://www.googleapis.com/oauth2/v3/userinfo",
                ),
            }),
            _ => None,
        };
        Self {
            bind_addr: string_or("BIND_ADDR", &defaults.bind_addr),
            port: parse_or("PORT", defaults.port),
            frontend_url: string_or("FRONTEND_URL", &defaults.frontend_url),
            cookie_name: string_or("SESSION_COOKIE_NAME", &defaults.cookie_name),
            cookie_secure: flag("COOKIE_SECURE"),
            session_ttl_days: parse_or("SESSION_TTL_DAYS", defaults.session_ttl_days),
            bcrypt_cost: parse_or("BCRYPT_COST", defaults.bcrypt_cost),
            data_dir: string_or("DATA_DIR", &defaults.data_dir),
            admin_data_dir: string_or("ADMIN_DATA_DIR", &defaults.admin_data_dir),
            database_url: opt("DATABASE_URL"),
            admin_database_url: opt("ADMIN_DATABASE_URL"),
            google,
            email: EmailConfig {
                api_key: opt("RESEND_API_KEY"),
                api_base: string_or("EMAIL_API_BASE", &defaults.email.api_base),
                from: string_or("EMAIL_FROM", &defaults.email.from),
                admin_email: opt("ADMIN_EMAIL"),
            },
            episodes_file: opt("EPISODES_FILE"),
            enable_hsts: flag("ENABLE_HSTS"),
        }
    }

    /// Logs which optional integrations are wired up. Never prints secrets.
    pub fn log_summary(&self) {
        info!("Frontend URL: {}", self.frontend_url);
        info!("Google OAuth configured: {}", self.google.is_some());
        info!("Email provider configured: {}", self.email.api_key.is_some());
        info!("Admin contact alerts: {}", self.email.admin_email.is_some());
        if self.cookie_secure {
            info!("Session cookie marked Secure");
        } else {
            warn!("Session cookie not marked Secure (set COOKIE_SECURE=1 behind TLS)");
        }
    }
}

fn opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn string_or(key: &str, default: &str) -> String {
    opt(key).unwrap_or_else(|| default.to_string())
}

fn flag(key: &str) -> bool {
    opt(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match opt(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value '{raw}': {e}; using default {default}");
            default
        }),
    }
}
