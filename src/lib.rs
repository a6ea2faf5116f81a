pub mod auth;
pub mod config;
pub mod episodes;
pub mod error;
pub mod mailer;
pub mod models;
pub mod moderation;
pub mod notifications;
pub mod openapi;
pub mod rate_limit; // in-memory rate limiting
pub mod repo;
pub mod routes;
pub mod security;
pub mod session;
pub mod templates;

// Re-export commonly used items for tests / external users
pub use config::Config;
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
