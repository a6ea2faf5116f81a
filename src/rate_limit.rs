use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

use crate::models::Id;

/// Sliding window in-memory rate limiter (process local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled { return true; }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window { entry.pop_front(); } else { break; }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }

    /// Drops keys whose whole window has passed.
    pub fn sweep(&self, window: Duration) {
        let now = Instant::now();
        self.store.retain(|_, hits| {
            hits.back().map(|t| now.duration_since(*t) < window).unwrap_or(false)
        });
    }
}

/// Per-action limits, overridable through `RL_*` variables.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub post_limit: usize,
    pub post_window: Duration,
    pub comment_limit: usize,
    pub comment_window: Duration,
    pub auth_limit: usize,
    pub auth_window: Duration,
    pub contact_limit: usize,
    pub contact_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            post_limit: 5,
            post_window: Duration::from_secs(600),
            comment_limit: 20,
            comment_window: Duration::from_secs(60),
            auth_limit: 10,
            auth_window: Duration::from_secs(900),
            contact_limit: 3,
            contact_window: Duration::from_secs(3600),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        fn dur_env(name: &str, default: Duration) -> Duration {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        }
        let d = Self::default();
        Self {
            enabled: std::env::var("RL_ENABLED")
                .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
                .unwrap_or(d.enabled),
            post_limit: usize_env("RL_POST_LIMIT", d.post_limit),
            post_window: dur_env("RL_POST_WINDOW", d.post_window),
            comment_limit: usize_env("RL_COMMENT_LIMIT", d.comment_limit),
            comment_window: dur_env("RL_COMMENT_WINDOW", d.comment_window),
            auth_limit: usize_env("RL_AUTH_LIMIT", d.auth_limit),
            auth_window: dur_env("RL_AUTH_WINDOW", d.auth_window),
            contact_limit: usize_env("RL_CONTACT_LIMIT", d.contact_limit),
            contact_window: dur_env("RL_CONTACT_WINDOW", d.contact_window),
        }
    }

    fn longest_window(&self) -> Duration {
        [self.post_window, self.comment_window, self.auth_window, self.contact_window]
            .into_iter()
            .max()
            .unwrap_or_default()
    }
}

/// High level guard used by handlers.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self {
        Self { limiter, cfg }
    }

    pub fn from_config(cfg: RateLimitConfig) -> Self {
        Self::new(InMemoryRateLimiter::new(cfg.enabled), cfg)
    }

    pub fn allow_post(&self, user: Id) -> bool {
        self.limiter.check(&format!("post:{user}"), self.cfg.post_limit, self.cfg.post_window)
    }

    pub fn allow_comment(&self, user: Id) -> bool {
        self.limiter
            .check(&format!("comment:{user}"), self.cfg.comment_limit, self.cfg.comment_window)
    }

    pub fn allow_auth(&self, ip: &str) -> bool {
        self.limiter.check(&format!("auth:{ip}"), self.cfg.auth_limit, self.cfg.auth_window)
    }

    pub fn allow_contact(&self, ip: &str) -> bool {
        self.limiter
            .check(&format!("contact:{ip}"), self.cfg.contact_limit, self.cfg.contact_window)
    }

    pub fn sweep(&self) {
        self.limiter.sweep(self.cfg.longest_window())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn sliding_window_basic() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_millis(50);
        for _ in 0..3 { assert!(rl.check("k", 3, window)); }
        assert!(!rl.check("k", 3, window));
        std::thread::sleep(Duration::from_millis(60));
        assert!(rl.check("k", 3, window));
    }

    #[test]
    fn actions_are_limited_independently() {
        let cfg = RateLimitConfig { post_limit: 1, comment_limit: 1, ..RateLimitConfig::default() };
        let rl = RateLimiterFacade::from_config(cfg);
        assert!(rl.allow_post(1));
        assert!(!rl.allow_post(1));
        assert!(rl.allow_post(2));
        assert!(rl.allow_comment(1));
    }

    #[test]
    fn disabled_limiter_allows_everything() {
        let rl = RateLimiterFacade::from_config(RateLimitConfig {
            enabled: false,
            contact_limit: 0,
            ..RateLimitConfig::default()
        });
        assert!(rl.allow_contact("1.2.3.4"));
    }

    #[test]
    #[serial_test::serial]
    fn env_overrides() {
        std::env::set_var("RL_CONTACT_LIMIT", "7");
        std::env::set_var("RL_CONTACT_WINDOW", "nope");
        let cfg = RateLimitConfig::from_env();
        std::env::remove_var("RL_CONTACT_LIMIT");
        std::env::remove_var("RL_CONTACT_WINDOW");
        assert_eq!(cfg.contact_limit, 7);
        assert_eq!(cfg.contact_window, RateLimitConfig::default().contact_window);
    }
}
