#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use actix_web::cookie::Cookie;
use actix_web::test::TestRequest;

use medicoz::auth::Role;
use medicoz::mailer::{Email, MailError, Mailer};
use medicoz::models::Id;
use medicoz::moderation::ContentModerator;
use medicoz::rate_limit::RateLimiterFacade;
use medicoz::repo::inmem::InMemRepo;
use medicoz::repo::UserRepo;
use medicoz::session::SessionStore;
use medicoz::{AppState, Config};

pub const PASSWORD: &str = "correct horse";

/// Captures outgoing email instead of talking to a provider.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError::Rejected(500));
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }

    pub fn to(&self, addr: &str) -> Vec<Email> {
        self.sent().into_iter().filter(|e| e.to == addr).collect()
    }

    /// Spawned sends land a little after the response; poll for them.
    pub async fn wait_for(&self, count: usize) -> Vec<Email> {
        for _ in 0..100 {
            if self.sent.lock().unwrap().len() >= count {
                break;
            }
            actix_rt::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent()
    }
}

pub struct Harness {
    pub state: AppState,
    pub repo: Arc<InMemRepo>,
    pub admin_store: Arc<InMemRepo>,
    pub mailer: Arc<RecordingMailer>,
}

pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.bcrypt_cost = 4;
    cfg
}

pub fn harness() -> Harness {
    harness_with(test_config(), None)
}

pub fn harness_with(config: Config, rate_limiter: Option<RateLimiterFacade>) -> Harness {
    let repo = Arc::new(InMemRepo::ephemeral());
    let admin_store = Arc::new(InMemRepo::ephemeral());
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState {
        repo: repo.clone(),
        admin_contacts: admin_store.clone(),
        sessions: SessionStore::new(config.session_ttl_days),
        mailer: mailer.clone(),
        moderator: ContentModerator::new(),
        config: Arc::new(config),
        rate_limiter,
    };
    Harness { state, repo, admin_store, mailer }
}

impl Harness {
    /// Gives an existing account a role and returns a session token carrying it.
    pub async fn session_as(&self, user_id: Id, role: Role) -> String {
        self.repo.set_role(user_id, role).await.unwrap();
        self.state.sessions.create(user_id, role)
    }
}

pub fn authed(req: TestRequest, token: &str) -> TestRequest {
    req.cookie(Cookie::new("medicoz.sid", token.to_string()))
}

/// Pulls the verification token out of an emailed link.
pub fn token_from(email: &Email) -> String {
    let start = email.html.find("token=").expect("link with token") + "token=".len();
    email.html[start..].chars().take_while(|c| c.is_ascii_hexdigit()).collect()
}

/// Builds the app for a harness.
#[macro_export]
macro_rules! app {
    ($h:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($h.state.clone()))
                .wrap(medicoz::SecurityHeaders::default())
                .configure(medicoz::config),
        )
        .await
    };
}

/// Sends a request; yields `(status, json body, session cookie if set)`.
#[macro_export]
macro_rules! send {
    ($app:expr, $req:expr) => {{
        let resp = actix_web::test::call_service(&$app, $req.to_request()).await;
        let status = resp.status().as_u16();
        let cookie = resp
            .response()
            .cookies()
            .find(|c| c.name() == "medicoz.sid")
            .map(|c| c.value().to_string());
        let body = actix_web::test::read_body(resp).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json, cookie)
    }};
}

/// Signs a new member up; yields `(user id, session token)`.
#[macro_export]
macro_rules! signup {
    ($app:expr, $name:expr) => {{
        let name: &str = $name;
        let (status, body, cookie) = send!(
            $app,
            actix_web::test::TestRequest::post().uri("/api/auth/signup").set_json(serde_json::json!({
                "username": name,
                "email": format!("{name}@example.com"),
                "password": common::PASSWORD,
            }))
        );
        assert_eq!(status, 201, "signup {name}: {body}");
        (body["user"]["id"].as_i64().unwrap(), cookie.expect("session cookie"))
    }};
}

/// Creates a post as `token`; yields its id.
#[macro_export]
macro_rules! create_post {
    ($app:expr, $token:expr, $title:expr, $content:expr) => {{
        let (status, body, _) = send!(
            $app,
            common::authed(actix_web::test::TestRequest::post().uri("/api/forum/posts"), &$token)
                .set_json(serde_json::json!({"title": $title, "content": $content}))
        );
        assert_eq!(status, 201, "create post: {body}");
        body["id"].as_i64().unwrap()
    }};
}
