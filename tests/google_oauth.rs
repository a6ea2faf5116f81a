#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::cookie::Cookie;
use actix_web::test::{self, TestRequest};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{harness, harness_with, test_config, Harness};
use medicoz::config::GoogleConfig;
use medicoz::models::AuthProvider;
use medicoz::repo::UserRepo;

async fn google_harness(server: &MockServer) -> Harness {
    let mut cfg = test_config();
    cfg.google = Some(GoogleConfig {
        client_id: "client-123".into(),
        client_secret: "shh".into(),
        redirect_uri: "http://localhost:8080/api/auth/google/callback".into(),
        auth_url: format!("{}/auth", server.uri()),
        token_url: format!("{}/token", server.uri()),
        userinfo_url: format!("{}/userinfo", server.uri()),
    });
    harness_with(cfg, None)
}

async fn mock_google(server: &MockServer, profile: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("code=good-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at-1", "token_type": "Bearer"})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .and(header("authorization", "Bearer at-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile))
        .mount(server)
        .await;
}

fn callback(state: &str, code: &str) -> TestRequest {
    TestRequest::get()
        .uri(&format!("/api/auth/google/callback?code={code}&state={state}"))
        .cookie(Cookie::new("medicoz.oauth_state", state.to_string()))
}

#[actix_web::test]
async fn unconfigured_google_is_unavailable() {
    let h = harness();
    let app = app!(h);
    let (status, _, _) = send!(app, TestRequest::get().uri("/api/auth/google"));
    assert_eq!(status, 503);
    let (status, _, _) = send!(app, callback("s", "c"));
    assert_eq!(status, 503);
}

#[actix_web::test]
async fn login_redirects_with_state_cookie() {
    let server = MockServer::start().await;
    let h = google_harness(&server).await;
    let app = app!(h);

    let resp = test::call_service(&app, TestRequest::get().uri("/api/auth/google").to_request()).await;
    assert_eq!(resp.status().as_u16(), 302);
    let location = resp.headers().get("location").unwrap().to_str().unwrap().to_string();
    assert!(location.starts_with(&format!("{}/auth?client_id=client-123", server.uri())));
    let state = resp
        .response()
        .cookies()
        .find(|c| c.name() == "medicoz.oauth_state")
        .map(|c| c.value().to_string())
        .expect("state cookie");
    assert!(location.contains(&format!("state={state}")));
}

#[actix_web::test]
async fn state_mismatch_is_rejected() {
    let server = MockServer::start().await;
    let h = google_harness(&server).await;
    let app = app!(h);

    let req = TestRequest::get()
        .uri("/api/auth/google/callback?code=good-code&state=attacker")
        .cookie(Cookie::new("medicoz.oauth_state", "mine"));
    let (status, body, cookie) = send!(app, req);
    assert_eq!(status, 400);
    assert_eq!(body["error"], "OAuth state mismatch");
    assert!(cookie.is_none());

    let (status, _, _) = send!(app, TestRequest::get().uri("/api/auth/google/callback?code=good-code&state=x"));
    assert_eq!(status, 400);
}

#[actix_web::test]
async fn callback_creates_a_verified_account() {
    let server = MockServer::start().await;
    mock_google(
        &server,
        json!({"sub": "g-42", "email": "Maya@Example.com", "name": "Maya Singh", "picture": "https://img.example/maya.png"}),
    )
    .await;
    let h = google_harness(&server).await;
    let app = app!(h);

    let resp = test::call_service(&app, callback("st8", "good-code").to_request()).await;
    assert_eq!(resp.status().as_u16(), 302);
    assert_eq!(resp.headers().get("location").unwrap(), "http://localhost:5173/xxperiment");
    let token = resp
        .response()
        .cookies()
        .find(|c| c.name() == "medicoz.sid")
        .map(|c| c.value().to_string())
        .expect("session cookie");

    let user = h.repo.find_user_by_email("maya@example.com").await.unwrap().expect("account created");
    assert!(user.is_verified);
    assert!(user.password_hash.is_none());
    assert_eq!(user.auth_provider, AuthProvider::Google);
    assert_eq!(user.oauth_id.as_deref(), Some("g-42"));
    assert_eq!(user.avatar_url.as_deref(), Some("https://img.example/maya.png"));
    assert_eq!(h.state.sessions.get(&token).unwrap().user_id, user.id);

    let (status, body, _) = send!(
        app,
        TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"email": "maya@example.com", "password": "whatever123"}))
    );
    assert_eq!(status, 401);
    assert_eq!(body["error"], "This account uses Google sign-in");
}

#[actix_web::test]
async fn callback_links_an_existing_local_account() {
    let server = MockServer::start().await;
    mock_google(&server, json!({"sub": "g-7", "email": "local@example.com", "name": "Local"})).await;
    let h = google_harness(&server).await;
    let app = app!(h);
    let (id, _) = signup!(app, "local");

    let resp = test::call_service(&app, callback("st8", "good-code").to_request()).await;
    assert_eq!(resp.status().as_u16(), 302);

    let user = h.repo.get_user(id).await.unwrap();
    assert_eq!(user.oauth_id.as_deref(), Some("g-7"));
    assert!(user.is_verified);
    assert!(user.password_hash.is_some());
}

#[actix_web::test]
async fn upstream_failure_is_a_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;
    let h = google_harness(&server).await;
    let app = app!(h);

    let (status, _, cookie) = send!(app, callback("st8", "stale-code"));
    assert_eq!(status, 502);
    assert!(cookie.is_none());
}
