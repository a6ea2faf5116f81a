#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::test::TestRequest;
use chrono::{Duration, Utc};
use serde_json::json;

use common::{authed, harness, token_from, PASSWORD};
use medicoz::auth::{token_digest, Role};
use medicoz::repo::UserRepo;

#[actix_web::test]
async fn signup_opens_a_session_and_sends_verification() {
    let h = harness();
    let app = app!(h);
    let (id, token) = signup!(app, "ada_l");

    let (status, me, _) = send!(app, authed(TestRequest::get().uri("/api/auth/me"), &token));
    assert_eq!(status, 200);
    assert_eq!(me["user"]["id"], id);
    assert_eq!(me["user"]["isVerified"], false);
    assert_eq!(me["user"]["role"], "user");
    assert!(me["user"].get("passwordHash").is_none());

    let mails = h.mailer.wait_for(1).await;
    assert_eq!(mails[0].to, "ada_l@example.com");
    assert_eq!(token_from(&mails[0]).len(), 64);
}

#[actix_web::test]
async fn duplicate_email_or_username_is_rejected() {
    let h = harness();
    let app = app!(h);
    signup!(app, "grace");

    let (status, body, _) = send!(
        app,
        TestRequest::post().uri("/api/auth/signup").set_json(json!({
            "username": "someone_else", "email": "GRACE@example.com", "password": PASSWORD
        }))
    );
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Email already registered");

    let (status, body, _) = send!(
        app,
        TestRequest::post().uri("/api/auth/signup").set_json(json!({
            "username": "Grace", "email": "other@example.com", "password": PASSWORD
        }))
    );
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Username already taken");
}

#[actix_web::test]
async fn signup_validation() {
    let h = harness();
    let app = app!(h);
    for (username, email, password) in [
        ("ab", "a@example.com", PASSWORD),
        ("has space", "a@example.com", PASSWORD),
        ("valid_name", "not-an-email", PASSWORD),
        ("valid_name", "a@example.com", "short"),
    ] {
        let (status, _, cookie) = send!(
            app,
            TestRequest::post()
                .uri("/api/auth/signup")
                .set_json(json!({"username": username, "email": email, "password": password}))
        );
        assert_eq!(status, 400, "{username} / {email} / {password}");
        assert!(cookie.is_none());
    }

    let (status, body, _) = send!(
        app,
        TestRequest::post().uri("/api/auth/signup").insert_header(("content-type", "application/json")).set_payload("{nope")
    );
    assert_eq!(status, 400);
    assert!(body["error"].is_string());
}

#[actix_web::test]
async fn login_logout_cycle() {
    let h = harness();
    let app = app!(h);
    signup!(app, "lin");

    let (status, _, _) = send!(
        app,
        TestRequest::post().uri("/api/auth/login").set_json(json!({"email": "lin@example.com", "password": "wrong password"}))
    );
    assert_eq!(status, 401);

    let (status, _, _) = send!(
        app,
        TestRequest::post().uri("/api/auth/login").set_json(json!({"email": "nobody@example.com", "password": PASSWORD}))
    );
    assert_eq!(status, 401);

    let (status, body, cookie) = send!(
        app,
        TestRequest::post().uri("/api/auth/login").set_json(json!({"username": "LIN", "password": PASSWORD}))
    );
    assert_eq!(status, 200);
    assert_eq!(body["user"]["username"], "lin");
    let token = cookie.expect("session cookie");

    let (status, _, _) = send!(app, authed(TestRequest::post().uri("/api/auth/logout"), &token));
    assert_eq!(status, 200);
    let (status, _, _) = send!(app, authed(TestRequest::get().uri("/api/auth/me"), &token));
    assert_eq!(status, 401);
}

#[actix_web::test]
async fn me_requires_a_live_session() {
    let h = harness();
    let app = app!(h);
    let (status, body, _) = send!(app, TestRequest::get().uri("/api/auth/me"));
    assert_eq!(status, 401);
    assert_eq!(body["error"], "Authentication required");

    let (status, _, _) = send!(app, authed(TestRequest::get().uri("/api/auth/me"), "forged"));
    assert_eq!(status, 401);

    let (_, token) = signup!(app, "expiring");
    h.state.sessions.expire_now(&token);
    let (status, _, _) = send!(app, authed(TestRequest::get().uri("/api/auth/me"), &token));
    assert_eq!(status, 401);
}

#[actix_web::test]
async fn verification_token_is_single_use() {
    let h = harness();
    let app = app!(h);
    signup!(app, "vera");
    let mails = h.mailer.wait_for(1).await;
    let token = token_from(&mails[0]);

    let (status, body, _) =
        send!(app, TestRequest::post().uri("/api/auth/verify-email").set_json(json!({"token": token})));
    assert_eq!(status, 200);
    assert_eq!(body["user"]["isVerified"], true);

    let (status, _, _) =
        send!(app, TestRequest::post().uri("/api/auth/verify-email").set_json(json!({"token": token})));
    assert_eq!(status, 400);
}

#[actix_web::test]
async fn expired_verification_token_is_rejected() {
    let h = harness();
    let app = app!(h);
    let (id, _) = signup!(app, "late");
    let token = "ab".repeat(32);
    h.repo.set_verification(id, &token_digest(&token), Utc::now() - Duration::minutes(1)).await.unwrap();

    let (status, body, _) =
        send!(app, TestRequest::post().uri("/api/auth/verify-email").set_json(json!({"token": token})));
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid or expired verification token");
    assert!(!h.repo.get_user(id).await.unwrap().is_verified);
}

#[actix_web::test]
async fn resend_replaces_the_old_token() {
    let h = harness();
    let app = app!(h);
    let (_, session) = signup!(app, "resend");
    let first = token_from(&h.mailer.wait_for(1).await[0]);

    let (status, _, _) = send!(app, authed(TestRequest::post().uri("/api/auth/resend-verification"), &session));
    assert_eq!(status, 200);
    let second = token_from(&h.mailer.wait_for(2).await[1]);
    assert_ne!(first, second);

    let (status, _, _) =
        send!(app, TestRequest::post().uri("/api/auth/verify-email").set_json(json!({"token": first})));
    assert_eq!(status, 400);
    let (status, _, _) =
        send!(app, TestRequest::post().uri("/api/auth/verify-email").set_json(json!({"token": second})));
    assert_eq!(status, 200);

    let (status, _, _) = send!(app, authed(TestRequest::post().uri("/api/auth/resend-verification"), &session));
    assert_eq!(status, 400);
}

#[actix_web::test]
async fn banned_members_cannot_sign_in() {
    let h = harness();
    let app = app!(h);
    let (id, _) = signup!(app, "troll");
    h.repo.set_banned(id, true).await.unwrap();
    let (status, _, cookie) = send!(
        app,
        TestRequest::post().uri("/api/auth/login").set_json(json!({"email": "troll@example.com", "password": PASSWORD}))
    );
    assert_eq!(status, 403);
    assert!(cookie.is_none());
}

#[actix_web::test]
async fn profile_update() {
    let h = harness();
    let app = app!(h);
    let (_, token) = signup!(app, "first_name");
    signup!(app, "taken_name");

    let (status, body, _) = send!(
        app,
        authed(TestRequest::patch().uri("/api/auth/profile"), &token)
            .set_json(json!({"bio": "Gynecologist", "emailNotifications": false}))
    );
    assert_eq!(status, 200);
    assert_eq!(body["user"]["bio"], "Gynecologist");
    assert_eq!(body["user"]["emailNotifications"], false);

    let (status, _, _) = send!(
        app,
        authed(TestRequest::patch().uri("/api/auth/profile"), &token).set_json(json!({"username": "TAKEN_NAME"}))
    );
    assert_eq!(status, 400);

    let (status, _, _) = send!(
        app,
        authed(TestRequest::patch().uri("/api/auth/profile"), &token).set_json(json!({"avatarUrl": "javascript:alert(1)"}))
    );
    assert_eq!(status, 400);
}

#[actix_web::test]
async fn role_change_ends_existing_sessions() {
    let h = harness();
    let app = app!(h);
    let (admin_id, _) = signup!(app, "boss");
    let admin = h.session_as(admin_id, Role::Admin).await;
    let (member_id, member) = signup!(app, "member");

    let (status, body, _) = send!(
        app,
        authed(TestRequest::post().uri(&format!("/api/forum/users/{member_id}/role")), &admin)
            .set_json(json!({"role": "moderator"}))
    );
    assert_eq!(status, 200);
    assert_eq!(body["role"], "moderator");

    let (status, _, _) = send!(app, authed(TestRequest::get().uri("/api/auth/me"), &member));
    assert_eq!(status, 401);
}
