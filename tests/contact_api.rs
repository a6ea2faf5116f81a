#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use std::sync::atomic::Ordering;

use actix_web::test::TestRequest;
use serde_json::{json, Value};

use common::{authed, harness, harness_with, test_config};
use medicoz::auth::Role;
use medicoz::models::ContactFilter;
use medicoz::repo::ContactRepo;

fn enquiry() -> Value {
    json!({
        "name": "Dr. Priya Rao",
        "email": "priya@clinic.example",
        "organization": "Rao Women's Clinic",
        "message": "We'd like to pilot the cycle tracker with our patients.",
        "intent": "pilot"
    })
}

#[actix_web::test]
async fn submission_is_stored_mirrored_and_announced() {
    let mut cfg = test_config();
    cfg.email.admin_email = Some("triage@medicoz.in".into());
    let h = harness_with(cfg, None);
    let app = app!(h);

    let (status, body, _) = send!(app, TestRequest::post().uri("/api/contact").set_json(enquiry()));
    assert_eq!(status, 201);
    let id = body["id"].as_i64().unwrap();

    let main = h.repo.get_contact(id).await.unwrap();
    assert_eq!(main.organization.as_deref(), Some("Rao Women's Clinic"));
    assert!(!main.is_read);
    let mirrored = h.admin_store.get_contact(id).await.unwrap();
    assert_eq!(mirrored.email, "priya@clinic.example");

    let mails = h.mailer.wait_for(1).await;
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].to, "triage@medicoz.in");
    assert!(mails[0].html.contains("Rao Women's Clinic"));
}

#[actix_web::test]
async fn no_alert_without_admin_address() {
    let h = harness();
    let app = app!(h);
    let (status, _, _) = send!(app, TestRequest::post().uri("/api/contact").set_json(enquiry()));
    assert_eq!(status, 201);
    actix_rt::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(h.mailer.sent().is_empty());
}

#[actix_web::test]
async fn submission_validation() {
    let h = harness();
    let app = app!(h);
    let cases = [
        ("name", json!("  ")),
        ("email", json!("nope")),
        ("message", json!("too short")),
        ("message", json!("x".repeat(5001))),
        ("organization", json!("o".repeat(201))),
        ("intent", json!("investment")),
    ];
    for (field, value) in cases {
        let mut payload = enquiry();
        payload[field] = value;
        let (status, _, _) = send!(app, TestRequest::post().uri("/api/contact").set_json(payload));
        assert_eq!(status, 400, "{field}");
    }
    assert!(h.admin_store.list_contacts(&ContactFilter::default()).await.unwrap().is_empty());
}

#[actix_web::test]
async fn triage_is_admin_only() {
    let h = harness();
    let app = app!(h);
    let (status, _, _) = send!(app, TestRequest::get().uri("/api/contact"));
    assert_eq!(status, 401);
    let (_, member) = signup!(app, "curious");
    let (status, _, _) = send!(app, authed(TestRequest::get().uri("/api/contact"), &member));
    assert_eq!(status, 403);
    let (mod_id, _) = signup!(app, "forum_mod");
    let moderator = h.session_as(mod_id, Role::Moderator).await;
    let (status, _, _) = send!(app, authed(TestRequest::get().uri("/api/contact"), &moderator));
    assert_eq!(status, 403);
}

#[actix_web::test]
async fn listing_filters_by_intent_and_unread() {
    let h = harness();
    let app = app!(h);
    let (admin_id, _) = signup!(app, "triage_admin");
    let admin = h.session_as(admin_id, Role::Admin).await;
    for intent in ["pilot", "careers", "careers"] {
        let mut payload = enquiry();
        payload["intent"] = json!(intent);
        send!(app, TestRequest::post().uri("/api/contact").set_json(payload));
    }

    let (status, all, _) = send!(app, authed(TestRequest::get().uri("/api/contact"), &admin));
    assert_eq!(status, 200);
    assert_eq!(all.as_array().unwrap().len(), 3);
    let (_, careers, _) = send!(app, authed(TestRequest::get().uri("/api/contact?intent=careers"), &admin));
    assert_eq!(careers.as_array().unwrap().len(), 2);

    let first = all[0]["id"].as_i64().unwrap();
    send!(app, authed(TestRequest::get().uri(&format!("/api/contact/{first}")), &admin));
    let (_, unread, _) = send!(app, authed(TestRequest::get().uri("/api/contact?unread=true"), &admin));
    assert_eq!(unread.as_array().unwrap().len(), 2);
}

#[actix_web::test]
async fn opening_marks_read_in_both_stores() {
    let h = harness();
    let app = app!(h);
    let (admin_id, _) = signup!(app, "reader_admin");
    let admin = h.session_as(admin_id, Role::Admin).await;
    let (_, body, _) = send!(app, TestRequest::post().uri("/api/contact").set_json(enquiry()));
    let id = body["id"].as_i64().unwrap();

    let (status, form, _) = send!(app, authed(TestRequest::get().uri(&format!("/api/contact/{id}")), &admin));
    assert_eq!(status, 200);
    assert_eq!(form["isRead"], true);
    assert!(h.admin_store.get_contact(id).await.unwrap().is_read);
    assert!(h.repo.get_contact(id).await.unwrap().is_read);

    let (status, form, _) = send!(
        app,
        authed(TestRequest::patch().uri(&format!("/api/contact/{id}")), &admin).set_json(json!({"isRead": false}))
    );
    assert_eq!(status, 200);
    assert_eq!(form["isRead"], false);
    assert!(!h.repo.get_contact(id).await.unwrap().is_read);

    let (status, _, _) = send!(app, authed(TestRequest::get().uri("/api/contact/9999"), &admin));
    assert_eq!(status, 404);
}

#[actix_web::test]
async fn reply_emails_the_sender_and_records_it() {
    let h = harness();
    let app = app!(h);
    let (admin_id, _) = signup!(app, "reply_admin");
    let admin = h.session_as(admin_id, Role::Admin).await;
    let (_, body, _) = send!(app, TestRequest::post().uri("/api/contact").set_json(enquiry()));
    let id = body["id"].as_i64().unwrap();
    let uri = format!("/api/contact/{id}/reply");

    let (status, _, _) = send!(app, authed(TestRequest::post().uri(&uri), &admin).set_json(json!({"message": "   "})));
    assert_eq!(status, 400);

    let (status, form, _) = send!(
        app,
        authed(TestRequest::post().uri(&uri), &admin).set_json(json!({"message": "Happy to set up a call next week."}))
    );
    assert_eq!(status, 200);
    assert_eq!(form["isReplied"], true);
    assert_eq!(form["replyMessage"], "Happy to set up a call next week.");
    assert!(form["repliedAt"].is_string());

    let to_sender = h.mailer.to("priya@clinic.example");
    assert_eq!(to_sender.len(), 1);
    assert!(to_sender[0].html.contains("Happy to set up a call next week."));
    assert!(h.repo.get_contact(id).await.unwrap().is_replied);
}

#[actix_web::test]
async fn failed_reply_email_leaves_form_unanswered() {
    let h = harness();
    let app = app!(h);
    let (admin_id, _) = signup!(app, "unlucky_admin");
    let admin = h.session_as(admin_id, Role::Admin).await;
    let (_, body, _) = send!(app, TestRequest::post().uri("/api/contact").set_json(enquiry()));
    let id = body["id"].as_i64().unwrap();

    h.mailer.fail.store(true, Ordering::SeqCst);
    let (status, body, _) = send!(
        app,
        authed(TestRequest::post().uri(&format!("/api/contact/{id}/reply")), &admin)
            .set_json(json!({"message": "This will bounce"}))
    );
    assert_eq!(status, 502);
    assert_eq!(body["error"], "Failed to send reply email");
    let form = h.admin_store.get_contact(id).await.unwrap();
    assert!(!form.is_replied);
    assert!(form.reply_message.is_none());
}
