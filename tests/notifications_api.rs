#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::test::TestRequest;
use serde_json::json;

use common::{authed, harness};

#[actix_web::test]
async fn comment_notifies_the_post_author() {
    let h = harness();
    let app = app!(h);
    let (_, author) = signup!(app, "notified");
    let (commenter_id, commenter) = signup!(app, "chatty");
    let id = create_post!(app, author, "Ask me anything", "About endometriosis");

    let (status, _, _) = send!(
        app,
        authed(TestRequest::post().uri(&format!("/api/forum/posts/{id}/comments")), &author)
            .set_json(json!({"content": "Talking to myself"}))
    );
    assert_eq!(status, 201);
    let (_, body, _) = send!(app, authed(TestRequest::get().uri("/api/notifications/unread-count"), &author));
    assert_eq!(body["unreadCount"], 0);

    send!(
        app,
        authed(TestRequest::post().uri(&format!("/api/forum/posts/{id}/comments")), &commenter)
            .set_json(json!({"content": "How long was your diagnosis?"}))
    );
    let (status, body, _) = send!(app, authed(TestRequest::get().uri("/api/notifications"), &author));
    assert_eq!(status, 200);
    assert_eq!(body["unreadCount"], 1);
    let n = &body["notifications"][0];
    assert_eq!(n["kind"], "comment");
    assert_eq!(n["actorId"], commenter_id);
    assert_eq!(n["actorUsername"], "chatty");
    assert_eq!(n["postId"], id);
    assert_eq!(n["isRead"], false);
    assert_eq!(n["message"], "chatty commented on \"Ask me anything\"");

    h.mailer.wait_for(3).await;
    let mails = h.mailer.to("notified@example.com");
    assert_eq!(mails.len(), 2, "verification plus one comment alert");
    assert!(mails[1].html.contains(&format!("/xxperiment/posts/{id}")));
}

#[actix_web::test]
async fn reply_notifies_parent_and_post_authors() {
    let h = harness();
    let app = app!(h);
    let (_, op) = signup!(app, "thread_op");
    let (_, first) = signup!(app, "first_voice");
    let (_, second) = signup!(app, "second_voice");
    let id = create_post!(app, op, "PCOS diets", "What worked?");
    let uri = format!("/api/forum/posts/{id}/comments");

    let (_, top, _) = send!(app, authed(TestRequest::post().uri(&uri), &first).set_json(json!({"content": "Low GI helped"})));
    send!(
        app,
        authed(TestRequest::post().uri(&uri), &second)
            .set_json(json!({"content": "Same here", "parentCommentId": top["id"]}))
    );

    let (_, body, _) = send!(app, authed(TestRequest::get().uri("/api/notifications"), &first));
    assert_eq!(body["notifications"].as_array().unwrap().len(), 1);
    assert_eq!(body["notifications"][0]["kind"], "reply");

    let (_, body, _) = send!(app, authed(TestRequest::get().uri("/api/notifications"), &op));
    let kinds: Vec<_> = body["notifications"].as_array().unwrap().iter().map(|n| n["kind"].clone()).collect();
    assert_eq!(kinds, vec![json!("comment"), json!("comment")]);
}

#[actix_web::test]
async fn reading_notifications() {
    let h = harness();
    let app = app!(h);
    let (_, author) = signup!(app, "reader");
    let (_, fan) = signup!(app, "admirer");
    let a = create_post!(app, author, "One", "Body");
    let b = create_post!(app, author, "Two", "Body");
    for id in [a, b] {
        send!(app, authed(TestRequest::post().uri(&format!("/api/forum/posts/{id}/like")), &fan));
    }

    let (_, body, _) = send!(app, authed(TestRequest::get().uri("/api/notifications"), &author));
    assert_eq!(body["unreadCount"], 2);
    assert_eq!(body["notifications"][0]["kind"], "post_like");
    let newest = body["notifications"][0]["id"].as_i64().unwrap();

    let (status, _, _) =
        send!(app, authed(TestRequest::post().uri(&format!("/api/notifications/{newest}/read")), &fan));
    assert_eq!(status, 404);
    let (status, n, _) =
        send!(app, authed(TestRequest::post().uri(&format!("/api/notifications/{newest}/read")), &author));
    assert_eq!(status, 200);
    assert_eq!(n["isRead"], true);

    let (_, body, _) = send!(app, authed(TestRequest::get().uri("/api/notifications?unreadOnly=true"), &author));
    assert_eq!(body["notifications"].as_array().unwrap().len(), 1);

    let (_, body, _) = send!(app, authed(TestRequest::post().uri("/api/notifications/read-all"), &author));
    assert_eq!(body["updated"], 1);
    let (_, body, _) = send!(app, authed(TestRequest::get().uri("/api/notifications/unread-count"), &author));
    assert_eq!(body["unreadCount"], 0);

    let (status, _, _) = send!(app, TestRequest::get().uri("/api/notifications"));
    assert_eq!(status, 401);
}

#[actix_web::test]
async fn unliking_does_not_notify() {
    let h = harness();
    let app = app!(h);
    let (_, author) = signup!(app, "fickle_target");
    let (_, fan) = signup!(app, "fickle_fan");
    let id = create_post!(app, author, "Like me", "Body");
    let uri = format!("/api/forum/posts/{id}/like");
    send!(app, authed(TestRequest::post().uri(&uri), &fan));
    send!(app, authed(TestRequest::post().uri(&uri), &fan));

    let (_, body, _) = send!(app, authed(TestRequest::get().uri("/api/notifications"), &author));
    assert_eq!(body["notifications"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn opting_out_keeps_in_app_only() {
    let h = harness();
    let app = app!(h);
    let (_, author) = signup!(app, "quiet_one");
    let (_, fan) = signup!(app, "loud_one");
    send!(
        app,
        authed(TestRequest::patch().uri("/api/auth/profile"), &author).set_json(json!({"emailNotifications": false}))
    );
    let id = create_post!(app, author, "Silence", "Body");
    send!(
        app,
        authed(TestRequest::post().uri(&format!("/api/forum/posts/{id}/comments")), &fan)
            .set_json(json!({"content": "Hello there"}))
    );

    let (_, body, _) = send!(app, authed(TestRequest::get().uri("/api/notifications/unread-count"), &author));
    assert_eq!(body["unreadCount"], 1);
    h.mailer.wait_for(3).await;
    actix_rt::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(h.mailer.to("quiet_one@example.com").len(), 1, "only the verification email");
}

#[actix_web::test]
async fn since_acts_as_a_polling_cursor() {
    let h = harness();
    let app = app!(h);
    let (_, author) = signup!(app, "polled");
    let (_, fan) = signup!(app, "poller_fan");
    let first = create_post!(app, author, "First", "Body");
    let second = create_post!(app, author, "Second", "Body");

    send!(app, authed(TestRequest::post().uri(&format!("/api/forum/posts/{first}/like")), &fan));
    let (_, body, _) = send!(app, authed(TestRequest::get().uri("/api/notifications"), &author));
    let cursor = body["notifications"][0]["createdAt"].as_str().unwrap().to_string();

    let (_, body, _) =
        send!(app, authed(TestRequest::get().uri("/api/notifications?since=2000-01-01T00:00:00Z"), &author));
    assert_eq!(body["notifications"].as_array().unwrap().len(), 1);
    let (_, body, _) =
        send!(app, authed(TestRequest::get().uri(&format!("/api/notifications?since={cursor}")), &author));
    assert_eq!(body["notifications"], json!([]));
    assert_eq!(body["unreadCount"], 1);

    actix_rt::time::sleep(std::time::Duration::from_millis(5)).await;
    send!(app, authed(TestRequest::post().uri(&format!("/api/forum/posts/{second}/like")), &fan));
    let (_, body, _) =
        send!(app, authed(TestRequest::get().uri(&format!("/api/notifications?since={cursor}")), &author));
    let fresh = body["notifications"].as_array().unwrap();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0]["postId"], second);
}
