use actix_web::{test, web, App, HttpResponse};
use medicoz::SecurityHeaders;

macro_rules! app_with {
    ($headers:expr) => {
        test::init_service(
            App::new()
                .wrap($headers)
                .route("/", web::get().to(|| async { HttpResponse::Ok().body("ok") }))
                .route(
                    "/framed",
                    web::get().to(|| async { HttpResponse::Ok().insert_header(("X-Frame-Options", "SAMEORIGIN")).finish() }),
                ),
        )
        .await
    };
}

#[actix_web::test]
async fn hardening_headers_are_present() {
    let app = app_with!(SecurityHeaders::default());
    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    let h = resp.headers();
    assert!(h.get("content-security-policy").unwrap().to_str().unwrap().contains("frame-ancestors 'none'"));
    assert_eq!(h.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(h.get("x-frame-options").unwrap(), "DENY");
    assert_eq!(h.get("referrer-policy").unwrap(), "strict-origin-when-cross-origin");
    assert!(h.get("permissions-policy").is_some());
    assert!(h.get("strict-transport-security").is_none());
}

#[actix_web::test]
async fn handler_headers_win() {
    let app = app_with!(SecurityHeaders::default());
    let resp = test::call_service(&app, test::TestRequest::get().uri("/framed").to_request()).await;
    assert_eq!(resp.headers().get("x-frame-options").unwrap(), "SAMEORIGIN");
}

#[actix_web::test]
async fn hsts_only_when_enabled() {
    let app = app_with!(SecurityHeaders::default().with_hsts(true));
    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    let hsts = resp.headers().get("strict-transport-security").expect("hsts header");
    assert!(hsts.to_str().unwrap().starts_with("max-age=63072000"));
}
