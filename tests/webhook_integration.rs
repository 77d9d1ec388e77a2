use actix_web::test::TestRequest;
use actix_web::{App, test, web};
use serde_json::{Value, json};
use sqlx::Row;

use storefront::api;
use storefront::api::razorpay::sign_hmac_sha256_hex;

mod support;

fn captured_payload(payment_id: &str, status: &str, user_id: &str, product_id: i32) -> Value {
    json!({
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "amount": 9900,
                    "status": status,
                    "notes": { "user_id": user_id, "product_id": product_id.to_string() }
                }
            }
        }
    })
}

#[actix_web::test]
async fn captured_payment_grants_access_once() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    support::insert_user(pool, "u1").await;
    let product_id = support::insert_product(pool, "Rust Course", "99.00", None).await;

    let state = web::Data::new(support::build_state(pool.clone(), support::test_config()));
    let app = test::init_service(App::new().app_data(state.clone()).configure(api::configure)).await;

    let req = TestRequest::post()
        .uri("/api/webhook/razorpay")
        .set_json(captured_payload("pay_abc", "captured", "u1", product_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["processed"], true);
    assert_eq!(body["message"], "Payment verified and access granted");
    assert_eq!(body["paymentId"], "pay_abc");

    let row = sqlx::query(
        "SELECT amount::text AS amount, status, payment_method FROM payments WHERE payment_id = 'pay_abc'",
    )
    .fetch_one(pool)
    .await
    .expect("select payment");
    assert_eq!(row.get::<String, _>("amount"), "99.00");
    assert_eq!(row.get::<String, _>("status"), "completed");
    assert_eq!(
        row.get::<Option<String>, _>("payment_method").as_deref(),
        Some("razorpay_webhook_verified")
    );

    let req = TestRequest::get()
        .uri(&format!("/api/access/{product_id}"))
        .insert_header(support::bearer("u1"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["hasAccess"], true);

    // Replayed delivery.
    let req = TestRequest::post()
        .uri("/api/webhook/razorpay")
        .set_json(captured_payload("pay_abc", "captured", "u1", product_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["processed"], false);
    assert_eq!(body["reason"], "duplicate");

    assert_eq!(support::count_rows(pool, "payments", "u1").await, 1);
    assert_eq!(support::count_rows(pool, "library", "u1").await, 1);
}

#[actix_web::test]
async fn pending_status_creates_nothing() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    support::insert_user(pool, "u1").await;
    let product_id = support::insert_product(pool, "Rust Course", "99.00", None).await;

    let state = web::Data::new(support::build_state(pool.clone(), support::test_config()));
    let app = test::init_service(App::new().app_data(state.clone()).configure(api::configure)).await;

    let req = TestRequest::post()
        .uri("/api/webhook/razorpay")
        .set_json(captured_payload("pay_p", "pending", "u1", product_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["processed"], false);
    assert_eq!(body["reason"], "not_captured");

    assert_eq!(support::count_rows(pool, "payments", "u1").await, 0);
    assert_eq!(support::count_rows(pool, "library", "u1").await, 0);
}

#[actix_web::test]
async fn missing_notes_and_unknown_product_are_rejected() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    support::insert_user(pool, "u1").await;

    let state = web::Data::new(support::build_state(pool.clone(), support::test_config()));
    let app = test::init_service(App::new().app_data(state.clone()).configure(api::configure)).await;

    let req = TestRequest::post()
        .uri("/api/webhook/razorpay")
        .set_json(json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": {
                "id": "pay_n", "amount": 100, "status": "captured", "notes": []
            } } }
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Missing required webhook data");

    let req = TestRequest::post()
        .uri("/api/webhook/razorpay")
        .set_json(captured_payload("pay_q", "captured", "u1", 9999))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Product not found");

    let product_id = support::insert_product(pool, "Rust Course", "99.00", None).await;
    let mut oversized = captured_payload("pay_big", "captured", "u1", product_id);
    oversized["payload"]["payment"]["entity"]["amount"] = json!(100_000_000_000_i64);
    let req = TestRequest::post()
        .uri("/api/webhook/razorpay")
        .set_json(oversized)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Invalid payment amount");

    assert_eq!(support::count_rows(pool, "payments", "u1").await, 0);
}

#[actix_web::test]
async fn pending_row_is_promoted_by_capture() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    support::insert_user(pool, "u1").await;
    let product_id = support::insert_product(pool, "Rust Course", "99.00", None).await;
    support::insert_payment(pool, "pay_pend", "u1", product_id, "pending", "razorpay").await;

    let state = web::Data::new(support::build_state(pool.clone(), support::test_config()));
    let app = test::init_service(App::new().app_data(state.clone()).configure(api::configure)).await;

    let req = TestRequest::post()
        .uri("/api/webhook/razorpay")
        .set_json(captured_payload("pay_pend", "captured", "u1", product_id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["processed"], true);

    let status: String = sqlx::query("SELECT status FROM payments WHERE payment_id = 'pay_pend'")
        .fetch_one(pool)
        .await
        .expect("select payment")
        .get("status");
    assert_eq!(status, "completed");
    assert_eq!(support::count_rows(pool, "payments", "u1").await, 1);
    assert_eq!(support::count_rows(pool, "library", "u1").await, 1);
}

#[actix_web::test]
async fn signature_is_enforced_when_secret_configured() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    support::insert_user(pool, "u1").await;
    let product_id = support::insert_product(pool, "Rust Course", "99.00", None).await;

    let mut config = support::test_config();
    config.razorpay_webhook_secret = Some("whsec_test".to_string());
    let state = web::Data::new(support::build_state(pool.clone(), config));
    let app = test::init_service(App::new().app_data(state.clone()).configure(api::configure)).await;

    let body = serde_json::to_vec(&captured_payload("pay_sig", "captured", "u1", product_id)).unwrap();

    let req = TestRequest::post()
        .uri("/api/webhook/razorpay")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    assert_eq!(support::count_rows(pool, "payments", "u1").await, 0);

    let req = TestRequest::post()
        .uri("/api/webhook/razorpay")
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Razorpay-Signature", sign_hmac_sha256_hex("whsec_test", &body)))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(support::count_rows(pool, "library", "u1").await, 1);
}
