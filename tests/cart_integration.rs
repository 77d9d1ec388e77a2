use actix_web::test::TestRequest;
use actix_web::{App, test, web};
use serde_json::{Value, json};

use storefront::api;

mod support;

#[actix_web::test]
async fn repeated_adds_merge_quantity() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    support::insert_user(pool, "u1").await;
    let product_id = support::insert_product(pool, "Course", "10.00", None).await;

    let state = web::Data::new(support::build_state(pool.clone(), support::test_config()));
    let app = test::init_service(App::new().app_data(state.clone()).configure(api::configure)).await;

    for quantity in [1, 2] {
        let req = TestRequest::post()
            .uri("/api/cart")
            .insert_header(support::bearer("u1"))
            .set_json(json!({ "productId": product_id, "quantity": quantity }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }

    let req = TestRequest::get()
        .uri("/api/cart")
        .insert_header(support::bearer("u1"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let lines = body.as_array().expect("array");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["quantity"], 3);
    assert_eq!(lines[0]["product"]["name"], "Course");

    let req = TestRequest::post()
        .uri("/api/cart")
        .insert_header(support::bearer("u1"))
        .set_json(json!({ "productId": product_id, "quantity": i32::MAX }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    // Merged adds saturate at the per-line ceiling instead of overflowing.
    for _ in 0..2 {
        let req = TestRequest::post()
            .uri("/api/cart")
            .insert_header(support::bearer("u1"))
            .set_json(json!({ "productId": product_id, "quantity": 999 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }
    let req = TestRequest::get()
        .uri("/api/cart")
        .insert_header(support::bearer("u1"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body[0]["quantity"], 999);

    // Another user cannot touch this line.
    let line_id = lines[0]["id"].as_i64().unwrap();
    let req = TestRequest::delete()
        .uri(&format!("/api/cart/{line_id}"))
        .insert_header(support::bearer("u2"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn checkout_snapshots_prices() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    support::insert_user(pool, "u1").await;
    let product_id = support::insert_product(pool, "Course", "10.00", None).await;

    let state = web::Data::new(support::build_state(pool.clone(), support::test_config()));
    let app = test::init_service(App::new().app_data(state.clone()).configure(api::configure)).await;

    let req = TestRequest::post()
        .uri("/api/orders")
        .insert_header(support::bearer("u1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400, "empty cart");

    let req = TestRequest::post()
        .uri("/api/cart")
        .insert_header(support::bearer("u1"))
        .set_json(json!({ "productId": product_id, "quantity": 2 }))
        .to_request();
    test::call_service(&app, req).await;

    for bad in [r#"{"shippingAddress":"Pune"}"#, "not json"] {
        let req = TestRequest::post()
            .uri("/api/orders")
            .insert_header(support::bearer("u1"))
            .insert_header(("Content-Type", "application/json"))
            .set_payload(bad)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400, "body {bad}");
    }
    assert_eq!(support::count_rows(pool, "cart_items", "u1").await, 1);

    let req = TestRequest::post()
        .uri("/api/orders")
        .insert_header(support::bearer("u1"))
        .set_json(json!({ "shippingAddress": { "city": "Pune" } }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let order: Value = test::read_body_json(resp).await;
    assert_eq!(order["totalAmount"], "20.00");
    assert_eq!(order["items"][0]["price"], "10.00");
    let order_id = order["id"].as_i64().unwrap();

    sqlx::query("UPDATE products SET price = 15.00 WHERE id = $1")
        .bind(product_id)
        .execute(pool)
        .await
        .expect("reprice");

    let req = TestRequest::get()
        .uri(&format!("/api/orders/{order_id}"))
        .insert_header(support::bearer("u1"))
        .to_request();
    let detail: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(detail["items"][0]["price"], "10.00");
    assert_eq!(detail["totalAmount"], "20.00");

    let req = TestRequest::get()
        .uri(&format!("/api/orders/{order_id}"))
        .insert_header(support::bearer("u2"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    assert_eq!(support::count_rows(pool, "cart_items", "u1").await, 0);
}

#[actix_web::test]
async fn shipping_generates_tracking_number() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    support::insert_user(pool, "u1").await;
    let product_id = support::insert_product(pool, "Course", "10.00", None).await;

    let state = web::Data::new(support::build_state(pool.clone(), support::test_config()));
    let app = test::init_service(App::new().app_data(state.clone()).configure(api::configure)).await;

    let req = TestRequest::post()
        .uri("/api/cart")
        .insert_header(support::bearer("u1"))
        .set_json(json!({ "productId": product_id }))
        .to_request();
    test::call_service(&app, req).await;
    let req = TestRequest::post()
        .uri("/api/orders")
        .insert_header(support::bearer("u1"))
        .to_request();
    let order: Value = test::call_and_read_body_json(&app, req).await;
    let order_id = order["id"].as_i64().unwrap();

    let req = TestRequest::put()
        .uri(&format!("/api/admin/orders/{order_id}/status"))
        .insert_header(support::bearer("u1"))
        .set_json(json!({ "status": "shipped" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = TestRequest::put()
        .uri(&format!("/api/admin/orders/{order_id}/status"))
        .insert_header(support::bearer(support::ADMIN_ID))
        .set_json(json!({ "status": "shipped", "carrier": "BlueDart" }))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["status"], "shipped");
    assert!(updated["trackingNumber"].as_str().unwrap().starts_with("CZ"));
    assert!(!updated["shippedAt"].is_null());
}

#[actix_web::test]
async fn catalog_and_payment_session() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;
    let linked = support::insert_product(pool, "Rust Course", "99.00", Some("https://rzp.io/l/sample1")).await;
    let unlinked = support::insert_product(pool, "Go Course", "49.00", None).await;

    let state = web::Data::new(support::build_state(pool.clone(), support::test_config()));
    let app = test::init_service(App::new().app_data(state.clone()).configure(api::configure)).await;

    let req = TestRequest::get().uri("/api/products?search=rust&category=all").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], linked);

    let req = TestRequest::get().uri("/api/products/abc").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
    let req = TestRequest::get().uri("/api/products/99999").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = TestRequest::post()
        .uri("/api/create-payment-session")
        .insert_header(support::bearer("u1"))
        .set_json(json!({
            "productId": linked.to_string(),
            "customerDetails": { "name": "Asha", "email": "asha@example.com", "phone": "98765" }
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["amount"], "99.00");
    let url = body["paymentUrl"].as_str().unwrap();
    assert!(url.starts_with("https://rzp.io/l/sample1?"));
    assert!(url.contains("notes%5Buser_id%5D=u1"));

    let req = TestRequest::post()
        .uri("/api/create-payment-session")
        .insert_header(support::bearer("u1"))
        .set_json(json!({ "productId": unlinked }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = TestRequest::post()
        .uri("/api/create-payment-session")
        .insert_header(support::bearer("u1"))
        .set_json(json!({ "productId": 99999 }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    // Creating a session grants nothing.
    let req = TestRequest::get()
        .uri(&format!("/api/access/{linked}"))
        .insert_header(support::bearer("u1"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["hasAccess"], false);
}

#[actix_web::test]
async fn categories_update_and_soft_delete() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let state = web::Data::new(support::build_state(pool.clone(), support::test_config()));
    let app = test::init_service(App::new().app_data(state.clone()).configure(api::configure)).await;

    let req = TestRequest::post()
        .uri("/api/categories")
        .insert_header(support::bearer(support::ADMIN_ID))
        .set_json(json!({ "name": "Courses", "icon": "book" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let created: Value = test::read_body_json(resp).await;
    let id = created["id"].as_i64().unwrap();

    let req = TestRequest::put()
        .uri(&format!("/api/categories/{id}"))
        .insert_header(support::bearer("u1"))
        .set_json(json!({ "name": "Nope" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = TestRequest::put()
        .uri(&format!("/api/categories/{id}"))
        .insert_header(support::bearer(support::ADMIN_ID))
        .set_json(json!({ "description": "Video courses" }))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["name"], "Courses");
    assert_eq!(updated["description"], "Video courses");
    assert_eq!(updated["icon"], "book");

    let req = TestRequest::delete()
        .uri(&format!("/api/categories/{id}"))
        .insert_header(support::bearer(support::ADMIN_ID))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = TestRequest::get().uri("/api/categories").to_request();
    let listed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listed.as_array().unwrap().len(), 0);

    // The row itself survives.
    let active: bool = sqlx::query_scalar("SELECT is_active FROM categories WHERE id = $1")
        .bind(id as i32)
        .fetch_one(pool)
        .await
        .expect("category row");
    assert!(!active);

    let req = TestRequest::delete()
        .uri("/api/categories/99999")
        .insert_header(support::bearer(support::ADMIN_ID))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}
