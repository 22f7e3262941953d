//! End-to-end order lifecycle over the HTTP surface
//!
//! Drives the full scan-to-order flow through the router: create order,
//! walk the status machine, settle via a signed gateway webhook, and check
//! the table is released and redeliveries are no-ops.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use sha2::Sha256;
use tavola_server::{AppState, Config, api, db};
use tower::ServiceExt;

async fn app() -> (Router, AppState) {
    let pool = db::connect_in_memory().await.unwrap();
    sqlx::query(
        "INSERT INTO restaurants (id, name, currency, tax_rate) VALUES ('r1', 'Trattoria', 'EUR', 0.1)",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO dining_tables (id, restaurant_id, name, capacity) VALUES ('t1', 'r1', 'T1', 4)",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO menu_items (id, restaurant_id, name, price, is_available, stock_quantity, low_stock_threshold, is_low_stock) \
         VALUES ('m1', 'r1', 'Margherita', 9.5, 1, 10, 3, 0)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let state = AppState::with_pool(Config::for_tests(), pool);
    (api::create_router(state.clone()), state)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn patch_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Signature the way Stripe computes it, using the test webhook secret
fn stripe_signature(body: &str) -> String {
    let ts = Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(b"whsec_test").unwrap();
    mac.update(format!("{ts}.{body}").as_bytes());
    format!("t={ts},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[tokio::test]
async fn scan_to_order_to_settlement() {
    let (router, state) = app().await;

    // Customer scans the QR and orders
    let (status, order) = send(
        &router,
        post_json(
            "/api/orders",
            json!({
                "restaurant_id": "r1",
                "table_id": "t1",
                "items": [{ "menu_item_id": "m1", "quantity": 2 }],
                "tip": 1.0,
                "source": "QR",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["total"], 21.9);
    let order_id = order["id"].as_str().unwrap().to_string();

    // The table is now occupied
    let (status, tables) = send(&router, get("/api/tables?restaurant_id=r1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tables[0]["status"], "OCCUPIED");

    // Kitchen flow
    for next in ["ACCEPTED", "PREPARING", "READY", "SERVED"] {
        let (status, body) = send(
            &router,
            patch_json(
                &format!("/api/orders/{order_id}/status"),
                json!({ "status": next, "actor": "waiter-1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], next);
    }

    // Serving deducted the stock
    let item = db::menu_items::find_by_id(&state.pool, "m1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.stock_quantity, Some(8));

    // The bill shows the sitting's one order as due
    let (status, bill) = send(&router, get("/api/tables/t1/bill")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bill["orders"].as_array().unwrap().len(), 1);
    assert_eq!(bill["due"], 21.9);

    // A payment record exists, as create_checkout would have left it
    sqlx::query(
        "INSERT INTO payments (id, order_id, restaurant_id, gateway, tracking_id, amount, \
            currency, status, created_at, updated_at) \
         VALUES ('p1', ?1, 'r1', 'stripe', 'pi_123', 21.9, 'EUR', 'PENDING', ?2, ?2)",
    )
    .bind(&order_id)
    .bind(Utc::now())
    .execute(&state.pool)
    .await
    .unwrap();

    // Stripe confirms the payment
    let event = json!({
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_123" } }
    })
    .to_string();
    let webhook = Request::builder()
        .method("POST")
        .uri("/api/webhooks/stripe")
        .header("stripe-signature", stripe_signature(&event))
        .body(Body::from(event.clone()))
        .unwrap();
    let (status, _) = send(&router, webhook).await;
    assert_eq!(status, StatusCode::OK);

    let (_, order) = send(&router, get(&format!("/api/orders/{order_id}"))).await;
    assert_eq!(order["payment_status"], "PAID");
    assert_eq!(order["payment_method"], "ONLINE");

    // Settlement released the table
    let (_, tables) = send(&router, get("/api/tables?restaurant_id=r1")).await;
    assert_eq!(tables[0]["status"], "FREE");
    assert!(tables[0]["session_id"].is_null());

    // Stripe redelivers; still 200, still exactly one PAID order
    let webhook = Request::builder()
        .method("POST")
        .uri("/api/webhooks/stripe")
        .header("stripe-signature", stripe_signature(&event))
        .body(Body::from(event))
        .unwrap();
    let (status, _) = send(&router, webhook).await;
    assert_eq!(status, StatusCode::OK);
    let (_, order) = send(&router, get(&format!("/api/orders/{order_id}"))).await;
    assert_eq!(order["payment_status"], "PAID");
}

#[tokio::test]
async fn webhook_rejects_missing_and_bad_signatures() {
    let (router, _state) = app().await;

    let event = json!({ "type": "payment_intent.succeeded", "data": { "object": { "id": "pi_1" } } })
        .to_string();

    let (status, _) = send(
        &router,
        Request::builder()
            .method("POST")
            .uri("/api/webhooks/stripe")
            .body(Body::from(event.clone()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &router,
        Request::builder()
            .method("POST")
            .uri("/api/webhooks/stripe")
            .header("stripe-signature", "t=0,v1=deadbeef")
            .body(Body::from(event))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn http_errors_map_to_statuses() {
    let (router, _state) = app().await;

    // Unknown order
    let (status, body) = send(&router, get("/api/orders/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    // Forged session token
    let (_, _) = send(
        &router,
        post_json(
            "/api/orders",
            json!({
                "restaurant_id": "r1",
                "table_id": "t1",
                "items": [{ "menu_item_id": "m1", "quantity": 1 }],
            }),
        ),
    )
    .await;
    let (status, body) = send(
        &router,
        post_json(
            "/api/orders",
            json!({
                "restaurant_id": "r1",
                "table_id": "t1",
                "security_token": "forged",
                "items": [{ "menu_item_id": "m1", "quantity": 1 }],
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "security_violation");

    // More units than are in stock
    let (status, body) = send(
        &router,
        post_json(
            "/api/orders",
            json!({
                "restaurant_id": "r1",
                "table_id": "t1",
                "items": [{ "menu_item_id": "m1", "quantity": 99 }],
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "insufficient_stock");

    // Empty cart
    let (status, body) = send(
        &router,
        post_json(
            "/api/orders",
            json!({ "restaurant_id": "r1", "items": [] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}
