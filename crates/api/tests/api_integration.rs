//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain::{Money, ProductId};
use metrics_exporter_prometheus::PrometheusHandle;
use services::InMemoryCatalog;
use store::Backend;
use tower::ServiceExt;
use uuid::Uuid;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

/// Builds the app with the settlement worker running in the background.
fn setup() -> (Router, InMemoryCatalog) {
    let (state, catalog, worker) = api::create_default_state(Backend::in_memory());
    tokio::spawn(worker.run());
    let app = api::create_app(state, get_metrics_handle());
    (app, catalog)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn post_json(uri: &str, user: Option<Uuid>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_req(uri: &str, user: Option<Uuid>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    builder.body(Body::empty()).unwrap()
}

/// Lists a product in the catalog and gives it stock through the API.
async fn seed_product(app: &Router, catalog: &InMemoryCatalog, sku: &str, stock: u32) {
    catalog.put(ProductId::new(sku), format!("{sku} item"), Money::from_cents(1000));

    let (status, _) = send(
        app,
        post_json("/inventory", None, serde_json::json!({ "product_id": sku })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        app,
        post_json(
            &format!("/inventory/{sku}/stock"),
            None,
            serde_json::json!({ "quantity": stock }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_check() {
    let (app, _) = setup();
    let (status, json) = send(&app, get_req("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn inventory_lifecycle() {
    let (app, catalog) = setup();
    seed_product(&app, &catalog, "SKU-001", 25).await;

    let (status, json) = send(&app, get_req("/inventory/SKU-001", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["available"], 25);
    assert_eq!(json["reserved"], 0);
    assert_eq!(json["total"], 25);

    // Double initialization is rejected.
    let (status, _) = send(
        &app,
        post_json("/inventory", None, serde_json::json!({ "product_id": "SKU-001" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn order_creation_requires_identity() {
    let (app, _) = setup();
    let (status, json) = send(
        &app,
        post_json(
            "/orders",
            None,
            serde_json::json!({ "lines": [{ "product_id": "SKU-001", "quantity": 1 }] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("X-User-Id"));
}

#[tokio::test]
async fn order_creation_reserves_stock() {
    let (app, catalog) = setup();
    seed_product(&app, &catalog, "SKU-001", 10).await;
    let user = Uuid::new_v4();

    let (status, order) = send(
        &app,
        post_json(
            "/orders",
            Some(user),
            serde_json::json!({ "lines": [{ "product_id": "SKU-001", "quantity": 4 }] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "CREATED");
    assert_eq!(order["total_cents"], 4000);

    let (_, inventory) = send(&app, get_req("/inventory/SKU-001", None)).await;
    assert_eq!(inventory["available"], 6);
    assert_eq!(inventory["reserved"], 4);

    // The order is scoped to its owner.
    let order_id = order["id"].as_str().unwrap();
    let (status, _) = send(&app, get_req(&format!("/orders/{order_id}"), Some(user))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        get_req(&format!("/orders/{order_id}"), Some(Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn payment_settles_asynchronously() {
    let (app, catalog) = setup();
    seed_product(&app, &catalog, "SKU-001", 10).await;
    let user = Uuid::new_v4();

    let (_, order) = send(
        &app,
        post_json(
            "/orders",
            Some(user),
            serde_json::json!({ "lines": [{ "product_id": "SKU-001", "quantity": 5 }] }),
        ),
    )
    .await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, payment) = send(
        &app,
        post_json(
            "/payments",
            Some(user),
            serde_json::json!({ "order_id": order_id, "idempotency_key": "k1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(payment["status"], "REQUESTED");
    assert_eq!(payment["amount_cents"], 5000);

    // The worker settles in the background; poll for the terminal status.
    let payment_id = payment["id"].as_str().unwrap().to_string();
    let mut settled = serde_json::Value::Null;
    for _ in 0..100 {
        let (_, current) = send(&app, get_req(&format!("/payments/{payment_id}"), Some(user))).await;
        if current["status"] != "REQUESTED" {
            settled = current;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(settled["status"], "COMPLETED");

    let (_, order) = send(&app, get_req(&format!("/orders/{order_id}"), Some(user))).await;
    assert_eq!(order["status"], "PAID");

    // Idempotent replay returns the same record.
    let (status, replay) = send(
        &app,
        post_json(
            "/payments",
            Some(user),
            serde_json::json!({ "order_id": order_id, "idempotency_key": "k1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(replay["id"].as_str().unwrap(), payment_id);
}

#[tokio::test]
async fn admin_refund_queue_rejects_bad_status() {
    let (app, _) = setup();
    let (status, _) = send(&app, get_req("/admin/refunds?status=BOGUS", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(&app, get_req("/admin/refunds?status=REQUESTED", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!([]));
}

#[tokio::test]
async fn metrics_endpoint_renders() {
    let (app, _) = setup();
    let response = app
        .clone()
        .oneshot(get_req("/metrics", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let (app, _) = setup();
    let (status, _) = send(&app, get_req("/inventory/SKU-404", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
