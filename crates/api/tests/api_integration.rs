//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{AddressId, Money, ProductId, TenantId, UserId};
use domain::{Address, PricingPolicy, ProductSnapshot};
use fulfillment::{
    Collaborators, InMemoryAddressBook, InMemoryAuditSink, InMemoryCatalog, InMemoryTenantGuard,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    catalog: Arc<InMemoryCatalog>,
    addresses: Arc<InMemoryAddressBook>,
    tenants: Arc<InMemoryTenantGuard>,
    tenant: TenantId,
}

impl TestApp {
    fn new() -> Self {
        let catalog = Arc::new(InMemoryCatalog::new());
        let addresses = Arc::new(InMemoryAddressBook::new());
        let tenants = Arc::new(InMemoryTenantGuard::new());
        let tenant = TenantId::new();
        tenants.allow(tenant);

        let collaborators = Collaborators {
            tenants: tenants.clone(),
            catalog: catalog.clone(),
            addresses: addresses.clone(),
            audit: Arc::new(InMemoryAuditSink::new()),
        };
        let state = api::create_state(
            InMemoryStore::new(),
            collaborators,
            PricingPolicy::default(),
            Duration::from_secs(5),
        );

        Self {
            app: api::create_app(state, get_metrics_handle()),
            catalog,
            addresses,
            tenants,
            tenant,
        }
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        user: Option<UserId>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.send_as(self.tenant, method, uri, user, body).await
    }

    async fn send_as(
        &self,
        tenant: TenantId,
        method: &str,
        uri: &str,
        user: Option<UserId>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-tenant-id", tenant.to_string());
        if let Some(user) = user {
            builder = builder.header("x-user-id", user.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// A published product priced in whole units with `stock` on hand.
    async fn product(&self, price: i64, stock: u32) -> ProductId {
        let id = ProductId::new();
        self.catalog.put_product(ProductSnapshot {
            id,
            tenant_id: self.tenant,
            name: "Widget".to_string(),
            published: true,
            base_price: Money::from_major(price),
            sale_price: None,
        });
        let (status, _) = self
            .send(
                "PUT",
                &format!("/stock/{id}"),
                None,
                Some(json!({ "quantity": stock })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        id
    }

    fn shopper(&self) -> (UserId, AddressId) {
        let user_id = UserId::new();
        let address = Address {
            id: AddressId::new(),
            user_id,
            recipient: "Grace Hopper".to_string(),
            line1: "1 Compiler Way".to_string(),
            line2: None,
            city: "Arlington".to_string(),
            postal_code: "22201".to_string(),
            country: "US".to_string(),
        };
        let id = address.id;
        self.addresses.put(address);
        (user_id, id)
    }

    /// Adds to the shopper's cart and returns the cart id.
    async fn add_to_cart(&self, user: UserId, product: ProductId, quantity: u32) -> String {
        let (status, cart) = self
            .send(
                "POST",
                "/cart/items",
                Some(user),
                Some(json!({ "product_id": product, "quantity": quantity })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{cart}");
        cart["id"].as_str().unwrap().to_string()
    }

    async fn checkout(&self, user: UserId, address: AddressId, cart_id: &str) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/checkout",
            Some(user),
            Some(json!({
                "cart_id": cart_id,
                "shipping_address_id": address,
                "payment_method": "card",
            })),
        )
        .await
    }

    async fn available(&self, product: ProductId) -> u64 {
        let (status, stock) = self
            .send("GET", &format!("/stock/{product}"), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        stock["available"].as_u64().unwrap()
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let (status, json) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new();
    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
}

#[tokio::test]
async fn test_missing_tenant_header_is_bad_request() {
    let app = TestApp::new();
    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/stock/{}", ProductId::new()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_tenant_is_forbidden() {
    let app = TestApp::new();
    let product = app.product(10, 5).await;
    let (status, json) = app
        .send_as(TenantId::new(), "GET", &format!("/stock/{product}"), None, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(json["error"].as_str().is_some());

    app.tenants.revoke(app.tenant);
    let (status, _) = app
        .send("GET", &format!("/stock/{product}"), None, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_checkout_and_fulfil_order() {
    let app = TestApp::new();
    let product = app.product(100, 10).await;
    let (user, address) = app.shopper();
    let cart_id = app.add_to_cart(user, product, 3).await;

    let (status, report) = app
        .send("GET", &format!("/carts/{cart_id}/validation"), Some(user), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["errors"].as_array().unwrap().len(), 0);

    let (status, outcome) = app.checkout(user, address, &cart_id).await;
    assert_eq!(status, StatusCode::CREATED, "{outcome}");
    let order = &outcome["order"];
    assert_eq!(order["status"], "Pending");
    assert_eq!(order["subtotal_cents"], 30_000);
    assert_eq!(order["shipping_cents"], 9_900);
    assert_eq!(order["tax_cents"], 4_800);
    assert_eq!(order["total_cents"], 44_700);
    assert!(outcome["reservation"].is_object());
    assert_eq!(app.available(product).await, 7);

    let order_id = order["id"].as_str().unwrap().to_string();
    let (status, paid) = app
        .send(
            "POST",
            &format!("/orders/{order_id}/payment"),
            None,
            Some(json!({ "payment_reference": "pay_001" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{paid}");
    assert_eq!(paid["order"]["status"], "Processing");
    assert_eq!(paid["order"]["payment_status"], "Completed");

    let (status, shipped) = app
        .send(
            "POST",
            &format!("/orders/{order_id}/ship"),
            None,
            Some(json!({ "tracking_number": "1Z999" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shipped["tracking_number"], "1Z999");

    let (status, delivered) = app
        .send("POST", &format!("/orders/{order_id}/deliver"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivered["status"], "Delivered");

    let (status, _) = app
        .send("POST", &format!("/orders/{order_id}/cancel"), None, None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, movements) = app
        .send("GET", &format!("/stock/{product}/movements"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = movements
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds.last(), Some(&"Confirmation"));
}

#[tokio::test]
async fn test_checkout_of_empty_cart_is_bad_request() {
    let app = TestApp::new();
    let (user, address) = app.shopper();
    let (status, cart) = app.send("GET", "/cart", Some(user), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = app
        .checkout(user, address, cart["id"].as_str().unwrap())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_checkout_beyond_stock_reports_cart_issues() {
    let app = TestApp::new();
    let product = app.product(10, 5).await;
    let (first, first_address) = app.shopper();
    let (second, second_address) = app.shopper();
    let first_cart = app.add_to_cart(first, product, 5).await;
    let second_cart = app.add_to_cart(second, product, 1).await;

    let (status, _) = app.checkout(first, first_address, &first_cart).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = app.checkout(second, second_address, &second_cart).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["issues"].as_array().unwrap().len(), 1);
    assert_eq!(json["issues"][0]["kind"]["type"], "InsufficientStock");
}

#[tokio::test]
async fn test_adding_more_than_available_is_conflict() {
    let app = TestApp::new();
    let product = app.product(10, 2).await;
    let (user, _) = app.shopper();

    let (status, json) = app
        .send(
            "POST",
            "/cart/items",
            Some(user),
            Some(json!({ "product_id": product, "quantity": 3 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["available"], 2);
    assert_eq!(json["requested"], 3);
}

#[tokio::test]
async fn test_cart_item_update_and_remove() {
    let app = TestApp::new();
    let product = app.product(10, 10).await;
    let (user, _) = app.shopper();
    app.add_to_cart(user, product, 1).await;

    let (status, cart) = app
        .send(
            "PUT",
            &format!("/cart/items/{product}"),
            Some(user),
            Some(json!({ "quantity": 4 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"][0]["quantity"], 4);

    let (status, cart) = app
        .send("DELETE", &format!("/cart/items/{product}"), Some(user), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(cart["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_reservation_restores_stock() {
    let app = TestApp::new();
    let product = app.product(10, 5).await;
    let (user, address) = app.shopper();
    let cart_id = app.add_to_cart(user, product, 5).await;

    let (_, outcome) = app.checkout(user, address, &cart_id).await;
    assert_eq!(app.available(product).await, 0);
    let reservation_id = outcome["reservation"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .send(
            "POST",
            &format!("/reservations/{reservation_id}/cancel"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.available(product).await, 5);

    let (status, _) = app
        .send(
            "POST",
            &format!("/reservations/{reservation_id}/confirm"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_reservations_are_hidden_from_other_tenants() {
    let app = TestApp::new();
    let product = app.product(10, 5).await;
    let (user, address) = app.shopper();
    let cart_id = app.add_to_cart(user, product, 1).await;
    let (_, outcome) = app.checkout(user, address, &cart_id).await;
    let reservation_id = outcome["reservation"]["id"].as_str().unwrap().to_string();
    let order_id = outcome["order"]["id"].as_str().unwrap().to_string();

    let other = TenantId::new();
    app.tenants.allow(other);
    let (status, _) = app
        .send_as(other, "GET", &format!("/reservations/{reservation_id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .send_as(other, "GET", &format!("/orders/{order_id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stock_adjustments() {
    let app = TestApp::new();
    let product = app.product(10, 5).await;
    let (user, address) = app.shopper();
    let cart_id = app.add_to_cart(user, product, 3).await;
    app.checkout(user, address, &cart_id).await;

    let uri = format!("/stock/{product}/adjustments");
    let (status, _) = app
        .send(
            "POST",
            &uri,
            None,
            Some(json!({ "delta": -3, "reason": "damaged" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send("POST", &uri, None, Some(json!({ "delta": 2, "reason": "" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, stock) = app
        .send(
            "POST",
            &uri,
            None,
            Some(json!({ "delta": 4, "reason": "restock delivery" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock["quantity"], 9);
    assert_eq!(stock["reserved"], 3);
    assert_eq!(stock["available"], 6);
}

#[tokio::test]
async fn test_coupon_create_and_validate() {
    let app = TestApp::new();
    let (status, coupon) = app
        .send(
            "POST",
            "/coupons",
            None,
            Some(json!({
                "code": "spring10",
                "discount": { "type": "Percentage", "value": 1000 },
                "max_discount_cents": 1500,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{coupon}");
    assert_eq!(coupon["code"], "SPRING10");

    let (status, result) = app
        .send(
            "POST",
            "/coupons/validate",
            None,
            Some(json!({ "code": "Spring10", "order_total_cents": 20_000 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["discount_cents"], 1_500);

    let (status, _) = app
        .send(
            "POST",
            "/coupons/validate",
            None,
            Some(json!({ "code": "NOPE", "order_total_cents": 20_000 })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_payment_releases_stock() {
    let app = TestApp::new();
    let product = app.product(10, 5).await;
    let (user, address) = app.shopper();
    let cart_id = app.add_to_cart(user, product, 2).await;
    let (_, outcome) = app.checkout(user, address, &cart_id).await;
    let order_id = outcome["order"]["id"].as_str().unwrap().to_string();
    assert_eq!(app.available(product).await, 3);

    let (status, json) = app
        .send(
            "POST",
            &format!("/orders/{order_id}/payment/failure"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["order"]["status"], "Cancelled");
    assert_eq!(json["order"]["payment_status"], "Failed");
    assert_eq!(app.available(product).await, 5);
}

#[tokio::test]
async fn test_follow_up_retry_with_empty_queue() {
    let app = TestApp::new();
    let (status, report) = app
        .send("POST", "/follow-ups/retry?limit=10", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["completed"], 0);
    assert_eq!(report["failed"], 0);
    assert_eq!(report["dropped"], 0);
}
