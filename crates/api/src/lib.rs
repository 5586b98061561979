//! HTTP API server for inventory reservation and order fulfillment.
//!
//! Exposes carts, checkout, order lifecycle, reservations, stock and coupons
//! as JSON endpoints, with structured logging (tracing) and Prometheus
//! metrics. The tenant comes from the `x-tenant-id` header and the shopper
//! from `x-user-id`.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post, put};
use domain::PricingPolicy;
use fulfillment::{Collaborators, OrderFulfillment};
use metrics_exporter_prometheus::PrometheusHandle;
use store::CommerceStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CommerceStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health))
        .route("/cart", get(routes::carts::get::<S>))
        .route("/cart/items", post(routes::carts::add_item::<S>))
        .route(
            "/cart/items/{product_id}",
            put(routes::carts::update_item::<S>).delete(routes::carts::remove_item::<S>),
        )
        .route("/carts/{id}/validation", get(routes::carts::validate::<S>))
        .route("/checkout", post(routes::orders::checkout::<S>))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route(
            "/orders/{id}/payment",
            post(routes::orders::confirm_payment::<S>),
        )
        .route(
            "/orders/{id}/payment/failure",
            post(routes::orders::fail_payment::<S>),
        )
        .route("/orders/{id}/ship", post(routes::orders::ship::<S>))
        .route("/orders/{id}/deliver", post(routes::orders::deliver::<S>))
        .route("/reservations/{id}", get(routes::reservations::get::<S>))
        .route(
            "/reservations/{id}/confirm",
            post(routes::reservations::confirm::<S>),
        )
        .route(
            "/reservations/{id}/cancel",
            post(routes::reservations::cancel::<S>),
        )
        .route(
            "/stock/{product_id}",
            get(routes::stock::get::<S>).put(routes::stock::set::<S>),
        )
        .route(
            "/stock/{product_id}/adjustments",
            post(routes::stock::adjust::<S>),
        )
        .route(
            "/stock/{product_id}/movements",
            get(routes::stock::movements::<S>),
        )
        .route("/coupons", post(routes::coupons::create::<S>))
        .route("/coupons/validate", post(routes::coupons::validate::<S>))
        .route(
            "/follow-ups/retry",
            post(routes::ops::retry_follow_ups::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the fulfillment services over `store` and the given collaborators.
pub fn create_state<S: CommerceStore + Clone + 'static>(
    store: S,
    collaborators: Collaborators,
    pricing: PricingPolicy,
    call_timeout: Duration,
) -> Arc<AppState<S>> {
    let fulfillment =
        OrderFulfillment::new(store, collaborators, pricing).with_call_timeout(call_timeout);
    Arc::new(AppState { fulfillment })
}
