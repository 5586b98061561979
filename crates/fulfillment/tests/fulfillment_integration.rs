//! End-to-end checkout and order lifecycle tests against the in-memory store.

use std::sync::Arc;

use common::{AddressId, BasisPoints, CartId, Money, ProductId, TenantId, UserId};
use domain::{
    Address, Cart, Coupon, CouponCode, CouponDiscount, OrderStatus, PaymentStatus, PricingPolicy,
    ProductSnapshot, ReservationStatus, StockKey,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::MovementReference;
use fulfillment::{
    AuditEvent, AuditSink, Collaborators, CreateOrder, FulfillmentError, InMemoryAddressBook,
    InMemoryAuditSink, InMemoryCatalog, InMemoryTenantGuard, OrderFulfillment,
};
use store::{
    CartStore, CouponStore, FollowUpKind, FollowUpStore, InMemoryStore, OrderStore, StockStore,
};

/// Writes off every unit still available for an order's lines as soon as
/// the order is recorded, like a stock count landing between cart
/// validation and reservation.
struct WriteOffOnOrderCreated {
    inner: Arc<InMemoryAuditSink>,
    store: InMemoryStore,
}

#[async_trait]
impl AuditSink for WriteOffOnOrderCreated {
    async fn record(&self, event: AuditEvent, at: DateTime<Utc>) {
        if let AuditEvent::OrderCreated { order_id, .. } = &event {
            let order = self.store.order(*order_id).await.unwrap().unwrap();
            for line in order.lines() {
                let key = line.key();
                let level = self.store.stock_level(key).await.unwrap().unwrap();
                self.store
                    .adjust_stock(
                        key,
                        -i64::from(level.available()),
                        MovementReference::reason("stock count"),
                    )
                    .await
                    .unwrap();
            }
        }
        self.inner.record(event, at).await;
    }
}

fn no_fees() -> PricingPolicy {
    PricingPolicy {
        free_shipping_threshold: Money::from_major(1_000_000),
        flat_shipping: Money::zero(),
        tax_rate: BasisPoints::new(0),
    }
}

struct TestHarness {
    store: InMemoryStore,
    fulfillment: OrderFulfillment<InMemoryStore>,
    catalog: Arc<InMemoryCatalog>,
    addresses: Arc<InMemoryAddressBook>,
    audit: Arc<InMemoryAuditSink>,
    tenant: TenantId,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_pricing(no_fees())
    }

    fn with_pricing(pricing: PricingPolicy) -> Self {
        Self::build(pricing, false)
    }

    /// Stock vanishes right after each order is written.
    fn with_stock_write_off() -> Self {
        Self::build(no_fees(), true)
    }

    fn build(pricing: PricingPolicy, write_off_on_order: bool) -> Self {
        let store = InMemoryStore::new();
        let catalog = Arc::new(InMemoryCatalog::new());
        let addresses = Arc::new(InMemoryAddressBook::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let sink: Arc<dyn AuditSink> = if write_off_on_order {
            Arc::new(WriteOffOnOrderCreated {
                inner: audit.clone(),
                store: store.clone(),
            })
        } else {
            audit.clone()
        };
        let collaborators = Collaborators {
            tenants: Arc::new(InMemoryTenantGuard::allow_all()),
            catalog: catalog.clone(),
            addresses: addresses.clone(),
            audit: sink,
        };

        Self {
            fulfillment: OrderFulfillment::new(store.clone(), collaborators, pricing),
            store,
            catalog,
            addresses,
            audit,
            tenant: TenantId::new(),
        }
    }

    async fn product(&self, price: i64, stock: u32) -> ProductId {
        let id = ProductId::new();
        self.catalog.put_product(ProductSnapshot {
            id,
            tenant_id: self.tenant,
            name: format!("Product {id}"),
            published: true,
            base_price: Money::from_major(price),
            sale_price: None,
        });
        self.fulfillment
            .ledger()
            .set_stock(StockKey::product(id), stock)
            .await
            .unwrap();
        id
    }

    fn shopper(&self) -> (UserId, AddressId) {
        let user_id = UserId::new();
        let address = Address {
            id: AddressId::new(),
            user_id,
            recipient: "Ada Lovelace".to_string(),
            line1: "12 Analytical St".to_string(),
            line2: None,
            city: "London".to_string(),
            postal_code: "N1 9GU".to_string(),
            country: "GB".to_string(),
        };
        let address_id = address.id;
        self.addresses.put(address);
        (user_id, address_id)
    }

    async fn add(&self, user_id: UserId, product_id: ProductId, quantity: u32) -> Cart {
        self.fulfillment
            .carts()
            .add_item(self.tenant, user_id, product_id, None, quantity)
            .await
            .unwrap()
    }

    fn request(&self, user_id: UserId, address_id: AddressId, cart_id: CartId) -> CreateOrder {
        CreateOrder {
            tenant_id: self.tenant,
            user_id,
            cart_id,
            shipping_address_id: address_id,
            billing_address_id: None,
            payment_method: "card".to_string(),
            coupon_code: None,
        }
    }

    async fn available(&self, product_id: ProductId) -> u32 {
        self.store
            .stock_level(StockKey::product(product_id))
            .await
            .unwrap()
            .unwrap()
            .available()
    }
}

#[tokio::test]
async fn checkout_reserves_stock_and_empties_cart() {
    let h = TestHarness::new();
    let product = h.product(100, 10).await;
    let (user, address) = h.shopper();
    let cart = h.add(user, product, 3).await;

    let outcome = h
        .fulfillment
        .checkout(h.request(user, address, cart.id))
        .await
        .unwrap();

    assert_eq!(outcome.order.status(), OrderStatus::Pending);
    assert_eq!(outcome.order.order_number.sequence(), 1);
    assert_eq!(outcome.order.totals.total, Money::from_major(300));
    assert_eq!(outcome.order.billing_address, outcome.order.shipping_address);
    let reservation = outcome.reservation.unwrap();
    assert_eq!(reservation.status(), ReservationStatus::Reserved);
    assert_eq!(reservation.total_quantity(), 3);
    assert!(outcome.warnings.is_empty());

    assert_eq!(h.available(product).await, 7);
    assert!(h.store.cart(cart.id).await.unwrap().unwrap().is_empty());
    assert_eq!(
        h.audit.event_types().await,
        vec!["OrderCreated", "ReservationCreated"]
    );
}

#[tokio::test]
async fn totals_follow_pricing_policy() {
    let h = TestHarness::with_pricing(PricingPolicy::default());
    let product = h.product(100, 10).await;
    let (user, address) = h.shopper();
    let cart = h.add(user, product, 5).await;

    let order = h
        .fulfillment
        .create_order(h.request(user, address, cart.id))
        .await
        .unwrap();

    assert_eq!(order.totals.subtotal, Money::from_major(500));
    assert_eq!(order.totals.shipping, Money::from_major(99));
    assert_eq!(order.totals.tax, Money::from_major(80));
    assert_eq!(order.totals.total, Money::from_major(679));
}

#[tokio::test]
async fn last_units_go_to_one_shopper() {
    let h = TestHarness::new();
    let product = h.product(10, 5).await;
    let (first, first_address) = h.shopper();
    let (second, second_address) = h.shopper();
    let first_cart = h.add(first, product, 5).await;
    let second_cart = h.add(second, product, 1).await;

    h.fulfillment
        .checkout(h.request(first, first_address, first_cart.id))
        .await
        .unwrap();
    assert_eq!(h.available(product).await, 0);

    let err = h
        .fulfillment
        .checkout(h.request(second, second_address, second_cart.id))
        .await
        .unwrap_err();
    let FulfillmentError::InvalidCart(issues) = err else {
        panic!("expected InvalidCart, got {err:?}");
    };
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].product_id, product);

    // The rejected cart is untouched.
    let cart = h.store.cart(second_cart.id).await.unwrap().unwrap();
    assert_eq!(cart.items().len(), 1);
}

#[tokio::test]
async fn concurrent_checkouts_never_oversell() {
    let h = TestHarness::new();
    let product = h.product(10, 5).await;

    let mut requests = Vec::new();
    for _ in 0..4 {
        let (user, address) = h.shopper();
        let cart = h.add(user, product, 2).await;
        requests.push(h.request(user, address, cart.id));
    }

    let results = futures_util::future::join_all(
        requests
            .into_iter()
            .map(|request| h.fulfillment.checkout(request)),
    )
    .await;

    let reserved: u32 = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .filter_map(|o| o.reservation.as_ref())
        .map(|r| r.total_quantity())
        .sum();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    assert_eq!(reserved, 4);
    assert_eq!(h.available(product).await, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(
            result,
            Err(FulfillmentError::InvalidCart(_)) | Err(FulfillmentError::InsufficientStock { .. })
        ));
    }
}

#[tokio::test]
async fn empty_cart_creates_no_order() {
    let h = TestHarness::new();
    let product = h.product(10, 5).await;
    let (user, address) = h.shopper();
    let cart = h
        .fulfillment
        .carts()
        .active_cart(h.tenant, user)
        .await
        .unwrap();

    let err = h
        .fulfillment
        .checkout(h.request(user, address, cart.id))
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::EmptyCart));

    // No order number was consumed.
    let cart = h.add(user, product, 1).await;
    let outcome = h
        .fulfillment
        .checkout(h.request(user, address, cart.id))
        .await
        .unwrap();
    assert_eq!(outcome.order.order_number.sequence(), 1);
}

#[tokio::test]
async fn cart_of_another_user_is_forbidden() {
    let h = TestHarness::new();
    let product = h.product(10, 5).await;
    let (owner, _) = h.shopper();
    let (intruder, address) = h.shopper();
    let cart = h.add(owner, product, 1).await;

    let err = h
        .fulfillment
        .checkout(h.request(intruder, address, cart.id))
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::Forbidden(_)));
}

#[tokio::test]
async fn unknown_address_is_not_found() {
    let h = TestHarness::new();
    let product = h.product(10, 5).await;
    let (user, _) = h.shopper();
    let cart = h.add(user, product, 1).await;

    let err = h
        .fulfillment
        .create_order(h.request(user, AddressId::new(), cart.id))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FulfillmentError::NotFound {
            entity: "address",
            ..
        }
    ));
}

#[tokio::test]
async fn price_drift_is_reported_but_snapshot_price_is_charged() {
    let h = TestHarness::new();
    let product = h.product(100, 5).await;
    let (user, address) = h.shopper();
    let cart = h.add(user, product, 1).await;

    h.catalog.put_product(ProductSnapshot {
        id: product,
        tenant_id: h.tenant,
        name: "Repriced".to_string(),
        published: true,
        base_price: Money::from_major(120),
        sale_price: None,
    });

    let outcome = h
        .fulfillment
        .checkout(h.request(user, address, cart.id))
        .await
        .unwrap();
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.order.totals.total, Money::from_major(100));
}

#[tokio::test]
async fn coupon_discount_is_applied_and_counted() {
    let h = TestHarness::new();
    let product = h.product(100, 5).await;
    let coupon = Coupon::new(
        h.tenant,
        "SAVE10",
        CouponDiscount::Percentage(BasisPoints::percent(10)),
    );
    h.fulfillment.coupons().save(&coupon).await.unwrap();
    let (user, address) = h.shopper();
    let cart = h.add(user, product, 2).await;

    let mut request = h.request(user, address, cart.id);
    request.coupon_code = Some("save10".to_string());
    let order = h.fulfillment.create_order(request).await.unwrap();

    assert_eq!(order.totals.discount, Money::from_major(20));
    assert_eq!(order.totals.total, Money::from_major(180));
    assert_eq!(order.coupon_code, Some(CouponCode::new("SAVE10")));

    let stored = h
        .store
        .coupon_by_code(h.tenant, &CouponCode::new("SAVE10"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.used_count, 1);
}

#[tokio::test]
async fn rejected_coupon_does_not_block_the_order() {
    let h = TestHarness::new();
    let product = h.product(100, 5).await;
    let (user, address) = h.shopper();
    let cart = h.add(user, product, 1).await;

    let mut request = h.request(user, address, cart.id);
    request.coupon_code = Some("DOESNOTEXIST".to_string());
    let order = h.fulfillment.create_order(request).await.unwrap();

    assert_eq!(order.totals.discount, Money::zero());
    assert_eq!(order.totals.total, Money::from_major(100));
    assert_eq!(order.coupon_code, None);
}

#[tokio::test]
async fn failed_coupon_usage_is_queued_and_replayed() {
    let h = TestHarness::new();
    let product = h.product(100, 5).await;
    let coupon = Coupon::new(
        h.tenant,
        "FIVE",
        CouponDiscount::FixedAmount(Money::from_major(5)),
    );
    h.fulfillment.coupons().save(&coupon).await.unwrap();
    let (user, address) = h.shopper();
    let cart = h.add(user, product, 1).await;

    h.store.set_fail_on_coupon_usage(true);
    let mut request = h.request(user, address, cart.id);
    request.coupon_code = Some("five".to_string());
    let order = h.fulfillment.create_order(request).await.unwrap();
    assert_eq!(order.totals.discount, Money::from_major(5));

    let pending = h.store.pending_follow_ups(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(
        pending[0].kind,
        FollowUpKind::IncrementCouponUsage {
            coupon_id: coupon.id,
            order_id: order.id,
        }
    );

    let report = h.fulfillment.retry_follow_ups(10).await.unwrap();
    assert_eq!((report.completed, report.failed), (0, 1));

    h.store.set_fail_on_coupon_usage(false);
    let report = h.fulfillment.retry_follow_ups(10).await.unwrap();
    assert_eq!((report.completed, report.failed), (1, 0));
    assert!(h.store.pending_follow_ups(10).await.unwrap().is_empty());

    let stored = h
        .store
        .coupon_by_code(h.tenant, &CouponCode::new("FIVE"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.used_count, 1);
}

#[tokio::test]
async fn reservation_outage_defers_to_follow_up() {
    let h = TestHarness::new();
    let product = h.product(10, 5).await;
    let (user, address) = h.shopper();
    let cart = h.add(user, product, 2).await;

    h.store.set_fail_on_reserve(true);
    let outcome = h
        .fulfillment
        .checkout(h.request(user, address, cart.id))
        .await
        .unwrap();
    assert!(outcome.reservation.is_none());
    assert_eq!(outcome.order.status(), OrderStatus::Pending);
    assert_eq!(h.available(product).await, 5);

    h.store.set_fail_on_reserve(false);
    let report = h.fulfillment.retry_follow_ups(10).await.unwrap();
    assert_eq!(report.completed, 1);

    let reservation = h
        .fulfillment
        .reservations()
        .for_order(outcome.order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reservation.total_quantity(), 2);
    assert_eq!(h.available(product).await, 3);
}

#[tokio::test]
async fn deferred_reservation_for_cancelled_order_is_dropped() {
    let h = TestHarness::new();
    let product = h.product(10, 5).await;
    let (user, address) = h.shopper();
    let cart = h.add(user, product, 2).await;

    h.store.set_fail_on_reserve(true);
    let outcome = h
        .fulfillment
        .checkout(h.request(user, address, cart.id))
        .await
        .unwrap();
    h.store.set_fail_on_reserve(false);
    h.fulfillment
        .cancel_order(h.tenant, outcome.order.id)
        .await
        .unwrap();

    let report = h.fulfillment.retry_follow_ups(10).await.unwrap();
    assert_eq!(report.dropped, 1);
    assert_eq!(h.available(product).await, 5);
}

#[tokio::test]
async fn stock_lost_after_validation_cancels_the_order() {
    let h = TestHarness::with_stock_write_off();
    let product = h.product(10, 5).await;
    let (user, address) = h.shopper();
    let cart = h.add(user, product, 3).await;

    let err = h
        .fulfillment
        .checkout(h.request(user, address, cart.id))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FulfillmentError::InsufficientStock {
            available: 0,
            requested: 3,
            ..
        }
    ));

    let level = h
        .store
        .stock_level(StockKey::product(product))
        .await
        .unwrap()
        .unwrap();
    assert_eq!((level.quantity(), level.reserved()), (0, 0));

    let order_id = h
        .audit
        .events()
        .await
        .into_iter()
        .find_map(|event| match event {
            AuditEvent::OrderCreated { order_id, .. } => Some(order_id),
            _ => None,
        })
        .unwrap();
    let order = h.fulfillment.order(h.tenant, order_id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);
    assert!(
        h.fulfillment
            .reservations()
            .for_order(order.id)
            .await
            .unwrap()
            .is_none()
    );

    // The lines go back to the cart so the shopper can revisit them.
    let cart = h.store.cart(cart.id).await.unwrap().unwrap();
    assert_eq!(cart.quantity_of(&StockKey::product(product)), 3);
    assert_eq!(
        h.audit.event_types().await,
        vec!["OrderCreated", "OrderCancelled"]
    );
}

#[tokio::test]
async fn deferred_reservation_without_stock_cancels_the_order() {
    let h = TestHarness::new();
    let product = h.product(10, 5).await;
    let key = StockKey::product(product);
    let (user, address) = h.shopper();
    let cart = h.add(user, product, 3).await;

    h.store.set_fail_on_reserve(true);
    let outcome = h
        .fulfillment
        .checkout(h.request(user, address, cart.id))
        .await
        .unwrap();
    h.store.set_fail_on_reserve(false);
    assert!(outcome.reservation.is_none());

    h.fulfillment
        .ledger()
        .adjust(key, -4, "water damage")
        .await
        .unwrap();
    assert_eq!(h.available(product).await, 1);

    let report = h.fulfillment.retry_follow_ups(10).await.unwrap();
    assert_eq!((report.completed, report.failed, report.dropped), (0, 0, 1));
    assert!(h.store.pending_follow_ups(10).await.unwrap().is_empty());

    let order = h.fulfillment.order(h.tenant, outcome.order.id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);
    assert!(
        h.fulfillment
            .reservations()
            .for_order(order.id)
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(h.available(product).await, 1);
    let cart = h.store.cart(cart.id).await.unwrap().unwrap();
    assert_eq!(cart.quantity_of(&key), 3);
}

#[tokio::test]
async fn reservation_after_cancellation_is_refused() {
    let h = TestHarness::new();
    let product = h.product(10, 5).await;
    let (user, address) = h.shopper();
    let cart = h.add(user, product, 5).await;

    let order = h
        .fulfillment
        .create_order(h.request(user, address, cart.id))
        .await
        .unwrap();
    h.fulfillment.cancel_order(h.tenant, order.id).await.unwrap();

    let err = h
        .fulfillment
        .reservations()
        .create(order.id, order.reservation_lines())
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::InvalidStateTransition { .. }));
    assert!(!err.is_retryable());

    assert_eq!(h.available(product).await, 5);
    assert!(
        h.fulfillment
            .reservations()
            .for_order(order.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn paid_order_ships_and_delivers() {
    let h = TestHarness::new();
    let product = h.product(10, 5).await;
    let (user, address) = h.shopper();
    let cart = h.add(user, product, 2).await;
    let order = h
        .fulfillment
        .checkout(h.request(user, address, cart.id))
        .await
        .unwrap()
        .order;

    let transition = h
        .fulfillment
        .confirm_payment(h.tenant, order.id, "pay_123")
        .await
        .unwrap();
    assert_eq!(transition.order.status(), OrderStatus::Processing);
    assert_eq!(transition.order.payment_status(), PaymentStatus::Completed);
    assert_eq!(
        transition.reservation.unwrap().status(),
        ReservationStatus::Confirmed
    );
    let level = h
        .store
        .stock_level(StockKey::product(product))
        .await
        .unwrap()
        .unwrap();
    assert_eq!((level.quantity(), level.reserved()), (3, 0));

    let shipped = h
        .fulfillment
        .ship_order(h.tenant, order.id, Some("TRACK-1".to_string()))
        .await
        .unwrap();
    assert_eq!(shipped.tracking_number(), Some("TRACK-1"));
    let delivered = h.fulfillment.deliver_order(h.tenant, order.id).await.unwrap();
    assert_eq!(delivered.status(), OrderStatus::Delivered);

    let err = h
        .fulfillment
        .cancel_order(h.tenant, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn cancelling_a_paid_order_restocks() {
    let h = TestHarness::new();
    let product = h.product(10, 5).await;
    let (user, address) = h.shopper();
    let cart = h.add(user, product, 2).await;
    let order = h
        .fulfillment
        .checkout(h.request(user, address, cart.id))
        .await
        .unwrap()
        .order;
    h.fulfillment
        .confirm_payment(h.tenant, order.id, "pay_456")
        .await
        .unwrap();

    let cancelled = h.fulfillment.cancel_order(h.tenant, order.id).await.unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    let level = h
        .store
        .stock_level(StockKey::product(product))
        .await
        .unwrap()
        .unwrap();
    assert_eq!((level.quantity(), level.reserved()), (5, 0));
}

#[tokio::test]
async fn failed_payment_cancels_and_releases() {
    let h = TestHarness::new();
    let product = h.product(10, 5).await;
    let (user, address) = h.shopper();
    let cart = h.add(user, product, 4).await;
    let order = h
        .fulfillment
        .checkout(h.request(user, address, cart.id))
        .await
        .unwrap()
        .order;
    assert_eq!(h.available(product).await, 1);

    let transition = h.fulfillment.fail_payment(h.tenant, order.id).await.unwrap();
    assert_eq!(transition.order.status(), OrderStatus::Cancelled);
    assert_eq!(transition.order.payment_status(), PaymentStatus::Failed);
    assert_eq!(h.available(product).await, 5);

    let types = h.audit.event_types().await;
    assert!(types.contains(&"PaymentFailed"));
    assert!(types.contains(&"OrderCancelled"));
}

#[tokio::test]
async fn blank_payment_reference_is_rejected() {
    let h = TestHarness::new();
    let product = h.product(10, 5).await;
    let (user, address) = h.shopper();
    let cart = h.add(user, product, 1).await;
    let order = h
        .fulfillment
        .create_order(h.request(user, address, cart.id))
        .await
        .unwrap();

    let err = h
        .fulfillment
        .confirm_payment(h.tenant, order.id, "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::Validation(_)));
}

#[tokio::test]
async fn orders_are_scoped_to_their_tenant() {
    let h = TestHarness::new();
    let product = h.product(10, 5).await;
    let (user, address) = h.shopper();
    let cart = h.add(user, product, 1).await;
    let order = h
        .fulfillment
        .create_order(h.request(user, address, cart.id))
        .await
        .unwrap();

    assert_eq!(
        h.fulfillment.order(h.tenant, order.id).await.unwrap().id,
        order.id
    );
    let err = h
        .fulfillment
        .order(TenantId::new(), order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::NotFound { .. }));
}

#[tokio::test]
async fn order_numbers_increase_per_tenant() {
    let h = TestHarness::new();
    let product = h.product(10, 10).await;
    let mut sequences = Vec::new();
    for _ in 0..3 {
        let (user, address) = h.shopper();
        let cart = h.add(user, product, 1).await;
        let order = h
            .fulfillment
            .create_order(h.request(user, address, cart.id))
            .await
            .unwrap();
        sequences.push(order.order_number.sequence());
    }
    assert_eq!(sequences, vec![1, 2, 3]);
}
