//! Order fulfillment orchestrator.
//!
//! Turns a cart into a durable order, reserves its stock, and drives the
//! order through payment, shipping and cancellation. Steps that happen after
//! the order commits (coupon usage, stock reservation) never roll the order
//! back; when they fail for infrastructure reasons they are queued as
//! follow-up tasks.

use std::time::{Duration, Instant};

use chrono::{Datelike, Utc};
use common::{AddressId, CartId, CouponId, OrderId, ProductId, TenantId, UserId, VariantId};
use domain::{
    Address, Cart, CartValidation, CheckoutIssue, Coupon, CouponError, Order, OrderDraft,
    OrderLine, OrderStatus, PricingPolicy, Reservation, StockKey,
};
use serde::{Deserialize, Serialize};
use store::{CommerceStore, FollowUpKind, FollowUpTask, OrderTransition, PaymentOutcome};

use crate::DEFAULT_CALL_TIMEOUT;
use crate::cart::{CartService, CartValidator};
use crate::coupons::CouponEngine;
use crate::error::{FulfillmentError, Result, bounded};
use crate::ledger::StockLedger;
use crate::reservations::ReservationManager;
use crate::services::{AuditEvent, Collaborators};

/// Everything needed to turn a cart into an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub cart_id: CartId,
    pub shipping_address_id: AddressId,
    /// Defaults to the shipping address.
    pub billing_address_id: Option<AddressId>,
    pub payment_method: String,
    pub coupon_code: Option<String>,
}

/// Result of a checkout: the order, its reservation (absent when reserving
/// was deferred to a follow-up task) and any price drift warnings.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: Order,
    pub reservation: Option<Reservation>,
    pub warnings: Vec<CheckoutIssue>,
}

pub struct OrderFulfillment<S> {
    pub(crate) store: S,
    pub(crate) reservations: ReservationManager<S>,
    pub(crate) coupons: CouponEngine<S>,
    validator: CartValidator<S>,
    carts: CartService<S>,
    pub(crate) collaborators: Collaborators,
    pricing: PricingPolicy,
    pub(crate) call_timeout: Duration,
}

impl<S> OrderFulfillment<S>
where
    S: CommerceStore + Clone,
{
    pub fn new(store: S, collaborators: Collaborators, pricing: PricingPolicy) -> Self {
        Self {
            reservations: ReservationManager::new(store.clone(), collaborators.audit.clone()),
            coupons: CouponEngine::new(store.clone()),
            validator: CartValidator::new(store.clone(), collaborators.catalog.clone()),
            carts: CartService::new(
                store.clone(),
                collaborators.catalog.clone(),
                collaborators.tenants.clone(),
            ),
            store,
            collaborators,
            pricing,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Bounds every store and collaborator call made by this instance.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.reservations = self.reservations.with_call_timeout(timeout);
        self.coupons = self.coupons.with_call_timeout(timeout);
        self.validator = self.validator.with_call_timeout(timeout);
        self.carts = self.carts.with_call_timeout(timeout);
        self.call_timeout = timeout;
        self
    }

    pub fn ledger(&self) -> &StockLedger<S> {
        self.reservations.ledger()
    }

    pub fn reservations(&self) -> &ReservationManager<S> {
        &self.reservations
    }

    pub fn coupons(&self) -> &CouponEngine<S> {
        &self.coupons
    }

    pub fn validator(&self) -> &CartValidator<S> {
        &self.validator
    }

    pub fn carts(&self) -> &CartService<S> {
        &self.carts
    }

    pub fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Stock key of a product (or variant) the tenant sells.
    pub async fn tenant_stock_key(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> Result<StockKey> {
        self.collaborators.tenants.ensure_access(tenant_id).await?;
        bounded(
            "catalog_product",
            self.call_timeout,
            self.collaborators.catalog.product(product_id),
        )
        .await?
        .filter(|p| p.tenant_id == tenant_id)
        .ok_or_else(|| FulfillmentError::not_found("product", product_id))?;

        if let Some(variant_id) = variant_id {
            bounded(
                "catalog_variant",
                self.call_timeout,
                self.collaborators.catalog.variant(variant_id),
            )
            .await?
            .filter(|v| v.product_id == product_id)
            .ok_or_else(|| FulfillmentError::not_found("variant", variant_id))?;
        }
        Ok(StockKey::new(product_id, variant_id))
    }

    /// Re-checks a cart the caller owns without changing anything.
    #[tracing::instrument(skip(self))]
    pub async fn validate_cart(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        cart_id: CartId,
    ) -> Result<CartValidation> {
        self.collaborators.tenants.ensure_access(tenant_id).await?;
        let cart = self.owned_cart(tenant_id, user_id, cart_id).await?;
        self.validator.validate_for_checkout(&cart).await
    }

    /// Creates a Pending order from the cart and empties the cart.
    ///
    /// Does not reserve stock; see [`OrderFulfillment::checkout`].
    #[tracing::instrument(skip(self, request), fields(tenant_id = %request.tenant_id, cart_id = %request.cart_id))]
    pub async fn create_order(&self, request: CreateOrder) -> Result<Order> {
        let started = Instant::now();
        self.collaborators
            .tenants
            .ensure_access(request.tenant_id)
            .await?;

        let cart = self
            .owned_cart(request.tenant_id, request.user_id, request.cart_id)
            .await?;
        if cart.is_empty() {
            return Err(FulfillmentError::EmptyCart);
        }
        let (shipping_address, billing_address) = self.resolve_addresses(&request).await?;

        let quote = self.pricing.quote(cart.subtotal());
        let coupon = match request.coupon_code.as_deref() {
            Some(code) if !code.trim().is_empty() => {
                self.try_coupon(request.tenant_id, code, quote.before_discount())
                    .await
            }
            _ => None,
        };
        let totals = match &coupon {
            Some(coupon) => quote.with_discount(
                self.coupons
                    .calculate_discount(coupon, quote.before_discount()),
            ),
            None => quote,
        };

        let order_number = bounded(
            "next_order_number",
            self.call_timeout,
            self.store
                .next_order_number(request.tenant_id, Utc::now().year()),
        )
        .await?;

        let draft = OrderDraft {
            tenant_id: request.tenant_id,
            user_id: request.user_id,
            lines: cart.items().iter().map(OrderLine::from).collect(),
            totals,
            coupon_code: coupon.as_ref().map(|c| c.code.clone()),
            shipping_address,
            billing_address,
            payment_method: request.payment_method,
        };
        let order = Order::place(draft, order_number)?;
        bounded(
            "place_order",
            self.call_timeout,
            self.store.place_order(&order, cart.id),
        )
        .await?;

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("order_creation_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.totals.total,
            discount = %order.totals.discount,
            "order created"
        );
        self.collaborators
            .audit
            .record(
                AuditEvent::OrderCreated {
                    order_id: order.id,
                    tenant_id: order.tenant_id,
                    order_number: order.order_number,
                    total: order.totals.total,
                },
                order.created_at,
            )
            .await;

        if let Some(coupon) = coupon {
            self.record_coupon_use(coupon.id, order.id).await;
        }
        Ok(order)
    }

    /// Validates the cart, creates the order and reserves its stock.
    ///
    /// A stock rejection cancels the new order, puts its lines back in the
    /// cart and is returned to the caller. An infrastructure failure while reserving leaves the order
    /// Pending and queues the reservation as a follow-up task.
    #[tracing::instrument(skip(self, request), fields(tenant_id = %request.tenant_id, cart_id = %request.cart_id))]
    pub async fn checkout(&self, request: CreateOrder) -> Result<CheckoutOutcome> {
        self.collaborators
            .tenants
            .ensure_access(request.tenant_id)
            .await?;
        let cart = self
            .owned_cart(request.tenant_id, request.user_id, request.cart_id)
            .await?;
        let report = self.validator.validate_for_checkout(&cart).await?;
        if !report.is_valid() {
            return Err(FulfillmentError::InvalidCart(report.errors));
        }

        let order = self.create_order(request).await?;
        let reservation = match self
            .reservations
            .create(order.id, order.reservation_lines())
            .await
        {
            Ok(reservation) => Some(reservation),
            Err(e) if e.is_retryable() || matches!(e, FulfillmentError::Store(_)) => {
                tracing::warn!(order_id = %order.id, error = %e, "reservation deferred to follow-up");
                self.enqueue_follow_up(FollowUpKind::CreateReservation { order_id: order.id }, &e)
                    .await;
                None
            }
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "stock unavailable, cancelling order");
                if let Err(cancel_err) = self.cancel_unreserved(&order).await {
                    tracing::error!(
                        order_id = %order.id,
                        error = %cancel_err,
                        "failed to cancel order after stock rejection"
                    );
                }
                return Err(e);
            }
        };

        Ok(CheckoutOutcome {
            order,
            reservation,
            warnings: report.warnings,
        })
    }

    /// An order within the tenant.
    pub async fn order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Order> {
        self.collaborators.tenants.ensure_access(tenant_id).await?;
        self.load_order(tenant_id, order_id).await
    }

    /// Cancels a Pending or Processing order and puts its stock back.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Order> {
        self.collaborators.tenants.ensure_access(tenant_id).await?;
        self.load_order(tenant_id, order_id).await?;

        let transition = bounded(
            "cancel_order",
            self.call_timeout,
            self.store.cancel_order(order_id, Utc::now()),
        )
        .await?;

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(%order_id, "order cancelled");
        self.collaborators
            .audit
            .record(AuditEvent::OrderCancelled { order_id }, Utc::now())
            .await;
        Ok(transition.order)
    }

    /// Records a successful payment: confirms the reservation and starts
    /// processing.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        payment_reference: &str,
    ) -> Result<OrderTransition> {
        let reference = payment_reference.trim();
        if reference.is_empty() {
            return Err(FulfillmentError::Validation(
                "payment reference is required".to_string(),
            ));
        }
        self.collaborators.tenants.ensure_access(tenant_id).await?;
        self.load_order(tenant_id, order_id).await?;

        let transition = bounded(
            "settle_payment",
            self.call_timeout,
            self.store.settle_payment(
                order_id,
                PaymentOutcome::Completed {
                    reference: reference.to_string(),
                },
                Utc::now(),
            ),
        )
        .await?;

        metrics::counter!("payments_settled_total", "outcome" => "completed").increment(1);
        tracing::info!(%order_id, payment_reference = reference, "payment confirmed");
        self.collaborators
            .audit
            .record(
                AuditEvent::PaymentConfirmed {
                    order_id,
                    payment_reference: reference.to_string(),
                },
                Utc::now(),
            )
            .await;
        if let Some(reservation) = &transition.reservation {
            self.collaborators
                .audit
                .record(
                    AuditEvent::ReservationConfirmed {
                        reservation_id: reservation.id,
                        order_id,
                    },
                    Utc::now(),
                )
                .await;
        }
        Ok(transition)
    }

    /// Records a failed payment: releases the reservation and cancels the
    /// order.
    #[tracing::instrument(skip(self))]
    pub async fn fail_payment(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<OrderTransition> {
        self.collaborators.tenants.ensure_access(tenant_id).await?;
        self.load_order(tenant_id, order_id).await?;

        let transition = bounded(
            "settle_payment",
            self.call_timeout,
            self.store
                .settle_payment(order_id, PaymentOutcome::Failed, Utc::now()),
        )
        .await?;

        metrics::counter!("payments_settled_total", "outcome" => "failed").increment(1);
        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(%order_id, "payment failed, order cancelled");
        self.collaborators
            .audit
            .record(AuditEvent::PaymentFailed { order_id }, Utc::now())
            .await;
        self.collaborators
            .audit
            .record(AuditEvent::OrderCancelled { order_id }, Utc::now())
            .await;
        Ok(transition)
    }

    /// Moves a Processing order to Shipped.
    #[tracing::instrument(skip(self))]
    pub async fn ship_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
        tracking_number: Option<String>,
    ) -> Result<Order> {
        self.collaborators.tenants.ensure_access(tenant_id).await?;
        let mut order = self.load_order(tenant_id, order_id).await?;
        let expected = order.status();
        order.ship(tracking_number.clone(), Utc::now())?;
        bounded(
            "update_order_status",
            self.call_timeout,
            self.store.update_order_status(&order, expected),
        )
        .await?;

        tracing::info!(%order_id, ?tracking_number, "order shipped");
        self.collaborators
            .audit
            .record(
                AuditEvent::OrderShipped {
                    order_id,
                    tracking_number,
                },
                Utc::now(),
            )
            .await;
        Ok(order)
    }

    /// Moves a Shipped order to Delivered.
    #[tracing::instrument(skip(self))]
    pub async fn deliver_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Order> {
        self.collaborators.tenants.ensure_access(tenant_id).await?;
        let mut order = self.load_order(tenant_id, order_id).await?;
        order.deliver(Utc::now())?;
        bounded(
            "update_order_status",
            self.call_timeout,
            self.store
                .update_order_status(&order, OrderStatus::Shipped),
        )
        .await?;

        tracing::info!(%order_id, "order delivered");
        self.collaborators
            .audit
            .record(AuditEvent::OrderDelivered { order_id }, Utc::now())
            .await;
        Ok(order)
    }

    async fn owned_cart(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        cart_id: CartId,
    ) -> Result<Cart> {
        let cart = bounded("cart", self.call_timeout, self.store.cart(cart_id))
            .await?
            .filter(|c| c.tenant_id == tenant_id)
            .ok_or_else(|| FulfillmentError::not_found("cart", cart_id))?;
        if cart.user_id != user_id {
            return Err(FulfillmentError::Forbidden(format!(
                "cart {cart_id} belongs to another user"
            )));
        }
        Ok(cart)
    }

    pub(crate) async fn load_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Order> {
        bounded("order", self.call_timeout, self.store.order(order_id))
            .await?
            .filter(|o| o.tenant_id == tenant_id)
            .ok_or_else(|| FulfillmentError::not_found("order", order_id))
    }

    async fn resolve_addresses(&self, request: &CreateOrder) -> Result<(Address, Address)> {
        let shipping = self
            .address(request.user_id, request.shipping_address_id)
            .await?;
        let billing = match request.billing_address_id {
            Some(id) if id != request.shipping_address_id => {
                self.address(request.user_id, id).await?
            }
            _ => shipping.clone(),
        };
        Ok((shipping, billing))
    }

    async fn address(&self, user_id: UserId, id: AddressId) -> Result<Address> {
        bounded(
            "address",
            self.call_timeout,
            self.collaborators.addresses.address(user_id, id),
        )
        .await?
        .ok_or_else(|| FulfillmentError::not_found("address", id))
    }

    /// A coupon that applies to `total`, or None. Rejections do not block
    /// the order.
    async fn try_coupon(
        &self,
        tenant_id: TenantId,
        code: &str,
        total: common::Money,
    ) -> Option<Coupon> {
        match self.coupons.validate(tenant_id, code, total).await {
            Ok(coupon) => Some(coupon),
            Err(e) => {
                tracing::warn!(
                    %tenant_id,
                    code,
                    error = %e,
                    "coupon not applied, continuing without discount"
                );
                None
            }
        }
    }

    async fn record_coupon_use(&self, coupon_id: CouponId, order_id: OrderId) {
        match self.coupons.increment_usage(coupon_id).await {
            Ok(_) => {}
            Err(FulfillmentError::Coupon(CouponError::UsageLimitReached { code })) => {
                metrics::counter!("coupon_usage_overruns_total").increment(1);
                tracing::error!(%order_id, %code, "coupon usage limit reached after order commit");
            }
            Err(e) => {
                tracing::warn!(%order_id, %coupon_id, error = %e, "coupon usage not recorded");
                self.enqueue_follow_up(
                    FollowUpKind::IncrementCouponUsage {
                        coupon_id,
                        order_id,
                    },
                    &e,
                )
                .await;
            }
        }
    }

    /// Cancels an order whose stock could not be reserved and returns its
    /// lines to the shopper's cart. An order that already left Pending is
    /// left alone.
    pub(crate) async fn cancel_unreserved(&self, order: &Order) -> Result<()> {
        let order_id = order.id;
        match bounded(
            "cancel_order",
            self.call_timeout,
            self.store.cancel_order(order_id, Utc::now()),
        )
        .await
        {
            Ok(_) => {}
            Err(FulfillmentError::InvalidStateTransition { from, .. }) => {
                tracing::info!(%order_id, status = %from, "order already left pending");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        metrics::counter!("orders_cancelled_total").increment(1);
        self.collaborators
            .audit
            .record(AuditEvent::OrderCancelled { order_id }, Utc::now())
            .await;

        if let Err(e) = self
            .carts
            .restore_items(order.tenant_id, order.user_id, order.cart_items())
            .await
        {
            tracing::warn!(%order_id, error = %e, "failed to return order lines to the cart");
        }
        Ok(())
    }

    pub(crate) async fn enqueue_follow_up(&self, kind: FollowUpKind, error: &FulfillmentError) {
        let name = kind.name();
        let order_id = kind.order_id();
        let task = FollowUpTask::new(kind, error.to_string());
        match bounded(
            "enqueue_follow_up",
            self.call_timeout,
            self.store.enqueue_follow_up(&task),
        )
        .await
        {
            Ok(()) => {
                metrics::counter!("follow_up_tasks_enqueued_total", "kind" => name).increment(1);
                tracing::info!(%order_id, task_id = %task.id, kind = name, "follow-up task queued");
            }
            Err(e) => {
                tracing::error!(
                    %order_id,
                    kind = name,
                    error = %e,
                    cause = %error,
                    "failed to queue follow-up task"
                );
            }
        }
    }
}
