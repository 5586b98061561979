//! Structured audit trail for reservation and order transitions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, ReservationId, TenantId};
use domain::{OrderNumber, StockKey};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// A reservation or order transition worth auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AuditEvent {
    ReservationCreated {
        reservation_id: ReservationId,
        order_id: OrderId,
        units: u32,
    },
    ReservationConfirmed {
        reservation_id: ReservationId,
        order_id: OrderId,
    },
    ReservationCancelled {
        reservation_id: ReservationId,
        order_id: OrderId,
    },
    OrderCreated {
        order_id: OrderId,
        tenant_id: TenantId,
        order_number: OrderNumber,
        total: Money,
    },
    OrderCancelled {
        order_id: OrderId,
    },
    PaymentConfirmed {
        order_id: OrderId,
        payment_reference: String,
    },
    PaymentFailed {
        order_id: OrderId,
    },
    OrderShipped {
        order_id: OrderId,
        tracking_number: Option<String>,
    },
    OrderDelivered {
        order_id: OrderId,
    },
    StockAdjusted {
        key: StockKey,
        delta: i64,
        reason: String,
    },
}

impl AuditEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::ReservationCreated { .. } => "ReservationCreated",
            AuditEvent::ReservationConfirmed { .. } => "ReservationConfirmed",
            AuditEvent::ReservationCancelled { .. } => "ReservationCancelled",
            AuditEvent::OrderCreated { .. } => "OrderCreated",
            AuditEvent::OrderCancelled { .. } => "OrderCancelled",
            AuditEvent::PaymentConfirmed { .. } => "PaymentConfirmed",
            AuditEvent::PaymentFailed { .. } => "PaymentFailed",
            AuditEvent::OrderShipped { .. } => "OrderShipped",
            AuditEvent::OrderDelivered { .. } => "OrderDelivered",
            AuditEvent::StockAdjusted { .. } => "StockAdjusted",
        }
    }
}

/// Receives audit events. Recording never fails the operation that
/// produced the event.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent, at: DateTime<Utc>);
}

/// Emits every event as a structured `tracing` record on the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent, at: DateTime<Utc>) {
        match serde_json::to_string(&event) {
            Ok(payload) => tracing::info!(
                target: "audit",
                event_type = event.event_type(),
                %at,
                %payload,
                "audit event"
            ),
            Err(e) => tracing::error!(
                target: "audit",
                event_type = event.event_type(),
                error = %e,
                "failed to serialize audit event"
            ),
        }
    }
}

/// In-memory audit sink for testing.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded events, oldest first.
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    pub async fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .await
            .iter()
            .map(AuditEvent::event_type)
            .collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, event: AuditEvent, _at: DateTime<Utc>) {
        self.events.lock().await.push(event);
    }
}
