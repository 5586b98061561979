//! Shared types for the inventory reservation and order fulfillment engine.

pub mod ids;
pub mod money;

pub use ids::{
    AddressId, CartId, CouponId, FollowUpId, MovementId, OrderId, ProductId, ReservationId,
    TenantId, UserId, VariantId,
};
pub use money::{BasisPoints, Money};
