//! Strongly typed identifiers.
//!
//! Every entity gets its own UUID wrapper so a product id can never be
//! passed where an order id is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Tenant (storefront) that owns carts, coupons and orders.
    TenantId
);
uuid_id!(
    /// Shopper account.
    UserId
);
uuid_id!(
    /// Catalog product.
    ProductId
);
uuid_id!(
    /// Purchasable variant of a product (size, colour, ...).
    VariantId
);
uuid_id!(CartId);
uuid_id!(OrderId);
uuid_id!(ReservationId);
uuid_id!(CouponId);
uuid_id!(AddressId);
uuid_id!(
    /// Entry in the stock movement log.
    MovementId
);
uuid_id!(
    /// Post-commit task awaiting retry.
    FollowUpId
);
