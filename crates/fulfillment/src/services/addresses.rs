//! User-owned postal addresses.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use common::{AddressId, UserId};
use domain::Address;

use crate::error::Result;

#[async_trait]
pub trait AddressBook: Send + Sync {
    /// The address, only if it belongs to `user_id`.
    async fn address(&self, user_id: UserId, id: AddressId) -> Result<Option<Address>>;
}

/// In-memory address book for testing.
#[derive(Debug, Default)]
pub struct InMemoryAddressBook {
    addresses: RwLock<HashMap<AddressId, Address>>,
}

impl InMemoryAddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, address: Address) {
        self.addresses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.id, address);
    }
}

#[async_trait]
impl AddressBook for InMemoryAddressBook {
    async fn address(&self, user_id: UserId, id: AddressId) -> Result<Option<Address>> {
        let addresses = self.addresses.read().unwrap_or_else(PoisonError::into_inner);
        Ok(addresses
            .get(&id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }
}
