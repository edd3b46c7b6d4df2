//! Per-key mutual exclusion for ledger mutations.
//!
//! Every key maps to one async mutex, created on first use. Callers needing
//! several keys must take them in one `acquire` call, which locks them in
//! sorted order so that two writers can never wait on each other.

use crate::domain::resources::ResourceRef;
use crate::domain::types::{CustomerId, InvoicePeriod};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// A unique key identifying a lock scope.
///
/// Resource keys order before invoice keys. Code that has to take a resource
/// key and later an invoice key therefore still respects the global order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Resource(ResourceRef),
    Invoice {
        customer_id: CustomerId,
        period: InvoicePeriod,
    },
}

impl LockKey {
    pub fn invoice(customer_id: &CustomerId, period: InvoicePeriod) -> Self {
        LockKey::Invoice {
            customer_id: customer_id.clone(),
            period,
        }
    }

    pub fn resource(resource: ResourceRef) -> Self {
        LockKey::Resource(resource)
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Resource(resource) => write!(f, "resource/{}", resource),
            LockKey::Invoice {
                customer_id,
                period,
            } => write!(f, "invoice/{}/{}", customer_id, period),
        }
    }
}

type Slots = Arc<Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>>;

/// Guards held for a set of keys. Dropping it releases all of them and
/// forgets slots nobody else is holding or waiting on.
pub struct LockSet {
    keys: Vec<LockKey>,
    guards: Vec<OwnedMutexGuard<()>>,
    slots: Slots,
}

impl LockSet {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        self.guards.clear();

        // Slots are only cloned under this map lock, so a count of one here
        // means no other caller can reach the mutex.
        let mut slots = self.slots.lock();
        for key in &self.keys {
            if slots.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                slots.remove(key);
            }
        }
    }
}

impl fmt::Debug for LockSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockSet").field("keys", &self.keys).finish()
    }
}

#[derive(Debug, Default, Clone)]
pub struct LockRegistry {
    locks: Slots,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &LockKey) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Waits until every key in `keys` is held by the caller.
    pub async fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> LockSet {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let slot = self.slot(key);
            guards.push(slot.lock_owned().await);
            trace!(key = %key, "Acquired ledger lock");
        }

        LockSet {
            keys,
            guards,
            slots: self.locks.clone(),
        }
    }

    pub async fn acquire_one(&self, key: LockKey) -> LockSet {
        self.acquire([key]).await
    }

    /// True when no key is held or awaited.
    pub fn is_idle(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resources::ResourceKind;
    use crate::domain::types::ResourceId;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let registry = LockRegistry::new();
        let key = LockKey::invoice(&CustomerId::new("acme"), InvoicePeriod::new(2017, 1).unwrap());

        let held = registry.acquire_one(key.clone()).await;
        let contender = registry.clone();
        let waiting = tokio::spawn(async move { contender.acquire_one(key).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(held);
        let acquired = waiting.await.unwrap();
        assert_eq!(acquired.keys().len(), 1);
        assert_eq!(registry.locks.lock().len(), 1);

        drop(acquired);
        assert!(registry.is_idle());
    }

    #[tokio::test]
    async fn test_released_slots_are_pruned() {
        let registry = LockRegistry::new();
        let customer = CustomerId::new("acme");

        for month in 1..=12 {
            let key = LockKey::invoice(&customer, InvoicePeriod::new(2017, month).unwrap());
            let set = registry.acquire_one(key).await;
            assert_eq!(registry.locks.lock().len(), 1);
            drop(set);
        }
        assert!(registry.is_idle());
    }

    #[tokio::test]
    async fn test_keys_are_sorted_and_deduplicated() {
        let registry = LockRegistry::new();
        let customer = CustomerId::new("acme");
        let invoice = LockKey::invoice(&customer, InvoicePeriod::new(2017, 2).unwrap());
        let resource = LockKey::resource(ResourceRef::new(ResourceKind::Package, ResourceId::new()));

        let set = registry
            .acquire([invoice.clone(), resource.clone(), invoice.clone()])
            .await;
        assert_eq!(set.keys(), &[resource, invoice]);
    }
}
