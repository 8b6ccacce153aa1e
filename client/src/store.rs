use std::sync::Arc;

use duka_common::cart::{CartItem, CartMutation, CartState, LineKey};
use duka_common::money::Money;

use crate::api::ServerCart;
use crate::persist::{CartSnapshot, SnapshotStore};
use crate::session::Identity;

/// The authoritative in-memory view of the cart for rendering, independent
/// of network latency. Every mutation is followed by a snapshot write keyed
/// by the current identity.
pub struct CartStore {
    state: CartState,
    identity: Identity,
    snapshots: Arc<dyn SnapshotStore>,
}

impl CartStore {
    /// Create the store and hydrate it from the identity's persisted
    /// snapshot, if one exists.
    pub fn new(snapshots: Arc<dyn SnapshotStore>, identity: Identity) -> Self {
        let mut store = Self {
            state: CartState::empty(),
            identity,
            snapshots,
        };
        store.hydrate();
        store
    }

    fn hydrate(&mut self) {
        if let Some(snapshot) = self.snapshots.load(&self.identity.storage_key()) {
            self.state.items = snapshot.items;
            self.state.updated_at = snapshot.updated_at;
            self.state.synced_with_server = false;
        }
    }

    pub fn state(&self) -> &CartState {
        &self.state
    }

    pub fn items(&self) -> &[CartItem] {
        &self.state.items
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn subtotal(&self) -> Money {
        self.state.subtotal()
    }

    pub fn line(&self, key: LineKey) -> Option<&CartItem> {
        self.state.line(key)
    }

    fn persist(&self) {
        let snapshot = CartSnapshot {
            items: self.state.items.clone(),
            updated_at: self.state.updated_at,
        };
        self.snapshots
            .save(&self.identity.storage_key(), &snapshot);
    }

    pub fn add_item(&mut self, item: CartItem) -> CartMutation {
        let outcome = self.state.add_item(item);
        if outcome.is_applied() {
            self.persist();
        }
        outcome
    }

    pub fn remove_item(&mut self, key: LineKey) {
        self.state.remove_item(key);
        self.persist();
    }

    pub fn update_quantity(&mut self, key: LineKey, delta: i32) -> CartMutation {
        let outcome = self.state.update_quantity(key, delta);
        self.persist();
        outcome
    }

    pub fn set_quantity(&mut self, key: LineKey, quantity: u32) -> CartMutation {
        let outcome = self.state.set_quantity(key, quantity);
        self.persist();
        outcome
    }

    pub fn clear(&mut self) {
        self.state.clear();
        self.persist();
    }

    /// Put back a full item list, e.g. after a failed server-side clear.
    pub fn replace_items(&mut self, items: Vec<CartItem>) {
        self.state.items = items;
        self.state.updated_at = chrono::Utc::now();
        self.state.synced_with_server = false;
        self.persist();
    }

    /// Replace state wholesale from the new identity's snapshot. Used on
    /// sign-in and sign-out; the previous identity's snapshot stays on disk
    /// untouched (the anonymous one is discarded separately after a merge).
    pub fn switch_identity(&mut self, identity: Identity) {
        self.identity = identity;
        self.state = CartState::empty();
        self.hydrate();
    }

    /// Read another identity's snapshot without switching to it.
    pub fn peek_snapshot(&self, identity: &Identity) -> Option<CartSnapshot> {
        self.snapshots.load(&identity.storage_key())
    }

    /// Drop a snapshot for good. Called exactly once after the anonymous
    /// cart has been merged into the authenticated one.
    pub fn discard_snapshot(&self, identity: &Identity) {
        self.snapshots.remove(&identity.storage_key());
    }

    /// Replace local state with the server's canonical cart after a
    /// confirmed reconciliation.
    pub fn adopt_server_cart(&mut self, cart: &ServerCart) {
        self.state.items = cart.lines.iter().map(|l| l.item.clone()).collect();
        self.state.applied_coupon_code = cart.applied_coupon_code.clone();
        self.state.discount_amount = cart.discount_amount;
        self.state.updated_at = chrono::Utc::now();
        self.state.synced_with_server = true;
        self.persist();
    }

    /// Roll back a single line to its pre-optimistic state, leaving every
    /// other line untouched.
    pub fn restore_line(&mut self, key: LineKey, prior: Option<CartItem>) {
        self.state.items.retain(|i| i.key() != key);
        if let Some(item) = prior {
            self.state.items.push(item);
        }
        self.state.updated_at = chrono::Utc::now();
        self.state.synced_with_server = false;
        self.persist();
    }

    pub fn set_coupon(&mut self, code: String, discount: Money) {
        self.state.set_coupon(code, discount);
        self.persist();
    }

    pub fn clear_coupon(&mut self) {
        self.state.clear_coupon();
        self.persist();
    }
}
