//! Reconciles the local cart with the server-held cart for authenticated
//! identities; purely local operation otherwise.
//!
//! Every mutation is optimistic: it lands in the local store first so the UI
//! updates with zero latency, then the corresponding REST call is issued. On
//! success the server's canonical cart replaces local state; on failure only
//! the failed operation's change is rolled back. Operations on the same
//! `(product, variant)` key are serialized through a per-key async mutex so
//! an interleaved rollback can never clobber another in-flight update.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use duka_common::cart::{CartItem, CartMutation, CartState, LineKey};
use duka_common::money::Money;
use tokio::sync::Mutex as AsyncMutex;

use crate::api::{CartApi, CartLineRef, CouponValidation, ServerCart};
use crate::error::{ApiError, CartError};
use crate::notify::{Notice, Notifier};
use crate::session::{Identity, Session};
use crate::store::CartStore;

const DEFAULT_DEBOUNCE_MS: u64 = 300;

pub struct CartSync {
    api: Arc<CartApi>,
    store: Arc<StdMutex<CartStore>>,
    notifier: Arc<dyn Notifier>,
    session: RwLock<Session>,
    /// Per-line async mutexes: apply and rollback happen in issuance order.
    line_locks: DashMap<LineKey, Arc<AsyncMutex<()>>>,
    /// Server row ids for known lines, refreshed on every adoption.
    line_ids: DashMap<LineKey, u64>,
    /// Debounce generation per line; a flush only proceeds if no newer
    /// change superseded it while it slept.
    debounce_gen: DashMap<LineKey, u64>,
    /// Pre-burst line state for rollback of debounced quantity changes.
    pending_prior: DashMap<LineKey, Option<CartItem>>,
    debounce_ms: AtomicU64,
}

impl CartSync {
    pub fn new(
        api: Arc<CartApi>,
        store: Arc<StdMutex<CartStore>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            api,
            store,
            notifier,
            session: RwLock::new(Session::anonymous()),
            line_locks: DashMap::new(),
            line_ids: DashMap::new(),
            debounce_gen: DashMap::new(),
            pending_prior: DashMap::new(),
            debounce_ms: AtomicU64::new(DEFAULT_DEBOUNCE_MS),
        }
    }

    pub fn session(&self) -> Session {
        self.session.read().unwrap().clone()
    }

    /// Shorten or lengthen the quantity-change debounce window.
    pub fn set_debounce(&self, window: Duration) {
        self.debounce_ms
            .store(window.as_millis() as u64, Ordering::Relaxed);
    }

    fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.load(Ordering::Relaxed))
    }

    pub fn items(&self) -> Vec<CartItem> {
        self.store.lock().unwrap().items().to_vec()
    }

    pub fn state(&self) -> CartState {
        self.store.lock().unwrap().state().clone()
    }

    fn line_lock(&self, key: LineKey) -> Arc<AsyncMutex<()>> {
        self.line_locks
            .entry(key)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn adopt(&self, cart: &ServerCart) {
        self.line_ids.clear();
        for line in &cart.lines {
            self.line_ids.insert(line.item.key(), line.line_id);
        }
        self.store.lock().unwrap().adopt_server_cart(cart);
    }

    // ─── Identity transitions ────────────────────────────────────────────────

    /// Anonymous → authenticated. A non-empty anonymous snapshot is merged
    /// into the server cart exactly once, then discarded; an empty one means
    /// we simply fetch the server cart.
    pub async fn sign_in(&self, session: Session) -> Result<(), CartError> {
        let anon_snapshot = {
            let store = self.store.lock().unwrap();
            store.peek_snapshot(&Identity::Anonymous)
        };
        let identity = session.identity().clone();
        {
            let mut store = self.store.lock().unwrap();
            store.switch_identity(identity);
        }
        *self.session.write().unwrap() = session.clone();

        let anon_lines: Vec<CartLineRef> = anon_snapshot
            .map(|s| s.items.iter().map(CartLineRef::from).collect())
            .unwrap_or_default();

        let cart = if anon_lines.is_empty() {
            self.api.fetch_cart(&session).await
        } else {
            let merged = self.api.merge_cart(&session, &anon_lines).await;
            if merged.is_ok() {
                // Discard only after the server confirmed the merge, so a
                // failed attempt can be retried on the next sign-in.
                self.store
                    .lock()
                    .unwrap()
                    .discard_snapshot(&Identity::Anonymous);
            }
            merged
        };

        match cart {
            Ok(cart) => {
                self.adopt(&cart);
                Ok(())
            }
            Err(e) => {
                self.notifier
                    .notify(Notice::error(format!("Could not load your cart: {e}")));
                Err(e.into())
            }
        }
    }

    pub fn sign_out(&self) {
        *self.session.write().unwrap() = Session::anonymous();
        self.line_ids.clear();
        self.pending_prior.clear();
        self.store
            .lock()
            .unwrap()
            .switch_identity(Identity::Anonymous);
    }

    /// Re-fetch and adopt the server cart. No-op while anonymous.
    pub async fn refresh(&self) -> Result<(), CartError> {
        let session = self.session();
        if !session.is_authenticated() {
            return Ok(());
        }
        let cart = self.api.fetch_cart(&session).await?;
        self.adopt(&cart);
        Ok(())
    }

    // ─── Mutations ───────────────────────────────────────────────────────────

    pub async fn add_item(&self, item: CartItem) -> Result<(), CartError> {
        let key = item.key();
        let lock = self.line_lock(key);
        let _guard = lock.lock().await;

        let session = self.session();
        let requested = CartLineRef::from(&item);
        let (prior, outcome) = {
            let mut store = self.store.lock().unwrap();
            let prior = store.line(key).cloned();
            let outcome = store.add_item(item);
            (prior, outcome)
        };
        match outcome {
            CartMutation::Rejected { max } => {
                self.notifier.notify(Notice::warning(format!(
                    "Only {max} of this item can be ordered"
                )));
                return Err(CartError::StockLimit { max });
            }
            CartMutation::Clamped { max } => {
                self.notifier.notify(Notice::info(format!(
                    "Quantity adjusted to the available stock of {max}"
                )));
            }
            CartMutation::Applied => {}
        }
        if !session.is_authenticated() {
            return Ok(());
        }
        match self.api.add_line(&session, &requested).await {
            Ok(cart) => {
                self.adopt(&cart);
                Ok(())
            }
            Err(e) => {
                self.store.lock().unwrap().restore_line(key, prior);
                self.notifier
                    .notify(Notice::error(format!("Could not add the item: {e}")));
                Err(e.into())
            }
        }
    }

    pub async fn remove_item(&self, key: LineKey) -> Result<(), CartError> {
        let lock = self.line_lock(key);
        let _guard = lock.lock().await;

        let session = self.session();
        let prior = {
            let mut store = self.store.lock().unwrap();
            let prior = store.line(key).cloned();
            store.remove_item(key);
            prior
        };
        if !session.is_authenticated() || prior.is_none() {
            return Ok(());
        }
        let result = match self.line_ids.get(&key).map(|id| *id) {
            Some(line_id) => self.api.delete_line(&session, line_id).await,
            None => self.full_resync(&session).await,
        };
        match result {
            Ok(cart) => {
                self.adopt(&cart);
                Ok(())
            }
            Err(e) => {
                self.store.lock().unwrap().restore_line(key, prior);
                self.notifier
                    .notify(Notice::error(format!("Could not remove the item: {e}")));
                Err(e.into())
            }
        }
    }

    /// Relative quantity change. Applied locally at once; the server call is
    /// debounced so rapid taps coalesce into one request carrying the final
    /// quantity — the last user intent wins over any in-flight response.
    pub async fn update_quantity(&self, key: LineKey, delta: i32) -> Result<(), CartError> {
        let session = self.session();
        let (prior, outcome) = {
            let mut store = self.store.lock().unwrap();
            let prior = store.line(key).cloned();
            let outcome = store.update_quantity(key, delta);
            (prior, outcome)
        };
        if let CartMutation::Clamped { max } = outcome {
            self.notifier.notify(Notice::info(format!(
                "Quantity adjusted to the available stock of {max}"
            )));
        }
        if !session.is_authenticated() {
            return Ok(());
        }

        self.pending_prior.entry(key).or_insert(prior);
        let my_gen = {
            let mut entry = self.debounce_gen.entry(key).or_insert(0);
            *entry += 1;
            *entry
        };
        tokio::time::sleep(self.debounce()).await;
        if self.debounce_gen.get(&key).map(|g| *g) != Some(my_gen) {
            // Superseded by a newer change in the same burst.
            return Ok(());
        }
        self.flush_quantity(key, &session).await
    }

    /// Absolute quantity set. Not debounced: it expresses a single, final
    /// intent (e.g. typing a number into the quantity field).
    pub async fn set_quantity(&self, key: LineKey, quantity: u32) -> Result<(), CartError> {
        let lock = self.line_lock(key);
        let _guard = lock.lock().await;

        let session = self.session();
        let (prior, outcome, applied) = {
            let mut store = self.store.lock().unwrap();
            let prior = store.line(key).cloned();
            let outcome = store.set_quantity(key, quantity);
            let applied = store.line(key).map(|l| l.quantity);
            (prior, outcome, applied)
        };
        if let CartMutation::Clamped { max } = outcome {
            self.notifier.notify(Notice::info(format!(
                "Quantity adjusted to the available stock of {max}"
            )));
        }
        if !session.is_authenticated() {
            return Ok(());
        }
        let Some(applied) = applied else {
            return Ok(());
        };
        let result = match self.line_ids.get(&key).map(|id| *id) {
            Some(line_id) => self.api.update_line(&session, line_id, applied).await,
            None => self.full_resync(&session).await,
        };
        match result {
            Ok(cart) => {
                self.adopt(&cart);
                Ok(())
            }
            Err(e) => {
                self.store.lock().unwrap().restore_line(key, prior);
                self.notifier
                    .notify(Notice::error(format!("Could not update the quantity: {e}")));
                Err(e.into())
            }
        }
    }

    pub async fn clear(&self) -> Result<(), CartError> {
        let session = self.session();
        let prior_items = {
            let mut store = self.store.lock().unwrap();
            let items = store.items().to_vec();
            store.clear();
            items
        };
        if !session.is_authenticated() {
            return Ok(());
        }
        match self.api.clear_cart(&session).await {
            Ok(cart) => {
                self.adopt(&cart);
                Ok(())
            }
            Err(e) => {
                self.store.lock().unwrap().replace_items(prior_items);
                self.notifier
                    .notify(Notice::error(format!("Could not clear the cart: {e}")));
                Err(e.into())
            }
        }
    }

    // ─── Coupons ─────────────────────────────────────────────────────────────

    /// Apply a coupon. Requires a signed-in user; anonymous attempts fail
    /// fast with a user-facing message and no server call.
    pub async fn apply_coupon(&self, code: &str) -> Result<Money, CartError> {
        let session = self.session();
        if !session.is_authenticated() {
            self.notifier
                .notify(Notice::warning("Sign in to use coupons"));
            return Err(CartError::AuthenticationRequired);
        }
        match self.api.apply_coupon(&session, code).await {
            Ok(cart) => {
                let discount = cart.discount_amount;
                self.adopt(&cart);
                self.store
                    .lock()
                    .unwrap()
                    .set_coupon(code.to_string(), discount);
                Ok(discount)
            }
            Err(e) => {
                self.notifier
                    .notify(Notice::error(format!("Coupon not applied: {e}")));
                Err(e.into())
            }
        }
    }

    pub async fn remove_coupon(&self) -> Result<(), CartError> {
        let session = self.session();
        if !session.is_authenticated() {
            self.notifier
                .notify(Notice::warning("Sign in to use coupons"));
            return Err(CartError::AuthenticationRequired);
        }
        match self.api.remove_coupon(&session).await {
            Ok(cart) => {
                self.adopt(&cart);
                self.store.lock().unwrap().clear_coupon();
                Ok(())
            }
            Err(e) => {
                self.notifier
                    .notify(Notice::error(format!("Coupon not removed: {e}")));
                Err(e.into())
            }
        }
    }

    pub async fn validate_coupon(&self, code: &str) -> Result<CouponValidation, CartError> {
        let session = self.session();
        Ok(self.api.validate_coupon(&session, code).await?)
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    async fn flush_quantity(&self, key: LineKey, session: &Session) -> Result<(), CartError> {
        let lock = self.line_lock(key);
        let _guard = lock.lock().await;

        let quantity = self.store.lock().unwrap().line(key).map(|l| l.quantity);
        let Some(quantity) = quantity else {
            // Line was removed while the debounce slept; nothing to flush.
            self.pending_prior.remove(&key);
            return Ok(());
        };
        let result = match self.line_ids.get(&key).map(|id| *id) {
            Some(line_id) => self.api.update_line(session, line_id, quantity).await,
            None => self.full_resync(session).await,
        };
        match result {
            Ok(cart) => {
                self.pending_prior.remove(&key);
                self.adopt(&cart);
                Ok(())
            }
            Err(e) => {
                if let Some((_, prior)) = self.pending_prior.remove(&key) {
                    self.store.lock().unwrap().restore_line(key, prior);
                }
                self.notifier
                    .notify(Notice::error(format!("Could not update the quantity: {e}")));
                Err(e.into())
            }
        }
    }

    /// Full-replace reconciliation of the server cart from current local
    /// items. Used when a line has no known server row id.
    async fn full_resync(&self, session: &Session) -> Result<ServerCart, ApiError> {
        let lines: Vec<CartLineRef> = self
            .store
            .lock()
            .unwrap()
            .items()
            .iter()
            .map(CartLineRef::from)
            .collect();
        let outcome = self.api.sync_cart(session, &lines).await?;
        for warning in &outcome.warnings {
            self.notifier.notify(Notice::warning(warning.to_string()));
        }
        Ok(outcome.cart)
    }
}
