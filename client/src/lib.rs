//! Duka storefront client core.
//!
//! The four services behind the cart and checkout UI: the local cart store,
//! the server cart sync adapter, the checkout orchestrator, and the payment
//! initiation service. Everything is wired through [`StorefrontClient`], an
//! explicit composition root — there are no ambient singletons.

pub mod api;
pub mod checkout;
pub mod error;
pub mod notify;
pub mod payment;
pub mod persist;
pub mod retry;
pub mod session;
pub mod store;
pub mod sync;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use duka_common::money::Currency;

use crate::api::CartApi;
use crate::checkout::CheckoutFlow;
use crate::error::ApiError;
use crate::notify::Notifier;
use crate::payment::PaymentService;
use crate::persist::SnapshotStore;
use crate::retry::retry_with_backoff;
use crate::session::Identity;
use crate::store::CartStore;
use crate::sync::CartSync;

/// Composition root. Owns the REST client, the local store, and the services
/// layered on top; hand out clones of the `Arc`s to whatever drives the UI.
pub struct StorefrontClient {
    pub api: Arc<CartApi>,
    pub store: Arc<Mutex<CartStore>>,
    pub sync: Arc<CartSync>,
    pub payments: PaymentService,
    pub notifier: Arc<dyn Notifier>,
    pub currency: Currency,
}

impl StorefrontClient {
    pub fn new(
        base_url: impl Into<String>,
        snapshots: Arc<dyn SnapshotStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let api = Arc::new(CartApi::new(base_url));
        let store = Arc::new(Mutex::new(CartStore::new(snapshots, Identity::Anonymous)));
        let sync = Arc::new(CartSync::new(
            Arc::clone(&api),
            Arc::clone(&store),
            Arc::clone(&notifier),
        ));
        let payments = PaymentService::new(
            Arc::clone(&api),
            Arc::clone(&store),
            Arc::clone(&notifier),
        );
        Self {
            api,
            store,
            sync,
            payments,
            notifier,
            currency: Currency::default(),
        }
    }

    /// Start a fresh checkout flow over the current cart.
    pub fn checkout(&self) -> CheckoutFlow {
        CheckoutFlow::new(Arc::clone(&self.notifier))
    }

    /// Fetch the account status for the signed-in user, retrying with
    /// backoff to absorb token-propagation races right after sign-in. The
    /// admin flag is cached on the session for display latency only; it
    /// never gates a privileged action.
    pub async fn refresh_account_status(&self) -> Result<api::AccountStatus, ApiError> {
        let session = self.sync.session();
        let api = Arc::clone(&self.api);
        let status = retry_with_backoff(3, Duration::from_millis(250), || {
            let api = Arc::clone(&api);
            let session = session.clone();
            async move { api.account_status(&session).await }
        })
        .await?;
        session.set_admin_hint(status.is_admin);
        Ok(status)
    }
}
