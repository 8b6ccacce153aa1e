//! The single choke-point for payment initiation: make sure the server and
//! client agree on the cart, submit the payment request, and classify every
//! structured failure. The client never sends computed amounts — the server
//! is the sole source of truth for pricing.

use std::sync::{Arc, Mutex};

use duka_common::cart::CartItem;
use duka_common::checkout::CheckoutDraft;
use duka_common::money::{Currency, Money};
use duka_common::payment::PaymentMethod;

use crate::api::{
    CartApi, CartLineRef, InitiateOutcome, InitiateRejection, PaymentRequest, PaymentStatus,
    SyncWarning,
};
use crate::error::{ApiError, PaymentError};
use crate::notify::{Notice, Notifier};
use crate::session::Session;
use crate::store::CartStore;

/// What the UI navigates on after a successful initiation: either an
/// in-app confirmation view keyed by `payment_id`, or a full-page redirect
/// to the gateway. At least one of the two is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub payment_id: Option<u64>,
    pub order_id: Option<u64>,
    pub redirect_url: Option<String>,
}

pub struct PaymentService {
    api: Arc<CartApi>,
    store: Arc<Mutex<CartStore>>,
    notifier: Arc<dyn Notifier>,
}

impl PaymentService {
    pub fn new(
        api: Arc<CartApi>,
        store: Arc<Mutex<CartStore>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            api,
            store,
            notifier,
        }
    }

    /// Initiate a payment for the current cart.
    ///
    /// 1. Tolerant pre-sync of the supplied items (full-replace, so retries
    ///    cannot duplicate server-side lines; failures only logged).
    /// 2. Fetch the server cart; an empty or non-positive cart aborts with
    ///    the sync warnings attached for item-level display.
    /// 3. Submit the initiate request without any client-computed amounts.
    /// 4. Classify structured rejections; require a `payment_id` (or a
    ///    gateway redirect URL) on success.
    pub async fn initiate(
        &self,
        session: &Session,
        draft: &CheckoutDraft,
        currency: Currency,
        items: &[CartItem],
    ) -> Result<PaymentOutcome, PaymentError> {
        let method = draft.payment_method.ok_or(PaymentError::NoMethodSelected)?;
        let lines: Vec<CartLineRef> = items.iter().map(CartLineRef::from).collect();

        let mut warnings: Vec<SyncWarning> = Vec::new();
        if !lines.is_empty() {
            match self.api.sync_cart(session, &lines).await {
                Ok(outcome) => warnings = outcome.warnings,
                // The fetch below is the real guard; a failed pre-sync is
                // not fatal on its own.
                Err(e) => tracing::warn!("pre-payment cart sync failed: {e}"),
            }
        }

        let cart = self.api.fetch_cart(session).await?;
        if !cart.is_payable() {
            tracing::warn!(
                lines = cart.lines.len(),
                total = %cart.total,
                "aborting payment: cart empty or invalid"
            );
            for warning in &warnings {
                self.notifier.notify(Notice::warning(warning.to_string()));
            }
            return Err(PaymentError::CartEmptyOrInvalid { warnings });
        }

        let request = PaymentRequest {
            method: method.wire_code().to_string(),
            shipping_method: draft.shipping_method_id.clone().unwrap_or_default(),
            currency: currency.code().to_string(),
            shipping_address: draft.address.clone(),
            billing_address: draft.address.clone(),
            customer_notes: draft.customer_notes.clone(),
            coupon_code: draft.coupon_code.clone(),
            items: lines,
        };

        match self.api.initiate_payment(session, &request).await? {
            InitiateOutcome::Accepted(body) => {
                let redirect_url = body.redirect_url().map(str::to_string);
                if body.payment_id.is_none() && redirect_url.is_none() {
                    // Never navigate to a confirmation view without an
                    // identifier to key it on.
                    self.notifier.notify(Notice::error(
                        "Payment was accepted without a payment id; contact support",
                    ));
                    return Err(PaymentError::MissingPaymentId);
                }
                tracing::info!(payment_id = ?body.payment_id, "payment initiated");
                // The server cart is consumed by the payment; drop the local
                // copy so the user does not re-order the same lines.
                self.store.lock().unwrap().clear();
                Ok(PaymentOutcome {
                    payment_id: body.payment_id,
                    order_id: body.order_id,
                    redirect_url,
                })
            }
            InitiateOutcome::Rejected(rejection) => Err(self.classify(rejection, warnings)),
        }
    }

    fn classify(&self, rejection: InitiateRejection, warnings: Vec<SyncWarning>) -> PaymentError {
        let code = rejection.error.as_deref().unwrap_or("");

        if code == "amount_exceeds_method_limit" {
            let suggestions: Vec<PaymentMethod> = rejection
                .suggestions
                .iter()
                .filter_map(|s| PaymentMethod::from_wire(s))
                .collect();
            return PaymentError::AmountExceedsMethodLimit {
                limit: rejection.limit.unwrap_or(Money::ZERO),
                total: rejection.total.unwrap_or(Money::ZERO),
                suggestions,
            };
        }

        if code == "amount_mismatch" {
            self.notifier.notify(Notice::warning(
                "Your order total changed on the server; reload and try again",
            ));
            return PaymentError::AmountMismatch {
                message: rejection
                    .message
                    .unwrap_or_else(|| "order total changed".into()),
            };
        }

        // Legacy lower-level rejection: same taxonomy as the empty-cart guard.
        if code == "Invalid amount" || rejection.message.as_deref() == Some("Invalid amount") {
            return PaymentError::CartEmptyOrInvalid { warnings };
        }

        let message = rejection
            .message
            .or(rejection.error)
            .unwrap_or_else(|| format!("payment failed with status {}", rejection.status));
        self.notifier.notify(Notice::error(message.clone()));
        PaymentError::Api(ApiError::Api {
            status: rejection.status,
            message,
        })
    }

    /// Poll payment state for the post-redirect confirmation view.
    pub async fn status(
        &self,
        session: &Session,
        order_id: u64,
    ) -> Result<PaymentStatus, PaymentError> {
        Ok(self.api.payment_status(session, order_id).await?)
    }
}
