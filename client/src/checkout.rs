//! Drives the linear, validated checkout flow from shipping details to
//! payment submission. Forward transitions are guarded; backward transitions
//! always succeed. The shipping step carries a nested microstep (pick a
//! method from the list, then confirm it) so every guard lives here and not
//! in ad hoc flags.

use std::sync::Arc;

use duka_common::cart::CartState;
use duka_common::checkout::{CheckoutDraft, CheckoutTotals, ShippingAddress};
use duka_common::money::{Currency, Money};
use duka_common::payment::PaymentMethod;
use duka_common::shipping::{find_method, ShippingMethod};

use crate::error::PaymentError;
use crate::notify::{Notice, Notifier};
use crate::payment::{PaymentOutcome, PaymentService};
use crate::sync::CartSync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShippingStage {
    /// Choosing from the server-provided method list.
    List,
    /// Confirming the chosen method before review.
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Address,
    Shipping(ShippingStage),
    Review,
}

pub struct CheckoutFlow {
    step: Step,
    draft: CheckoutDraft,
    methods: Vec<ShippingMethod>,
    notifier: Arc<dyn Notifier>,
}

impl CheckoutFlow {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            step: Step::Address,
            draft: CheckoutDraft::default(),
            methods: Vec::new(),
            notifier,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn draft(&self) -> &CheckoutDraft {
        &self.draft
    }

    pub fn set_address(&mut self, address: ShippingAddress) {
        self.draft.address = address;
    }

    pub fn set_payment_method(&mut self, method: PaymentMethod) {
        self.draft.payment_method = Some(method);
    }

    pub fn set_customer_notes(&mut self, notes: impl Into<String>) {
        self.draft.customer_notes = notes.into();
    }

    pub fn set_coupon_code(&mut self, code: Option<String>) {
        self.draft.coupon_code = code;
    }

    /// Install the server-provided shipping method list.
    pub fn load_methods(&mut self, methods: Vec<ShippingMethod>) {
        if let Some(selected) = &self.draft.shipping_method_id {
            if find_method(&methods, selected).is_none() {
                self.draft.shipping_method_id = None;
            }
        }
        self.methods = methods;
    }

    pub fn methods(&self) -> &[ShippingMethod] {
        &self.methods
    }

    pub fn selected_method(&self) -> Option<&ShippingMethod> {
        let id = self.draft.shipping_method_id.as_deref()?;
        find_method(&self.methods, id)
    }

    /// Select a shipping method by id. Disabled or unknown methods are
    /// rejected with a notification and no state change.
    pub fn select_method(&mut self, id: &str) -> bool {
        match find_method(&self.methods, id) {
            Some(method) if method.enabled => {
                self.draft.shipping_method_id = Some(method.id.clone());
                true
            }
            Some(method) => {
                self.notifier.notify(Notice::warning(format!(
                    "{} is currently unavailable",
                    method.name
                )));
                false
            }
            None => {
                self.notifier
                    .notify(Notice::warning("Unknown shipping method"));
                false
            }
        }
    }

    /// Shipping cost for the current selection: the method's effective cost,
    /// or zero when no method is found.
    pub fn shipping_cost(&self, subtotal: Money) -> Money {
        self.selected_method()
            .map(|m| m.effective_cost(subtotal))
            .unwrap_or(Money::ZERO)
    }

    /// Recomputed on every method or cart change; never cached.
    pub fn totals(&self, cart: &CartState) -> CheckoutTotals {
        let subtotal = cart.subtotal();
        CheckoutTotals::compute(subtotal, cart.discount_amount, self.shipping_cost(subtotal))
    }

    /// Guarded forward transition. Returns whether the step changed; guard
    /// failures surface as field-level notifications.
    pub fn advance(&mut self) -> bool {
        match self.step {
            Step::Address => match self.draft.address.validate() {
                Ok(()) => {
                    self.step = Step::Shipping(ShippingStage::List);
                    true
                }
                Err(errors) => {
                    for error in errors {
                        self.notifier.notify(Notice::warning(error.to_string()));
                    }
                    false
                }
            },
            Step::Shipping(ShippingStage::List) => match self.selected_method() {
                Some(method) if method.enabled => {
                    self.step = Step::Shipping(ShippingStage::Confirm);
                    true
                }
                Some(method) => {
                    self.notifier.notify(Notice::warning(format!(
                        "{} is currently unavailable",
                        method.name
                    )));
                    false
                }
                None => {
                    self.notifier
                        .notify(Notice::warning("Select a shipping method"));
                    false
                }
            },
            Step::Shipping(ShippingStage::Confirm) => {
                self.step = Step::Review;
                true
            }
            Step::Review => false,
        }
    }

    /// Backward transition, always allowed.
    pub fn back(&mut self) {
        self.step = match self.step {
            Step::Review => Step::Shipping(ShippingStage::Confirm),
            Step::Shipping(ShippingStage::Confirm) => Step::Shipping(ShippingStage::List),
            Step::Shipping(ShippingStage::List) | Step::Address => Step::Address,
        };
    }

    /// Terminal action from the review step: initiate payment for the
    /// current cart. On an over-limit rejection the first suggested method
    /// is pre-selected so the user can retry immediately.
    pub async fn submit(
        &mut self,
        sync: &CartSync,
        payments: &PaymentService,
        currency: Currency,
    ) -> Result<PaymentOutcome, PaymentError> {
        let session = sync.session();
        let items = sync.items();
        match payments
            .initiate(&session, &self.draft, currency, &items)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let PaymentError::AmountExceedsMethodLimit {
                    limit,
                    total,
                    suggestions,
                } = &e
                {
                    let message = match suggestions.first() {
                        Some(alternative) => {
                            self.draft.payment_method = Some(*alternative);
                            format!(
                                "The total {total} exceeds this method's limit of {limit}; \
                                 switched to {alternative}"
                            )
                        }
                        None => format!(
                            "The total {total} exceeds this method's limit of {limit}; \
                             choose another payment method"
                        ),
                    };
                    self.notifier.notify(Notice::warning(message));
                }
                Err(e)
            }
        }
    }
}
