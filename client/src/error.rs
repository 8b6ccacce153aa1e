use duka_common::money::Money;
use duka_common::payment::PaymentMethod;
use thiserror::Error;

use crate::api::SyncWarning;

/// Errors crossing the REST boundary. Everything the server rejects is
/// normalized into one of these before it reaches a service.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx with a server-provided message (or the bare status when the
    /// body carried none).
    #[error("{message}")]
    Api { status: u16, message: String },

    /// The response parsed, but not into any accepted wire shape.
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failures of cart operations, local or remote.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("only {max} of this item can be ordered")]
    StockLimit { max: u32 },

    #[error("sign in to use coupons")]
    AuthenticationRequired,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// The payment-initiation error taxonomy. Each variant maps to a distinct
/// remediation the UI offers the user.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The server cart is empty or its total is not a positive amount.
    /// Carries item-level sync warnings so the user can fix individual
    /// lines instead of restarting checkout.
    #[error("your cart is empty or contains invalid items")]
    CartEmptyOrInvalid { warnings: Vec<SyncWarning> },

    /// The computed total exceeds what the chosen method allows. The first
    /// suggestion is suitable for auto-selection.
    #[error("total {total} exceeds the {limit} limit for this payment method")]
    AmountExceedsMethodLimit {
        limit: Money,
        total: Money,
        suggestions: Vec<PaymentMethod>,
    },

    /// The server-side total changed under us (cart or shipping updated
    /// concurrently). The user should reload and retry.
    #[error("the order total changed on the server; reload and try again")]
    AmountMismatch { message: String },

    /// A 2xx response without a payment identifier and without a redirect
    /// URL. Fatal: never navigate to a confirmation view without one.
    #[error("payment was accepted without a payment id; contact support")]
    MissingPaymentId,

    #[error("select a payment method")]
    NoMethodSelected,

    #[error(transparent)]
    Api(#[from] ApiError),
}
