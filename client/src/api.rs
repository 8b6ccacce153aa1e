//! Typed REST client for the cart resource, plus the normalization boundary
//! that converts every accepted wire shape into canonical in-memory types.
//! Nothing outside this module reads raw response bodies.

use std::fmt;

use duka_common::cart::CartItem;
use duka_common::checkout::ShippingAddress;
use duka_common::money::Money;
use duka_common::shipping::ShippingMethod;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::session::Session;

// ─── Money on the wire ───────────────────────────────────────────────────────

/// Backends serialize decimals inconsistently: sometimes JSON numbers,
/// sometimes strings. Accept both; reject anything else.
fn de_money<'de, D: Deserializer<'de>>(d: D) -> Result<Money, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Num(f64),
        Str(String),
    }
    match Wire::deserialize(d)? {
        Wire::Num(v) => {
            Money::from_major_f64(v).ok_or_else(|| serde::de::Error::custom("non-finite amount"))
        }
        Wire::Str(s) => Money::from_decimal_str(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("bad decimal amount: {s}"))),
    }
}

fn de_money_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Money>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Num(f64),
        Str(String),
    }
    match Option::<Wire>::deserialize(d)? {
        None => Ok(None),
        Some(Wire::Num(v)) => Money::from_major_f64(v)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("non-finite amount")),
        Some(Wire::Str(s)) => Money::from_decimal_str(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("bad decimal amount: {s}"))),
    }
}

/// Identifiers arrive as numbers or numeric strings depending on the
/// serializer in front of the database.
fn de_id_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Num(u64),
        Str(String),
    }
    match Option::<Wire>::deserialize(d)? {
        None => Ok(None),
        Some(Wire::Num(v)) => Ok(Some(v)),
        Some(Wire::Str(s)) => s
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("bad id: {s}"))),
    }
}

// ─── Wire shapes ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LineWire {
    id: u64,
    product_id: u64,
    #[serde(default)]
    color_id: Option<u64>,
    #[serde(default)]
    name: String,
    quantity: u32,
    #[serde(deserialize_with = "de_money")]
    unit_price: Money,
    #[serde(default)]
    max_quantity: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CartWire {
    #[serde(default)]
    items: Vec<LineWire>,
    #[serde(deserialize_with = "de_money", default)]
    subtotal: Money,
    #[serde(deserialize_with = "de_money", default)]
    discount_amount: Money,
    #[serde(deserialize_with = "de_money", default)]
    total: Money,
    #[serde(default)]
    applied_coupon_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorWire {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Lists arrive either bare or wrapped in a DRF-style `{results: [...]}`
/// envelope. Anything else is rejected, not defaulted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListWire<T> {
    Bare(Vec<T>),
    Envelope { results: Vec<T> },
}

impl<T> ListWire<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListWire::Bare(v) => v,
            ListWire::Envelope { results } => results,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct MethodWire {
    #[serde(deserialize_with = "de_string_id")]
    id: String,
    name: String,
    #[serde(default, deserialize_with = "de_money_opt")]
    price: Option<Money>,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default, deserialize_with = "de_money_opt")]
    min_order: Option<Money>,
    #[serde(default)]
    delivery_time: Option<String>,
}

fn de_string_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Num(u64),
        Str(String),
    }
    Ok(match Wire::deserialize(d)? {
        Wire::Num(v) => v.to_string(),
        Wire::Str(s) => s,
    })
}

impl From<MethodWire> for ShippingMethod {
    fn from(w: MethodWire) -> Self {
        ShippingMethod {
            id: w.id,
            name: w.name,
            // Absent price means free, per the lookup rule.
            price: w.price.unwrap_or(Money::ZERO),
            enabled: w.enabled,
            min_order: w.min_order,
            delivery_time: w.delivery_time,
        }
    }
}

// ─── Canonical types ─────────────────────────────────────────────────────────

/// A server-held cart line: the server's row id plus the item it describes.
/// The row id is what `PUT`/`DELETE /cart/items/{id}/` key on.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerLine {
    pub line_id: u64,
    pub item: CartItem,
}

/// The server's canonical cart. The server is the sole source of truth for
/// pricing; these totals are reflected, never argued with.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerCart {
    pub lines: Vec<ServerLine>,
    pub subtotal: Money,
    pub discount_amount: Money,
    pub total: Money,
    pub applied_coupon_code: Option<String>,
}

impl ServerCart {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// A cart can be paid for iff it has items and a positive total.
    pub fn is_payable(&self) -> bool {
        !self.is_empty() && self.total.is_positive()
    }
}

impl From<CartWire> for ServerCart {
    fn from(w: CartWire) -> Self {
        ServerCart {
            lines: w
                .items
                .into_iter()
                .map(|l| ServerLine {
                    line_id: l.id,
                    item: CartItem {
                        product_id: l.product_id,
                        color_id: l.color_id,
                        name: l.name,
                        quantity: l.quantity,
                        unit_price: l.unit_price,
                        max_quantity: l.max_quantity,
                    },
                })
                .collect(),
            subtotal: w.subtotal,
            discount_amount: w.discount_amount,
            total: w.total,
            applied_coupon_code: w.applied_coupon_code,
        }
    }
}

/// A line reference sent to the server (merge, sync, payment traceability).
#[derive(Debug, Clone, Serialize)]
pub struct CartLineRef {
    pub product_id: u64,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_id: Option<u64>,
}

impl From<&CartItem> for CartLineRef {
    fn from(item: &CartItem) -> Self {
        CartLineRef {
            product_id: item.product_id,
            quantity: item.quantity,
            color_id: item.color_id,
        }
    }
}

/// Item-level warning from a cart sync, e.g. a product that vanished from
/// the catalog or a quantity the server had to adjust.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncWarning {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub product_id: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.message, self.product_id) {
            (Some(msg), _) => f.write_str(msg),
            (None, Some(pid)) => write!(f, "{} (product {pid})", self.kind),
            (None, None) => f.write_str(&self.kind),
        }
    }
}

#[derive(Debug)]
pub struct SyncOutcome {
    pub cart: ServerCart,
    pub warnings: Vec<SyncWarning>,
}

#[derive(Debug, Deserialize)]
struct SyncWire {
    #[serde(flatten)]
    cart: CartWire,
    #[serde(default)]
    warnings: Vec<SyncWarning>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CouponValidation {
    pub valid: bool,
    #[serde(default, deserialize_with = "de_money_opt")]
    pub discount_amount: Option<Money>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CouponAppliedWire {
    cart: CartWire,
    #[serde(default, deserialize_with = "de_money_opt")]
    discount_amount: Option<Money>,
}

/// Request body for `POST /cart/payments/initiate/`. Deliberately carries no
/// client-computed amounts: the server prices the cart itself.
#[derive(Debug, Serialize)]
pub struct PaymentRequest {
    pub method: String,
    pub shipping_method: String,
    pub currency: String,
    pub shipping_address: ShippingAddress,
    pub billing_address: ShippingAddress,
    pub customer_notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    pub items: Vec<CartLineRef>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GatewayDetails {
    #[serde(default)]
    pub checkout_url: Option<String>,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub payment_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentInitiated {
    #[serde(default, deserialize_with = "de_id_opt")]
    pub payment_id: Option<u64>,
    #[serde(default, deserialize_with = "de_id_opt")]
    pub order_id: Option<u64>,
    #[serde(default)]
    pub payment: Option<GatewayDetails>,
}

impl PaymentInitiated {
    /// Gateway URL for a full-page redirect, when the gateway provides one.
    pub fn redirect_url(&self) -> Option<&str> {
        let p = self.payment.as_ref()?;
        p.checkout_url
            .as_deref()
            .or(p.redirect_url.as_deref())
            .or(p.payment_url.as_deref())
    }
}

/// Structured body of a rejected payment initiation.
#[derive(Debug, Clone, Deserialize)]
pub struct InitiateRejection {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "de_money_opt")]
    pub limit: Option<Money>,
    #[serde(default, deserialize_with = "de_money_opt")]
    pub total: Option<Money>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(skip)]
    pub status: u16,
}

#[derive(Debug)]
pub enum InitiateOutcome {
    Accepted(PaymentInitiated),
    Rejected(InitiateRejection),
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatus {
    #[serde(default)]
    pub order: Option<Value>,
    #[serde(default)]
    pub payments: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct AccountStatus {
    pub is_admin: bool,
    #[serde(default)]
    pub email: Option<String>,
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// HTTP client for the cart resource. One instance per backend; cheap to
/// share behind an `Arc`.
pub struct CartApi {
    http: reqwest::Client,
    base_url: String,
}

impl CartApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, req: reqwest::RequestBuilder, session: &Session) -> reqwest::RequestBuilder {
        match session.bearer() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn read_error(resp: reqwest::Response) -> ApiError {
        let status = resp.status().as_u16();
        let message = match resp.json::<ErrorWire>().await {
            Ok(body) => body
                .message
                .or(body.detail)
                .or(body.error)
                .unwrap_or_else(|| format!("request failed with status {status}")),
            Err(_) => format!("request failed with status {status}"),
        };
        ApiError::Api { status, message }
    }

    async fn parse_cart(resp: reqwest::Response) -> Result<ServerCart, ApiError> {
        if !resp.status().is_success() {
            return Err(Self::read_error(resp).await);
        }
        let wire: CartWire = resp
            .json()
            .await
            .map_err(|e| ApiError::UnexpectedShape(e.to_string()))?;
        Ok(wire.into())
    }

    /// GET /cart/
    pub async fn fetch_cart(&self, session: &Session) -> Result<ServerCart, ApiError> {
        let resp = self
            .authed(self.http.get(self.url("/cart/")), session)
            .send()
            .await?;
        Self::parse_cart(resp).await
    }

    /// POST /cart/
    pub async fn add_line(
        &self,
        session: &Session,
        line: &CartLineRef,
    ) -> Result<ServerCart, ApiError> {
        tracing::debug!(product_id = line.product_id, "cart add");
        let resp = self
            .authed(self.http.post(self.url("/cart/")), session)
            .json(line)
            .send()
            .await?;
        Self::parse_cart(resp).await
    }

    /// PUT /cart/items/{id}/
    pub async fn update_line(
        &self,
        session: &Session,
        line_id: u64,
        quantity: u32,
    ) -> Result<ServerCart, ApiError> {
        tracing::debug!(line_id, quantity, "cart update");
        let resp = self
            .authed(
                self.http
                    .put(self.url(&format!("/cart/items/{line_id}/"))),
                session,
            )
            .json(&serde_json::json!({ "quantity": quantity }))
            .send()
            .await?;
        Self::parse_cart(resp).await
    }

    /// DELETE /cart/items/{id}/
    pub async fn delete_line(
        &self,
        session: &Session,
        line_id: u64,
    ) -> Result<ServerCart, ApiError> {
        tracing::debug!(line_id, "cart delete line");
        let resp = self
            .authed(
                self.http
                    .delete(self.url(&format!("/cart/items/{line_id}/"))),
                session,
            )
            .send()
            .await?;
        Self::parse_cart(resp).await
    }

    /// DELETE /cart/
    pub async fn clear_cart(&self, session: &Session) -> Result<ServerCart, ApiError> {
        let resp = self
            .authed(self.http.delete(self.url("/cart/")), session)
            .send()
            .await?;
        Self::parse_cart(resp).await
    }

    /// POST /cart/merge/
    pub async fn merge_cart(
        &self,
        session: &Session,
        lines: &[CartLineRef],
    ) -> Result<ServerCart, ApiError> {
        tracing::info!(lines = lines.len(), "merging anonymous cart");
        let resp = self
            .authed(self.http.post(self.url("/cart/merge/")), session)
            .json(&serde_json::json!({ "anonymous_cart_data": lines }))
            .send()
            .await?;
        Self::parse_cart(resp).await
    }

    /// POST /cart/sync/ — full-replace reconciliation keyed by
    /// product+variant; safe to repeat with the same lines.
    pub async fn sync_cart(
        &self,
        session: &Session,
        lines: &[CartLineRef],
    ) -> Result<SyncOutcome, ApiError> {
        tracing::debug!(lines = lines.len(), "cart sync");
        let resp = self
            .authed(self.http.post(self.url("/cart/sync/")), session)
            .json(&serde_json::json!({ "items": lines }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::read_error(resp).await);
        }
        let wire: SyncWire = resp
            .json()
            .await
            .map_err(|e| ApiError::UnexpectedShape(e.to_string()))?;
        Ok(SyncOutcome {
            cart: wire.cart.into(),
            warnings: wire.warnings,
        })
    }

    /// POST /cart/coupon/
    pub async fn apply_coupon(
        &self,
        session: &Session,
        code: &str,
    ) -> Result<ServerCart, ApiError> {
        let resp = self
            .authed(self.http.post(self.url("/cart/coupon/")), session)
            .json(&serde_json::json!({ "coupon_code": code }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::read_error(resp).await);
        }
        let wire: CouponAppliedWire = resp
            .json()
            .await
            .map_err(|e| ApiError::UnexpectedShape(e.to_string()))?;
        let mut cart: ServerCart = wire.cart.into();
        if let Some(discount) = wire.discount_amount {
            cart.discount_amount = discount;
        }
        Ok(cart)
    }

    /// DELETE /cart/coupon/
    pub async fn remove_coupon(&self, session: &Session) -> Result<ServerCart, ApiError> {
        let resp = self
            .authed(self.http.delete(self.url("/cart/coupon/")), session)
            .send()
            .await?;
        Self::parse_cart(resp).await
    }

    /// GET /cart/coupon/validate/?code=...
    pub async fn validate_coupon(
        &self,
        session: &Session,
        code: &str,
    ) -> Result<CouponValidation, ApiError> {
        let resp = self
            .authed(self.http.get(self.url("/cart/coupon/validate/")), session)
            .query(&[("code", code)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::read_error(resp).await);
        }
        resp.json()
            .await
            .map_err(|e| ApiError::UnexpectedShape(e.to_string()))
    }

    /// GET /cart/shipping-methods/
    pub async fn shipping_methods(
        &self,
        session: &Session,
    ) -> Result<Vec<ShippingMethod>, ApiError> {
        let resp = self
            .authed(self.http.get(self.url("/cart/shipping-methods/")), session)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::read_error(resp).await);
        }
        let wire: ListWire<MethodWire> = resp
            .json()
            .await
            .map_err(|e| ApiError::UnexpectedShape(e.to_string()))?;
        Ok(wire.into_vec().into_iter().map(Into::into).collect())
    }

    /// POST /cart/payments/initiate/
    pub async fn initiate_payment(
        &self,
        session: &Session,
        request: &PaymentRequest,
    ) -> Result<InitiateOutcome, ApiError> {
        tracing::info!(method = %request.method, "initiating payment");
        let resp = self
            .authed(self.http.post(self.url("/cart/payments/initiate/")), session)
            .json(request)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            let body: PaymentInitiated = resp
                .json()
                .await
                .map_err(|e| ApiError::UnexpectedShape(e.to_string()))?;
            return Ok(InitiateOutcome::Accepted(body));
        }
        let mut rejection: InitiateRejection = resp
            .json()
            .await
            .map_err(|e| ApiError::UnexpectedShape(e.to_string()))?;
        rejection.status = status.as_u16();
        Ok(InitiateOutcome::Rejected(rejection))
    }

    /// GET /cart/payments/status/{order_id}/
    pub async fn payment_status(
        &self,
        session: &Session,
        order_id: u64,
    ) -> Result<PaymentStatus, ApiError> {
        let resp = self
            .authed(
                self.http
                    .get(self.url(&format!("/cart/payments/status/{order_id}/"))),
                session,
            )
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::read_error(resp).await);
        }
        resp.json()
            .await
            .map_err(|e| ApiError::UnexpectedShape(e.to_string()))
    }

    /// GET /account/status/
    pub async fn account_status(&self, session: &Session) -> Result<AccountStatus, ApiError> {
        let resp = self
            .authed(self.http.get(self.url("/account/status/")), session)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::read_error(resp).await);
        }
        resp.json()
            .await
            .map_err(|e| ApiError::UnexpectedShape(e.to_string()))
    }
}
