//! In-process mock of the storefront REST backend. Serves the cart, coupon,
//! shipping, payment, and account endpoints over a real TCP socket so the
//! client under test exercises its full reqwest stack.
//!
//! Money is serialized as decimal strings, the way a Django backend would.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

// ─── Backend state ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub name: String,
    /// Unit price in minor units.
    pub unit_price: i64,
    pub max_quantity: Option<u32>,
    pub colors: Vec<u64>,
}

#[derive(Debug, Clone)]
struct StoredLine {
    id: u64,
    product_id: u64,
    color_id: Option<u64>,
    quantity: u32,
}

#[derive(Debug, Default)]
struct CartRecord {
    lines: Vec<StoredLine>,
    coupon: Option<String>,
    next_line_id: u64,
}

#[derive(Debug, Clone)]
pub struct MethodRecord {
    pub id: String,
    pub name: String,
    /// Minor units.
    pub price: i64,
    pub enabled: bool,
    pub min_order: Option<i64>,
}

/// How the payment initiation endpoint responds.
#[derive(Debug, Clone)]
pub enum PaymentMode {
    Accept { payment_id: u64 },
    AcceptWithRedirect { payment_id: u64, url: String },
    /// 200 with neither a payment id nor a gateway URL.
    AcceptMissingId,
    /// Amounts in major units, matching the wire format.
    RejectOverLimit {
        limit: i64,
        total: i64,
        suggestions: Vec<String>,
    },
    RejectMismatch,
    RejectInvalidAmount,
}

pub struct BackendState {
    pub catalog: DashMap<u64, CatalogEntry>,
    /// Carts keyed by bearer token; anonymous requests share one bucket.
    carts: DashMap<String, CartRecord>,
    /// Coupon code to fixed discount in minor units.
    pub coupons: DashMap<String, i64>,
    pub methods: Mutex<Vec<MethodRecord>>,
    /// Wrap the method list in a `{results: [...]}` envelope.
    pub envelope_method_list: AtomicBool,
    pub payment_mode: Mutex<PaymentMode>,
    /// Last body received by the initiate endpoint, for request assertions.
    pub last_initiate_body: Mutex<Option<Value>>,
    /// 401s to serve from the account endpoint before succeeding.
    pub account_failures_left: AtomicU32,
    pub account_calls: AtomicU32,
    pub merge_calls: AtomicU32,
    pub cart_update_calls: AtomicU32,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            catalog: DashMap::new(),
            carts: DashMap::new(),
            coupons: DashMap::new(),
            methods: Mutex::new(Vec::new()),
            envelope_method_list: AtomicBool::new(true),
            payment_mode: Mutex::new(PaymentMode::Accept { payment_id: 1 }),
            last_initiate_body: Mutex::new(None),
            account_failures_left: AtomicU32::new(0),
            account_calls: AtomicU32::new(0),
            merge_calls: AtomicU32::new(0),
            cart_update_calls: AtomicU32::new(0),
        }
    }
}

fn money_str(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

fn cart_key(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("anonymous-session")
        .to_string()
}

impl BackendState {
    fn cart_json(&self, key: &str) -> Value {
        let record = self.carts.entry(key.to_string()).or_default();
        let mut items = Vec::new();
        let mut subtotal: i64 = 0;
        for line in &record.lines {
            let entry = match self.catalog.get(&line.product_id) {
                Some(e) => e.clone(),
                None => continue,
            };
            subtotal += entry.unit_price * i64::from(line.quantity);
            items.push(json!({
                "id": line.id,
                "product_id": line.product_id,
                "color_id": line.color_id,
                "name": entry.name,
                "quantity": line.quantity,
                "unit_price": money_str(entry.unit_price),
                "max_quantity": entry.max_quantity,
            }));
        }
        let discount = record
            .coupon
            .as_ref()
            .and_then(|c| self.coupons.get(c).map(|d| *d))
            .unwrap_or(0)
            .min(subtotal);
        json!({
            "items": items,
            "subtotal": money_str(subtotal),
            "discount_amount": money_str(discount),
            "total": money_str(subtotal - discount),
            "applied_coupon_code": record.coupon,
        })
    }

    fn cart_is_empty(&self, key: &str) -> bool {
        self.carts
            .get(key)
            .map(|r| r.lines.is_empty())
            .unwrap_or(true)
    }

    /// Insert or merge a line, clamping to catalog stock. Returns a warning
    /// when the quantity had to be adjusted, an error for unknown products
    /// or colors.
    fn upsert_line(
        &self,
        key: &str,
        product_id: u64,
        color_id: Option<u64>,
        quantity: u32,
        additive: bool,
    ) -> Result<Option<Value>, Value> {
        let entry = self
            .catalog
            .get(&product_id)
            .ok_or_else(|| {
                json!({"error": "product_not_found",
                       "message": format!("Product {product_id} is unavailable")})
            })?
            .clone();
        if let Some(color) = color_id {
            if !entry.colors.contains(&color) {
                return Err(json!({"error": "color_not_found",
                                  "message": format!("Color {color} is unavailable")}));
            }
        }
        let mut record = self.carts.entry(key.to_string()).or_default();
        let pos = record
            .lines
            .iter()
            .position(|l| l.product_id == product_id && l.color_id == color_id);
        let requested = match (pos, additive) {
            (Some(i), true) => record.lines[i].quantity.saturating_add(quantity),
            _ => quantity,
        };
        let granted = match entry.max_quantity {
            Some(max) => requested.min(max),
            None => requested,
        };
        match pos {
            Some(i) => record.lines[i].quantity = granted,
            None => {
                let id = record.next_line_id.max(1);
                record.next_line_id = id + 1;
                record.lines.push(StoredLine {
                    id,
                    product_id,
                    color_id,
                    quantity: granted,
                });
            }
        }
        if granted < requested {
            Ok(Some(json!({
                "type": "quantity_adjusted",
                "product_id": product_id,
                "message": format!("only {granted} left"),
            })))
        } else {
            Ok(None)
        }
    }
}

// ─── Handlers ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LineBody {
    product_id: u64,
    quantity: u32,
    #[serde(default)]
    color_id: Option<u64>,
}

#[derive(Deserialize)]
struct QuantityBody {
    quantity: u32,
}

#[derive(Deserialize)]
struct MergeBody {
    anonymous_cart_data: Vec<LineBody>,
}

#[derive(Deserialize)]
struct SyncBody {
    items: Vec<LineBody>,
}

#[derive(Deserialize)]
struct CouponBody {
    coupon_code: String,
}

#[derive(Deserialize)]
struct ValidateQuery {
    code: String,
}

async fn get_cart(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Json<Value> {
    Json(state.cart_json(&cart_key(&headers)))
}

async fn add_to_cart(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<LineBody>,
) -> impl IntoResponse {
    let key = cart_key(&headers);
    match state.upsert_line(&key, body.product_id, body.color_id, body.quantity, true) {
        Ok(_) => (StatusCode::OK, Json(state.cart_json(&key))),
        Err(error) => (StatusCode::BAD_REQUEST, Json(error)),
    }
}

async fn update_item(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(body): Json<QuantityBody>,
) -> impl IntoResponse {
    state.cart_update_calls.fetch_add(1, Ordering::SeqCst);
    let key = cart_key(&headers);
    let found = {
        let mut record = state.carts.entry(key.clone()).or_default();
        match record.lines.iter_mut().find(|l| l.id == id) {
            Some(line) => {
                let max = state
                    .catalog
                    .get(&line.product_id)
                    .and_then(|e| e.max_quantity);
                line.quantity = match max {
                    Some(max) => body.quantity.min(max),
                    None => body.quantity,
                };
                true
            }
            None => false,
        }
    };
    if found {
        (StatusCode::OK, Json(state.cart_json(&key)))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "not_found", "message": format!("No cart item {id}")})),
        )
    }
}

async fn delete_item(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Json<Value> {
    let key = cart_key(&headers);
    state
        .carts
        .entry(key.clone())
        .or_default()
        .lines
        .retain(|l| l.id != id);
    Json(state.cart_json(&key))
}

async fn clear_cart(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Json<Value> {
    let key = cart_key(&headers);
    {
        let mut record = state.carts.entry(key.clone()).or_default();
        record.lines.clear();
        record.coupon = None;
    }
    Json(state.cart_json(&key))
}

async fn merge_cart(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<MergeBody>,
) -> Json<Value> {
    state.merge_calls.fetch_add(1, Ordering::SeqCst);
    let key = cart_key(&headers);
    for line in body.anonymous_cart_data {
        // Unknown products are dropped silently on merge.
        let _ = state.upsert_line(&key, line.product_id, line.color_id, line.quantity, true);
    }
    Json(state.cart_json(&key))
}

async fn sync_cart(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<SyncBody>,
) -> Json<Value> {
    let key = cart_key(&headers);
    {
        let mut record = state.carts.entry(key.clone()).or_default();
        record.lines.clear();
    }
    let mut warnings = Vec::new();
    for line in body.items {
        match state.upsert_line(&key, line.product_id, line.color_id, line.quantity, false) {
            Ok(Some(warning)) => warnings.push(warning),
            Ok(None) => {}
            Err(error) => warnings.push(json!({
                "type": error["error"],
                "product_id": line.product_id,
                "message": error["message"],
            })),
        }
    }
    let mut cart = state.cart_json(&key);
    cart["warnings"] = Value::Array(warnings);
    Json(cart)
}

async fn apply_coupon(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<CouponBody>,
) -> impl IntoResponse {
    let key = cart_key(&headers);
    let Some(discount) = state.coupons.get(&body.coupon_code).map(|d| *d) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_coupon",
                        "message": format!("Coupon {} is not valid", body.coupon_code)})),
        );
    };
    state.carts.entry(key.clone()).or_default().coupon = Some(body.coupon_code);
    (
        StatusCode::OK,
        Json(json!({
            "cart": state.cart_json(&key),
            "discount_amount": money_str(discount),
        })),
    )
}

async fn remove_coupon(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Json<Value> {
    let key = cart_key(&headers);
    state.carts.entry(key.clone()).or_default().coupon = None;
    Json(state.cart_json(&key))
}

async fn validate_coupon(
    State(state): State<Arc<BackendState>>,
    Query(query): Query<ValidateQuery>,
) -> Json<Value> {
    Json(match state.coupons.get(&query.code) {
        Some(discount) => json!({"valid": true, "discount_amount": money_str(*discount)}),
        None => json!({"valid": false, "error_message": "Unknown coupon code"}),
    })
}

async fn shipping_methods(State(state): State<Arc<BackendState>>) -> Json<Value> {
    let methods: Vec<Value> = state
        .methods
        .lock()
        .unwrap()
        .iter()
        .map(|m| {
            json!({
                "id": m.id,
                "name": m.name,
                "price": money_str(m.price),
                "enabled": m.enabled,
                "min_order": m.min_order.map(money_str),
            })
        })
        .collect();
    if state.envelope_method_list.load(Ordering::Relaxed) {
        Json(json!({ "results": methods }))
    } else {
        Json(Value::Array(methods))
    }
}

async fn initiate_payment(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let key = cart_key(&headers);
    *state.last_initiate_body.lock().unwrap() = Some(body);
    if state.cart_is_empty(&key) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid amount"})),
        );
    }
    let mode = state.payment_mode.lock().unwrap().clone();
    match mode {
        PaymentMode::Accept { payment_id } => {
            state.carts.entry(key).or_default().lines.clear();
            (
                StatusCode::OK,
                Json(json!({"payment_id": payment_id, "order_id": payment_id + 1000})),
            )
        }
        PaymentMode::AcceptWithRedirect { payment_id, url } => {
            state.carts.entry(key).or_default().lines.clear();
            (
                StatusCode::OK,
                Json(json!({
                    "payment_id": payment_id,
                    "order_id": payment_id + 1000,
                    "payment": {"checkout_url": url},
                })),
            )
        }
        PaymentMode::AcceptMissingId => (StatusCode::OK, Json(json!({"status": "pending"}))),
        PaymentMode::RejectOverLimit {
            limit,
            total,
            suggestions,
        } => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "amount_exceeds_method_limit",
                "message": "Order total exceeds the method limit",
                "limit": limit,
                "total": total,
                "suggestions": suggestions,
            })),
        ),
        PaymentMode::RejectMismatch => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "amount_mismatch",
                "message": "Cart contents changed during checkout",
            })),
        ),
        PaymentMode::RejectInvalidAmount => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid amount"})),
        ),
    }
}

async fn payment_status(Path(order_id): Path<u64>) -> Json<Value> {
    Json(json!({
        "order": {"id": order_id, "status": "pending"},
        "payments": [{"status": "pending"}],
    }))
}

async fn account_status(State(state): State<Arc<BackendState>>) -> impl IntoResponse {
    state.account_calls.fetch_add(1, Ordering::SeqCst);
    let failures = state.account_failures_left.load(Ordering::SeqCst);
    if failures > 0 {
        state.account_failures_left.fetch_sub(1, Ordering::SeqCst);
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Token not yet active"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"is_admin": true, "email": "admin@example.com"})),
    )
}

// ─── Server ──────────────────────────────────────────────────────────────────

pub struct MockBackend {
    pub state: Arc<BackendState>,
    pub base_url: String,
    server: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::default());
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        let app = Router::new()
            .route(
                "/cart/",
                get(get_cart).post(add_to_cart).delete(clear_cart),
            )
            .route(
                "/cart/items/{id}/",
                axum::routing::put(update_item).delete(delete_item),
            )
            .route("/cart/merge/", post(merge_cart))
            .route("/cart/sync/", post(sync_cart))
            .route(
                "/cart/coupon/",
                post(apply_coupon).delete(remove_coupon),
            )
            .route("/cart/coupon/validate/", get(validate_coupon))
            .route("/cart/shipping-methods/", get(shipping_methods))
            .route("/cart/payments/initiate/", post(initiate_payment))
            .route("/cart/payments/status/{order_id}/", get(payment_status))
            .route("/account/status/", get(account_status))
            .layer(cors)
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock backend");
        });
        tracing::info!(%addr, "mock backend listening");
        Self {
            state,
            base_url: format!("http://{addr}"),
            server,
        }
    }

    pub fn seed_product(&self, id: u64, name: &str, price_major: i64, max_quantity: Option<u32>) {
        self.state.catalog.insert(
            id,
            CatalogEntry {
                name: name.to_string(),
                unit_price: price_major * 100,
                max_quantity,
                colors: Vec::new(),
            },
        );
    }

    pub fn seed_color(&self, product_id: u64, color_id: u64) {
        if let Some(mut entry) = self.state.catalog.get_mut(&product_id) {
            entry.colors.push(color_id);
        }
    }

    pub fn seed_method(&self, id: &str, name: &str, price_major: i64, enabled: bool) {
        self.state.methods.lock().unwrap().push(MethodRecord {
            id: id.to_string(),
            name: name.to_string(),
            price: price_major * 100,
            enabled,
            min_order: None,
        });
    }

    pub fn seed_coupon(&self, code: &str, discount_major: i64) {
        self.state.coupons.insert(code.to_string(), discount_major * 100);
    }

    pub fn set_payment_mode(&self, mode: PaymentMode) {
        *self.state.payment_mode.lock().unwrap() = mode;
    }

    /// `(product_id, quantity)` pairs of the server-held cart for a token.
    pub fn server_lines(&self, token: &str) -> Vec<(u64, u32)> {
        self.state
            .carts
            .get(token)
            .map(|r| r.lines.iter().map(|l| (l.product_id, l.quantity)).collect())
            .unwrap_or_default()
    }

    pub fn last_initiate_body(&self) -> Option<Value> {
        self.state.last_initiate_body.lock().unwrap().clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}
