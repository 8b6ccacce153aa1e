use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Identity of a cart line: a product plus an optional colour variant.
/// Two items belong to the same line iff their keys are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineKey {
    pub product_id: u64,
    pub color_id: Option<u64>,
}

impl LineKey {
    pub fn new(product_id: u64) -> Self {
        Self {
            product_id,
            color_id: None,
        }
    }

    pub fn with_color(product_id: u64, color_id: u64) -> Self {
        Self {
            product_id,
            color_id: Some(color_id),
        }
    }
}

/// A line in the cart. `unit_price` is the price at the time of add and is
/// not re-validated against the catalog until the next server sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: u64,
    pub color_id: Option<u64>,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    /// Stock ceiling. When absent, no client-side limit is enforced.
    pub max_quantity: Option<u32>,
}

impl CartItem {
    pub fn key(&self) -> LineKey {
        LineKey {
            product_id: self.product_id,
            color_id: self.color_id,
        }
    }

    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// Result of a local cart mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartMutation {
    Applied,
    /// Applied, but the quantity was clamped to the stock ceiling.
    Clamped { max: u32 },
    /// No-op: the requested quantity alone exceeds the stock ceiling.
    Rejected { max: u32 },
}

impl CartMutation {
    pub fn is_applied(self) -> bool {
        !matches!(self, CartMutation::Rejected { .. })
    }
}

/// In-memory cart contents. Insertion order of lines is preserved for
/// display; it carries no other meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartState {
    pub items: Vec<CartItem>,
    pub updated_at: DateTime<Utc>,
    /// False after any local-only mutation, true after a confirmed server
    /// reconciliation.
    pub synced_with_server: bool,
    /// Set together with `discount_amount` after a successful server-side
    /// coupon validation; cleared together.
    pub applied_coupon_code: Option<String>,
    pub discount_amount: Money,
}

impl Default for CartState {
    fn default() -> Self {
        Self::empty()
    }
}

impl CartState {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            updated_at: Utc::now(),
            synced_with_server: false,
            applied_coupon_code: None,
            discount_amount: Money::ZERO,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn subtotal(&self) -> Money {
        self.items
            .iter()
            .fold(Money::ZERO, |acc, item| acc + item.line_total())
    }

    pub fn line(&self, key: LineKey) -> Option<&CartItem> {
        self.items.iter().find(|i| i.key() == key)
    }

    fn line_mut(&mut self, key: LineKey) -> Option<&mut CartItem> {
        self.items.iter_mut().find(|i| i.key() == key)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.synced_with_server = false;
    }

    /// Add an item. An existing line with the same key absorbs the quantity,
    /// capped at the stock ceiling. A brand-new add whose quantity alone
    /// exceeds the ceiling is rejected outright.
    pub fn add_item(&mut self, item: CartItem) -> CartMutation {
        if item.quantity == 0 {
            return CartMutation::Applied;
        }
        match self.line_mut(item.key()) {
            Some(line) => {
                let wanted = line.quantity.saturating_add(item.quantity);
                match line.max_quantity.or(item.max_quantity) {
                    Some(max) if wanted > max => {
                        line.quantity = max;
                        self.touch();
                        CartMutation::Clamped { max }
                    }
                    _ => {
                        line.quantity = wanted;
                        self.touch();
                        CartMutation::Applied
                    }
                }
            }
            None => {
                if let Some(max) = item.max_quantity {
                    if item.quantity > max {
                        return CartMutation::Rejected { max };
                    }
                }
                self.items.push(item);
                self.touch();
                CartMutation::Applied
            }
        }
    }

    /// Remove the matching line. Idempotent: removing an absent line is fine.
    pub fn remove_item(&mut self, key: LineKey) {
        let before = self.items.len();
        self.items.retain(|i| i.key() != key);
        if self.items.len() != before {
            self.touch();
        }
    }

    /// Relative quantity adjustment. Decrements floor at 1; the line is never
    /// auto-removed (explicit `remove_item` is required). Increments cap at
    /// the stock ceiling.
    pub fn update_quantity(&mut self, key: LineKey, delta: i32) -> CartMutation {
        let Some(line) = self.line_mut(key) else {
            return CartMutation::Applied;
        };
        let wanted = (i64::from(line.quantity) + i64::from(delta)).max(1);
        let outcome = match line.max_quantity {
            Some(max) if wanted > i64::from(max) => {
                line.quantity = max;
                CartMutation::Clamped { max }
            }
            _ => {
                line.quantity = wanted as u32;
                CartMutation::Applied
            }
        };
        self.touch();
        outcome
    }

    /// Absolute quantity set, capped at the stock ceiling, floored at 1.
    pub fn set_quantity(&mut self, key: LineKey, quantity: u32) -> CartMutation {
        let Some(line) = self.line_mut(key) else {
            return CartMutation::Applied;
        };
        let wanted = quantity.max(1);
        let outcome = match line.max_quantity {
            Some(max) if wanted > max => {
                line.quantity = max;
                CartMutation::Clamped { max }
            }
            _ => {
                line.quantity = wanted;
                CartMutation::Applied
            }
        };
        self.touch();
        outcome
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.clear_coupon_internal();
        self.touch();
    }

    /// Record a validated coupon. Code and discount always move together.
    pub fn set_coupon(&mut self, code: String, discount: Money) {
        self.applied_coupon_code = Some(code);
        self.discount_amount = discount;
        self.touch();
    }

    pub fn clear_coupon(&mut self) {
        self.clear_coupon_internal();
        self.touch();
    }

    fn clear_coupon_internal(&mut self) {
        self.applied_coupon_code = None;
        self.discount_amount = Money::ZERO;
    }
}
