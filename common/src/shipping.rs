use serde::{Deserialize, Serialize};

use crate::money::Money;

/// A delivery option from the server-provided list. Costs are looked up
/// here, never computed client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: String,
    pub name: String,
    pub price: Money,
    pub enabled: bool,
    /// Free-shipping promotion threshold, when configured on the method.
    pub min_order: Option<Money>,
    pub delivery_time: Option<String>,
}

impl ShippingMethod {
    /// Shipping cost for a given cart subtotal: free once the subtotal
    /// reaches the method's promotion threshold, full price otherwise.
    pub fn effective_cost(&self, subtotal: Money) -> Money {
        match self.min_order {
            Some(threshold) if subtotal >= threshold => Money::ZERO,
            _ => self.price,
        }
    }
}

pub fn find_method<'a>(methods: &'a [ShippingMethod], id: &str) -> Option<&'a ShippingMethod> {
    methods.iter().find(|m| m.id == id)
}
