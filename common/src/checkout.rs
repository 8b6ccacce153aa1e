use std::fmt;

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::payment::PaymentMethod;

/// Shipping and contact details collected on the address step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressField {
    FullName,
    Phone,
    Email,
    Street,
    City,
    Province,
    PostalCode,
}

impl AddressField {
    pub fn label(self) -> &'static str {
        match self {
            AddressField::FullName => "full name",
            AddressField::Phone => "phone",
            AddressField::Email => "email",
            AddressField::Street => "street",
            AddressField::City => "city",
            AddressField::Province => "province",
            AddressField::PostalCode => "postal code",
        }
    }
}

/// A field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressError {
    pub field: AddressField,
    pub message: String,
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field.label(), self.message)
    }
}

/// Minimal `local@domain.tld` shape check. The backend performs the real
/// deliverability validation.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

fn phone_digit_count(phone: &str) -> usize {
    phone.chars().filter(|c| c.is_ascii_digit()).count()
}

impl ShippingAddress {
    /// Validate all required fields. Returns every failure so the UI can
    /// show field-level messages in one pass.
    pub fn validate(&self) -> Result<(), Vec<AddressError>> {
        let mut errors = Vec::new();
        let required = [
            (AddressField::FullName, &self.full_name),
            (AddressField::Phone, &self.phone),
            (AddressField::Email, &self.email),
            (AddressField::Street, &self.street),
            (AddressField::City, &self.city),
            (AddressField::Province, &self.province),
            (AddressField::PostalCode, &self.postal_code),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                errors.push(AddressError {
                    field,
                    message: "is required".into(),
                });
            }
        }
        if !self.email.trim().is_empty() && !is_valid_email(self.email.trim()) {
            errors.push(AddressError {
                field: AddressField::Email,
                message: "must look like name@example.com".into(),
            });
        }
        if !self.phone.trim().is_empty() && phone_digit_count(&self.phone) < 9 {
            errors.push(AddressError {
                field: AddressField::Phone,
                message: "must contain at least 9 digits".into(),
            });
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Everything the checkout flow collects before payment initiation.
/// Totals are always derived, never stored here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckoutDraft {
    pub address: ShippingAddress,
    pub shipping_method_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub customer_notes: String,
    pub coupon_code: Option<String>,
}

/// Derived checkout totals. `total` is floored at zero even when the
/// discount exceeds the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub shipping: Money,
    pub total: Money,
}

impl CheckoutTotals {
    pub fn compute(subtotal: Money, discount: Money, shipping: Money) -> Self {
        Self {
            subtotal,
            discount,
            shipping,
            total: (subtotal - discount + shipping).clamp_non_negative(),
        }
    }
}
