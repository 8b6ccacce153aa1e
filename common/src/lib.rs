//! Domain types shared between the storefront client and its tests: money,
//! cart contents, shipping methods, payment methods, and checkout data.

pub mod cart;
pub mod checkout;
pub mod money;
pub mod payment;
pub mod shipping;
