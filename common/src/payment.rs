use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed set of payment methods the backend dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Mpesa,
    AirtelMoney,
    Card,
    BankTransfer,
}

impl PaymentMethod {
    /// Code sent over the wire on payment initiation.
    pub fn wire_code(self) -> &'static str {
        match self {
            PaymentMethod::Mpesa => "mpesa",
            PaymentMethod::AirtelMoney => "airtel_money",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }

    pub fn from_wire(code: &str) -> Option<Self> {
        match code {
            "mpesa" => Some(PaymentMethod::Mpesa),
            "airtel_money" => Some(PaymentMethod::AirtelMoney),
            "card" => Some(PaymentMethod::Card),
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PaymentMethod::Mpesa => "M-Pesa",
            PaymentMethod::AirtelMoney => "Airtel Money",
            PaymentMethod::Card => "Card",
            PaymentMethod::BankTransfer => "Bank transfer",
        }
    }

    pub fn all() -> &'static [PaymentMethod] {
        &[
            PaymentMethod::Mpesa,
            PaymentMethod::AirtelMoney,
            PaymentMethod::Card,
            PaymentMethod::BankTransfer,
        ]
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
