//! Order model
//!
//! Orders are the minimum POS surface the session flows need: each order
//! belongs to a till session, and unsettled orders block the session from
//! closing. Amounts are integer minor units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An order rung up against a till session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique identifier
    pub id: i64,
    /// Till session the order was rung up on
    pub session_id: i64,
    /// Human-facing order reference (ticket number)
    pub reference: String,
    /// Order total in minor units
    pub amount: i64,
    /// Payment method, set when the order settles
    pub method: Option<PaymentMethod>,
    /// Settlement status
    pub status: OrderStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Settlement timestamp
    pub settled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_settled(&self) -> bool {
        self.status == OrderStatus::Settled
    }
}

/// How an order was paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Mobile,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::Mobile => write!(f, "mobile"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "mobile" => Ok(PaymentMethod::Mobile),
            _ => Err(anyhow::anyhow!("Invalid payment method: {}", s)),
        }
    }
}

/// Order settlement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Rung up, not yet paid
    Open,
    /// Paid and counted into settlement totals
    Settled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "open"),
            OrderStatus::Settled => write!(f, "settled"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(OrderStatus::Open),
            "settled" => Ok(OrderStatus::Settled),
            _ => Err(anyhow::anyhow!("Invalid order status: {}", s)),
        }
    }
}
