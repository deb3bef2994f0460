//! Till session model
//!
//! A till session is a cashier's working period at a register: it opens with
//! a counted float, accumulates orders, and closes with a cash count and a
//! settlement report. All money amounts are integer minor units.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Order, PaymentMethod, ShiftKind};

/// Till session entity
///
/// A cashier has at most one OPEN session per shift per business date.
/// Settlement fields are `None` until the session closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TillSession {
    /// Unique identifier
    pub id: i64,
    /// Cashier running the till
    pub cashier_id: i64,
    /// Shift window the session belongs to
    pub shift: ShiftKind,
    /// Business date the session books to (night wraps backwards)
    pub business_date: NaiveDate,
    /// Opening float counted into the drawer, minor units
    pub opening_float: i64,
    /// Open or closed
    pub status: SessionStatus,
    /// Physical cash counted at close
    pub actual_cash: Option<i64>,
    /// Free-text closing notes
    pub notes: Option<String>,
    /// Settlement totals, computed server-side at close
    pub totals: Option<SettlementTotals>,
    /// Opening timestamp
    pub opened_at: DateTime<Utc>,
    /// Closing timestamp
    pub closed_at: Option<DateTime<Utc>>,
}

impl TillSession {
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}

/// Till session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Closed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Open => write!(f, "open"),
            SessionStatus::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(SessionStatus::Open),
            "closed" => Ok(SessionStatus::Closed),
            _ => Err(anyhow::anyhow!("Invalid session status: {}", s)),
        }
    }
}

/// Settlement totals per payment method: sum and count of settled orders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementTotals {
    pub cash_total: i64,
    pub cash_count: i64,
    pub card_total: i64,
    pub card_count: i64,
    pub mobile_total: i64,
    pub mobile_count: i64,
}

impl SettlementTotals {
    /// Add one settled order to the totals
    pub fn record(&mut self, method: PaymentMethod, amount: i64) {
        match method {
            PaymentMethod::Cash => {
                self.cash_total += amount;
                self.cash_count += 1;
            }
            PaymentMethod::Card => {
                self.card_total += amount;
                self.card_count += 1;
            }
            PaymentMethod::Mobile => {
                self.mobile_total += amount;
                self.mobile_count += 1;
            }
        }
    }

    /// Revenue across all payment methods
    pub fn revenue(&self) -> i64 {
        self.cash_total + self.card_total + self.mobile_total
    }

    /// Number of settled orders across all payment methods
    pub fn order_count(&self) -> i64 {
        self.cash_count + self.card_count + self.mobile_count
    }
}

/// Cash reconciliation tiers, operator feedback only.
///
/// No business rule blocks closing on any tier; the tier drives how loudly
/// the variance is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceTier {
    /// Drawer matches expectations (within the balanced threshold)
    Balanced,
    /// Small discrepancy worth a note
    Small,
    /// Large discrepancy worth a manager's attention
    Large,
}

/// Cash reconciliation: expected vs. counted drawer contents
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CashVariance {
    /// Opening float + cash-payment total
    pub expected: i64,
    /// Physical cash counted by the operator
    pub actual: i64,
    /// Signed difference, actual - expected
    pub variance: i64,
    /// Display tier
    pub tier: VarianceTier,
}

impl CashVariance {
    /// Reconcile a cash count against a session's float and cash takings.
    ///
    /// `balanced` and `small` are the absolute-variance thresholds from
    /// configuration (balanced <= small).
    pub fn compute(
        opening_float: i64,
        cash_total: i64,
        actual: i64,
        balanced: i64,
        small: i64,
    ) -> Self {
        let expected = opening_float + cash_total;
        let variance = actual - expected;
        let tier = if variance.abs() <= balanced {
            VarianceTier::Balanced
        } else if variance.abs() <= small {
            VarianceTier::Small
        } else {
            VarianceTier::Large
        };
        Self {
            expected,
            actual,
            variance,
            tier,
        }
    }
}

/// Result of the can-this-session-close check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionValidation {
    /// True when no unsettled orders remain
    pub can_close: bool,
    /// Orders blocking closure, empty when `can_close`
    pub unsettled_orders: Vec<Order>,
}

impl SessionValidation {
    pub fn from_unsettled(unsettled_orders: Vec<Order>) -> Self {
        Self {
            can_close: unsettled_orders.is_empty(),
            unsettled_orders,
        }
    }
}

/// Finalized settlement snapshot produced when a session closes.
///
/// Persisted separately from the session row and immutable afterwards;
/// this is what the front desk prints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// The closed session
    pub session_id: i64,
    /// Cashier who ran the till
    pub cashier_id: i64,
    /// Cashier username, denormalized for printing
    pub cashier_name: String,
    /// Shift window
    pub shift: ShiftKind,
    /// Business date
    pub business_date: NaiveDate,
    /// Printed weekday header
    pub weekday: String,
    /// Opening float
    pub opening_float: i64,
    /// Settlement totals per payment method
    pub totals: SettlementTotals,
    /// Cash reconciliation
    pub reconciliation: CashVariance,
    /// Closing notes
    pub notes: Option<String>,
    /// When the session closed
    pub closed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settlement_totals_record() {
        let mut totals = SettlementTotals::default();
        totals.record(PaymentMethod::Cash, 25000);
        totals.record(PaymentMethod::Cash, 25000);
        totals.record(PaymentMethod::Card, 80000);
        totals.record(PaymentMethod::Mobile, 12000);

        assert_eq!(totals.cash_total, 50000);
        assert_eq!(totals.cash_count, 2);
        assert_eq!(totals.card_total, 80000);
        assert_eq!(totals.card_count, 1);
        assert_eq!(totals.mobile_total, 12000);
        assert_eq!(totals.mobile_count, 1);
        assert_eq!(totals.revenue(), 142000);
        assert_eq!(totals.order_count(), 4);
    }

    #[test]
    fn test_variance_balanced_at_zero() {
        // Opening 100000 + cash takings 50000 => expected 150000
        let v = CashVariance::compute(100_000, 50_000, 150_000, 100, 5000);
        assert_eq!(v.expected, 150_000);
        assert_eq!(v.variance, 0);
        assert_eq!(v.tier, VarianceTier::Balanced);
    }

    #[test]
    fn test_variance_tiers() {
        let v = CashVariance::compute(0, 0, 100, 100, 5000);
        assert_eq!(v.tier, VarianceTier::Balanced);

        let v = CashVariance::compute(0, 0, 101, 100, 5000);
        assert_eq!(v.variance, 101);
        assert_eq!(v.tier, VarianceTier::Small);

        // Short drawer: signed variance is negative
        let v = CashVariance::compute(100_000, 0, 94_000, 100, 5000);
        assert_eq!(v.variance, -6000);
        assert_eq!(v.tier, VarianceTier::Large);
    }

    #[test]
    fn test_validation_from_unsettled() {
        let validation = SessionValidation::from_unsettled(vec![]);
        assert!(validation.can_close);

        let order = Order {
            id: 7,
            session_id: 1,
            reference: "T-0007".to_string(),
            amount: 4200,
            method: None,
            status: crate::models::OrderStatus::Open,
            created_at: Utc::now(),
            settled_at: None,
        };
        let validation = SessionValidation::from_unsettled(vec![order]);
        assert!(!validation.can_close);
        assert_eq!(validation.unsettled_orders.len(), 1);
    }
}
