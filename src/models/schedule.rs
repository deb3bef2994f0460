//! Shift schedule model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ShiftKind;

/// A cashier's shift assignment for one business date.
///
/// One row per (cashier, date, shift); assignment is an upsert, so
/// re-assigning the same slot replaces nothing but the timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftAssignment {
    /// Unique identifier
    pub id: i64,
    /// Assigned cashier
    pub cashier_id: i64,
    /// Business date the shift falls on
    pub date: NaiveDate,
    /// Which window of the day
    pub shift: ShiftKind,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}
