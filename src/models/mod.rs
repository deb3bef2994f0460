//! Data models
//!
//! This module contains all data structures used throughout the Tilldesk service.
//! Models represent:
//! - Database entities (User, Session, ShiftAssignment, TillSession, Order)
//! - Domain types (ShiftKind, SettlementTotals, CashVariance, SessionReport)

pub mod order;
pub mod schedule;
pub mod session;
pub mod shift;
pub mod till_session;
pub mod user;

pub use order::{Order, OrderStatus, PaymentMethod};
pub use schedule::ShiftAssignment;
pub use session::Session;
pub use shift::{ShiftKind, ShiftWindows};
pub use till_session::{
    CashVariance, SessionReport, SessionStatus, SessionValidation, SettlementTotals, TillSession,
    VarianceTier,
};
pub use user::{User, UserRole};
