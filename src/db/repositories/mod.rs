//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the operations for a specific entity.

pub mod order;
pub mod schedule;
pub mod session;
pub mod till_session;
pub mod user;

pub use order::{OrderFilter, OrderRepository, SqlxOrderRepository};
pub use schedule::{ScheduleRepository, SqlxScheduleRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use till_session::{SqlxTillSessionRepository, TillSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
