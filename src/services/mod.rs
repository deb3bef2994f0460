//! Services layer - Business logic
//!
//! This module contains all business logic services for the Tilldesk
//! service. Services sit between the HTTP handlers and the repositories:
//! they implement the rules (session invariants, the closing flow, shift
//! enforcement) and leave persistence details to the repository layer.

pub mod close_wizard;
pub mod password;
pub mod rate_limiter;
pub mod shift_enforcement;
pub mod till_session;
pub mod user;

pub use close_wizard::{CloseWizard, WizardError, WizardStep, WizardTracker};
pub use rate_limiter::LoginRateLimiter;
pub use shift_enforcement::{EnforcementDecision, ShiftEnforcementService};
pub use till_session::{TillSessionError, TillSessionService};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
