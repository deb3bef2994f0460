//! Session closing wizard
//!
//! The closing flow is a linear four-step state machine per open till
//! session: `validate -> cash-count -> summary -> success`, with the single
//! back-transition `summary -> cash-count`. Steps never skip:
//! - cash-count is unreachable while unsettled orders remain,
//! - summary is unreachable without a recorded cash count,
//! - success only follows a confirmed summary.
//!
//! Wizard state lives in memory keyed by session id. No step before the
//! final confirmation mutates the session row, so losing the map (restart)
//! just sends the operator back to the validate step.

use crate::models::SessionValidation;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

/// Wizard steps, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WizardStep {
    Validate,
    CashCount,
    Summary,
    Success,
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WizardStep::Validate => write!(f, "validate"),
            WizardStep::CashCount => write!(f, "cash-count"),
            WizardStep::Summary => write!(f, "summary"),
            WizardStep::Success => write!(f, "success"),
        }
    }
}

/// Error types for wizard transitions
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    /// A step was invoked while the wizard is on a different step
    #[error("Closing flow is at step '{at}', not '{wanted}'")]
    WrongStep { at: WizardStep, wanted: WizardStep },

    /// Unsettled orders block the validate step from passing
    #[error("{0} unsettled order(s) must be settled before closing")]
    Blocked(usize),

    /// A cash count below zero makes no sense for a drawer
    #[error("Counted cash must not be negative")]
    NegativeCash,
}

/// In-flight closing wizard for one till session
#[derive(Debug, Clone)]
pub struct CloseWizard {
    step: WizardStep,
    actual_cash: Option<i64>,
}

impl CloseWizard {
    pub fn new() -> Self {
        Self {
            step: WizardStep::Validate,
            actual_cash: None,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    /// The cash count recorded at the cash-count step
    pub fn actual_cash(&self) -> Option<i64> {
        self.actual_cash
    }

    fn expect_step(&self, wanted: WizardStep) -> Result<(), WizardError> {
        if self.step != wanted {
            return Err(WizardError::WrongStep {
                at: self.step,
                wanted,
            });
        }
        Ok(())
    }

    /// Apply a validation result at the validate step.
    ///
    /// Advances to cash-count only when no unsettled orders remain; a
    /// blocked validation keeps the wizard where it is so the operator can
    /// settle the orders and retry.
    pub fn pass_validation(&mut self, validation: &SessionValidation) -> Result<(), WizardError> {
        self.expect_step(WizardStep::Validate)?;
        if !validation.can_close {
            return Err(WizardError::Blocked(validation.unsettled_orders.len()));
        }
        self.step = WizardStep::CashCount;
        Ok(())
    }

    /// Record the physical cash count and advance to the summary
    pub fn record_cash(&mut self, actual_cash: i64) -> Result<(), WizardError> {
        self.expect_step(WizardStep::CashCount)?;
        if actual_cash < 0 {
            return Err(WizardError::NegativeCash);
        }
        self.actual_cash = Some(actual_cash);
        self.step = WizardStep::Summary;
        Ok(())
    }

    /// The one allowed back-transition: summary -> cash-count
    pub fn back_to_cash_count(&mut self) -> Result<(), WizardError> {
        self.expect_step(WizardStep::Summary)?;
        self.step = WizardStep::CashCount;
        Ok(())
    }

    /// Confirm the summary. Returns the recorded cash count; the caller
    /// performs the actual close and then marks the wizard finished.
    pub fn confirm(&mut self) -> Result<i64, WizardError> {
        self.expect_step(WizardStep::Summary)?;
        // Unreachable without record_cash, which always sets the count
        let actual = self.actual_cash.ok_or(WizardError::NegativeCash)?;
        self.step = WizardStep::Success;
        Ok(actual)
    }
}

impl Default for CloseWizard {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory wizard tracker keyed by till session id
pub struct WizardTracker {
    wizards: RwLock<HashMap<i64, CloseWizard>>,
}

impl WizardTracker {
    pub fn new() -> Self {
        Self {
            wizards: RwLock::new(HashMap::new()),
        }
    }

    /// The wizard for a session, created at the validate step on first use
    pub async fn get_or_begin(&self, session_id: i64) -> CloseWizard {
        let mut wizards = self.wizards.write().await;
        wizards.entry(session_id).or_default().clone()
    }

    /// Current wizard state, if a closing flow is in progress
    pub async fn get(&self, session_id: i64) -> Option<CloseWizard> {
        self.wizards.read().await.get(&session_id).cloned()
    }

    /// Run a transition against the stored wizard.
    ///
    /// The mutation is applied under the write lock; a failed transition
    /// leaves the stored state untouched.
    pub async fn transition<T>(
        &self,
        session_id: i64,
        f: impl FnOnce(&mut CloseWizard) -> Result<T, WizardError>,
    ) -> Result<T, WizardError> {
        let mut wizards = self.wizards.write().await;
        let wizard = wizards.entry(session_id).or_default();
        let mut candidate = wizard.clone();
        let out = f(&mut candidate)?;
        *wizard = candidate;
        Ok(out)
    }

    /// Drop the wizard for a session (after close, or to abandon the flow)
    pub async fn remove(&self, session_id: i64) {
        self.wizards.write().await.remove(&session_id);
    }
}

impl Default for WizardTracker {
    fn default() -> Self {
        Self::new()
    }
}
