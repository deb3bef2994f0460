//! Till session service
//!
//! Business logic for the till session lifecycle:
//! - opening a session (one OPEN session per cashier per shift per day)
//! - unsettled-order validation
//! - cash reconciliation previews for the closing flow
//! - transactional close with a frozen settlement report

use crate::db::repositories::{
    OrderRepository, ScheduleRepository, TillSessionRepository, UserRepository,
};
use crate::models::shift::weekday_name;
use crate::models::{
    CashVariance, SessionReport, SessionStatus, SessionValidation, SettlementTotals, ShiftKind,
    ShiftWindows, TillSession, User,
};
use anyhow::Context;
use chrono::{NaiveDateTime, Utc};
use std::sync::Arc;

/// Error types for till session operations
#[derive(Debug, thiserror::Error)]
pub enum TillSessionError {
    /// Session does not exist
    #[error("Till session not found")]
    NotFound,

    /// Operation requires an open session
    #[error("Till session is already closed")]
    NotOpen,

    /// The wall clock is outside every shift window
    #[error("No shift window is active right now")]
    NoActiveShift,

    /// The cashier has no schedule assignment for the shift
    #[error("Cashier is not scheduled for the {0} shift")]
    NotScheduled(ShiftKind),

    /// The single-open-session invariant would be violated
    #[error("Cashier already has an open session for this shift")]
    AlreadyOpen,

    /// Unsettled orders block the close
    #[error("{0} unsettled order(s) block closing this session")]
    Blocked(usize),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Till session service
pub struct TillSessionService {
    till_repo: Arc<dyn TillSessionRepository>,
    order_repo: Arc<dyn OrderRepository>,
    schedule_repo: Arc<dyn ScheduleRepository>,
    user_repo: Arc<dyn UserRepository>,
    windows: ShiftWindows,
    variance_balanced: i64,
    variance_small: i64,
}

impl TillSessionService {
    pub fn new(
        till_repo: Arc<dyn TillSessionRepository>,
        order_repo: Arc<dyn OrderRepository>,
        schedule_repo: Arc<dyn ScheduleRepository>,
        user_repo: Arc<dyn UserRepository>,
        windows: ShiftWindows,
        variance_balanced: i64,
        variance_small: i64,
    ) -> Self {
        Self {
            till_repo,
            order_repo,
            schedule_repo,
            user_repo,
            windows,
            variance_balanced,
            variance_small,
        }
    }

    /// Open a till session for a scheduled cashier.
    ///
    /// `shift` defaults to the window `now` falls in. Enforces the invariant
    /// that a cashier has at most one OPEN session per shift per business
    /// date; the session row is only ever mutated again by [`close`].
    ///
    /// [`close`]: TillSessionService::close
    pub async fn open(
        &self,
        cashier: &User,
        opening_float: i64,
        shift: Option<ShiftKind>,
        now: NaiveDateTime,
    ) -> Result<TillSession, TillSessionError> {
        if opening_float < 0 {
            return Err(TillSessionError::ValidationError(
                "Opening float must not be negative".to_string(),
            ));
        }

        let shift = match shift.or_else(|| self.windows.classify_at(now)) {
            Some(s) => s,
            None => return Err(TillSessionError::NoActiveShift),
        };
        let business_date = self.windows.business_date(now, shift);

        let scheduled = self
            .schedule_repo
            .get(cashier.id, business_date, shift)
            .await
            .context("Failed to check schedule")?;
        if scheduled.is_none() {
            return Err(TillSessionError::NotScheduled(shift));
        }

        if self
            .till_repo
            .find_open(cashier.id, shift, business_date)
            .await
            .context("Failed to check for an open session")?
            .is_some()
        {
            return Err(TillSessionError::AlreadyOpen);
        }

        let session = TillSession {
            id: 0,
            cashier_id: cashier.id,
            shift,
            business_date,
            opening_float,
            status: SessionStatus::Open,
            actual_cash: None,
            notes: None,
            totals: None,
            opened_at: Utc::now(),
            closed_at: None,
        };

        let created = self
            .till_repo
            .create(&session)
            .await
            .context("Failed to create till session")?;
        tracing::info!(
            session_id = created.id,
            cashier_id = cashier.id,
            shift = %shift,
            "Till session opened"
        );
        Ok(created)
    }

    /// Get a session by id
    pub async fn get(&self, id: i64) -> Result<TillSession, TillSessionError> {
        self.till_repo
            .get_by_id(id)
            .await
            .context("Failed to load till session")?
            .ok_or(TillSessionError::NotFound)
    }

    /// The cashier's open session, if any
    pub async fn active_for(&self, cashier_id: i64) -> Result<Option<TillSession>, TillSessionError> {
        Ok(self
            .till_repo
            .find_open_by_cashier(cashier_id)
            .await
            .context("Failed to look up open session")?)
    }

    /// Page of sessions, newest first; `cashier_id` restricts to one cashier
    pub async fn list(
        &self,
        cashier_id: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<TillSession>, i64), TillSessionError> {
        let sessions = self
            .till_repo
            .list(cashier_id, limit, offset)
            .await
            .context("Failed to list till sessions")?;
        let count = self
            .till_repo
            .count(cashier_id)
            .await
            .context("Failed to count till sessions")?;
        Ok((sessions, count))
    }

    /// Can this session close? Lists the unsettled orders blocking it.
    pub async fn validate(&self, session: &TillSession) -> Result<SessionValidation, TillSessionError> {
        let unsettled = self
            .order_repo
            .unsettled_for_session(session.id)
            .await
            .context("Failed to list unsettled orders")?;
        Ok(SessionValidation::from_unsettled(unsettled))
    }

    /// Settlement totals plus the cash reconciliation for a prospective count.
    ///
    /// Expected cash = opening float + cash-payment total; the tier is
    /// operator feedback only and never blocks the close.
    pub async fn reconcile(
        &self,
        session: &TillSession,
        actual_cash: i64,
    ) -> Result<(SettlementTotals, CashVariance), TillSessionError> {
        let totals = self
            .order_repo
            .settlement_totals(session.id)
            .await
            .context("Failed to aggregate settlement totals")?;
        let variance = CashVariance::compute(
            session.opening_float,
            totals.cash_total,
            actual_cash,
            self.variance_balanced,
            self.variance_small,
        );
        Ok((totals, variance))
    }

    /// Close a session and freeze its settlement report.
    ///
    /// Re-validates unsettled orders (they may have changed since the wizard
    /// passed validation) and performs the row update and report insert in
    /// one transaction.
    pub async fn close(
        &self,
        session: &TillSession,
        actual_cash: i64,
        notes: Option<String>,
    ) -> Result<SessionReport, TillSessionError> {
        if !session.is_open() {
            return Err(TillSessionError::NotOpen);
        }
        if actual_cash < 0 {
            return Err(TillSessionError::ValidationError(
                "Counted cash must not be negative".to_string(),
            ));
        }

        let validation = self.validate(session).await?;
        if !validation.can_close {
            return Err(TillSessionError::Blocked(validation.unsettled_orders.len()));
        }

        let (totals, reconciliation) = self.reconcile(session, actual_cash).await?;

        let cashier_name = self
            .user_repo
            .get_by_id(session.cashier_id)
            .await
            .context("Failed to load cashier")?
            .map(|u| u.username)
            .unwrap_or_else(|| format!("cashier #{}", session.cashier_id));

        let closed_at = Utc::now();
        let report = SessionReport {
            session_id: session.id,
            cashier_id: session.cashier_id,
            cashier_name,
            shift: session.shift,
            business_date: session.business_date,
            weekday: weekday_name(session.business_date).to_string(),
            opening_float: session.opening_float,
            totals,
            reconciliation,
            notes: notes.clone(),
            closed_at,
        };

        self.till_repo
            .close(
                session.id,
                actual_cash,
                notes.as_deref(),
                &totals,
                closed_at,
                &report,
            )
            .await
            .context("Failed to close till session")?;

        tracing::info!(
            session_id = session.id,
            variance = reconciliation.variance,
            tier = ?reconciliation.tier,
            "Till session closed"
        );
        Ok(report)
    }

    /// The frozen report of a closed session
    pub async fn report(&self, session_id: i64) -> Result<SessionReport, TillSessionError> {
        self.till_repo
            .get_report(session_id)
            .await
            .context("Failed to load session report")?
            .ok_or(TillSessionError::NotFound)
    }
}
