//! Shift enforcement
//!
//! The gatekeeper that tells a cashier whether they must open a till
//! session, close one, or do nothing. Clients poll the decision every few
//! minutes, so the schedule lookup is cached.
//!
//! The decision is deliberately fail-open: a schedule or session lookup
//! failure is logged and mapped to "no action" so a transient fault never
//! locks a cashier out of the till.

use crate::db::repositories::{ScheduleRepository, TillSessionRepository};
use crate::models::shift::minute_of_day;
use crate::models::{ShiftKind, ShiftWindows, User};
use chrono::{NaiveDate, NaiveDateTime};
use moka::future::Cache;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// How long a schedule lookup stays cached. Matches the client polling
/// cadence so a fresh assignment is picked up within one poll cycle.
const SCHEDULE_CACHE_TTL: Duration = Duration::from_secs(300);

type ScheduleKey = (i64, NaiveDate, ShiftKind);

/// What the cashier must do right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EnforcementDecision {
    /// Nothing to do
    None,
    /// A scheduled shift is running and no session is open
    OpenRequired { shift: ShiftKind },
    /// The open session must close before the shift ends
    CloseRequired {
        shift: ShiftKind,
        session_id: i64,
        minutes_left: u32,
    },
}

/// Shift enforcement service
pub struct ShiftEnforcementService {
    schedule_repo: Arc<dyn ScheduleRepository>,
    till_repo: Arc<dyn TillSessionRepository>,
    windows: ShiftWindows,
    close_warning_minutes: u32,
    schedule_cache: Cache<ScheduleKey, bool>,
}

impl ShiftEnforcementService {
    pub fn new(
        schedule_repo: Arc<dyn ScheduleRepository>,
        till_repo: Arc<dyn TillSessionRepository>,
        windows: ShiftWindows,
        close_warning_minutes: u32,
    ) -> Self {
        Self {
            schedule_repo,
            till_repo,
            windows,
            close_warning_minutes,
            schedule_cache: Cache::builder().time_to_live(SCHEDULE_CACHE_TTL).build(),
        }
    }

    /// Decide whether the user must open or close a till session at `now`.
    ///
    /// Never returns an error: non-cashiers, off-window times, unscheduled
    /// cashiers, and lookup failures all resolve to
    /// [`EnforcementDecision::None`].
    pub async fn evaluate(&self, user: &User, now: NaiveDateTime) -> EnforcementDecision {
        if !user.is_cashier() || !user.active {
            return EnforcementDecision::None;
        }

        let minute = minute_of_day(now);
        let shift = match self.windows.classify(minute) {
            Some(s) => s,
            None => return EnforcementDecision::None,
        };
        let business_date = self.windows.business_date(now, shift);

        let scheduled = match self.is_scheduled(user.id, business_date, shift).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(
                    cashier_id = user.id,
                    error = %e,
                    "Schedule lookup failed; skipping enforcement"
                );
                return EnforcementDecision::None;
            }
        };
        if !scheduled {
            return EnforcementDecision::None;
        }

        let session = match self.till_repo.find_open(user.id, shift, business_date).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(
                    cashier_id = user.id,
                    error = %e,
                    "Open-session lookup failed; skipping enforcement"
                );
                return EnforcementDecision::None;
            }
        };

        match session {
            None => EnforcementDecision::OpenRequired { shift },
            Some(session) => {
                let minutes_left = self.windows.minutes_until_end(shift, minute);
                if minutes_left <= self.close_warning_minutes {
                    EnforcementDecision::CloseRequired {
                        shift,
                        session_id: session.id,
                        minutes_left,
                    }
                } else {
                    EnforcementDecision::None
                }
            }
        }
    }

    /// Log every open session that is overdue for closing.
    ///
    /// Server-side mirror of the client poller: a session is overdue when
    /// its shift window is in the close-warning zone or has already passed.
    /// Returns the number of overdue sessions; failures are logged and
    /// counted as zero.
    pub async fn sweep_overdue(&self, now: NaiveDateTime) -> usize {
        let sessions = match self.till_repo.list_open().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Open-session sweep failed");
                return 0;
            }
        };

        let minute = minute_of_day(now);
        let mut overdue = 0;
        for session in sessions {
            let in_window = self.windows.classify(minute) == Some(session.shift)
                && self.windows.business_date(now, session.shift) == session.business_date;
            let must_close = if in_window {
                self.windows
                    .is_near_end(session.shift, minute, self.close_warning_minutes)
            } else {
                // The window the session belongs to is over
                true
            };
            if must_close {
                overdue += 1;
                tracing::warn!(
                    session_id = session.id,
                    cashier_id = session.cashier_id,
                    shift = %session.shift,
                    "Till session overdue for closing"
                );
            }
        }
        overdue
    }

    async fn is_scheduled(
        &self,
        cashier_id: i64,
        date: NaiveDate,
        shift: ShiftKind,
    ) -> anyhow::Result<bool> {
        let repo = self.schedule_repo.clone();
        self.schedule_cache
            .try_get_with((cashier_id, date, shift), async move {
                let assignment = repo.get(cashier_id, date, shift).await?;
                Ok::<bool, anyhow::Error>(assignment.is_some())
            })
            .await
            .map_err(|e: Arc<anyhow::Error>| anyhow::anyhow!("{}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        ScheduleRepository, SqlxScheduleRepository, SqlxTillSessionRepository,
        SqlxUserRepository, TillSessionRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{
        SessionReport, SessionStatus, SettlementTotals, TillSession, User, UserRole,
    };
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, Utc};

    struct Fixture {
        service: ShiftEnforcementService,
        schedule: Arc<dyn ScheduleRepository>,
        till: Arc<dyn TillSessionRepository>,
        cashier: User,
        manager: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::boxed(pool.clone());
        let cashier = users
            .create(&User::new(
                "anna".to_string(),
                "hash".to_string(),
                UserRole::Cashier,
            ))
            .await
            .unwrap();
        let manager = users
            .create(&User::new(
                "boris".to_string(),
                "hash".to_string(),
                UserRole::Manager,
            ))
            .await
            .unwrap();

        let schedule = SqlxScheduleRepository::boxed(pool.clone());
        let till = SqlxTillSessionRepository::boxed(pool.clone());
        let service =
            ShiftEnforcementService::new(schedule.clone(), till.clone(), ShiftWindows::default(), 15);

        Fixture {
            service,
            schedule,
            till,
            cashier,
            manager,
        }
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn at(hm: (u32, u32)) -> NaiveDateTime {
        monday().and_hms_opt(hm.0, hm.1, 0).unwrap()
    }

    async fn open_session(fix: &Fixture, shift: ShiftKind, date: NaiveDate) -> TillSession {
        fix.till
            .create(&TillSession {
                id: 0,
                cashier_id: fix.cashier.id,
                shift,
                business_date: date,
                opening_float: 100_000,
                status: SessionStatus::Open,
                actual_cash: None,
                notes: None,
                totals: None,
                opened_at: Utc::now(),
                closed_at: None,
            })
            .await
            .expect("Failed to open session")
    }

    #[tokio::test]
    async fn test_non_cashier_gets_no_action() {
        let fix = setup().await;
        fix.schedule
            .assign(fix.manager.id, monday(), ShiftKind::Morning)
            .await
            .unwrap();

        let decision = fix.service.evaluate(&fix.manager, at((9, 0))).await;
        assert_eq!(decision, EnforcementDecision::None);
    }

    #[tokio::test]
    async fn test_unscheduled_cashier_gets_no_action() {
        let fix = setup().await;
        let decision = fix.service.evaluate(&fix.cashier, at((9, 0))).await;
        assert_eq!(decision, EnforcementDecision::None);
    }

    #[tokio::test]
    async fn test_scheduled_cashier_without_session_must_open() {
        let fix = setup().await;
        fix.schedule
            .assign(fix.cashier.id, monday(), ShiftKind::Morning)
            .await
            .unwrap();

        let decision = fix.service.evaluate(&fix.cashier, at((9, 0))).await;
        assert_eq!(
            decision,
            EnforcementDecision::OpenRequired {
                shift: ShiftKind::Morning
            }
        );
    }

    #[tokio::test]
    async fn test_open_session_mid_shift_no_action() {
        let fix = setup().await;
        fix.schedule
            .assign(fix.cashier.id, monday(), ShiftKind::Morning)
            .await
            .unwrap();
        open_session(&fix, ShiftKind::Morning, monday()).await;

        // 13:44 is 16 minutes before the 14:00 end
        let decision = fix.service.evaluate(&fix.cashier, at((13, 44))).await;
        assert_eq!(decision, EnforcementDecision::None);
    }

    #[tokio::test]
    async fn test_close_required_within_warning_window() {
        let fix = setup().await;
        fix.schedule
            .assign(fix.cashier.id, monday(), ShiftKind::Morning)
            .await
            .unwrap();
        let session = open_session(&fix, ShiftKind::Morning, monday()).await;

        // Exactly 15 minutes before the 14:00 end
        let decision = fix.service.evaluate(&fix.cashier, at((13, 45))).await;
        assert_eq!(
            decision,
            EnforcementDecision::CloseRequired {
                shift: ShiftKind::Morning,
                session_id: session.id,
                minutes_left: 15,
            }
        );
    }

    #[tokio::test]
    async fn test_close_required_wraps_past_midnight() {
        let fix = setup().await;
        // Night shift booked to Monday; it is now 05:50 on Tuesday
        fix.schedule
            .assign(fix.cashier.id, monday(), ShiftKind::Night)
            .await
            .unwrap();
        let session = open_session(&fix, ShiftKind::Night, monday()).await;

        let tuesday_dawn = NaiveDate::from_ymd_opt(2025, 3, 11)
            .unwrap()
            .and_hms_opt(5, 50, 0)
            .unwrap();
        let decision = fix.service.evaluate(&fix.cashier, tuesday_dawn).await;
        assert_eq!(
            decision,
            EnforcementDecision::CloseRequired {
                shift: ShiftKind::Night,
                session_id: session.id,
                minutes_left: 10,
            }
        );
    }

    #[tokio::test]
    async fn test_sweep_counts_overdue_sessions() {
        let fix = setup().await;
        open_session(&fix, ShiftKind::Morning, monday()).await;

        // Mid-morning: nothing overdue
        assert_eq!(fix.service.sweep_overdue(at((9, 0))).await, 0);
        // Within the warning window
        assert_eq!(fix.service.sweep_overdue(at((13, 50))).await, 1);
        // Window passed entirely
        assert_eq!(fix.service.sweep_overdue(at((15, 0))).await, 1);
    }

    // ------------------------------------------------------------------
    // Fail-open behavior on repository errors
    // ------------------------------------------------------------------

    struct FailingScheduleRepo;

    #[async_trait]
    impl ScheduleRepository for FailingScheduleRepo {
        async fn assign(
            &self,
            _cashier_id: i64,
            _date: NaiveDate,
            _shift: ShiftKind,
        ) -> Result<crate::models::ShiftAssignment> {
            anyhow::bail!("schedule backend down")
        }

        async fn get(
            &self,
            _cashier_id: i64,
            _date: NaiveDate,
            _shift: ShiftKind,
        ) -> Result<Option<crate::models::ShiftAssignment>> {
            anyhow::bail!("schedule backend down")
        }

        async fn list_for_date(&self, _date: NaiveDate) -> Result<Vec<crate::models::ShiftAssignment>> {
            anyhow::bail!("schedule backend down")
        }
    }

    struct FailingTillRepo;

    #[async_trait]
    impl TillSessionRepository for FailingTillRepo {
        async fn create(&self, _session: &TillSession) -> Result<TillSession> {
            anyhow::bail!("till backend down")
        }

        async fn get_by_id(&self, _id: i64) -> Result<Option<TillSession>> {
            anyhow::bail!("till backend down")
        }

        async fn find_open(
            &self,
            _cashier_id: i64,
            _shift: ShiftKind,
            _business_date: NaiveDate,
        ) -> Result<Option<TillSession>> {
            anyhow::bail!("till backend down")
        }

        async fn find_open_by_cashier(&self, _cashier_id: i64) -> Result<Option<TillSession>> {
            anyhow::bail!("till backend down")
        }

        async fn list_open(&self) -> Result<Vec<TillSession>> {
            anyhow::bail!("till backend down")
        }

        async fn list(
            &self,
            _cashier_id: Option<i64>,
            _limit: i64,
            _offset: i64,
        ) -> Result<Vec<TillSession>> {
            anyhow::bail!("till backend down")
        }

        async fn count(&self, _cashier_id: Option<i64>) -> Result<i64> {
            anyhow::bail!("till backend down")
        }

        async fn close(
            &self,
            _id: i64,
            _actual_cash: i64,
            _notes: Option<&str>,
            _totals: &SettlementTotals,
            _closed_at: DateTime<Utc>,
            _report: &SessionReport,
        ) -> Result<()> {
            anyhow::bail!("till backend down")
        }

        async fn get_report(&self, _session_id: i64) -> Result<Option<SessionReport>> {
            anyhow::bail!("till backend down")
        }
    }

    #[tokio::test]
    async fn test_schedule_failure_fails_open() {
        let fix = setup().await;
        let service = ShiftEnforcementService::new(
            Arc::new(FailingScheduleRepo),
            fix.till.clone(),
            ShiftWindows::default(),
            15,
        );

        let decision = service.evaluate(&fix.cashier, at((9, 0))).await;
        assert_eq!(decision, EnforcementDecision::None);
    }

    #[tokio::test]
    async fn test_session_lookup_failure_fails_open() {
        let fix = setup().await;
        fix.schedule
            .assign(fix.cashier.id, monday(), ShiftKind::Morning)
            .await
            .unwrap();
        let service = ShiftEnforcementService::new(
            fix.schedule.clone(),
            Arc::new(FailingTillRepo),
            ShiftWindows::default(),
            15,
        );

        let decision = service.evaluate(&fix.cashier, at((9, 0))).await;
        assert_eq!(decision, EnforcementDecision::None);
    }

    #[tokio::test]
    async fn test_sweep_failure_returns_zero() {
        let fix = setup().await;
        let service = ShiftEnforcementService::new(
            fix.schedule.clone(),
            Arc::new(FailingTillRepo),
            ShiftWindows::default(),
            15,
        );

        assert_eq!(service.sweep_overdue(at((13, 50))).await, 0);
    }
}
