//! Tilldesk - Back-office till session service for hospitality venues

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilldesk::{
    api::{self, AppState, RequestStats},
    config::Config,
    db::{
        self,
        repositories::{
            SqlxOrderRepository, SqlxScheduleRepository, SqlxSessionRepository,
            SqlxTillSessionRepository, SqlxUserRepository,
        },
    },
    models::ShiftWindows,
    services::{
        LoginRateLimiter, ShiftEnforcementService, TillSessionService, UserService, WizardTracker,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tilldesk=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tilldesk service...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Create repositories
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let schedule_repo = SqlxScheduleRepository::boxed(pool.clone());
    let till_repo = SqlxTillSessionRepository::boxed(pool.clone());
    let order_repo = SqlxOrderRepository::boxed(pool.clone());

    // Initialize services
    let windows = ShiftWindows::new(&config.shift);
    let user_service = Arc::new(UserService::new(user_repo.clone(), session_repo));
    let till_service = Arc::new(TillSessionService::new(
        till_repo.clone(),
        order_repo.clone(),
        schedule_repo.clone(),
        user_repo,
        windows,
        config.shift.variance_balanced,
        config.shift.variance_small,
    ));
    let enforcement = Arc::new(ShiftEnforcementService::new(
        schedule_repo.clone(),
        till_repo,
        windows,
        config.shift.close_warning_minutes,
    ));

    let rate_limiter = Arc::new(LoginRateLimiter::new());
    let request_stats = Arc::new(RequestStats::new());

    let state = AppState {
        pool: pool.clone(),
        user_service: user_service.clone(),
        till_service,
        enforcement: enforcement.clone(),
        wizards: Arc::new(WizardTracker::new()),
        order_repo,
        schedule_repo,
        windows,
        rate_limiter: rate_limiter.clone(),
        request_stats,
    };

    // Maintenance task (runs every 5 minutes): drop expired auth sessions
    // and stale rate-limiter entries.
    {
        let limiter = rate_limiter.clone();
        let users = user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                limiter.cleanup().await;
                match users.purge_expired_sessions().await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!("Purged {} expired auth session(s)", n),
                    Err(e) => tracing::warn!("Auth session purge failed: {}", e),
                }
            }
        });
    }

    // Enforcement sweep (every 5 minutes, mirroring the client poll cadence):
    // log till sessions that are overdue for closing.
    {
        let enforcement = enforcement.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                let now = chrono::Local::now().naive_local();
                let overdue = enforcement.sweep_overdue(now).await;
                if overdue > 0 {
                    tracing::info!("{} till session(s) overdue for closing", overdue);
                }
            }
        });
    }

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
