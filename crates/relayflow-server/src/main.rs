//! RelayFlow - email gateway entry point

use anyhow::{bail, Context, Result};
use relayflow_api::AppState;
use relayflow_common::config::Config;
use relayflow_core::{
    HealthController, LoadBalancer, MailTransport, Mailer, QuotaEngine, RelayProbe, StatsService,
    TaskQueue, WorkerPool,
};
use relayflow_storage::models::PlanInput;
use relayflow_storage::{
    DatabasePool, DbPlanRepository, DbSendLogRepository, DbSmtpRelayRepository,
    DbTenantRepository, DbUsageStatsRepository, KvStore, PlanRepository, RedisStore,
    SendLogRepository, SmtpRelayRepository, TenantRepository, UsageStatsRepository,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting RelayFlow email gateway...");

    let config = Config::load().context("failed to load configuration")?;

    let db = DatabasePool::new(&config.database).await?;
    db.migrate().await?;
    seed_default_plans(&DbPlanRepository::new(db.clone())).await?;

    let kv: Arc<dyn KvStore> = Arc::new(RedisStore::connect(&config.redis).await?);

    // Repositories shared by the pipeline components
    let tenants: Arc<dyn TenantRepository> = Arc::new(DbTenantRepository::new(db.clone()));
    let relays: Arc<dyn SmtpRelayRepository> = Arc::new(DbSmtpRelayRepository::new(db.clone()));
    let send_logs: Arc<dyn SendLogRepository> = Arc::new(DbSendLogRepository::new(db.clone()));
    let usage: Arc<dyn UsageStatsRepository> = Arc::new(DbUsageStatsRepository::new(db.clone()));

    // Pipeline components
    let mailer = Arc::new(Mailer::new());
    let quota = Arc::new(QuotaEngine::new(kv.clone(), tenants.clone()));
    let queue = Arc::new(TaskQueue::new(kv.clone()));
    let balancer = Arc::new(LoadBalancer::new(relays.clone(), kv.clone()));
    let stats = Arc::new(StatsService::new(
        kv.clone(),
        usage,
        send_logs.clone(),
        tenants.clone(),
        relays.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Stats reconciler
    let reconciler_task = {
        let stats = stats.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { stats.run_reconciler(shutdown).await })
    };

    // Relay health controller
    let health_task = {
        let probe: Arc<dyn RelayProbe> = mailer.clone();
        let controller = HealthController::new(relays.clone(), probe);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { controller.run(shutdown).await })
    };

    // Send workers
    let transport: Arc<dyn MailTransport> = mailer.clone();
    let workers = Arc::new(WorkerPool::new(
        queue.clone(),
        balancer.clone(),
        transport,
        quota.clone(),
        stats.clone(),
        send_logs,
        tenants,
        config.worker.count,
    ));
    let worker_tasks = workers.spawn(shutdown_rx.clone());

    // HTTP server
    let state = Arc::new(AppState {
        db,
        kv,
        quota,
        queue,
        stats,
        balancer,
        probe: mailer,
        admin: config.admin.clone(),
    });
    let app = relayflow_api::create_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.server.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.server.port))?;
    info!(port = config.server.port, "HTTP server listening");

    let server_task = {
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.changed().await;
                })
                .await
        })
    };

    info!("RelayFlow started");

    wait_for_signal().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    // The HTTP server gets a bounded drain; overrunning it is an error exit
    match tokio::time::timeout(Duration::from_secs(10), server_task).await {
        Ok(Ok(Ok(()))) => info!("HTTP server stopped"),
        Ok(Ok(Err(e))) => bail!("HTTP server error: {}", e),
        Ok(Err(e)) => bail!("HTTP server task failed: {}", e),
        Err(_) => bail!("HTTP server failed to shut down within 10s"),
    }

    for task in worker_tasks {
        let _ = task.await;
    }
    let _ = reconciler_task.await;
    let _ = health_task.await;

    info!("RelayFlow shutdown complete");
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,relayflow=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}

async fn wait_for_signal() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("failed to listen for SIGINT")?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

/// Seed the built-in plan ladder on first boot
async fn seed_default_plans(plans: &DbPlanRepository) -> Result<()> {
    if plans.count().await? > 0 {
        return Ok(());
    }

    let defaults = [
        ("free", "Free", "For personal testing", 10, 100, 500, 2_000, 1),
        ("basic", "Basic", "For small apps and early teams", 100, 5_000, 30_000, 100_000, 2),
        ("standard", "Standard", "For mid-size production use", 500, 20_000, 120_000, 500_000, 3),
        ("professional", "Professional", "For high-volume senders", 1_000, 50_000, 300_000, 1_000_000, 4),
        ("enterprise", "Enterprise", "Unlimited enterprise tier", 0, 0, 0, 0, 5),
    ];

    for (code, name, description, minute, daily, weekly, monthly, sort_order) in defaults {
        plans
            .create(PlanInput {
                code: code.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                minute_limit: minute,
                daily_limit: daily,
                weekly_limit: weekly,
                monthly_limit: monthly,
                is_active: true,
                sort_order,
            })
            .await?;
    }

    info!("Seeded default plans");
    Ok(())
}
