use agroflow_engine::advisory::moisture_alert;
use agroflow_engine::analytics::{analyze, format_pump_duration};
use agroflow_engine::cache::{Clock, SystemClock};
use agroflow_engine::config::Config;
use agroflow_engine::feed::{HttpPollingFeed, PushFeed, ReplayFeed};
use agroflow_engine::fetcher::{
    CachedEnvironmentSource, EnvironmentalSource, HttpEnvironmentSource, StaticEnvironmentSource,
};
use agroflow_engine::history::SensorHistory;
use agroflow_engine::models::FarmSnapshot;
use agroflow_engine::orchestrator::{Orchestrator, Sources};
use agroflow_engine::schedule::{
    CachedScheduleGenerator, FixedScheduleGenerator, HttpScheduleGenerator, ScheduleGenerator,
};
use agroflow_engine::state::FarmState;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,agroflow_engine=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("AgroFlow engine starting...");

    let config_path =
        std::env::var("AGROFLOW_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration from {}: {}\n\n\
             Make sure:\n\
             1. The file exists (or point AGROFLOW_CONFIG at it)\n\
             2. All referenced environment variables are set (check .env.example)\n\
             3. farm_size is positive and pump_flow_rate is not negative",
            config_path,
            e
        )
    })?;
    info!(
        "Configuration loaded: {} ha of {} at '{}'",
        config.farm.farm_size, config.farm.crop, config.farm.location
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sources = Sources {
        environment: environment_source(&config, Arc::clone(&clock))?,
        schedule: schedule_generator(&config, Arc::clone(&clock))?,
        feed: push_feed(&config)?,
    };

    let history = SensorHistory::with_clock(config.sync.capacity(), Arc::clone(&clock));
    let state = FarmState::new(config.farm.clone(), history);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let (mut orchestrator, handle) = Orchestrator::new(config.sync.clone(), state, sources, shutdown_rx);

    let mut snapshots = handle.watch_snapshot();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            if let Some(snapshot) = snapshot {
                report(&snapshot);
            }
        }
    });

    if let Err(e) = orchestrator.run().await {
        error!("Orchestrator error: {}", e);
    }

    info!("AgroFlow engine shutting down");
    Ok(())
}

fn environment_source(
    config: &Config,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn EnvironmentalSource>> {
    let ttl = config.sync.cache_ttl();
    let source: Arc<dyn EnvironmentalSource> = match config.environment.base_url.as_deref() {
        Some(base_url) if !base_url.trim().is_empty() => {
            let http = HttpEnvironmentSource::new(
                base_url,
                config.environment.api_key.clone(),
                Duration::from_secs(config.environment.timeout_seconds),
            )?
            .with_max_retries(config.environment.max_retries as u32);
            info!("Environmental lookups via {}", base_url);
            Arc::new(CachedEnvironmentSource::new(http, ttl, clock))
        }
        _ => {
            warn!("No environment.base_url configured, using fallback environmental data");
            Arc::new(StaticEnvironmentSource::fallback())
        }
    };
    Ok(source)
}

fn schedule_generator(
    config: &Config,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn ScheduleGenerator>> {
    let generator: Arc<dyn ScheduleGenerator> = match config.schedule.base_url.as_deref() {
        Some(base_url) if !base_url.trim().is_empty() => {
            let http = HttpScheduleGenerator::new(
                base_url,
                config.schedule.api_key.clone(),
                Duration::from_secs(config.schedule.timeout_seconds),
            )?;
            info!("Schedule generation via {}", base_url);
            Arc::new(CachedScheduleGenerator::new(http, config.sync.cache_ttl(), clock))
        }
        _ => {
            info!("No schedule.base_url configured, using the default schedule");
            Arc::new(FixedScheduleGenerator)
        }
    };
    Ok(generator)
}

fn push_feed(config: &Config) -> anyhow::Result<Arc<dyn PushFeed>> {
    let feed: Arc<dyn PushFeed> = match &config.sync.replay_file {
        Some(path) => {
            let replay = ReplayFeed::from_file(path, config.sync.replay_interval())
                .map_err(|e| anyhow::anyhow!("Failed to load replay file {}: {}", path, e))?;
            info!("Replaying {} recorded feed payloads from {}", replay.len(), path);
            Arc::new(replay)
        }
        None => Arc::new(HttpPollingFeed::new(
            config.sync.feed_poll_interval(),
            Duration::from_secs(config.environment.timeout_seconds),
        )?),
    };
    Ok(feed)
}

fn report(snapshot: &FarmSnapshot) {
    let budget = &snapshot.budget;
    let metrics = analyze(snapshot.settings.irrigation_method, budget);

    info!(
        "[{}] moisture {:.1}% | balance {:.1} m³ | pump {} | groundwater {}{}",
        snapshot.sample.timestamp,
        snapshot.sample.soil_moisture,
        budget.balance,
        format_pump_duration(budget.pump_duration),
        budget.groundwater_status,
        if snapshot.manual_override { " | manual" } else { "" }
    );
    info!("{}", budget.recommendation);
    info!(
        "Efficiency {:.1}% | savings {:.0} | yield impact {:+.0}% | carbon -{:.1}%",
        metrics.water_use_efficiency,
        metrics.pumping_savings,
        metrics.yield_impact,
        metrics.carbon_reduction
    );

    if let Some(alert) = moisture_alert(&snapshot.sample) {
        warn!("{} {}", alert.message(), alert.suggested_question());
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
