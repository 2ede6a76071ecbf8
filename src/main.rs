//! RADAR: new-listing signal pipeline
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores state from disk (or starts fresh), and runs the
//! discover→track→signal loop with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

use radar::clock::{Clock, SystemClock};
use radar::config::{self, Secrets};
use radar::engine::{Collaborators, CycleReport, Lifecycle};
use radar::exchanges;
use radar::listings::cmc::CmcClient;
use radar::notify::telegram::TelegramNotifier;
use radar::notify::{format, LogNotifier, Notifier};
use radar::storage::audit::{AuditSink, NullAudit, SqliteAuditLog};
use radar::storage::{JsonFileStore, StateStore};
use radar::types::PipelineState;

const BANNER: &str = r#"
 ____      _    ____    _    ____
|  _ \    / \  |  _ \  / \  |  _ \
| |_) |  / _ \ | | | |/ _ \ | |_) |
|  _ <  / ___ \| |_| / ___ \|  _ <
|_| \_\/_/   \_\____/_/   \_\_| \_\

  New-listing signal pipeline
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("RADAR_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        name = %cfg.radar.name,
        config = %config_path,
        day_interval_secs = cfg.radar.day_interval_secs,
        night_interval_secs = cfg.radar.night_interval_secs,
        state_file = %cfg.radar.state_file,
        "RADAR starting up"
    );

    let secrets = Secrets::resolve(&cfg.secrets)?;

    // -- Restore or create state -----------------------------------------

    let store = JsonFileStore::new(&cfg.radar.state_file);
    let mut state = match store.load() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Could not restore state, starting fresh");
            PipelineState::default()
        }
    };

    // -- Initialise components -------------------------------------------

    let notifier: Box<dyn Notifier> = match secrets.telegram {
        Some((token, chat_id)) => {
            info!("Telegram notifier enabled");
            Box::new(TelegramNotifier::new(token, chat_id, cfg.retry.clone())?)
        }
        None => {
            warn!("No Telegram credentials configured, alerts go to the log only (dry-run)");
            Box::new(LogNotifier)
        }
    };

    let audit: Box<dyn AuditSink> = if cfg.radar.audit_db_url.is_empty() {
        info!("Audit log disabled");
        Box::new(NullAudit)
    } else {
        match SqliteAuditLog::connect(&cfg.radar.audit_db_url).await {
            Ok(log) => Box::new(log),
            Err(e) => {
                warn!(error = %e, "Audit log unavailable, rows will be discarded");
                Box::new(NullAudit)
            }
        }
    };

    let listings = CmcClient::new(&cfg.listings.base_url, secrets.cmc_api_key, cfg.retry.clone())?;
    let venues = exchanges::build_venues(&cfg.venues)?;
    if venues.is_empty() {
        warn!("All venues disabled, nothing will ever be tracked");
    }
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut lifecycle = Lifecycle::new(
        &cfg,
        Collaborators {
            listings: Box::new(listings),
            venues,
            notifier,
            audit,
            store: Box::new(store),
            clock: clock.clone(),
        },
    );

    lifecycle
        .announce_startup(&mut state, &cfg.radar.name, cfg.radar.poll_interval(clock.now()))
        .await;

    // -- Main loop -------------------------------------------------------

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Entering main loop. Press Ctrl+C to stop.");

    loop {
        match lifecycle.run_cycle(&mut state).await {
            Ok(report) => log_cycle_report(&report),
            Err(e) => {
                error!(error = %format!("{e:#}"), "Cycle failed, continuing to next");
                lifecycle.notify(&format::error(&cfg.radar.name, &e)).await;
            }
        }

        let interval = cfg.radar.poll_interval(clock.now());
        info!(next_in_secs = interval.as_secs(), "Sleeping until next cycle");

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    // Save final state
    lifecycle.persist(&mut state);
    info!(
        cycles = state.cycle_count,
        seen = state.seen.len(),
        watching = state.watch.len(),
        tracked = state.tracked.len(),
        "RADAR shut down cleanly."
    );

    Ok(())
}

/// Log a human-readable cycle summary.
fn log_cycle_report(report: &CycleReport) {
    info!(
        cycle = report.cycle_number,
        listings = report.listings_fetched,
        discovered = report.discovered,
        admitted = report.admitted,
        rejected = report.rejected,
        promoted = report.promoted,
        evicted = report.evicted,
        evaluated = report.evaluated,
        gated = report.gated,
        no_data = report.no_data,
        first_moves = report.first_moves,
        confirms = report.confirms,
        notify_failures = report.notify_failures,
        audit_rows = report.audit_rows,
        "Cycle complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("radar=info"));

    let json_logging = std::env::var("RADAR_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
