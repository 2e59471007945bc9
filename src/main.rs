// =============================================================================
// EdgeMiner — Main Entry Point
// =============================================================================
//
// Opens one bar series from the replay source, keeps its indicator frame
// current, records the configured annotations as setups and prints a summary
// of the setup store.  Runs until Ctrl+C.
// =============================================================================

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use edgeminer::notification::notification_channel;
use edgeminer::reconcile::{reconciler_channel, run_reconciler, Reconciler};
use edgeminer::runtime_config::{Annotation, RuntimeConfig};
use edgeminer::session::Session;
use edgeminer::setup::{column_summary, SetupFilter, SetupRecorder, SetupStore, T0_COLUMNS, T1_COLUMNS};
use edgeminer::source::{ReplaySource, SourceSink};

const DEFAULT_CONFIG_PATH: &str = "edgeminer.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("EDGEMINER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let loaded = RuntimeConfig::load(&config_path);

    let default_level = loaded
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        EdgeMiner — Starting Up                           ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = loaded.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env_overrides()?;
    let request = config.series_request()?;

    info!(
        series = %request.key,
        lookback = %request.lookback,
        as_of = ?request.as_of,
        data_dir = %config.data_dir.display(),
        "Configured series"
    );

    // ── 2. Channels ──────────────────────────────────────────────────────
    let (notify_tx, notify_rx) = notification_channel();
    let (input_tx, input_rx) = reconciler_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── 3. Source + reconciler ───────────────────────────────────────────
    let source = ReplaySource::new(config.data_dir.clone(), config.replay_live_bars);
    let mut reconciler = Reconciler::new(Box::new(source), notify_tx)
        .with_benign_codes(config.benign_error_codes.clone())
        .with_max_bars(config.max_bars);
    reconciler
        .start_source(SourceSink::new(input_tx.clone()))
        .context("failed to start data source")?;
    let reconciler_task = tokio::spawn(run_reconciler(reconciler, input_rx, shutdown_rx.clone()));

    // ── 4. Session ───────────────────────────────────────────────────────
    let store = SetupStore::load(config.setups_json.clone(), config.setups_csv.clone())
        .context("failed to open setup store")?;
    let session = Arc::new(Session::new(
        request.key.clone(),
        config.indicators.clone(),
        SetupRecorder::new(store),
        input_tx,
    ));
    let session_task = tokio::spawn(session.clone().run(notify_rx, shutdown_rx));

    let mut frames = session.subscribe_frames();
    session.request_series(request)?;

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Annotations, once the first frame is in ──────────────────────
    let interrupted = tokio::select! {
        changed = frames.changed(), if !config.annotations.is_empty() => {
            if changed.is_ok() {
                record_annotations(&session, &config.annotations);
                report(&session, &config.symbol);
            }
            false
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            true
        }
    };

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    if !interrupted {
        tokio::signal::ctrl_c().await?;
    }
    warn!("Shutdown signal received — stopping gracefully");

    let _ = shutdown_tx.send(true);
    if let Err(e) = reconciler_task.await {
        error!(error = %e, "Reconciler task failed");
    }
    if let Err(e) = session_task.await {
        error!(error = %e, "Session task failed");
    }

    info!("EdgeMiner shut down complete.");
    Ok(())
}

fn record_annotations(session: &Session, annotations: &[Annotation]) {
    for annotation in annotations {
        if let Err(e) = session.record_setup(annotation.time, &annotation.context) {
            error!(
                time = %annotation.time,
                ticker = %annotation.context.ticker,
                error = %e,
                "Failed to record annotation"
            );
        }
    }
}

fn report(session: &Session, symbol: &str) {
    let setups = session.setups();
    let selected = SetupFilter::default().with_ticker(symbol).apply(&setups);
    info!(symbol, setups = selected.len(), total = setups.len(), "Setup summary");

    for column in T0_COLUMNS.iter().chain(T1_COLUMNS.iter()) {
        if let Some(summary) = column_summary(selected.iter().copied(), column) {
            info!(
                column,
                count = summary.count,
                mean = summary.mean,
                min = summary.min,
                max = summary.max,
                "feature"
            );
        }
    }
}
