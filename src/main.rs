//! Locus - camera barcode scanning for asset inventory
//!
//! Main entry point for the console application.
//!
//! # Overview
//!
//! This binary wires the scanning pipeline to a terminal front-end. It initializes:
//! - Configuration loading ([`ConfigManager`]) from `locus.yaml` plus `LOCUS_*` overrides
//! - Logging infrastructure (daily rotating file + optional console output)
//! - Tokio async runtime (decoder ticks, camera start, console input)
//! - The simulated camera, symbol engines and decoder
//! - Session control ([`ScanController`]) over a [`StateManager`]
//! - The console loop ([`Console`])
//!
//! # Execution Flow
//!
//! 1. Load configuration from `config/` (defaults when missing)
//! 2. Initialize logging -> logs/locus.<date>
//! 3. Create tokio runtime
//! 4. Build camera, engines, decoder and feedback from the config
//! 5. Run the console loop until `quit` or end of input
//! 6. Close the session, log the metrics summary, shut the runtime down
//!
//! # Environment
//!
//! - `LOCUS_CONFIG_DIR`: configuration directory (default `config`)
//! - `LOCUS_USER`: user recorded on saved inventory items (default: `$USER`)

use anyhow::Result;
use locus::models::{AppConfig, Symbology};
use locus::services::inventory::InMemoryItemStore;
use locus::services::{
    Ean13Engine, FeedbackEmitter, MultiEngine, SimulatedCamera, SymbolEngine, build_decoder,
};
use locus::ui::{Console, run_console};
use locus::{
    APP_NAME, ConfigManager, Metrics, ScanController, ScanPipeline, ScanRequest, StateManager,
    VERSION,
};
use std::sync::Arc;
use std::time::Duration;

/// Main entry point for the Locus console application
///
/// # Errors
///
/// This function can fail if:
/// - The configuration file is invalid YAML or has out-of-range values
/// - Logging initialization fails (disk space, permissions)
/// - Tokio runtime creation fails (system resources)
/// - Reading console input fails
fn main() -> Result<()> {
    let config_dir = std::env::var("LOCUS_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let config_manager = ConfigManager::new(config_dir.as_str())?;
    let config = config_manager.load_config()?;

    // Hold the guard for the lifetime of the program to keep file logging alive
    let _log_guard = locus::logging::setup_logging(&config.logging)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("locus-worker")
        .build()?;

    let metrics = Arc::new(Metrics::new());
    let result = runtime.block_on(run(config, Arc::clone(&metrics)));

    tracing::info!("Console closed, shutting down");
    metrics.log_summary();

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Application shutdown complete");

    result
}

async fn run(config: AppConfig, metrics: Arc<Metrics>) -> Result<()> {
    let camera = SimulatedCamera::new(config.simulation.clone());
    let engine = symbol_engine(&config);
    let decoder = build_decoder(engine, &config.scanner, Arc::clone(&metrics));
    let target = Arc::new(locus::services::RenderSurface::new(
        config.scanner.render_target.as_str(),
    ));

    tracing::info!(
        "Pipeline ready: {:?} decoder at {} ticks/s, threshold {}",
        decoder.mode(),
        config.scanner.ticks_per_second,
        config.scanner.confidence_threshold
    );

    let pipeline = ScanPipeline {
        source: Arc::new(camera),
        decoder,
        target,
        feedback: Arc::new(FeedbackEmitter::new(config.feedback.clone())),
    };

    let controller = Arc::new(ScanController::new(
        pipeline,
        StateManager::new(),
        metrics,
        &config.scanner,
        tokio::runtime::Handle::current(),
    ));

    let user = std::env::var("LOCUS_USER")
        .or_else(|_| std::env::var("USER"))
        .ok();
    if user.is_none() {
        tracing::warn!("No user set, saving inventory items is disabled");
    }

    let console = Console::new(
        Arc::clone(&controller),
        Arc::new(InMemoryItemStore::new()),
        user,
    )
    .with_request(ScanRequest::from_settings(&config.scanner));

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let result = run_console(&console, stdin).await;

    controller.close();
    result
}

/// Engines for every allowed symbology this build can decode.
fn symbol_engine(config: &AppConfig) -> Arc<dyn SymbolEngine> {
    let mut engine = MultiEngine::new();

    if config.allows(Symbology::Ean13) {
        engine = engine.with_engine(Arc::new(Ean13Engine::new()));
    }

    #[cfg(feature = "qr-engine")]
    if config.allows(Symbology::Qr) {
        engine = engine.with_engine(Arc::new(locus::services::QrEngine::new()));
    }

    if engine.is_empty() {
        tracing::warn!("No symbol engine matches the allowed symbologies; scans will fail to start");
    }

    Arc::new(engine)
}
