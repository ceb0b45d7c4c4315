// Locus - camera barcode scanning for asset inventory
//
// This is the library crate containing the scanning pipeline, the session
// state machine and the inventory hand-off.
// The binary crate (main.rs) provides the console entry point.

pub mod config;
pub mod controller;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use controller::{ScanController, ScanPipeline, ScanRequest};
pub use metrics::Metrics;
pub use models::{AcceptedCode, AppConfig, ScanSession, ScanState, SessionId};
pub use services::ScanError;
pub use state::{SessionEvent, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
