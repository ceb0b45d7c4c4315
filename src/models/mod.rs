//! Data models for the Locus scanning pipeline.
//!
//! This module contains the core data structures used throughout the crate:
//! - [`ScanSession`]: The central scan entity (state, accepted code, last error, counters)
//! - [`DecodeCandidate`]: Transient decoder output awaiting confidence evaluation
//! - [`CameraCapabilities`] / [`CameraConstraints`]: What was requested from and negotiated with the camera
//! - [`AcceptedCode`]: The trimmed, non-empty terminal output of a session
//! - [`AppConfig`]: Scanner, feedback, logging and simulation settings loaded from `locus.yaml`
//! - [`InventoryItem`]: The record an accepted code ends up in
//!
//! # Architecture Note
//!
//! The models are designed to be:
//! - **Plain data**: No I/O, no locking; behaviour lives in `services` and `controller`
//! - **Cloneable**: `ScanSession` is wrapped in `Arc<RwLock<>>` by [`StateManager`](crate::state::StateManager)
//! - **Serializable where persisted**: config and inventory structs derive `Serialize`/`Deserialize`

pub mod config;
pub mod inventory;
pub mod scan;
pub mod session;

pub use config::{
    AppConfig, ConfigError, DecoderMode, FeedbackSettings, LoggingSettings, ScannerSettings,
    SimulationSettings,
};
pub use inventory::{CalibrationStatus, InventoryItem};
pub use scan::{
    AcceptedCode, CameraCapabilities, CameraConstraints, DecodeCandidate, FacingMode, Frame,
    LocatorPolygon, Point, Resolution, ResolutionRange, Symbology, SymbologySet, ZoomRange,
    default_symbologies,
};
pub use session::{CodeSource, ScanSession, ScanState, SessionId};
