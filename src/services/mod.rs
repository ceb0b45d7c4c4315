//! Services module - the scanning pipeline's building blocks.
//!
//! Everything here is independent of the session state machine and of any
//! front-end. The [`controller`](crate::controller) wires these pieces into a
//! scan session.
//!
//! # Components
//!
//! - [`camera`]: [`FrameSource`] capability, the [`RenderSurface`] it draws
//!   into, exact-to-ideal constraint fallback and the [`SimulatedCamera`]
//! - [`decoder`]: [`Decoder`] variants ticking at a bounded cadence over a
//!   pluggable [`SymbolEngine`] ([`Ean13Engine`], `QrEngine`, [`MultiEngine`])
//! - [`confidence`]: the pure [`ConfidenceFilter`] deciding which candidates
//!   are trustworthy
//! - [`manual`]: validation of typed codes
//! - [`feedback`]: tone, overlay and failure messages ([`FeedbackEmitter`])
//! - [`inventory`]: turning an accepted code into an [`InventoryItem`](crate::models::InventoryItem)
//!   and the [`ItemStore`] it is saved to
//!
//! # Design Philosophy
//!
//! - **Capabilities at the seams**: camera, decoder, engine, audio and store
//!   are traits so tests substitute them freely
//! - **No hidden blocking**: CPU-bound decoding runs on tokio's blocking pool,
//!   audio runs on its own thread
//! - **Errors as values**: every fault becomes a [`ScanError`] (or
//!   [`InventoryError`]) the session can turn into a terminal state

pub mod camera;
pub mod confidence;
pub mod decoder;
pub mod error;
pub mod feedback;
pub mod inventory;
pub mod manual;

pub use camera::{BoxFuture, FrameSource, RenderSurface, SimulatedCamera, start_with_fallback};
pub use confidence::{ConfidenceFilter, DEFAULT_CONFIDENCE_THRESHOLD, Verdict};
pub use decoder::{
    ContinuousDecoder, DecodeHandle, DecodeStream, Decoder, Ean13Engine, MultiEngine,
    SingleShotDecoder, SymbolEngine, build_decoder,
};
#[cfg(feature = "qr-engine")]
pub use decoder::QrEngine;
pub use error::ScanError;
pub use feedback::{AudioError, AudioOutput, FeedbackEmitter, FeedbackEvent, FeedbackMessage};
pub use inventory::{
    InMemoryItemStore, InventoryError, InventorySummary, ItemEvent, ItemStore, NewItemForm,
    StatusFilter,
};
