//! Frame decoding at a bounded cadence.
//!
//! A [`Decoder`] pulls frames from a [`FrameSource`] and hands them to a
//! [`SymbolEngine`], delivering whatever the engine finds as a stream of
//! [`DecodeCandidate`]s. Two variants exist:
//!
//! - [`ContinuousDecoder`]: ticks at a fixed rate until stopped
//! - [`SingleShotDecoder`]: waits one tick, decodes one frame, ends the stream
//!
//! # Tick discipline
//!
//! Ticks never overlap. Analysis runs on the blocking pool and is bounded by
//! a timeout of one tick interval; an analysis that overruns is abandoned
//! (its result discarded) and further ticks are skipped, not queued, until
//! it actually finishes. The in-flight flag belongs to the decoder, not to
//! one activation, so a single-shot decoder re-activated while an abandoned
//! analysis is still running waits for it too. Cancellation races every
//! await, so a hung engine never delays teardown.
//!
//! Frames whose pixel buffer does not match their dimensions are skipped
//! before they reach the engine.

pub mod ean13;
#[cfg(feature = "qr-engine")]
pub mod qr;

pub use ean13::Ean13Engine;
#[cfg(feature = "qr-engine")]
pub use qr::QrEngine;

use crate::metrics::Metrics;
use crate::models::{DecodeCandidate, DecoderMode, Frame, ScannerSettings, Symbology, SymbologySet};
use crate::services::ScanError;
use crate::services::camera::{FrameSource, RenderSurface};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

/// Candidates buffered between the tick loop and the session.
const CANDIDATE_BUFFER: usize = 16;

/// Locates and decodes symbols in a single frame.
///
/// Engines are synchronous and CPU-bound; the decoder runs them on the
/// blocking pool. Finding nothing is an empty `Vec`, never an error.
pub trait SymbolEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, symbology: Symbology) -> bool;

    fn decode(&self, frame: &Frame) -> Vec<DecodeCandidate>;
}

/// Runs several engines over the same frame and concatenates their output.
#[derive(Default)]
pub struct MultiEngine {
    engines: Vec<Arc<dyn SymbolEngine>>,
}

impl MultiEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, engine: Arc<dyn SymbolEngine>) -> Self {
        self.engines.push(engine);
        self
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

impl SymbolEngine for MultiEngine {
    fn name(&self) -> &'static str {
        "multi"
    }

    fn supports(&self, symbology: Symbology) -> bool {
        self.engines.iter().any(|engine| engine.supports(symbology))
    }

    fn decode(&self, frame: &Frame) -> Vec<DecodeCandidate> {
        self.engines
            .iter()
            .flat_map(|engine| engine.decode(frame))
            .collect()
    }
}

/// Stops the tick loop behind a [`DecodeStream`]. Cloneable and idempotent.
#[derive(Clone, Debug)]
pub struct DecodeHandle {
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl DecodeHandle {
    pub(crate) fn new() -> (Self, watch::Receiver<bool>) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (
            Self {
                cancel_tx: Arc::new(cancel_tx),
            },
            cancel_rx,
        )
    }

    pub fn stop(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

/// Asynchronous sequence of candidates from one decoder activation.
///
/// Ends when the decoder stops (or, for single-shot, after one frame).
/// Dropping the stream stops the decoder.
pub struct DecodeStream {
    candidates: mpsc::Receiver<DecodeCandidate>,
    handle: DecodeHandle,
}

impl DecodeStream {
    pub async fn next(&mut self) -> Option<DecodeCandidate> {
        self.candidates.recv().await
    }

    pub fn handle(&self) -> DecodeHandle {
        self.handle.clone()
    }
}

impl Drop for DecodeStream {
    fn drop(&mut self) {
        self.handle.stop();
    }
}

/// Capability shared by the decoder variants.
pub trait Decoder: Send + Sync {
    /// Begin decoding frames from `source`.
    ///
    /// Candidates outside `allowed` are never yielded. Fails with
    /// [`ScanError::DecoderUnavailable`] when the engine supports none of
    /// the allowed symbologies or no async runtime is running.
    fn activate(
        &self,
        source: Arc<dyn FrameSource>,
        target: Arc<RenderSurface>,
        allowed: SymbologySet,
    ) -> Result<DecodeStream, ScanError>;

    fn mode(&self) -> DecoderMode;
}

/// Settings shared by both decoder variants.
#[derive(Clone)]
struct TickConfig {
    engine: Arc<dyn SymbolEngine>,
    interval: Duration,
    draw_locator: bool,
    metrics: Option<Arc<Metrics>>,
    /// Set while an analysis runs on the blocking pool, across activations
    in_flight: Arc<AtomicBool>,
}

impl TickConfig {
    fn new(engine: Arc<dyn SymbolEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            draw_locator: true,
            metrics: None,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    fn activate(
        &self,
        source: Arc<dyn FrameSource>,
        target: Arc<RenderSurface>,
        allowed: SymbologySet,
        single_shot: bool,
    ) -> Result<DecodeStream, ScanError> {
        if !allowed.iter().any(|symbology| self.engine.supports(*symbology)) {
            return Err(ScanError::DecoderUnavailable(format!(
                "engine '{}' supports none of the allowed symbologies",
                self.engine.name()
            )));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ScanError::DecoderUnavailable("no async runtime".to_string()))?;

        let (handle, cancel_rx) = DecodeHandle::new();
        let (tx, rx) = mpsc::channel(CANDIDATE_BUFFER);

        let tick_loop = TickLoop {
            config: self.clone(),
            source,
            target,
            allowed,
            single_shot,
        };
        runtime.spawn(tick_loop.run(tx, cancel_rx));

        Ok(DecodeStream {
            candidates: rx,
            handle,
        })
    }
}

/// Ticks at a fixed rate until stopped.
#[derive(Clone)]
pub struct ContinuousDecoder {
    config: TickConfig,
}

impl ContinuousDecoder {
    pub fn new(engine: Arc<dyn SymbolEngine>, interval: Duration) -> Self {
        Self {
            config: TickConfig::new(engine, interval),
        }
    }

    pub fn with_locator(mut self, draw_locator: bool) -> Self {
        self.config.draw_locator = draw_locator;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.config.metrics = Some(metrics);
        self
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }
}

impl Decoder for ContinuousDecoder {
    fn activate(
        &self,
        source: Arc<dyn FrameSource>,
        target: Arc<RenderSurface>,
        allowed: SymbologySet,
    ) -> Result<DecodeStream, ScanError> {
        self.config.activate(source, target, allowed, false)
    }

    fn mode(&self) -> DecoderMode {
        DecoderMode::Continuous
    }
}

/// Waits one tick interval, decodes a single frame and ends the stream.
///
/// The session re-activates it for as long as it stays in `Scanning`.
#[derive(Clone)]
pub struct SingleShotDecoder {
    config: TickConfig,
}

impl SingleShotDecoder {
    pub fn new(engine: Arc<dyn SymbolEngine>, interval: Duration) -> Self {
        Self {
            config: TickConfig::new(engine, interval),
        }
    }

    pub fn with_locator(mut self, draw_locator: bool) -> Self {
        self.config.draw_locator = draw_locator;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.config.metrics = Some(metrics);
        self
    }
}

impl Decoder for SingleShotDecoder {
    fn activate(
        &self,
        source: Arc<dyn FrameSource>,
        target: Arc<RenderSurface>,
        allowed: SymbologySet,
    ) -> Result<DecodeStream, ScanError> {
        self.config.activate(source, target, allowed, true)
    }

    fn mode(&self) -> DecoderMode {
        DecoderMode::SingleShot
    }
}

/// Build the decoder variant selected in `settings`.
pub fn build_decoder(
    engine: Arc<dyn SymbolEngine>,
    settings: &ScannerSettings,
    metrics: Arc<Metrics>,
) -> Arc<dyn Decoder> {
    let interval = settings.tick_interval();
    match settings.decoder_mode {
        DecoderMode::Continuous => Arc::new(
            ContinuousDecoder::new(engine, interval)
                .with_locator(settings.draw_locator)
                .with_metrics(metrics),
        ),
        DecoderMode::SingleShot => Arc::new(
            SingleShotDecoder::new(engine, interval)
                .with_locator(settings.draw_locator)
                .with_metrics(metrics),
        ),
    }
}

/// Clears the in-flight flag when the blocking analysis finishes, even if
/// the engine panics.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

enum Analysis {
    Done(Vec<DecodeCandidate>),
    TimedOut,
    Panicked,
}

struct TickLoop {
    config: TickConfig,
    source: Arc<dyn FrameSource>,
    target: Arc<RenderSurface>,
    allowed: SymbologySet,
    single_shot: bool,
}

impl TickLoop {
    async fn run(self, tx: mpsc::Sender<DecodeCandidate>, mut cancel_rx: watch::Receiver<bool>) {
        let period = self.config.interval;
        let mut ticker = if self.single_shot {
            tokio::time::interval_at(Instant::now() + period, period)
        } else {
            tokio::time::interval(period)
        };
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut last_sequence: Option<u64> = None;

        tracing::debug!(
            "Decoder started: engine={}, interval={:?}, single_shot={}",
            self.config.engine.name(),
            period,
            self.single_shot
        );

        loop {
            tokio::select! {
                _ = cancel_rx.changed() => break,
                _ = ticker.tick() => {}
            }

            if *cancel_rx.borrow() || tx.is_closed() {
                break;
            }

            if self.config.in_flight.load(Ordering::SeqCst) {
                if let Some(metrics) = &self.config.metrics {
                    metrics.record_tick_skipped();
                }
                continue;
            }

            let Some(frame) = self.source.latest_frame() else {
                continue;
            };

            if !frame.is_well_formed() {
                tracing::warn!(
                    "Skipping malformed frame {}: {} bytes for {}x{}",
                    frame.sequence,
                    frame.luma.len(),
                    frame.width,
                    frame.height
                );
                continue;
            }

            // Same frame as last tick; nothing new to look at
            if last_sequence == Some(frame.sequence) && !self.single_shot {
                continue;
            }
            last_sequence = Some(frame.sequence);

            let analysis = tokio::select! {
                _ = cancel_rx.changed() => break,
                analysis = self.analyse(frame) => analysis,
            };

            let candidates = match analysis {
                Analysis::Done(candidates) => candidates,
                Analysis::TimedOut => {
                    tracing::debug!("Frame analysis exceeded {:?}, discarding", period);
                    if let Some(metrics) = &self.config.metrics {
                        metrics.record_tick_timeout();
                    }
                    Vec::new()
                }
                Analysis::Panicked => {
                    tracing::error!("Symbol engine '{}' panicked", self.config.engine.name());
                    Vec::new()
                }
            };

            if !self.deliver(candidates, &tx).await {
                break;
            }

            if self.single_shot {
                break;
            }
        }

        tracing::debug!("Decoder stopped: engine={}", self.config.engine.name());
    }

    async fn analyse(&self, frame: Frame) -> Analysis {
        if let Some(metrics) = &self.config.metrics {
            metrics.record_decode_tick();
        }

        self.config.in_flight.store(true, Ordering::SeqCst);
        let guard = InFlightGuard(Arc::clone(&self.config.in_flight));
        let engine = Arc::clone(&self.config.engine);

        let task = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            engine.decode(&frame)
        });

        match tokio::time::timeout(self.config.interval, task).await {
            Ok(Ok(candidates)) => Analysis::Done(candidates),
            Ok(Err(_)) => Analysis::Panicked,
            Err(_) => Analysis::TimedOut,
        }
    }

    /// Draw the locator and forward allowed candidates. Returns `false`
    /// once the receiving side is gone.
    async fn deliver(&self, candidates: Vec<DecodeCandidate>, tx: &mpsc::Sender<DecodeCandidate>) -> bool {
        if self.config.draw_locator {
            match candidates.iter().find_map(|candidate| candidate.locator) {
                Some(polygon) => self.target.draw_locator(polygon),
                None => self.target.clear_locator(),
            }
        }

        for candidate in candidates {
            if !self.allowed.contains(&candidate.symbology) {
                tracing::trace!(
                    "Dropping {} candidate outside the allow-list",
                    candidate.symbology
                );
                continue;
            }

            if tx.send(candidate).await.is_err() {
                return false;
            }
        }

        true
    }
}
