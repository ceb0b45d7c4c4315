// Scan controller - drives one scan session at a time
//
// This module contains the ScanController which coordinates between:
// - StateManager (session state and events)
// - FrameSource (camera handle)
// - Decoder (candidate stream)
// - ConfidenceFilter (which candidates count)
// - FeedbackEmitter (tone, overlay, failure messages)
//
// Every session attempt owns its camera and decoder resources through an
// `Attempt`, whose teardown runs exactly once on every exit path.

use crate::metrics::Metrics;
use crate::models::{
    AcceptedCode, CameraConstraints, CodeSource, DecodeCandidate, DecoderMode, FacingMode, Resolution,
    ScanSession, ScanState, ScannerSettings, SessionId, SymbologySet,
};
use crate::services::camera::{FrameSource, RenderSurface, start_with_fallback};
use crate::services::confidence::ConfidenceFilter;
use crate::services::decoder::{DecodeHandle, DecodeStream, Decoder};
use crate::services::feedback::FeedbackEmitter;
use crate::services::{ScanError, manual};
use crate::state::{SessionEvent, StateManager};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot, watch};

/// Parameters for one scan session.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub preferred_facing: FacingMode,
    /// Require `preferred_facing`; relaxed once to a preference if no
    /// device has it
    pub exact_facing: bool,
    pub allowed_symbologies: SymbologySet,
}

impl ScanRequest {
    pub fn from_settings(settings: &ScannerSettings) -> Self {
        Self {
            preferred_facing: settings.preferred_facing,
            exact_facing: settings.exact_facing,
            allowed_symbologies: settings.symbologies.clone(),
        }
    }

    fn constraints(&self, ideal_resolution: Option<Resolution>) -> CameraConstraints {
        CameraConstraints {
            facing: self.preferred_facing,
            exact: self.exact_facing,
            ideal_resolution,
        }
    }
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self::from_settings(&ScannerSettings::default())
    }
}

/// The capabilities a controller is wired to.
pub struct ScanPipeline {
    pub source: Arc<dyn FrameSource>,
    pub decoder: Arc<dyn Decoder>,
    pub target: Arc<RenderSurface>,
    pub feedback: Arc<FeedbackEmitter>,
}

/// Camera and decoder resources of one session attempt.
///
/// `release` may be called before the camera start has resolved; the start
/// task then tears down when it resolves. Either way teardown, and with it
/// `FrameSource::stop`, runs exactly once.
struct Attempt {
    session_id: SessionId,
    source: Arc<dyn FrameSource>,
    target: Arc<RenderSurface>,
    cancel_tx: watch::Sender<bool>,
    start_resolved: AtomicBool,
    released: AtomicBool,
    torn_down: AtomicBool,
    decode: Mutex<Option<DecodeHandle>>,
}

impl Attempt {
    fn new(session_id: SessionId, source: Arc<dyn FrameSource>, target: Arc<RenderSurface>) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            session_id,
            source,
            target,
            cancel_tx,
            start_resolved: AtomicBool::new(false),
            released: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            decode: Mutex::new(None),
        }
    }

    fn cancelled(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Hand the decoder's stop handle to the attempt. Stops it right away
    /// if teardown already ran.
    fn set_decode(&self, handle: DecodeHandle) {
        *self.decode.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());
        if self.torn_down.load(Ordering::SeqCst) {
            handle.stop();
        }
    }

    /// Mark the start as resolved. Returns `true` if the attempt was
    /// released meanwhile, in which case teardown has run.
    fn resolve_start(&self) -> bool {
        self.start_resolved.store(true, Ordering::SeqCst);
        if self.released.load(Ordering::SeqCst) {
            self.teardown();
            return true;
        }
        false
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.cancel_tx.send_replace(true);
        if self.start_resolved.load(Ordering::SeqCst) {
            self.teardown();
        }
    }

    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel_tx.send_replace(true);
        if let Some(handle) = self
            .decode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.stop();
        }
        self.source.stop();
        self.target.clear_locator();

        tracing::debug!("Session {} torn down", self.session_id);
    }
}

struct Inner {
    state: StateManager,
    pipeline: ScanPipeline,
    metrics: Arc<Metrics>,
    threshold: f64,
    ideal_resolution: Option<Resolution>,
    runtime: Handle,
    attempt: Mutex<Option<Arc<Attempt>>>,
    last_request: Mutex<ScanRequest>,
    /// Completes when the newest attempt has finished its start phase
    start_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

/// Orders the start phases of successive attempts.
///
/// An attempt waits for `previous` before touching the camera and drops
/// `done` once its own start has resolved and any teardown it owes has run,
/// so a late start never closes the handle of the next session.
struct StartGate {
    previous: Option<oneshot::Receiver<()>>,
    done: oneshot::Sender<()>,
}

/// Scan session controller
///
/// Owns the session lifecycle and is the only writer of the
/// [`ScanSession`]. Front-ends call the inbound operations and listen to
/// [`SessionEvent`]s through [`subscribe`](Self::subscribe).
///
/// Dropping the controller closes the session, releasing any camera handle.
///
/// # Example
/// ```ignore
/// let controller = ScanController::new(pipeline, StateManager::new(), metrics, &settings, handle);
/// let mut events = controller.subscribe();
/// controller.start_session(ScanRequest::default())?;
/// ```
pub struct ScanController {
    inner: Arc<Inner>,
}

impl ScanController {
    /// Create a controller
    ///
    /// # Arguments
    /// * `pipeline` - Camera, decoder, render target and feedback
    /// * `state` - State manager the session lives in
    /// * `metrics` - Shared pipeline counters
    /// * `settings` - Confidence threshold and ideal resolution
    /// * `runtime` - Handle used to spawn session tasks
    pub fn new(
        pipeline: ScanPipeline,
        state: StateManager,
        metrics: Arc<Metrics>,
        settings: &ScannerSettings,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state,
                pipeline,
                metrics,
                threshold: settings.confidence_threshold,
                ideal_resolution: settings.ideal_resolution,
                runtime,
                attempt: Mutex::new(None),
                last_request: Mutex::new(ScanRequest::from_settings(settings)),
                start_gate: Mutex::new(None),
            }),
        }
    }

    /// Begin a new session.
    ///
    /// Allowed from `Idle`, `Accepted`, `Stopped` and `Failed`; fails with
    /// [`ScanError::SessionBusy`] while a session is starting or scanning.
    pub fn start_session(&self, request: ScanRequest) -> Result<SessionId, ScanError> {
        let inner = &self.inner;
        let session_id = SessionId::new();
        let attempt = Arc::new(Attempt::new(
            session_id,
            Arc::clone(&inner.pipeline.source),
            Arc::clone(&inner.pipeline.target),
        ));

        let mut gate = None;
        let committed = inner.state.try_transition(
            None,
            &[
                ScanState::Idle,
                ScanState::Accepted,
                ScanState::Stopped,
                ScanState::Failed,
            ],
            |session| session.begin(session_id),
            |_| gate = Some(inner.install_attempt(Arc::clone(&attempt))),
        );

        let (Some(_), Some(gate)) = (committed, gate) else {
            tracing::debug!("Start rejected: a session is already running");
            return Err(ScanError::SessionBusy);
        };

        *inner
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = request.clone();
        inner.pipeline.target.clear_overlay();
        inner.metrics.record_session_started();
        tracing::info!("Scan session {} starting", session_id);

        inner.spawn_attempt(attempt, request, gate);
        Ok(session_id)
    }

    /// Cancel a starting or scanning session.
    ///
    /// Returns `false` when there was nothing to stop.
    pub fn stop_session(&self) -> bool {
        let inner = &self.inner;
        let committed = inner.state.try_transition(
            None,
            &[ScanState::Starting, ScanState::Scanning],
            |session| session.state = ScanState::Stopped,
            |_| inner.release_attempt(),
        );

        match committed {
            Some(_) => {
                inner.metrics.record_scan_stopped();
                tracing::info!("Scan session stopped");
                true
            }
            None => false,
        }
    }

    /// Restart a failed session with its last request.
    pub fn retry_session(&self) -> Result<SessionId, ScanError> {
        let inner = &self.inner;
        let snapshot = inner.state.snapshot();
        let Some(session_id) = snapshot.session_id.filter(|_| snapshot.state == ScanState::Failed)
        else {
            return Err(ScanError::NotRetryable(snapshot.state));
        };

        let attempt = Arc::new(Attempt::new(
            session_id,
            Arc::clone(&inner.pipeline.source),
            Arc::clone(&inner.pipeline.target),
        ));

        let mut gate = None;
        let committed = inner.state.try_transition(
            Some(session_id),
            &[ScanState::Failed],
            |session| {
                session.state = ScanState::Starting;
                session.last_error = None;
            },
            |_| gate = Some(inner.install_attempt(Arc::clone(&attempt))),
        );

        let (Some(_), Some(gate)) = (committed, gate) else {
            return Err(ScanError::NotRetryable(inner.state.read(|s| s.state)));
        };

        let request = inner
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        inner.metrics.record_session_started();
        tracing::info!("Retrying scan session {}", session_id);

        inner.spawn_attempt(attempt, request, gate);
        Ok(session_id)
    }

    /// Discard the accepted code and scan again with the last request.
    pub fn change_code(&self) -> Result<SessionId, ScanError> {
        let request = self
            .inner
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.start_session(request)
    }

    /// Accept a typed code.
    ///
    /// Blank input fails with [`ScanError::EmptyInput`] and leaves the
    /// session untouched. Otherwise the session moves straight to
    /// `Accepted`, releasing any camera resources. Fails with
    /// [`ScanError::SessionClosed`] if a code was already accepted.
    pub fn submit_manual_code(&self, text: &str) -> Result<AcceptedCode, ScanError> {
        let code = manual::submit(text)?;
        let inner = &self.inner;

        let committed = inner.state.try_transition(
            None,
            &[
                ScanState::Idle,
                ScanState::Starting,
                ScanState::Scanning,
                ScanState::Failed,
                ScanState::Stopped,
            ],
            |session| {
                if session.session_id.is_none() {
                    session.session_id = Some(SessionId::new());
                    session.started_at = Some(Instant::now());
                }
                session.state = ScanState::Accepted;
                session.accepted_code = Some(code.clone());
                session.code_source = Some(CodeSource::Manual);
                session.last_error = None;
            },
            |_| inner.release_attempt(),
        );

        if committed.is_none() {
            return Err(ScanError::SessionClosed);
        }

        inner.pipeline.feedback.on_accept(&code, &inner.pipeline.target);
        inner.metrics.record_manual_entry();
        tracing::info!("Code entered manually: {}", code);
        Ok(code)
    }

    /// Forward a zoom request to the camera while scanning.
    pub fn apply_zoom(&self, value: f64) {
        let inner = &self.inner;
        if inner.state.read(|session| session.state) == ScanState::Scanning {
            inner.pipeline.source.apply_zoom(value);
        } else {
            tracing::debug!("Zoom ignored outside of scanning");
        }
    }

    /// Close the scan UI: tear down and reset to `Idle`.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> ScanSession {
        self.inner.state.snapshot()
    }

    pub fn state(&self) -> &StateManager {
        &self.inner.state
    }

    pub fn target(&self) -> &Arc<RenderSurface> {
        &self.inner.pipeline.target
    }

    pub fn decoder_mode(&self) -> DecoderMode {
        self.inner.pipeline.decoder.mode()
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl Inner {
    /// Replace the current attempt, releasing the previous one, and queue
    /// its start phase behind the previous attempt's.
    fn install_attempt(&self, attempt: Arc<Attempt>) -> StartGate {
        let previous = self
            .attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(attempt);
        if let Some(previous) = previous {
            previous.release();
        }

        let (done, next) = oneshot::channel();
        let previous = self
            .start_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(next);

        StartGate { previous, done }
    }

    fn release_attempt(&self) {
        let current = self
            .attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(attempt) = current {
            attempt.release();
        }
    }

    fn close(&self) {
        let state = self.state.read(|session| session.state);
        self.release_attempt();
        if state != ScanState::Idle {
            self.state.reset();
            tracing::info!("Scan view closed (was {})", state);
        }
        self.pipeline.target.clear_overlay();
    }

    fn spawn_attempt(self: &Arc<Self>, attempt: Arc<Attempt>, request: ScanRequest, gate: StartGate) {
        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            inner.run_attempt(attempt, request, gate).await;
        });
    }

    async fn run_attempt(&self, attempt: Arc<Attempt>, request: ScanRequest, gate: StartGate) {
        if let Some(previous) = gate.previous {
            // Err only means the previous task is gone, which is just as good
            let _ = previous.await;
        }

        let started = if attempt.is_released() {
            None
        } else {
            Some(
                start_with_fallback(
                    self.pipeline.source.as_ref(),
                    Arc::clone(&self.pipeline.target),
                    request.constraints(self.ideal_resolution),
                )
                .await,
            )
        };

        if attempt.resolve_start() {
            tracing::debug!(
                "Session {} was released before its camera started, discarding",
                attempt.session_id
            );
            return;
        }

        let capabilities = match started {
            Some(Ok(capabilities)) => capabilities,
            Some(Err(error)) => {
                self.fail(&attempt, error);
                return;
            }
            None => return,
        };

        let stream = match self.activate(&attempt, &request) {
            Ok(stream) => stream,
            Err(error) => {
                self.fail(&attempt, error);
                return;
            }
        };

        let scanning = self.state.try_transition(
            Some(attempt.session_id),
            &[ScanState::Starting],
            |session| {
                session.state = ScanState::Scanning;
                session.capabilities = Some(capabilities);
            },
            |_| {},
        );

        if scanning.is_none() {
            attempt.teardown();
            return;
        }
        drop(gate.done);

        tracing::info!(
            "Session {} scanning with {} camera",
            attempt.session_id,
            capabilities.facing_mode
        );

        self.consume(&attempt, &request, stream).await;
    }

    fn activate(&self, attempt: &Attempt, request: &ScanRequest) -> Result<DecodeStream, ScanError> {
        let stream = self.pipeline.decoder.activate(
            Arc::clone(&self.pipeline.source),
            Arc::clone(&self.pipeline.target),
            request.allowed_symbologies.clone(),
        )?;
        attempt.set_decode(stream.handle());
        Ok(stream)
    }

    /// Feed candidates through the filter until one is accepted or the
    /// attempt ends.
    async fn consume(&self, attempt: &Attempt, request: &ScanRequest, mut stream: DecodeStream) {
        let filter = ConfidenceFilter::new(self.threshold, request.allowed_symbologies.clone());
        let mut cancelled = attempt.cancelled();

        loop {
            if *cancelled.borrow() {
                break;
            }

            let next = tokio::select! {
                _ = cancelled.changed() => break,
                next = stream.next() => next,
            };

            match next {
                Some(candidate) => {
                    if self.consider(attempt, &filter, candidate) {
                        break;
                    }
                }
                None => {
                    let still_scanning = self.state.read(|session| {
                        session.session_id == Some(attempt.session_id)
                            && session.state == ScanState::Scanning
                    });
                    if !still_scanning || attempt.is_released() {
                        break;
                    }

                    if self.pipeline.decoder.mode() == DecoderMode::SingleShot {
                        match self.activate(attempt, request) {
                            Ok(next_stream) => {
                                stream = next_stream;
                                continue;
                            }
                            Err(error) => {
                                self.fail(attempt, error);
                                break;
                            }
                        }
                    }

                    self.fail(
                        attempt,
                        ScanError::DecoderUnavailable("decoder stopped unexpectedly".to_string()),
                    );
                    break;
                }
            }
        }
    }

    /// Run one candidate through the filter. Returns `true` once the
    /// session no longer wants candidates.
    fn consider(
        &self,
        attempt: &Attempt,
        filter: &ConfidenceFilter,
        candidate: DecodeCandidate,
    ) -> bool {
        let verdict = filter.evaluate(&candidate);
        let code = AcceptedCode::parse(&candidate.raw_text).filter(|_| verdict.is_accepted());

        let Some(code) = code else {
            self.metrics.record_candidate_rejected();
            tracing::debug!("Candidate {} discarded: {:?}", candidate.symbology, verdict);
            self.state.try_transition(
                Some(attempt.session_id),
                &[ScanState::Scanning],
                |session| session.rejected_count += 1,
                |_| {},
            );
            return false;
        };

        self.metrics.record_candidate_accepted();
        let symbology = candidate.symbology;
        let mut started_at = None;

        let committed = self.state.try_transition(
            Some(attempt.session_id),
            &[ScanState::Scanning],
            |session| {
                session.attempt_count += 1;
                session.state = ScanState::Accepted;
                session.accepted_code = Some(code.clone());
                session.code_source = Some(CodeSource::Camera(symbology));
            },
            |session| {
                started_at = session.started_at;
                attempt.teardown();
            },
        );

        match committed {
            Some(_) => {
                self.pipeline.feedback.on_accept(&code, &self.pipeline.target);
                let elapsed = started_at.map(|at| at.elapsed()).unwrap_or_default();
                self.metrics.record_scan_accepted(elapsed);
                tracing::info!(
                    "Session {} accepted {} code {} after {:?}",
                    attempt.session_id,
                    symbology,
                    code,
                    elapsed
                );
                true
            }
            None => {
                tracing::debug!("Candidate {} ignored: session already closed", code);
                true
            }
        }
    }

    /// Move the attempt's session to `Failed` and raise failure feedback.
    fn fail(&self, attempt: &Attempt, error: ScanError) {
        let committed = self.state.try_transition(
            Some(attempt.session_id),
            &[ScanState::Starting, ScanState::Scanning],
            |session| {
                session.state = ScanState::Failed;
                session.last_error = Some(error.clone());
            },
            |_| attempt.teardown(),
        );
        attempt.teardown();

        if committed.is_none() {
            tracing::debug!("Session {} ended before failing with: {}", attempt.session_id, error);
            return;
        }

        if error.is_usage_error() {
            tracing::error!("Session {} failed: {}", attempt.session_id, error);
        } else {
            tracing::warn!("Session {} failed: {}", attempt.session_id, error);
        }

        let message = self.pipeline.feedback.on_fail(&error);
        tracing::debug!(
            "Failure feedback: {} (retry: {})",
            message.message,
            message.retry_available
        );
        self.metrics.record_scan_failed();
    }
}
