//! Camera frame sources and the surface they render into.
//!
//! A [`FrameSource`] owns at most one open camera handle. Decoders pull the
//! most recent frame from it at their own cadence; the source never pushes.
//!
//! # Fallback
//!
//! Requesting an *exact* facing mode on a device that lacks it fails with
//! [`ScanError::DeviceUnavailable`]. [`start_with_fallback`] retries such a
//! request once with the facing mode downgraded to a preference before the
//! error is surfaced. Permission and target errors are never retried.

pub mod simulated;

pub use simulated::SimulatedCamera;

use crate::models::{CameraCapabilities, CameraConstraints, Frame, LocatorPolygon};
use crate::services::ScanError;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Owned, sendable future returned by object-safe async trait methods.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Rendering target a camera stream is bound to.
///
/// Also carries the decoder's locator polygon and the feedback overlay, which
/// a front-end reads when it repaints.
#[derive(Debug)]
pub struct RenderSurface {
    id: String,
    mounted: AtomicBool,
    attached: AtomicBool,
    locator: Mutex<Option<LocatorPolygon>>,
    overlay: Mutex<Option<String>>,
}

impl RenderSurface {
    /// Create a mounted surface.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mounted: AtomicBool::new(true),
            attached: AtomicBool::new(false),
            locator: Mutex::new(None),
            overlay: Mutex::new(None),
        }
    }

    /// Create a surface that is not mounted yet.
    pub fn unmounted(id: impl Into<String>) -> Self {
        let surface = Self::new(id);
        surface.mounted.store(false, Ordering::SeqCst);
        surface
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mount(&self) {
        self.mounted.store(true, Ordering::SeqCst);
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Called by a frame source when its stream starts rendering here.
    pub fn attach(&self) {
        self.attached.store(true, Ordering::SeqCst);
    }

    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
        self.clear_locator();
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn draw_locator(&self, polygon: LocatorPolygon) {
        *self.locator.lock().unwrap_or_else(PoisonError::into_inner) = Some(polygon);
    }

    pub fn clear_locator(&self) {
        *self.locator.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn locator(&self) -> Option<LocatorPolygon> {
        *self.locator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn show_overlay(&self, text: impl Into<String>) {
        *self.overlay.lock().unwrap_or_else(PoisonError::into_inner) = Some(text.into());
    }

    pub fn clear_overlay(&self) {
        *self.overlay.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn overlay(&self) -> Option<String> {
        self.overlay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Live camera stream bound to a [`RenderSurface`].
///
/// Implementations hold at most one open handle: a second `start` releases
/// the first. `stop` is idempotent.
pub trait FrameSource: Send + Sync {
    /// Open the camera and begin rendering into `target`.
    ///
    /// Fails with [`ScanError::TargetMissing`] when `target` is not mounted
    /// at call time, before any asynchronous work begins.
    fn start(
        &self,
        target: Arc<RenderSurface>,
        constraints: CameraConstraints,
    ) -> BoxFuture<Result<CameraCapabilities, ScanError>>;

    /// Most recent frame, or `None` when no stream is open.
    fn latest_frame(&self) -> Option<Frame>;

    /// Best-effort zoom. Clamped into the reported range; ignored when the
    /// device has no zoom or no stream is open.
    fn apply_zoom(&self, value: f64);

    /// Release the camera handle and detach from the target.
    fn stop(&self);

    fn is_active(&self) -> bool;
}

/// Start `source`, retrying once with relaxed constraints when an exact
/// facing-mode request finds no matching device.
pub async fn start_with_fallback(
    source: &dyn FrameSource,
    target: Arc<RenderSurface>,
    constraints: CameraConstraints,
) -> Result<CameraCapabilities, ScanError> {
    match source.start(Arc::clone(&target), constraints).await {
        Err(ScanError::DeviceUnavailable) if constraints.exact => {
            tracing::warn!(
                "No camera with exact facing mode '{}', retrying as a preference",
                constraints.facing
            );
            source.start(target, constraints.relaxed()).await
        }
        result => result,
    }
}
