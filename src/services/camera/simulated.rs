//! Deterministic camera for the console demo and tests.
//!
//! Renders a synthetic grayscale scene at a fixed frame rate: a noisy blank
//! background that, after a configurable number of frames, shows an EAN-13
//! symbol across the middle band of the image. Zoom scales the symbol's
//! module width, so zooming in too far pushes it off the frame.

use super::{BoxFuture, FrameSource, RenderSurface};
use crate::models::{
    CameraCapabilities, CameraConstraints, FacingMode, Frame, Resolution, ResolutionRange,
    SimulationSettings, ZoomRange,
};
use crate::services::ScanError;
use crate::services::decoder::ean13::encode_modules;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const FRAME_WIDTH: usize = 640;
pub const FRAME_HEIGHT: usize = 360;

const QUIET_MODULES: usize = 9;
const BAR_LUMA: u8 = 20;
const SPACE_LUMA: u8 = 230;
const BACKGROUND_LUMA: u8 = 200;

const ZOOM_RANGE: ZoomRange = ZoomRange {
    min: 1.0,
    max: 2.5,
    step: 0.5,
};

struct OpenHandle {
    facing: FacingMode,
    zoom: f64,
    opened_at: Instant,
    target: Arc<RenderSurface>,
    last_frame: Option<Frame>,
}

struct Shared {
    settings: SimulationSettings,
    modules: Option<Vec<bool>>,
    handle: Mutex<Option<OpenHandle>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl Shared {
    fn handle(&self) -> MutexGuard<'_, Option<OpenHandle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn capabilities(&self, facing: FacingMode) -> CameraCapabilities {
        CameraCapabilities {
            facing_mode: facing,
            resolution_range: ResolutionRange {
                min: Resolution::new(320, 180),
                max: Resolution::new(FRAME_WIDTH as u32, FRAME_HEIGHT as u32),
            },
            zoom_range: self.settings.zoom.then_some(ZOOM_RANGE),
        }
    }

    /// Pick a device for `constraints`, honouring `exact`.
    fn select_device(&self, constraints: &CameraConstraints) -> Result<FacingMode, ScanError> {
        let devices = &self.settings.devices;
        if devices.contains(&constraints.facing) {
            return Ok(constraints.facing);
        }
        if constraints.exact {
            return Err(ScanError::DeviceUnavailable);
        }
        devices.first().copied().ok_or(ScanError::DeviceUnavailable)
    }
}

/// In-process [`FrameSource`] driven by [`SimulationSettings`].
///
/// Cloning shares the same device.
#[derive(Clone)]
pub struct SimulatedCamera {
    shared: Arc<Shared>,
}

impl SimulatedCamera {
    pub fn new(settings: SimulationSettings) -> Self {
        let modules = settings.ean13.as_deref().and_then(|code| {
            let modules = encode_modules(code);
            if modules.is_none() {
                tracing::warn!("Simulated EAN-13 '{}' is not a valid code, scene stays blank", code);
            }
            modules
        });

        Self {
            shared: Arc::new(Shared {
                settings,
                modules,
                handle: Mutex::new(None),
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of camera handles currently open (0 or 1).
    pub fn open_handles(&self) -> usize {
        usize::from(self.shared.handle().is_some())
    }

    /// Number of `start` calls that opened a handle.
    pub fn starts(&self) -> usize {
        self.shared.starts.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls that released a handle.
    pub fn stops(&self) -> usize {
        self.shared.stops.load(Ordering::SeqCst)
    }

    pub fn zoom(&self) -> Option<f64> {
        self.shared.handle().as_ref().map(|handle| handle.zoom)
    }
}

impl FrameSource for SimulatedCamera {
    fn start(
        &self,
        target: Arc<RenderSurface>,
        constraints: CameraConstraints,
    ) -> BoxFuture<Result<CameraCapabilities, ScanError>> {
        if !target.is_mounted() {
            let id = target.id().to_string();
            return Box::pin(async move { Err(ScanError::TargetMissing(id)) });
        }

        let shared = Arc::clone(&self.shared);
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(shared.settings.start_delay_ms)).await;

            if !shared.settings.permission_granted {
                return Err(ScanError::PermissionDenied);
            }
            let facing = shared.select_device(&constraints)?;

            let mut handle = shared.handle();
            if let Some(previous) = handle.take() {
                tracing::debug!("Releasing previous simulated camera handle");
                previous.target.detach();
                shared.stops.fetch_add(1, Ordering::SeqCst);
            }

            target.attach();
            *handle = Some(OpenHandle {
                facing,
                zoom: ZOOM_RANGE.min,
                opened_at: Instant::now(),
                target,
                last_frame: None,
            });
            shared.starts.fetch_add(1, Ordering::SeqCst);

            tracing::debug!("Simulated camera opened: facing={}", facing);
            Ok(shared.capabilities(facing))
        })
    }

    fn latest_frame(&self) -> Option<Frame> {
        let fps = self.shared.settings.frames_per_second.max(1) as f64;
        let mut guard = self.shared.handle();
        let handle = guard.as_mut()?;

        let sequence = (handle.opened_at.elapsed().as_secs_f64() * fps) as u64;
        if let Some(frame) = &handle.last_frame {
            if frame.sequence == sequence {
                return Some(frame.clone());
            }
        }

        let modules = if sequence >= self.shared.settings.appears_after_frames {
            self.shared.modules.as_deref()
        } else {
            None
        };
        let frame = render_scene(sequence, modules, handle.zoom);
        handle.last_frame = Some(frame.clone());
        Some(frame)
    }

    fn apply_zoom(&self, value: f64) {
        if !self.shared.settings.zoom {
            return;
        }
        if let Some(handle) = self.shared.handle().as_mut() {
            handle.zoom = ZOOM_RANGE.clamp(value);
            handle.last_frame = None;
            tracing::debug!("Simulated camera zoom set to {:.1}", handle.zoom);
        }
    }

    fn stop(&self) {
        if let Some(handle) = self.shared.handle().take() {
            handle.target.detach();
            self.shared.stops.fetch_add(1, Ordering::SeqCst);
            tracing::debug!("Simulated camera released: facing={}", handle.facing);
        }
    }

    fn is_active(&self) -> bool {
        self.shared.handle().is_some()
    }
}

/// Deterministic per-pixel noise in `-8..=8`.
fn noise(sequence: u64, x: usize, y: usize) -> i16 {
    let hash = (x as u32).wrapping_mul(73_856_093)
        ^ (y as u32).wrapping_mul(19_349_663)
        ^ (sequence as u32).wrapping_mul(83_492_791);
    (hash % 17) as i16 - 8
}

fn shade(base: u8, sequence: u64, x: usize, y: usize) -> u8 {
    (base as i16 + noise(sequence, x, y)).clamp(0, 255) as u8
}

fn render_scene(sequence: u64, modules: Option<&[bool]>, zoom: f64) -> Frame {
    let mut luma = vec![0u8; FRAME_WIDTH * FRAME_HEIGHT];

    let module_px = (2.0 * zoom).round().max(1.0) as usize;
    let band = FRAME_HEIGHT / 4..FRAME_HEIGHT * 3 / 4;

    // Symbol plus quiet zones, centred; may overflow the frame when zoomed
    let symbol = modules.map(|modules| {
        let span = (modules.len() + 2 * QUIET_MODULES) * module_px;
        let left = FRAME_WIDTH as isize / 2 - span as isize / 2;
        (modules, left, span)
    });

    for y in 0..FRAME_HEIGHT {
        for x in 0..FRAME_WIDTH {
            let base = match symbol {
                Some((modules, left, span)) if band.contains(&y) => {
                    let offset = x as isize - left;
                    if offset < 0 || offset >= span as isize {
                        BACKGROUND_LUMA
                    } else {
                        let module = offset as usize / module_px;
                        let bar = module
                            .checked_sub(QUIET_MODULES)
                            .and_then(|m| modules.get(m))
                            .copied()
                            .unwrap_or(false);
                        if bar { BAR_LUMA } else { SPACE_LUMA }
                    }
                }
                _ => BACKGROUND_LUMA,
            };
            luma[y * FRAME_WIDTH + x] = shade(base, sequence, x, y);
        }
    }

    Frame::new(sequence, FRAME_WIDTH, FRAME_HEIGHT, luma)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::decoder::{Ean13Engine, SymbolEngine};

    fn settings() -> SimulationSettings {
        SimulationSettings {
            start_delay_ms: 0,
            appears_after_frames: 0,
            ..SimulationSettings::default()
        }
    }

    #[tokio::test]
    async fn test_start_and_stop_track_handle() {
        let camera = SimulatedCamera::new(settings());
        let target = Arc::new(RenderSurface::new("reader"));

        let caps = camera
            .start(Arc::clone(&target), CameraConstraints::default())
            .await
            .unwrap();

        assert_eq!(caps.facing_mode, FacingMode::Environment);
        assert!(caps.supports_zoom());
        assert_eq!(camera.open_handles(), 1);
        assert!(target.is_attached());

        camera.stop();
        camera.stop();
        assert_eq!(camera.open_handles(), 0);
        assert_eq!(camera.stops(), 1);
        assert!(!target.is_attached());
    }

    #[tokio::test]
    async fn test_unmounted_target_fails_immediately() {
        let camera = SimulatedCamera::new(settings());
        let target = Arc::new(RenderSurface::unmounted("reader"));

        let result = camera.start(target, CameraConstraints::default()).await;
        assert_eq!(result, Err(ScanError::TargetMissing("reader".to_string())));
        assert_eq!(camera.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let camera = SimulatedCamera::new(SimulationSettings {
            permission_granted: false,
            ..settings()
        });
        let target = Arc::new(RenderSurface::new("reader"));

        let result = camera.start(target, CameraConstraints::default()).await;
        assert_eq!(result, Err(ScanError::PermissionDenied));
    }

    #[tokio::test]
    async fn test_exact_facing_requires_device() {
        let camera = SimulatedCamera::new(SimulationSettings {
            devices: vec![FacingMode::User],
            ..settings()
        });
        let target = Arc::new(RenderSurface::new("reader"));

        let exact = camera
            .start(Arc::clone(&target), CameraConstraints::exact(FacingMode::Environment))
            .await;
        assert_eq!(exact, Err(ScanError::DeviceUnavailable));

        let ideal = camera
            .start(target, CameraConstraints::ideal(FacingMode::Environment))
            .await
            .unwrap();
        assert_eq!(ideal.facing_mode, FacingMode::User);
    }

    #[tokio::test]
    async fn test_second_start_releases_first_handle() {
        let camera = SimulatedCamera::new(settings());
        let target = Arc::new(RenderSurface::new("reader"));

        for _ in 0..3 {
            camera
                .start(Arc::clone(&target), CameraConstraints::default())
                .await
                .unwrap();
        }

        assert_eq!(camera.open_handles(), 1);
        assert_eq!(camera.starts(), 3);
        assert_eq!(camera.stops(), 2);
    }

    #[tokio::test]
    async fn test_scene_decodes_to_configured_code() {
        let camera = SimulatedCamera::new(settings());
        let target = Arc::new(RenderSurface::new("reader"));
        camera.start(target, CameraConstraints::default()).await.unwrap();

        let frame = camera.latest_frame().unwrap();
        let candidates = Ean13Engine::new().decode(&frame);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].raw_text, "4006381333931");
    }

    #[tokio::test]
    async fn test_zoom_clamps_and_scales_symbol() {
        let camera = SimulatedCamera::new(settings());
        let target = Arc::new(RenderSurface::new("reader"));
        camera.start(target, CameraConstraints::default()).await.unwrap();

        camera.apply_zoom(9.0);
        assert_eq!(camera.zoom(), Some(2.5));
        let frame = camera.latest_frame().unwrap();
        assert_eq!(Ean13Engine::new().decode(&frame)[0].raw_text, "4006381333931");

        camera.apply_zoom(f64::NAN);
        assert_eq!(camera.zoom(), Some(1.0));
    }

    #[test]
    fn test_blank_scene_has_low_contrast() {
        let frame = render_scene(3, None, 1.0);
        let min = frame.luma.iter().copied().min().unwrap();
        let max = frame.luma.iter().copied().max().unwrap();
        assert!(max - min < 40);
        assert!(Ean13Engine::new().decode(&frame).is_empty());
    }

    #[test]
    fn test_no_frames_without_handle() {
        let camera = SimulatedCamera::new(settings());
        assert!(camera.latest_frame().is_none());
        camera.apply_zoom(2.0);
        assert!(camera.zoom().is_none());
    }
}
