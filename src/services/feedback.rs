//! User feedback on scan outcomes.
//!
//! Acceptance plays a short tone and raises an overlay on the render
//! surface; failure produces a message offering retry and manual entry.
//! Audio is strictly best-effort: tones go to a dedicated `scan-tone`
//! thread that opens the output device on the first accepted scan, at most
//! once, and any audio problem is logged and swallowed there. Callers never
//! wait on the device.

use crate::models::{AcceptedCode, FeedbackSettings};
use crate::services::ScanError;
use crate::services::camera::RenderSurface;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("audio output unavailable: {0}")]
    Unavailable(String),

    #[error("tone playback failed: {0}")]
    Playback(String),
}

/// Something that can play a short tone.
#[cfg_attr(test, mockall::automock)]
pub trait AudioOutput: Send + Sync {
    fn play_tone(&self, frequency_hz: f32, duration: Duration) -> Result<(), AudioError>;
}

/// Opens the audio output. Called at most once per emitter, on the tone
/// thread.
pub type AudioFactory = Box<dyn Fn() -> Result<Arc<dyn AudioOutput>, AudioError> + Send + Sync>;

/// What the scan UI shows next to the retry and manual-entry controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackMessage {
    pub message: String,
    pub retry_available: bool,
    pub manual_entry_available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackEvent {
    Accepted { code: AcceptedCode },
    Failed(FeedbackMessage),
}

struct Tone {
    frequency_hz: f32,
    duration: Duration,
}

pub struct FeedbackEmitter {
    settings: FeedbackSettings,
    factory: Arc<AudioFactory>,
    /// Queue of the tone thread; `None` once the thread could not be spawned
    tones: OnceLock<Option<Mutex<Sender<Tone>>>>,
    events_tx: broadcast::Sender<FeedbackEvent>,
}

impl FeedbackEmitter {
    /// Emitter using the platform tone output (when built with `audio`).
    pub fn new(settings: FeedbackSettings) -> Self {
        Self::with_audio_factory(settings, Box::new(default_audio))
    }

    pub fn with_audio_factory(settings: FeedbackSettings, factory: AudioFactory) -> Self {
        let (events_tx, _) = broadcast::channel(16);
        Self {
            settings,
            factory: Arc::new(factory),
            tones: OnceLock::new(),
            events_tx,
        }
    }

    /// Emitter that never touches an audio device.
    pub fn silent(settings: FeedbackSettings) -> Self {
        Self::with_audio_factory(
            settings,
            Box::new(|| Err(AudioError::Unavailable("silenced".to_string()))),
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedbackEvent> {
        self.events_tx.subscribe()
    }

    fn tones(&self) -> Option<&Mutex<Sender<Tone>>> {
        self.tones
            .get_or_init(|| match spawn_tone_thread(Arc::clone(&self.factory)) {
                Ok(tx) => Some(Mutex::new(tx)),
                Err(e) => {
                    tracing::warn!("Scan tone disabled: {}", e);
                    None
                }
            })
            .as_ref()
    }

    /// Success tone plus overlay. Never fails and never waits on audio.
    pub fn on_accept(&self, code: &AcceptedCode, surface: &RenderSurface) {
        if self.settings.beep_enabled {
            if let Some(tones) = self.tones() {
                let tone = Tone {
                    frequency_hz: self.settings.tone_hz,
                    duration: self.settings.tone_duration(),
                };
                // Fails only once the tone thread gave up on the device
                if tones
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .send(tone)
                    .is_err()
                {
                    tracing::trace!("Scan tone skipped: no audio output");
                }
            }
        }

        if self.settings.overlay_enabled {
            surface.show_overlay(format!("Code read: {}", code));
        }

        let _ = self.events_tx.send(FeedbackEvent::Accepted { code: code.clone() });
    }

    /// Message for a failed session. Manual entry is always offered.
    pub fn on_fail(&self, error: &ScanError) -> FeedbackMessage {
        let message = FeedbackMessage {
            message: error.user_message().to_string(),
            retry_available: error.is_retryable(),
            manual_entry_available: true,
        };

        let _ = self.events_tx.send(FeedbackEvent::Failed(message.clone()));
        message
    }
}

/// Start the thread that opens the audio output and plays queued tones.
///
/// The thread exits when the emitter is dropped or the device cannot be
/// opened; later tones are then dropped at the sender.
fn spawn_tone_thread(factory: Arc<AudioFactory>) -> Result<Sender<Tone>, AudioError> {
    let (tx, rx) = mpsc::channel::<Tone>();

    thread::Builder::new()
        .name("scan-tone".to_string())
        .spawn(move || {
            let output = match factory() {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!("Scan tone disabled: {}", e);
                    return;
                }
            };

            while let Ok(tone) = rx.recv() {
                if let Err(e) = output.play_tone(tone.frequency_hz, tone.duration) {
                    tracing::debug!("Scan tone not played: {}", e);
                }
            }
        })
        .map_err(|e| AudioError::Unavailable(e.to_string()))?;

    Ok(tx)
}

#[cfg(feature = "audio")]
fn default_audio() -> Result<Arc<dyn AudioOutput>, AudioError> {
    Ok(Arc::new(tone::RodioTone::new()?))
}

#[cfg(not(feature = "audio"))]
fn default_audio() -> Result<Arc<dyn AudioOutput>, AudioError> {
    Err(AudioError::Unavailable(
        "built without the `audio` feature".to_string(),
    ))
}

#[cfg(feature = "audio")]
pub mod tone {
    //! Tone output on a dedicated thread; rodio's stream handle is not `Send`.

    use super::{AudioError, AudioOutput};
    use rodio::source::{SineWave, Source};
    use rodio::{OutputStream, Sink};
    use std::sync::mpsc::{self, Sender};
    use std::sync::{Mutex, PoisonError};
    use std::thread;
    use std::time::Duration;

    struct Tone {
        frequency_hz: f32,
        duration: Duration,
    }

    pub struct RodioTone {
        tx: Mutex<Sender<Tone>>,
    }

    impl RodioTone {
        /// Open the default output device. Fails if there is none.
        ///
        /// Blocks until the device reports ready; the emitter only calls it
        /// from its tone thread.
        pub fn new() -> Result<Self, AudioError> {
            let (tx, rx) = mpsc::channel::<Tone>();
            let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();

            thread::Builder::new()
                .name("scan-tone-sink".to_string())
                .spawn(move || {
                    let opened = OutputStream::try_default()
                        .map_err(|e| AudioError::Unavailable(e.to_string()))
                        .and_then(|(stream, handle)| {
                            Sink::try_new(&handle)
                                .map(|sink| (stream, sink))
                                .map_err(|e| AudioError::Unavailable(e.to_string()))
                        });

                    let (_stream, sink) = match opened {
                        Ok(pair) => {
                            let _ = ready_tx.send(Ok(()));
                            pair
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                    while let Ok(tone) = rx.recv() {
                        sink.append(
                            SineWave::new(tone.frequency_hz)
                                .take_duration(tone.duration)
                                .amplify(0.2),
                        );
                    }
                })
                .map_err(|e| AudioError::Unavailable(e.to_string()))?;

            ready_rx
                .recv()
                .map_err(|e| AudioError::Unavailable(e.to_string()))??;

            Ok(Self { tx: Mutex::new(tx) })
        }
    }

    impl AudioOutput for RodioTone {
        fn play_tone(&self, frequency_hz: f32, duration: Duration) -> Result<(), AudioError> {
            self.tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .send(Tone {
                    frequency_hz,
                    duration,
                })
                .map_err(|e| AudioError::Playback(e.to_string()))
        }
    }
}
