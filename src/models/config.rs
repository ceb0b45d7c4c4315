use crate::models::scan::{
    CameraConstraints, FacingMode, Resolution, Symbology, SymbologySet, default_symbologies,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Application configuration from `locus.yaml` (plus `LOCUS_*` overrides).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scanner: ScannerSettings,
    pub feedback: FeedbackSettings,
    pub logging: LoggingSettings,
    pub simulation: SimulationSettings,
}

/// Which decoder variant drives the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderMode {
    #[default]
    Continuous,
    SingleShot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    /// Mean per-module error above which a candidate is discarded
    pub confidence_threshold: f64,

    /// Decode attempts per second
    pub ticks_per_second: u32,

    pub preferred_facing: FacingMode,

    /// Require the preferred facing mode (falls back once to a preference)
    pub exact_facing: bool,

    pub symbologies: SymbologySet,

    pub ideal_resolution: Option<Resolution>,

    /// Draw the locator polygon on the render surface
    pub draw_locator: bool,

    pub decoder_mode: DecoderMode,

    /// Identifier of the surface the camera renders into
    pub render_target: String,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.10,
            ticks_per_second: 10,
            preferred_facing: FacingMode::Environment,
            exact_facing: false,
            symbologies: default_symbologies(),
            ideal_resolution: Some(Resolution::new(1280, 720)),
            draw_locator: true,
            decoder_mode: DecoderMode::Continuous,
            render_target: "reader".to_string(),
        }
    }
}

impl ScannerSettings {
    /// Interval between decode ticks. Also the per-tick analysis timeout.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.ticks_per_second.max(1) as f64)
    }

    pub fn constraints(&self) -> CameraConstraints {
        CameraConstraints {
            facing: self.preferred_facing,
            exact: self.exact_facing,
            ideal_resolution: self.ideal_resolution,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackSettings {
    pub beep_enabled: bool,
    pub tone_hz: f32,
    pub tone_ms: u64,
    pub overlay_enabled: bool,
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            beep_enabled: true,
            tone_hz: 1000.0,
            tone_ms: 150,
            overlay_enabled: true,
        }
    }
}

impl FeedbackSettings {
    pub fn tone_duration(&self) -> Duration {
        Duration::from_millis(self.tone_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub directory: String,
    pub prefix: String,
    pub debug: bool,
    pub console: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            prefix: "locus".to_string(),
            debug: false,
            console: false,
        }
    }
}

/// Scene and device behaviour of the built-in simulated camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// EAN-13 digits rendered into the scene; blank scene when unset
    pub ean13: Option<String>,
    /// Frames of empty scene before the symbol shows up
    pub appears_after_frames: u64,
    pub frames_per_second: u32,
    pub start_delay_ms: u64,
    pub permission_granted: bool,
    pub devices: Vec<FacingMode>,
    pub zoom: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            ean13: Some("4006381333931".to_string()),
            appears_after_frames: 15,
            frames_per_second: 30,
            start_delay_ms: 250,
            permission_granted: true,
            devices: vec![FacingMode::Environment, FacingMode::User],
            zoom: true,
        }
    }
}

/// Semantic problems a syntactically valid config can still have.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("confidence_threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f64),

    #[error("ticks_per_second must be between 1 and 60, got {0}")]
    TickRateOutOfRange(u32),

    #[error("at least one symbology must be allowed")]
    NoSymbologies,

    #[error("render_target must not be empty")]
    EmptyRenderTarget,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scanner = &self.scanner;

        if !(0.0..=1.0).contains(&scanner.confidence_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(
                scanner.confidence_threshold,
            ));
        }
        if !(1..=60).contains(&scanner.ticks_per_second) {
            return Err(ConfigError::TickRateOutOfRange(scanner.ticks_per_second));
        }
        if scanner.symbologies.is_empty() {
            return Err(ConfigError::NoSymbologies);
        }
        if scanner.render_target.trim().is_empty() {
            return Err(ConfigError::EmptyRenderTarget);
        }

        Ok(())
    }

    /// Whether `symbology` is on the scanner allow-list.
    pub fn allows(&self, symbology: Symbology) -> bool {
        self.scanner.symbologies.contains(&symbology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanner_defaults() {
        let settings = ScannerSettings::default();
        assert_eq!(settings.confidence_threshold, 0.10);
        assert_eq!(settings.ticks_per_second, 10);
        assert_eq!(settings.preferred_facing, FacingMode::Environment);
        assert!(!settings.exact_facing);
        assert_eq!(settings.tick_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(AppConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = AppConfig::default();
        config.scanner.confidence_threshold = 1.5;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ThresholdOutOfRange(1.5))
        );
    }

    #[test]
    fn test_validate_rejects_zero_tick_rate() {
        let mut config = AppConfig::default();
        config.scanner.ticks_per_second = 0;
        assert_eq!(config.validate(), Err(ConfigError::TickRateOutOfRange(0)));
    }

    #[test]
    fn test_validate_rejects_empty_allow_list() {
        let mut config = AppConfig::default();
        config.scanner.symbologies.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoSymbologies));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "scanner:\n  confidence_threshold: 0.2\n  symbologies: [qr, ean13, qr]\n";
        let config: AppConfig = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(config.scanner.confidence_threshold, 0.2);
        assert_eq!(config.scanner.ticks_per_second, 10);
        // IndexSet keeps first-seen order and drops duplicates
        let symbologies: Vec<_> = config.scanner.symbologies.iter().copied().collect();
        assert_eq!(symbologies, vec![Symbology::Qr, Symbology::Ean13]);
        assert!(config.feedback.beep_enabled);
    }

    #[test]
    fn test_constraints_from_settings() {
        let settings = ScannerSettings {
            preferred_facing: FacingMode::User,
            exact_facing: true,
            ..ScannerSettings::default()
        };
        let constraints = settings.constraints();
        assert_eq!(constraints.facing, FacingMode::User);
        assert!(constraints.exact);
    }
}
