use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Optical code encodings the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbology {
    Code128,
    Code39,
    Ean13,
    Ean8,
    UpcA,
    Qr,
}

impl Symbology {
    /// Linear (1D) symbologies are the ones prone to partial reads.
    pub fn is_linear(&self) -> bool {
        !matches!(self, Symbology::Qr)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Symbology::Code128 => "Code 128",
            Symbology::Code39 => "Code 39",
            Symbology::Ean13 => "EAN-13",
            Symbology::Ean8 => "EAN-8",
            Symbology::UpcA => "UPC-A",
            Symbology::Qr => "QR Code",
        }
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered, de-duplicated allow-list of symbologies.
pub type SymbologySet = IndexSet<Symbology>;

/// Linear code sets plus QR, in the order the scanner advertises them.
pub fn default_symbologies() -> SymbologySet {
    [
        Symbology::Code128,
        Symbology::Code39,
        Symbology::Ean13,
        Symbology::UpcA,
        Symbology::Qr,
    ]
    .into_iter()
    .collect()
}

/// A point in frame coordinates (pixels).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Bounding quadrilateral of a located symbol, clockwise from top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocatorPolygon {
    pub corners: [Point; 4],
}

impl LocatorPolygon {
    /// Axis-aligned rectangle spanning `x0..x1` and `y0..y1`.
    pub fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            corners: [
                Point::new(x0, y0),
                Point::new(x1, y0),
                Point::new(x1, y1),
                Point::new(x0, y1),
            ],
        }
    }
}

/// Unvalidated decode result produced by one decoder tick.
///
/// Never persisted. The confidence filter consumes it immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeCandidate {
    pub raw_text: String,
    pub symbology: Symbology,
    /// Per-module (or per-digit) error estimates in `[0, 1]`. Empty when the
    /// engine validates the symbol itself (checksums, Reed-Solomon).
    pub per_module_error_rates: Vec<f64>,
    pub locator: Option<LocatorPolygon>,
}

impl DecodeCandidate {
    pub fn new(raw_text: impl Into<String>, symbology: Symbology) -> Self {
        Self {
            raw_text: raw_text.into(),
            symbology,
            per_module_error_rates: Vec::new(),
            locator: None,
        }
    }

    pub fn with_error_rates(mut self, rates: Vec<f64>) -> Self {
        self.per_module_error_rates = rates;
        self
    }

    pub fn with_locator(mut self, locator: LocatorPolygon) -> Self {
        self.locator = Some(locator);
        self
    }
}

/// Camera-selection preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear camera on phones and tablets.
    #[default]
    Environment,
    /// Front camera.
    User,
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacingMode::Environment => f.write_str("environment"),
            FacingMode::User => f.write_str("user"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionRange {
    pub min: Resolution,
    pub max: Resolution,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ZoomRange {
    /// Clamp a requested zoom level into the supported range.
    ///
    /// NaN requests fall back to the minimum.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }
}

/// What the camera negotiation produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraCapabilities {
    pub facing_mode: FacingMode,
    pub resolution_range: ResolutionRange,
    pub zoom_range: Option<ZoomRange>,
}

impl CameraCapabilities {
    /// Whether the UI should offer a zoom slider.
    pub fn supports_zoom(&self) -> bool {
        self.zoom_range.is_some()
    }
}

/// Requested camera properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConstraints {
    pub facing: FacingMode,
    /// Require exactly `facing` instead of merely preferring it.
    pub exact: bool,
    pub ideal_resolution: Option<Resolution>,
}

impl CameraConstraints {
    pub fn ideal(facing: FacingMode) -> Self {
        Self {
            facing,
            exact: false,
            ideal_resolution: None,
        }
    }

    pub fn exact(facing: FacingMode) -> Self {
        Self {
            facing,
            exact: true,
            ideal_resolution: None,
        }
    }

    /// The same request with the facing mode downgraded to a preference.
    pub fn relaxed(&self) -> Self {
        Self {
            exact: false,
            ..*self
        }
    }
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self::ideal(FacingMode::Environment)
    }
}

/// Terminal output of a scan session: trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AcceptedCode(String);

impl AcceptedCode {
    /// Returns `None` when nothing is left after trimming.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for AcceptedCode {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AcceptedCode::parse(&value).ok_or("accepted code must not be empty")
    }
}

impl From<AcceptedCode> for String {
    fn from(code: AcceptedCode) -> Self {
        code.0
    }
}

impl fmt::Display for AcceptedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One grayscale video frame, row-major, 8 bits per pixel.
///
/// `luma` must hold exactly `width * height` bytes; [`Frame::row`] and
/// [`Frame::pixel`] panic otherwise. Check [`Frame::is_well_formed`] before
/// handing frames from outside sources to an engine.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub width: usize,
    pub height: usize,
    pub luma: Arc<[u8]>,
}

impl Frame {
    pub fn new(sequence: u64, width: usize, height: usize, luma: Vec<u8>) -> Self {
        Self {
            sequence,
            width,
            height,
            luma: luma.into(),
        }
    }

    /// Whether the buffer length matches the dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.width
            .checked_mul(self.height)
            .is_some_and(|len| len == self.luma.len())
    }

    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.width;
        &self.luma[start..start + self.width]
    }

    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.luma[y * self.width + x]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_code_trims() {
        let code = AcceptedCode::parse("  ABC-123 \n").unwrap();
        assert_eq!(code.as_str(), "ABC-123");
        assert!(AcceptedCode::parse(" \t ").is_none());
        assert!(AcceptedCode::parse("").is_none());
    }

    #[test]
    fn test_default_symbologies_cover_linear_and_qr() {
        let set = default_symbologies();
        assert!(set.contains(&Symbology::Code128));
        assert!(set.contains(&Symbology::Code39));
        assert!(set.contains(&Symbology::Ean13));
        assert!(set.contains(&Symbology::Qr));
        assert!(set.iter().filter(|s| !s.is_linear()).count() == 1);
    }

    #[test]
    fn test_frame_shape_check() {
        assert!(Frame::new(0, 4, 2, vec![0; 8]).is_well_formed());
        assert!(!Frame::new(0, 4, 2, vec![0; 7]).is_well_formed());
        assert!(!Frame::new(0, usize::MAX, 2, vec![]).is_well_formed());
        assert!(Frame::new(0, 0, 0, vec![]).is_well_formed());
    }

    #[test]
    fn test_zoom_clamp() {
        let range = ZoomRange {
            min: 1.0,
            max: 4.0,
            step: 0.1,
        };
        assert_eq!(range.clamp(0.2), 1.0);
        assert_eq!(range.clamp(9.0), 4.0);
        assert_eq!(range.clamp(2.5), 2.5);
        assert_eq!(range.clamp(f64::NAN), 1.0);
    }

    #[test]
    fn test_relaxed_constraints_keep_facing() {
        let exact = CameraConstraints::exact(FacingMode::User);
        let relaxed = exact.relaxed();
        assert!(!relaxed.exact);
        assert_eq!(relaxed.facing, FacingMode::User);
    }

    #[test]
    fn test_symbology_serde_names() {
        let yaml = serde_yaml_ng::to_string(&vec![Symbology::Ean13, Symbology::Code128]).unwrap();
        assert!(yaml.contains("ean13"));
        assert!(yaml.contains("code128"));
    }
}
