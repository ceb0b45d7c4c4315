//! Scanline EAN-13 engine.
//!
//! Samples a few horizontal rows around the frame centre, binarizes each row
//! at the midpoint of its luminance range and measures bar/space runs. A
//! symbol is 59 runs: start guard (3), six left digits (4 each), centre
//! guard (5), six right digits (4 each), end guard (3). Both reading
//! directions are tried so upside-down labels decode too.
//!
//! Every encoded digit gets an error estimate: the distance between its
//! measured run widths and the ideal pattern, in modules, divided by the
//! digit's 7 modules. The 12 estimates travel on the candidate for the
//! confidence filter.

use super::SymbolEngine;
use crate::models::{DecodeCandidate, Frame, LocatorPolygon, Symbology};

const MODULES_PER_SYMBOL: f64 = 95.0;
const RUNS_PER_SYMBOL: usize = 59;
const MIN_CONTRAST: u8 = 40;

/// Widths of the L-code (odd parity) digit patterns, space first.
/// R-code uses the same widths starting with a bar.
const L_WIDTHS: [[u8; 4]; 10] = [
    [3, 2, 1, 1],
    [2, 2, 2, 1],
    [2, 1, 2, 2],
    [1, 4, 1, 1],
    [1, 1, 3, 2],
    [1, 2, 3, 1],
    [1, 1, 1, 4],
    [1, 3, 1, 2],
    [1, 2, 1, 3],
    [3, 1, 1, 2],
];

/// Widths of the G-code (even parity) patterns: the R-code reversed.
const G_WIDTHS: [[u8; 4]; 10] = [
    [1, 1, 2, 3],
    [1, 2, 2, 2],
    [2, 2, 1, 2],
    [1, 1, 4, 1],
    [2, 3, 1, 1],
    [1, 3, 2, 1],
    [4, 1, 1, 1],
    [2, 1, 3, 1],
    [3, 1, 2, 1],
    [2, 1, 1, 3],
];

/// Parity of the six left digits for each implied first digit (bit set = G).
/// Most significant of the six bits is the leftmost digit.
const FIRST_DIGIT_PARITY: [u8; 10] = [
    0b000000, 0b001011, 0b001101, 0b001110, 0b010011, 0b011001, 0b011100, 0b010101, 0b010110,
    0b011010,
];

/// Worst accepted per-digit pattern distance, in modules.
const MAX_DIGIT_DISTANCE: f64 = 2.0;

#[derive(Debug, Clone, Copy)]
struct Run {
    dark: bool,
    start: usize,
    len: usize,
}

#[derive(Debug, Default)]
pub struct Ean13Engine;

impl Ean13Engine {
    pub fn new() -> Self {
        Self
    }
}

impl SymbolEngine for Ean13Engine {
    fn name(&self) -> &'static str {
        "ean13"
    }

    fn supports(&self, symbology: Symbology) -> bool {
        symbology == Symbology::Ean13
    }

    fn decode(&self, frame: &Frame) -> Vec<DecodeCandidate> {
        if frame.width < RUNS_PER_SYMBOL || frame.height == 0 {
            return Vec::new();
        }

        let centre = frame.height / 2;
        let offset = frame.height / 8;
        let rows = [centre, centre.saturating_sub(offset), (centre + offset).min(frame.height - 1)];

        for y in rows {
            if let Some(candidate) = decode_row(frame, y) {
                return vec![candidate];
            }
        }

        Vec::new()
    }
}

fn decode_row(frame: &Frame, y: usize) -> Option<DecodeCandidate> {
    let row = frame.row(y);
    let runs = binarize(row)?;
    let band = (frame.height / 20).max(1) as f32;

    if let Some((text, rates, x0, x1)) = scan_runs(&runs) {
        let locator = LocatorPolygon::rect(x0 as f32, y as f32 - band, x1 as f32, y as f32 + band);
        return Some(
            DecodeCandidate::new(text, Symbology::Ean13)
                .with_error_rates(rates)
                .with_locator(locator),
        );
    }

    // Upside down: mirror the runs and map pixel positions back
    let width = row.len();
    let mirrored: Vec<Run> = runs
        .iter()
        .rev()
        .map(|run| Run {
            dark: run.dark,
            start: width - (run.start + run.len),
            len: run.len,
        })
        .collect();

    let (text, rates, x0, x1) = scan_runs(&mirrored)?;
    let (x0, x1) = (width - x1, width - x0);
    let locator = LocatorPolygon::rect(x0 as f32, y as f32 - band, x1 as f32, y as f32 + band);
    Some(
        DecodeCandidate::new(text, Symbology::Ean13)
            .with_error_rates(rates)
            .with_locator(locator),
    )
}

/// Threshold at the midpoint of the row's range and collapse into runs.
fn binarize(row: &[u8]) -> Option<Vec<Run>> {
    let min = row.iter().copied().min()?;
    let max = row.iter().copied().max()?;
    if max - min < MIN_CONTRAST {
        return None;
    }

    let mid = ((min as u16 + max as u16) / 2) as u8;
    let mut runs: Vec<Run> = Vec::new();

    for (x, &px) in row.iter().enumerate() {
        let dark = px < mid;
        match runs.last_mut() {
            Some(run) if run.dark == dark => run.len += 1,
            _ => runs.push(Run { dark, start: x, len: 1 }),
        }
    }

    Some(runs)
}

/// Try every dark run as a start guard. Returns text, per-digit error
/// rates and the pixel span of the symbol.
fn scan_runs(runs: &[Run]) -> Option<(String, Vec<f64>, usize, usize)> {
    if runs.len() < RUNS_PER_SYMBOL {
        return None;
    }

    for start in 0..=runs.len() - RUNS_PER_SYMBOL {
        if !runs[start].dark {
            continue;
        }
        if let Some(decoded) = decode_symbol(&runs[start..start + RUNS_PER_SYMBOL]) {
            let last = &runs[start + RUNS_PER_SYMBOL - 1];
            return Some((decoded.0, decoded.1, runs[start].start, last.start + last.len));
        }
    }

    None
}

fn decode_symbol(runs: &[Run]) -> Option<(String, Vec<f64>)> {
    let total: usize = runs.iter().map(|run| run.len).sum();
    let unit = total as f64 / MODULES_PER_SYMBOL;

    // Guard bars and spaces are one module wide
    let guards = runs[0..3].iter().chain(&runs[27..32]).chain(&runs[56..59]);
    for run in guards {
        let modules = run.len as f64 / unit;
        if !(0.5..=1.5).contains(&modules) {
            return None;
        }
    }

    let mut digits = Vec::with_capacity(13);
    let mut rates = Vec::with_capacity(12);
    let mut parity = 0u8;

    for i in 0..6 {
        let widths = &runs[3 + i * 4..7 + i * 4];
        let (digit, is_g, rate) = match_digit(widths, true)?;
        digits.push(digit);
        rates.push(rate);
        parity = (parity << 1) | u8::from(is_g);
    }

    for i in 0..6 {
        let widths = &runs[32 + i * 4..36 + i * 4];
        let (digit, _, rate) = match_digit(widths, false)?;
        digits.push(digit);
        rates.push(rate);
    }

    let first = FIRST_DIGIT_PARITY.iter().position(|&p| p == parity)? as u8;
    digits.insert(0, first);

    if !checksum_valid(&digits) {
        return None;
    }

    let text = digits.iter().map(|d| char::from(b'0' + d)).collect();
    Some((text, rates))
}

/// Best pattern for four runs. Left-half digits may be L or G coded.
fn match_digit(runs: &[Run], left: bool) -> Option<(u8, bool, f64)> {
    let total: usize = runs.iter().map(|run| run.len).sum();
    let scale = 7.0 / total as f64;
    let measured: Vec<f64> = runs.iter().map(|run| run.len as f64 * scale).collect();

    let mut best: Option<(u8, bool, f64)> = None;
    let tables: &[(&[[u8; 4]; 10], bool)] = if left {
        &[(&L_WIDTHS, false), (&G_WIDTHS, true)]
    } else {
        &[(&L_WIDTHS, false)]
    };

    for (table, is_g) in tables {
        for (digit, pattern) in table.iter().enumerate() {
            let distance: f64 = measured
                .iter()
                .zip(pattern.iter())
                .map(|(m, &p)| (m - p as f64).abs())
                .sum();
            if best.is_none_or(|(_, _, d)| distance < d) {
                best = Some((digit as u8, *is_g, distance));
            }
        }
    }

    let (digit, is_g, distance) = best?;
    if distance > MAX_DIGIT_DISTANCE {
        return None;
    }

    Some((digit, is_g, (distance / 7.0).clamp(0.0, 1.0)))
}

fn checksum_valid(digits: &[u8]) -> bool {
    digits.len() == 13 && check_digit(&digits[..12]) == digits[12]
}

fn check_digit(digits: &[u8]) -> u8 {
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, &d)| d as u32 * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

/// Bar pattern for a 13-digit EAN-13 code, one entry per module
/// (`true` = bar). Returns `None` for malformed input or a bad check digit.
pub fn encode_modules(code: &str) -> Option<Vec<bool>> {
    let digits: Vec<u8> = code
        .chars()
        .map(|c| c.to_digit(10).map(|d| d as u8))
        .collect::<Option<_>>()?;
    if !checksum_valid(&digits) {
        return None;
    }

    let mut modules = Vec::with_capacity(95);
    let push_widths = |modules: &mut Vec<bool>, widths: &[u8], first_bar: bool| {
        let mut bar = first_bar;
        for &width in widths {
            modules.extend(std::iter::repeat_n(bar, width as usize));
            bar = !bar;
        }
    };

    push_widths(&mut modules, &[1, 1, 1], true);

    let parity = FIRST_DIGIT_PARITY[digits[0] as usize];
    for (i, &digit) in digits[1..7].iter().enumerate() {
        let is_g = parity & (1 << (5 - i)) != 0;
        let widths = if is_g { &G_WIDTHS[digit as usize] } else { &L_WIDTHS[digit as usize] };
        push_widths(&mut modules, widths, false);
    }

    push_widths(&mut modules, &[1, 1, 1, 1, 1], false);

    for &digit in &digits[7..] {
        push_widths(&mut modules, &L_WIDTHS[digit as usize], true);
    }

    push_widths(&mut modules, &[1, 1, 1], true);

    Some(modules)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODE: &str = "4006381333931";

    /// Render `modules` into a frame with `px` pixels per module and a
    /// 10-module quiet zone on each side.
    fn render(modules: &[bool], px: usize, mirrored: bool) -> Frame {
        let quiet = 10 * px;
        let width = modules.len() * px + 2 * quiet;
        let height = 40;
        let mut luma = vec![230u8; width * height];

        for y in 0..height {
            for (m, &bar) in modules.iter().enumerate() {
                if !bar {
                    continue;
                }
                for dx in 0..px {
                    let mut x = quiet + m * px + dx;
                    if mirrored {
                        x = width - 1 - x;
                    }
                    luma[y * width + x] = 20;
                }
            }
        }

        Frame::new(0, width, height, luma)
    }

    #[test]
    fn test_encode_has_95_modules() {
        let modules = encode_modules(CODE).unwrap();
        assert_eq!(modules.len(), 95);
        assert_eq!(&modules[..3], &[true, false, true]);
        assert_eq!(&modules[92..], &[true, false, true]);
    }

    #[test]
    fn test_encode_rejects_bad_check_digit() {
        assert!(encode_modules("4006381333932").is_none());
        assert!(encode_modules("40063813339").is_none());
        assert!(encode_modules("400638133393A").is_none());
    }

    #[test]
    fn test_decodes_clean_symbol() {
        let frame = render(&encode_modules(CODE).unwrap(), 3, false);
        let candidates = Ean13Engine::new().decode(&frame);

        assert_eq!(candidates.len(), 1);
        let candidate = &candidates[0];
        assert_eq!(candidate.raw_text, CODE);
        assert_eq!(candidate.symbology, Symbology::Ean13);
        assert_eq!(candidate.per_module_error_rates.len(), 12);
        assert!(candidate.per_module_error_rates.iter().all(|&r| r < 0.01));
        assert!(candidate.locator.is_some());
    }

    #[test]
    fn test_decodes_upside_down_symbol() {
        let frame = render(&encode_modules(CODE).unwrap(), 2, true);
        let candidates = Ean13Engine::new().decode(&frame);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].raw_text, CODE);
    }

    #[test]
    fn test_decodes_code_with_even_parity_digits() {
        let code = "5901234123457";
        let frame = render(&encode_modules(code).unwrap(), 2, false);
        let candidates = Ean13Engine::new().decode(&frame);
        assert_eq!(candidates[0].raw_text, code);
    }

    #[test]
    fn test_blank_frame_yields_nothing() {
        let frame = Frame::new(0, 320, 40, vec![128; 320 * 40]);
        assert!(Ean13Engine::new().decode(&frame).is_empty());
    }

    #[test]
    fn test_check_digit() {
        assert_eq!(check_digit(&[4, 0, 0, 6, 3, 8, 1, 3, 3, 3, 9, 3]), 1);
        assert_eq!(check_digit(&[5, 9, 0, 1, 2, 3, 4, 1, 2, 3, 4, 5]), 7);
    }
}
