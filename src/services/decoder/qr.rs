//! QR engine backed by `rqrr`.
//!
//! Reed-Solomon correction already validates the payload, so candidates
//! carry no per-module error rates and always pass the confidence filter.

use super::SymbolEngine;
use crate::models::{DecodeCandidate, Frame, LocatorPolygon, Point, Symbology};

#[derive(Debug, Default)]
pub struct QrEngine;

impl QrEngine {
    pub fn new() -> Self {
        Self
    }
}

impl SymbolEngine for QrEngine {
    fn name(&self) -> &'static str {
        "qr"
    }

    fn supports(&self, symbology: Symbology) -> bool {
        symbology == Symbology::Qr
    }

    fn decode(&self, frame: &Frame) -> Vec<DecodeCandidate> {
        let mut image = rqrr::PreparedImage::prepare_from_greyscale(frame.width, frame.height, |x, y| {
            frame.luma.get(y * frame.width + x).copied().unwrap_or(0)
        });

        image
            .detect_grids()
            .into_iter()
            .filter_map(|grid| {
                let bounds = grid.bounds;
                match grid.decode() {
                    Ok((meta, content)) => {
                        tracing::debug!(
                            "QR decoded: {} bytes, version {}, ECC {}",
                            content.len(),
                            meta.version.0,
                            meta.ecc_level
                        );
                        let corners = bounds.map(|p| Point::new(p.x as f32, p.y as f32));
                        Some(
                            DecodeCandidate::new(content, Symbology::Qr)
                                .with_locator(LocatorPolygon { corners }),
                        )
                    }
                    Err(e) => {
                        tracing::trace!("QR grid found but not decodable: {}", e);
                        None
                    }
                }
            })
            .collect()
    }
}
