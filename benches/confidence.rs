use criterion::{Criterion, criterion_group, criterion_main};
use locus::models::{DecodeCandidate, Frame, Symbology, default_symbologies};
use locus::services::decoder::ean13::encode_modules;
use locus::services::{ConfidenceFilter, DEFAULT_CONFIDENCE_THRESHOLD, Ean13Engine, SymbolEngine};
use std::hint::black_box;

/// EAN-13 symbol at 3 px per module on a 640x120 frame.
fn symbol_frame() -> Frame {
    let modules = encode_modules("4006381333931").expect("valid EAN-13");
    let (width, height, px) = (640usize, 120usize, 3usize);
    let left = (width - modules.len() * px) / 2;
    let mut luma = vec![225u8; width * height];

    for y in 0..height {
        for (m, &bar) in modules.iter().enumerate() {
            if bar {
                let x = left + m * px;
                luma[y * width + x..y * width + x + px].fill(25);
            }
        }
    }

    Frame::new(0, width, height, luma)
}

fn bench_confidence_filter(c: &mut Criterion) {
    let filter = ConfidenceFilter::new(DEFAULT_CONFIDENCE_THRESHOLD, default_symbologies());
    let clean = DecodeCandidate::new("4006381333931", Symbology::Ean13)
        .with_error_rates(vec![0.02; 95]);
    let noisy = DecodeCandidate::new("4006381333931", Symbology::Ean13)
        .with_error_rates((0..95).map(|i| (i % 7) as f64 * 0.05).collect());

    c.bench_function("confidence_evaluate_clean", |b| {
        b.iter(|| filter.evaluate(black_box(&clean)))
    });

    c.bench_function("confidence_evaluate_noisy", |b| {
        b.iter(|| filter.evaluate(black_box(&noisy)))
    });
}

fn bench_ean13_decode(c: &mut Criterion) {
    let engine = Ean13Engine::new();
    let frame = symbol_frame();
    let blank = Frame::new(0, 640, 120, vec![128u8; 640 * 120]);

    c.bench_function("ean13_decode_640x120", |b| {
        b.iter(|| engine.decode(black_box(&frame)))
    });

    c.bench_function("ean13_decode_blank_640x120", |b| {
        b.iter(|| engine.decode(black_box(&blank)))
    });
}

criterion_group!(benches, bench_confidence_filter, bench_ean13_decode);
criterion_main!(benches);
