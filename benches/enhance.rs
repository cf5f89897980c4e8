use adaptive_scan::Frame;
use adaptive_scan::enhance::{
    ThresholdMode, binary_threshold, contrast_stretch, denoise_median, sharpen, to_grayscale,
};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::time::Instant;

/// Mid-gray frame with a soft horizontal ramp
fn ramp_frame(width: u32, height: u32) -> Frame {
    let mut luma = Vec::with_capacity((width * height) as usize);
    for _ in 0..height {
        for x in 0..width {
            luma.push((64 + x * 128 / width) as u8);
        }
    }
    Frame::from_luma(width, height, &luma, Instant::now()).unwrap()
}

fn bench_grayscale_640x480(c: &mut Criterion) {
    let frame = ramp_frame(640, 480);
    c.bench_function("to_grayscale_640x480", |b| {
        b.iter(|| to_grayscale(black_box(&frame)))
    });
}

fn bench_contrast_640x480(c: &mut Criterion) {
    let frame = ramp_frame(640, 480);
    c.bench_function("contrast_stretch_640x480", |b| {
        b.iter(|| contrast_stretch(black_box(&frame), black_box(1.8)))
    });
}

fn bench_sharpen_640x480(c: &mut Criterion) {
    let frame = ramp_frame(640, 480);
    c.bench_function("sharpen_640x480", |b| b.iter(|| sharpen(black_box(&frame))));
}

fn bench_denoise_640x480(c: &mut Criterion) {
    let frame = ramp_frame(640, 480);
    c.bench_function("denoise_median_640x480", |b| {
        b.iter(|| denoise_median(black_box(&frame)))
    });
}

fn bench_threshold_global_1280x720(c: &mut Criterion) {
    let frame = ramp_frame(1280, 720);
    c.bench_function("threshold_global_1280x720", |b| {
        b.iter(|| binary_threshold(black_box(&frame), ThresholdMode::Global))
    });
}

fn bench_threshold_adaptive_1280x720(c: &mut Criterion) {
    let frame = ramp_frame(1280, 720);
    c.bench_function("threshold_adaptive_1280x720", |b| {
        b.iter(|| binary_threshold(black_box(&frame), ThresholdMode::adaptive()))
    });
}

criterion_group!(
    benches,
    bench_grayscale_640x480,
    bench_contrast_640x480,
    bench_sharpen_640x480,
    bench_denoise_640x480,
    bench_threshold_global_1280x720,
    bench_threshold_adaptive_1280x720
);
criterion_main!(benches);
