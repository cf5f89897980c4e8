use adaptive_scan::Frame;
use adaptive_scan::strategy::{build_candidates, catalogue};
use adaptive_scan::tools::{dataset_iter, dataset_root_from_env, load_frame};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::time::Instant;

/// First dataset image when one is available, a synthetic frame otherwise
fn sample_frame() -> Arc<Frame> {
    let root = dataset_root_from_env();
    if let Some(frame) = dataset_iter(&root, Some(1)).find_map(|path| load_frame(path).ok()) {
        return Arc::new(frame);
    }
    let (width, height) = (640u32, 480u32);
    let mut luma = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            luma.push(if (x / 16 + y / 16) % 2 == 0 { 30 } else { 220 });
        }
    }
    Arc::new(Frame::from_luma(width, height, &luma, Instant::now()).unwrap())
}

fn bench_fan_out(c: &mut Criterion) {
    let frame = sample_frame();
    let mut group = c.benchmark_group("build_candidates");
    for id in catalogue::BUILTIN_IDS {
        let Some(strategy) = catalogue::builtin(id) else {
            continue;
        };
        group.bench_function(*id, |b| {
            b.iter(|| build_candidates(black_box(&strategy), black_box(&frame)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fan_out);
criterion_main!(benches);
