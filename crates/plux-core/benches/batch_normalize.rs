//! Throughput of stacking and normalizing buffered frames
//!
//! A biosignalsplux hub at 8 channels and 2 kHz with `emit_at_once = 20`
//! builds 100 batches per second; this keeps an eye on the per-batch cost.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use plux_core::{Batch, FrameBuffer};

fn bench_batch_from_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_from_frames");

    for &frames in &[1usize, 20, 100] {
        for &channels in &[1usize, 7, 8] {
            let rows: Vec<Vec<i32>> = (0..frames)
                .map(|t| (0..channels).map(|ch| (t * 31 + ch * 7) as i32).collect())
                .collect();

            group.bench_with_input(
                BenchmarkId::new("normalized", format!("{}frames_{}ch", frames, channels)),
                &rows,
                |b, rows| {
                    b.iter(|| {
                        let batch = Batch::from_frames(black_box(rows)).unwrap();
                        black_box(batch.normalized())
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_buffer_push(c: &mut Criterion) {
    c.bench_function("frame_buffer_push_emit_20", |b| {
        let mut buffer = FrameBuffer::new(20);
        let frame = vec![32768; 8];
        b.iter(|| black_box(buffer.push(frame.clone())));
    });
}

criterion_group!(benches, bench_batch_from_frames, bench_buffer_push);
criterion_main!(benches);
