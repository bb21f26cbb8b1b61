//! Ring buffer throughput: one render quantum in, one out

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use radio_audio_streamer::audio::ring_buffer;

fn bench_transfer(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer");

    for quantum in [128usize, 1024] {
        let (mut writer, mut reader) = ring_buffer(24_000).unwrap();
        let input = vec![0.25f32; quantum];
        let mut output = vec![0.0f32; quantum];

        group.throughput(Throughput::Elements(quantum as u64));
        group.bench_function(format!("write_read_{}", quantum), |b| {
            b.iter(|| {
                assert!(writer.write(black_box(&input)));
                assert!(reader.read(black_box(&mut output)));
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_transfer);
criterion_main!(benches);
