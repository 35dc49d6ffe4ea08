use std::hint::black_box;

use chx::common::{Chunk, ConnectionContext, ContentFormat, RawRecord};
use chx::envelope::EnvelopeBuilder;
use chx::publisher::publish;
use chx::readers::InMemoryReader;
use chx::sinks::{InMemorySink, SinkBackend};
use chx::stream::{ChunkStream, StreamSettings};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};

fn sample_record(i: usize) -> String {
    format!(
        "{{\"leader\":\"00714cam a2200205 a 4500\",\"fields\":[{{\"001\":\"in{i:08}\"}},{{\"245\":\"A title that is long enough to compress\"}}]}}"
    )
}

fn bench_envelope_build(c: &mut Criterion) {
    let builder = EnvelopeBuilder::new("bench-tenant");
    let mut group = c.benchmark_group("envelope_build");

    for batch_size in [1, 50, 500] {
        let records: Vec<RawRecord> = (0..batch_size)
            .map(|i| RawRecord::new(sample_record(i), Some(i as u64)))
            .collect();
        let chunk = Chunk::batch(records, ContentFormat::Json, batch_size as u64, batch_size as u64);

        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_function(format!("records_{batch_size}"), |b| {
            b.iter(|| builder.build(black_box(&chunk)).expect("envelope should build"));
        });
    }

    group.finish();
}

fn bench_stream_to_sink(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime should start");
    let mut group = c.benchmark_group("stream_to_sink");
    let total = 5_000usize;
    group.throughput(Throughput::Elements(total as u64));

    for in_flight in [1, 16] {
        group.bench_function(format!("in_flight_{in_flight}"), |b| {
            b.to_async(&runtime).iter(|| async move {
                let reader = InMemoryReader::new((0..total).map(sample_record), 50, ContentFormat::Json);
                let settings = StreamSettings::new("bench-job", "bench-topic", ConnectionContext::new("bench-tenant"))
                    .with_fanout_width(100)
                    .with_total_expected(total as u64);
                let stream = ChunkStream::spawn(&tokio::runtime::Handle::current(), reader, settings)
                    .expect("settings should be valid");
                publish(&stream, SinkBackend::InMemory(InMemorySink::new()), in_flight)
                    .await
                    .expect("publish should succeed")
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_envelope_build, bench_stream_to_sink);
criterion_main!(benches);
