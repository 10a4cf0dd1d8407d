//! Benchmarks for slot writes and reassembly

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use athos_core::*;
use athos_engine::{assemble, UploadSession};

const CHUNK_SIZE: usize = 4 * 1024 * 1024;
const CHUNK_COUNTS: &[u32] = &[1, 3, 7];

fn filled_session(chunks: u32) -> UploadSession {
    let mut session = UploadSession::new(
        SessionId::new("bench").unwrap(),
        chunks,
        UploadMetadata::new("bench.bin", OwnerRecordId::new("bench").unwrap()),
    );
    let data = Bytes::from(vec![42u8; CHUNK_SIZE]);
    for index in (0..chunks).rev() {
        session.write_slot(index, data.clone(), u64::MAX).unwrap();
    }
    session
}

fn bench_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");

    for &chunks in CHUNK_COUNTS {
        let session = filled_session(chunks);
        group.throughput(Throughput::Bytes(chunks as u64 * CHUNK_SIZE as u64));
        group.bench_with_input(BenchmarkId::from_parameter(chunks), &session, |b, session| {
            b.iter(|| black_box(assemble(session).unwrap()));
        });
    }

    group.finish();
}

fn bench_write_slot(c: &mut Criterion) {
    let data = Bytes::from(vec![7u8; CHUNK_SIZE]);

    c.bench_function("write_slot_overwrite", |b| {
        let mut session = UploadSession::new(
            SessionId::new("bench").unwrap(),
            2,
            UploadMetadata::new("bench.bin", OwnerRecordId::new("bench").unwrap()),
        );
        b.iter(|| black_box(session.write_slot(0, data.clone(), u64::MAX).unwrap()));
    });
}

fn bench_checksum(c: &mut Criterion) {
    let session = filled_session(3);
    let data = assemble(&session).unwrap();
    let expected = ContentHash::new(&data);

    let mut group = c.benchmark_group("verify_checksum");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("blake3_12mib", |b| {
        b.iter(|| athos_engine::verify_checksum(black_box(&data), &expected).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_assemble, bench_write_slot, bench_checksum);
criterion_main!(benches);
