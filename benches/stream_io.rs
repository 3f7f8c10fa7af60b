//! Benchmarks for document reads and writes in both stores

use compound_rs::Filesystem;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::Read;

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_write");

    for size in [100usize, 4000, 64 * 1024, 1024 * 1024] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let data = vec![0xAB; size];
            b.iter(|| {
                let mut fs = Filesystem::new().unwrap();
                let root = fs.root();
                fs.create_document(root, "Doc", black_box(&data)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_read");

    for size in [100usize, 4000, 64 * 1024, 1024 * 1024] {
        let mut fs = Filesystem::new().unwrap();
        let root = fs.root();
        let id = fs.create_document(root, "Doc", &vec![0xCD; size]).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("whole", size), &size, |b, _| {
            b.iter(|| black_box(fs.read_document(id).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("streaming", size), &size, |b, _| {
            let mut buf = [0u8; 1024];
            b.iter(|| {
                let mut reader = fs.document_reader(id).unwrap();
                while reader.read(&mut buf).unwrap() > 0 {}
            });
        });
    }

    group.finish();
}

fn bench_update_across_cutoff(c: &mut Criterion) {
    let mut fs = Filesystem::new().unwrap();
    let root = fs.root();
    let id = fs.create_document(root, "Doc", &[1u8; 4000]).unwrap();
    let small = vec![2u8; 4000];
    let large = vec![3u8; 5000];

    c.bench_function("update_migrate_round_trip", |b| {
        b.iter(|| {
            fs.update_document(id, black_box(&large)).unwrap();
            fs.update_document(id, black_box(&small)).unwrap();
        });
    });
}

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("save");

    let mut fs = Filesystem::new().unwrap();
    let root = fs.root();
    for i in 0..200 {
        fs.create_document(root, &format!("Doc{}", i), &vec![i as u8; (i * 97) % 9000])
            .unwrap();
    }

    group.bench_function("flush_in_place", |b| {
        b.iter(|| fs.flush().unwrap());
    });
    group.bench_function("write_compacted", |b| {
        b.iter(|| {
            let mut sink = Vec::new();
            fs.write_to(&mut sink).unwrap();
            black_box(sink)
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_write,
    bench_read,
    bench_update_across_cutoff,
    bench_save
);
criterion_main!(benches);
