use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;

use std::sync::Arc;
use basaltdb::storage::buffer::BufferPoolManager;

// Create temporary db for benchmarking
fn create_bench_buffer_pool(pool_size: usize) -> Arc<BufferPoolManager> {
    let temp_file = tempfile::NamedTempFile::new().unwrap();
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, temp_file.path()).unwrap());

    // Keep the temp file alive
    std::mem::forget(temp_file);

    buffer_pool
}

fn buffer_pool_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("BufferPool");

    for size in [16, 128, 1024].iter() {
        group.bench_with_input(
            BenchmarkId::new("sequential_fetch", size),
            size,
            |b, &size| {
                let buffer_pool = create_bench_buffer_pool(size);

                let mut page_ids = Vec::new();
                for i in 0..size {
                    let (page, page_id) = buffer_pool.new_page().unwrap();
                    page.write().data[0] = (i % 256) as u8;
                    buffer_pool.unpin_page(page_id, true).unwrap();
                    page_ids.push(page_id);
                }

                b.iter(|| {
                    for &page_id in &page_ids {
                        let page = buffer_pool.fetch_page(page_id).unwrap();
                        let _ = page.read().data[0];
                        buffer_pool.unpin_page(page_id, false).unwrap();
                    }
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("random_fetch_with_eviction", size),
            size,
            |b, &size| {
                let buffer_pool = create_bench_buffer_pool(size);

                // Twice as many pages as frames so fetches evict
                let mut page_ids = Vec::new();
                for _ in 0..size * 2 {
                    let (_, page_id) = buffer_pool.new_page().unwrap();
                    buffer_pool.unpin_page(page_id, true).unwrap();
                    page_ids.push(page_id);
                }

                let mut rng = StdRng::seed_from_u64(7);
                b.iter(|| {
                    let page_id = *page_ids.choose(&mut rng).unwrap();
                    let page = buffer_pool.fetch_page(page_id).unwrap();
                    let _ = page.read().data[0];
                    buffer_pool.unpin_page(page_id, false).unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, buffer_pool_benchmark);
criterion_main!(benches);
