//! Benchmarks for the hot paths of the first/rewrite passes: tag
//! classification at scale and the id-set containers the filter pass
//! leans on for every way/relation in a planet-scale extract. Mirrors
//! the "skip if the real-world fixture isn't present" shape of the
//! teacher's `backend/benches/graph_generation.rs` for the one
//! benchmark that needs actual rasters on disk.

use std::path::PathBuf;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use osm_transform::elevation::ElevationService;
use osm_transform::idset::IdSetDense;
use osm_transform::tags::{compile_removal_regex, has_no_relevant_tags, DEFAULT_REMOVE_TAG_REGEX};

fn sample_tags(n: usize) -> Vec<(String, String)> {
    (0..n)
        .map(|i| match i % 5 {
            0 => ("highway".to_string(), "residential".to_string()),
            1 => ("source".to_string(), "survey".to_string()),
            2 => (format!("name:{i}"), "foo".to_string()),
            3 => ("building".to_string(), "yes".to_string()),
            _ => (format!("k{i}"), format!("v{i}")),
        })
        .collect()
}

fn benchmark_tag_classification(c: &mut Criterion) {
    let removal = compile_removal_regex(DEFAULT_REMOVE_TAG_REGEX).unwrap();
    let mut group = c.benchmark_group("has_no_relevant_tags");

    for n in [4usize, 16, 64] {
        let tags = sample_tags(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &tags, |b, tags| {
            b.iter(|| has_no_relevant_tags(black_box(tags), black_box(&removal)));
        });
    }
    group.finish();
}

fn benchmark_id_set_dense(c: &mut Criterion) {
    let mut group = c.benchmark_group("id_set_dense");

    group.bench_function("insert_1m_sequential", |b| {
        b.iter(|| {
            let mut set = IdSetDense::new();
            for id in 0..1_000_000i64 {
                set.set(black_box(id));
            }
            set
        });
    });

    let mut populated = IdSetDense::new();
    for id in (0..1_000_000i64).step_by(3) {
        populated.set(id);
    }
    group.bench_function("lookup_1m_sparse", |b| {
        b.iter(|| {
            let mut hits = 0u64;
            for id in 0..1_000_000i64 {
                if populated.get(black_box(id)) {
                    hits += 1;
                }
            }
            hits
        });
    });

    group.finish();
}

/// Exercises `ElevationService::load`'s directory walk + R-tree build
/// against real rasters when a benchmarking data set is checked out
/// locally; skipped otherwise, matching the teacher's
/// `benchmark_partial_graph_generation` guard.
fn benchmark_elevation_load(c: &mut Criterion) {
    let tiff_dir = PathBuf::from("data/tiffs");
    if !tiff_dir.exists() {
        eprintln!("Skipping elevation_load benchmark: no rasters at {tiff_dir:?}");
        return;
    }

    c.bench_function("elevation_service_load", |b| {
        b.iter(|| {
            let mut service = ElevationService::new(1_073_741_824);
            service.load(black_box(std::slice::from_ref(&tiff_dir))).unwrap();
            service
        });
    });
}

criterion_group!(
    benches,
    benchmark_tag_classification,
    benchmark_id_set_dense,
    benchmark_elevation_load
);
criterion_main!(benches);
