// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Range filter tree benchmarks
//!
//! Measures build throughput and filtered batch search latency across the
//! three query strategies.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use spandb_index::{QueryParams, RangeFilterTree, SearchStrategy, TreeConfig};

const DIM: usize = 32;

fn random_points(n: usize, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((n, DIM), |_| rng.gen_range(-1.0..1.0))
}

fn random_filters(n: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(0.0..1000.0)).collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_build");
    group.sample_size(10);

    for size in [10_000, 50_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let points = random_points(size, 1);
            let filters = random_filters(size, 2);

            b.iter(|| {
                let tree: RangeFilterTree<f32> = RangeFilterTree::build(
                    points.view(),
                    &filters,
                    TreeConfig::with_cutoff(500),
                )
                .unwrap();
                black_box(tree);
            });
        });
    }

    group.finish();
}

fn bench_batch_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_batch_search");

    let n = 50_000;
    let points = random_points(n, 1);
    let filters = random_filters(n, 2);
    let tree: RangeFilterTree<f32> =
        RangeFilterTree::build(points.view(), &filters, TreeConfig::with_cutoff(500)).unwrap();

    let num_queries = 64;
    let queries = random_points(num_queries, 3);
    let mut rng = StdRng::seed_from_u64(4);
    let ranges: Vec<(f32, f32)> = (0..num_queries)
        .map(|_| {
            let lo = rng.gen_range(0.0..900.0);
            (lo, lo + rng.gen_range(10.0..100.0))
        })
        .collect();

    let qp = QueryParams::with_k(10);
    for strategy in [
        SearchStrategy::FenwickTree,
        SearchStrategy::OptimizedPostfilter,
        SearchStrategy::ThreeSplit,
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(strategy),
            &strategy,
            |b, &strategy| {
                b.iter(|| {
                    let out = tree
                        .batch_search(queries.view(), &ranges, strategy, &qp)
                        .unwrap();
                    black_box(out);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_build, bench_batch_search);
criterion_main!(benches);
