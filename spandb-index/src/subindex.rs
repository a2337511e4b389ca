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

//! Per-bucket sub-index contract
//!
//! The range filter tree treats each bucket's ANN index as an opaque
//! collaborator behind this trait. The tree is monomorphized over the
//! implementation; per-query cost dominates either way.

use spandb_core::{FilterRange, FilterValue, Neighbor, QueryParams};

use crate::store::SubsetView;

/// An approximate kNN index over one bucket of filter-sorted points.
///
/// `filters` passed at build time is the bucket's slice of the tree's
/// non-decreasing filter array, so implementations may binary-search it.
///
/// `query` returns up to `qp.k` hits sorted by ascending distance (ties by
/// ascending id), with ids in the tree's **sorted coordinate space** — the
/// subset view does the translation. Results honor `range` within the
/// bucket's own population, using the tree's boundary convention: a point is
/// eligible iff `lo < value < hi` after resolution through
/// `[first_gt(lo), first_ge(hi))`.
pub trait SubIndex<F: FilterValue>: Send + Sync + Sized {
    /// Build the index from one bucket's points and filter values
    fn build(subset: SubsetView, filters: Vec<F>) -> Self;

    /// Bounded-range top-k query
    fn query(&self, query: &[f32], range: FilterRange<F>, qp: &QueryParams) -> Vec<Neighbor>;
}
