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

//! SpanDB Index Layer
//!
//! Range-filtered approximate nearest-neighbor search over a static vector
//! collection. Each point carries a scalar filter value; a query supplies a
//! vector, an inclusive filter interval and a count `k`, and gets back the
//! `k` nearest eligible points.
//!
//! ## Architecture
//!
//! The hard problem is serving an *arbitrary* filter interval without
//! building an index per interval. The range filter tree solves it with a
//! multi-resolution pyramid over filter-sorted points:
//!
//! - **SortedLayout** (`layout`): one-time stable sort by filter value, with
//!   the permutation kept for result remapping.
//! - **BucketPyramid** (`pyramid`): geometric family of contiguous buckets
//!   (width `cutoff * 2^j`), one sub-index per bucket, built in parallel.
//! - **RangeFilterTree** (`tree`): per-query planning — cover the eligible
//!   window with O(log n) aligned buckets (`fenwick_tree`), delegate to the
//!   one containing bucket (`optimized_postfilter`), or split into a center
//!   bucket plus two recursive remainders (`three_split`).
//!
//! ## Sub-indices
//!
//! Buckets are searched through the `SubIndex` trait:
//!
//! - **PrefilterIndex** (`prefilter`): resolves the eligible slice by binary
//!   search and scans it exactly. The default.
//! - **VamanaIndex** (`vamana`): DiskANN-style graph with postfilter beam
//!   doubling, for buckets large enough that scans hurt.

pub mod layout;
pub mod prefilter;
pub mod pyramid;
pub mod store;
pub mod subindex;
pub mod tree;
pub mod vamana;

pub use layout::SortedLayout;
pub use prefilter::PrefilterIndex;
pub use pyramid::{BucketPyramid, PyramidStats};
pub use store::{PointSet, SubsetView, l2_squared};
pub use subindex::SubIndex;
pub use tree::{FenwickPlan, RangeFilterTree, TreeStats};
pub use vamana::VamanaIndex;

// the shared value types travel with the index API
pub use spandb_core::{
    FilterRange, FilterValue, Neighbor, QueryParams, Result, SearchStrategy, SpanDBError,
    TreeConfig,
};
