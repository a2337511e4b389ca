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

//! Shared query and configuration types
//!
//! `QueryParams` is a plain value: strategies that need a modified copy
//! (e.g. the center search of the three-split strategy forcing
//! `final_beam_multiply = 1`) clone it locally and never mutate the
//! caller's object.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Scalar filter attribute attached to each point.
///
/// Total order is assumed; NaN handling is the caller's responsibility.
pub trait FilterValue: PartialOrd + Copy + Send + Sync + fmt::Display {}

impl<T: PartialOrd + Copy + Send + Sync + fmt::Display> FilterValue for T {}

/// Inclusive filter interval `[lo, hi]` attached to a query
pub type FilterRange<F> = (F, F);

/// Build-time configuration for the range filter tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Bucket width of the finest pyramid level. Level `j` has width
    /// `cutoff * 2^j`.
    pub cutoff: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self { cutoff: 1000 }
    }
}

impl TreeConfig {
    /// Create config with a custom finest bucket width
    pub fn with_cutoff(cutoff: usize) -> Self {
        Self { cutoff }
    }
}

/// Per-query search parameters, forwarded to sub-indices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryParams {
    /// Result count per query
    pub k: usize,
    /// Base beam width for graph traversal
    pub beam_size: usize,
    /// Frontier pruning multiplier: candidates farther than `cut` times the
    /// current k-th best distance are not expanded
    pub cut: f32,
    /// Maximum nodes visited per graph search
    pub limit: usize,
    /// Maximum neighbors expanded per visited node
    pub degree_limit: usize,
    /// Multiplier applied to `beam_size` before the first search pass.
    /// Overridden to 1 for the center search of the three-split strategy.
    pub final_beam_multiply: usize,
    /// Upper bound on the beam during postfilter beam doubling
    pub postfiltering_max_beam: usize,
    /// Optional looseness threshold for the optimized-postfilter strategy:
    /// if the containing bucket is more than this many times larger than the
    /// query window, fall back to the fenwick strategy
    pub min_query_to_bucket_ratio: Option<f32>,
    /// Emit per-query plan diagnostics
    pub verbose: bool,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            k: 10,
            beam_size: 100,
            cut: 1.35,
            limit: 10_000,
            degree_limit: 64,
            final_beam_multiply: 2,
            postfiltering_max_beam: 8192,
            min_query_to_bucket_ratio: None,
            verbose: false,
        }
    }
}

impl QueryParams {
    /// Create params for a specific k
    pub fn with_k(k: usize) -> Self {
        Self {
            k,
            beam_size: k.max(100),
            ..Default::default()
        }
    }
}

/// Query routing strategy, selected per batch by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStrategy {
    /// Cover the eligible window with O(log n) aligned buckets, brute-force
    /// the residues at both ends
    FenwickTree,
    /// Delegate to the single smallest bucket containing the window and rely
    /// on its in-bucket postfiltering
    OptimizedPostfilter,
    /// Search the largest contained bucket with a tightened beam, recurse on
    /// the left and right remainders
    ThreeSplit,
}

impl FromStr for SearchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fenwick_tree" => Ok(Self::FenwickTree),
            "optimized_postfilter" => Ok(Self::OptimizedPostfilter),
            "three_split" => Ok(Self::ThreeSplit),
            other => Err(format!("unknown search strategy: {other}")),
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FenwickTree => "fenwick_tree",
            Self::OptimizedPostfilter => "optimized_postfilter",
            Self::ThreeSplit => "three_split",
        };
        f.write_str(name)
    }
}

/// A single search hit: point id plus squared distance to the query.
///
/// Inside the planner the id is in sorted coordinate space; the batch driver
/// remaps to the caller's original ids before returning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: u32,
    pub distance: f32,
}

impl Neighbor {
    pub fn new(id: u32, distance: f32) -> Self {
        Self { id, distance }
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    /// Distance ascending, ties broken by ascending id. Distances are sums
    /// of squares and therefore never NaN, so `total_cmp` agrees with the
    /// arithmetic order.
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}
