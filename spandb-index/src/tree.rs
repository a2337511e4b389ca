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

//! Range filter tree: query planning and batch dispatch
//!
//! Three strategies route a filtered query to the bucket pyramid:
//!
//! - **fenwick_tree**: cover the eligible window with O(log n) aligned
//!   buckets drawn largest-first from the pyramid, brute-force the residue
//!   at both ends. Exact coverage, no overlap.
//! - **optimized_postfilter**: when the window sits inside one bucket of
//!   some level, delegate to that single sub-index and let its in-bucket
//!   postfiltering do the range work.
//! - **three_split**: search the largest aligned bucket inside the window
//!   with a tightened beam, then recurse on the left and right remainders
//!   through optimized_postfilter.
//!
//! All strategies work in sorted coordinate space; the batch driver remaps
//! to the caller's original point ids and sentinel-pads short rows.

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use tracing::debug;

use spandb_core::{
    FilterRange, FilterValue, Neighbor, QueryParams, Result, SearchStrategy, SpanDBError,
    TreeConfig,
};

use crate::layout::SortedLayout;
use crate::prefilter::PrefilterIndex;
use crate::pyramid::{BucketPyramid, PyramidStats};
use crate::subindex::SubIndex;

/// Sentinel id for unfilled result slots
const PAD_ID: u32 = 0;

/// The fenwick strategy's bucket selection for one query window.
///
/// `buckets` are (level, bucket) pairs whose spans lie fully inside the
/// window; `residues` are the sorted-id ranges left uncovered. Together
/// they partition the window exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenwickPlan {
    pub buckets: Vec<(usize, usize)>,
    pub residues: Vec<(usize, usize)>,
}

/// Build-shape summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeStats {
    pub num_points: usize,
    pub dim: usize,
    pub pyramid: PyramidStats,
}

/// Range-filtered approximate nearest-neighbor index.
///
/// Built once over a static point collection; immutable and lock-free
/// afterwards. Generic over the filter value type and the per-bucket
/// sub-index implementation.
pub struct RangeFilterTree<F: FilterValue, S: SubIndex<F> = PrefilterIndex<F>> {
    layout: SortedLayout<F>,
    pyramid: BucketPyramid<F, S>,
    cutoff: usize,
}

impl<F: FilterValue, S: SubIndex<F>> RangeFilterTree<F, S> {
    /// Sort the points by filter value and build the bucket pyramid.
    ///
    /// Fails on shape mismatches or degenerate parameters; a failed build
    /// leaves no partial index behind.
    pub fn build(
        points: ArrayView2<'_, f32>,
        filters: &[F],
        config: TreeConfig,
    ) -> Result<Self> {
        if config.cutoff == 0 {
            return Err(SpanDBError::Parameter("cutoff must be at least 1".into()));
        }
        let layout = SortedLayout::build(points, filters)?;
        let pyramid = BucketPyramid::build(&layout, config.cutoff);
        Ok(Self {
            layout,
            pyramid,
            cutoff: config.cutoff,
        })
    }

    pub fn len(&self) -> usize {
        self.layout.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.layout.dim()
    }

    /// Non-decreasing filter values in sorted coordinate space
    pub fn sorted_filter_values(&self) -> &[F] {
        self.layout.filter_values()
    }

    /// The sorted-to-original id permutation
    pub fn original_ids(&self) -> &[u32] {
        self.layout.original_ids()
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats {
            num_points: self.len(),
            dim: self.dim(),
            pyramid: self.pyramid.stats(),
        }
    }

    // ========================================================================
    // Single query
    // ========================================================================

    /// Top-k search for one query, results remapped to original point ids.
    pub fn search(
        &self,
        query: &[f32],
        range: FilterRange<F>,
        strategy: SearchStrategy,
        qp: &QueryParams,
    ) -> Result<Vec<Neighbor>> {
        if qp.k == 0 {
            return Err(SpanDBError::Parameter("k must be at least 1".into()));
        }
        if query.len() != self.dim() {
            return Err(SpanDBError::ShapeMismatch {
                context: "query vector",
                expected: self.dim(),
                actual: query.len(),
            });
        }

        let mut hits = self.search_sorted(query, range, strategy, qp);
        for hit in hits.iter_mut() {
            hit.id = self.layout.original_id(hit.id);
        }
        // re-establish the tie order in original-id space
        hits.sort_unstable();
        Ok(hits)
    }

    /// Strategy dispatch in sorted coordinate space
    fn search_sorted(
        &self,
        query: &[f32],
        range: FilterRange<F>,
        strategy: SearchStrategy,
        qp: &QueryParams,
    ) -> Vec<Neighbor> {
        match strategy {
            SearchStrategy::FenwickTree => self.fenwick_search(query, range, qp),
            SearchStrategy::OptimizedPostfilter => self.optimized_postfilter_search(query, range, qp),
            SearchStrategy::ThreeSplit => self.three_split_search(query, range, qp),
        }
    }

    // ========================================================================
    // fenwick_tree strategy
    // ========================================================================

    /// Select the aligned buckets covering `window`, largest level first.
    ///
    /// While nothing is covered yet, the first full-width bucket lying
    /// inside the window seeds the covered range; afterwards each level may
    /// extend coverage by one bucket per side wherever the remaining gap
    /// exceeds that level's width. What the buckets leave uncovered comes
    /// back as residue ranges for the brute-force pass.
    pub fn fenwick_plan(&self, window: (usize, usize)) -> FenwickPlan {
        let (start, end) = window;
        debug_assert!(start < end);

        let mut buckets = Vec::new();
        let mut covered: Option<(usize, usize)> = None;

        for level in (0..self.pyramid.num_levels()).rev() {
            let w = self.pyramid.width(level);

            if covered.is_none() {
                for bucket in start / w..end / w {
                    let bucket_start = bucket * w;
                    let bucket_end = bucket_start + w;
                    if bucket_start >= start && bucket_end <= end {
                        buckets.push((level, bucket));
                        covered = Some((bucket_start, bucket_end));
                        break;
                    }
                }
            }

            let Some((mut c_lo, mut c_hi)) = covered else {
                continue;
            };
            if c_lo - start > w {
                c_lo -= w;
                buckets.push((level, c_lo / w));
            }
            if end - c_hi > w {
                buckets.push((level, c_hi / w));
                c_hi += w;
            }
            covered = Some((c_lo, c_hi));
        }

        let residues = match covered {
            None => vec![(start, end)],
            Some((c_lo, c_hi)) => {
                let mut ranges = Vec::new();
                if start < c_lo {
                    ranges.push((start, c_lo));
                }
                if c_hi < end {
                    ranges.push((c_hi, end));
                }
                ranges
            }
        };

        FenwickPlan { buckets, residues }
    }

    fn fenwick_search(
        &self,
        query: &[f32],
        range: FilterRange<F>,
        qp: &QueryParams,
    ) -> Vec<Neighbor> {
        let Some(window) = self.layout.window(&range) else {
            return Vec::new();
        };

        let plan = self.fenwick_plan(window);
        if qp.verbose {
            debug!(
                "fenwick window [{}, {}): {} buckets, {} residue ranges",
                window.0,
                window.1,
                plan.buckets.len(),
                plan.residues.len()
            );
        }

        let mut frontier = Vec::new();
        for &(level, bucket) in &plan.buckets {
            frontier.extend(self.pyramid.get(level, bucket).query(query, range, qp));
        }

        let points = self.layout.points();
        for &(res_start, res_end) in &plan.residues {
            for i in res_start..res_end {
                frontier.push(Neighbor::new(i as u32, points.distance(i, query)));
            }
        }

        frontier.sort_unstable();
        frontier.truncate(qp.k);
        frontier
    }

    // ========================================================================
    // optimized_postfilter strategy
    // ========================================================================

    fn optimized_postfilter_search(
        &self,
        query: &[f32],
        range: FilterRange<F>,
        qp: &QueryParams,
    ) -> Vec<Neighbor> {
        let Some((start, end)) = self.layout.window(&range) else {
            return Vec::new();
        };

        // tiny windows gain nothing from a containing bucket
        if 4 * (end - start) < self.cutoff {
            return self.fenwick_search(query, range, qp);
        }

        // smallest level whose single bucket contains the window; the
        // coarsest level spans everything, so this always resolves
        let containing = (0..self.pyramid.num_levels()).find_map(|level| {
            let w = self.pyramid.width(level);
            (start / w == (end - 1) / w).then_some((level, start / w))
        });
        let Some((level, bucket)) = containing else {
            return self.fenwick_search(query, range, qp);
        };

        let w = self.pyramid.width(level);
        if qp.verbose {
            debug!(
                "postfilter window [{start}, {end}): containing bucket (level {level}, \
                 width {w}) spans [{}, {})",
                bucket * w,
                bucket * w + w
            );
        }

        let ratio = w as f32 / (end - start) as f32;
        if let Some(min_ratio) = qp.min_query_to_bucket_ratio
            && ratio > min_ratio
        {
            return self.fenwick_search(query, range, qp);
        }

        self.pyramid.get(level, bucket).query(query, range, qp)
    }

    // ========================================================================
    // three_split strategy
    // ========================================================================

    /// Largest aligned bucket fully inside the window, if any.
    ///
    /// Unlike the fenwick seed, the short last bucket of a level counts
    /// here: its span is clamped to `n`.
    fn largest_contained_bucket(&self, window: (usize, usize)) -> Option<(usize, usize)> {
        let (start, end) = window;
        let n = self.len();
        for level in (0..self.pyramid.num_levels()).rev() {
            let w = self.pyramid.width(level);
            for bucket in start / w..end / w {
                let bucket_start = bucket * w;
                let bucket_end = (bucket_start + w).min(n);
                if bucket_start >= start && bucket_end <= end {
                    return Some((level, bucket));
                }
            }
        }
        None
    }

    fn three_split_search(
        &self,
        query: &[f32],
        range: FilterRange<F>,
        qp: &QueryParams,
    ) -> Vec<Neighbor> {
        let Some((start, end)) = self.layout.window(&range) else {
            return Vec::new();
        };

        let Some((level, bucket)) = self.largest_contained_bucket((start, end)) else {
            return self.fenwick_search(query, range, qp);
        };

        // the center slice holds most of the answer; don't dilate the beam
        let mut center_qp = qp.clone();
        center_qp.final_beam_multiply = 1;

        let mut frontier = self.pyramid.get(level, bucket).query(query, range, &center_qp);

        let w = self.pyramid.width(level);
        let mid_lo = bucket * w;
        let mid_hi = (mid_lo + w).min(self.len());
        if qp.verbose {
            debug!(
                "three_split window [{start}, {end}): center (level {level}, bucket \
                 {bucket}) spans [{mid_lo}, {mid_hi})"
            );
        }

        let filter_values = self.layout.filter_values();
        if mid_lo > start {
            let left = (range.0, filter_values[mid_lo]);
            frontier.extend(self.optimized_postfilter_search(query, left, qp));
        }
        if mid_hi < end {
            let right = (filter_values[mid_hi], range.1);
            frontier.extend(self.optimized_postfilter_search(query, right, qp));
        }

        frontier.sort_unstable();
        frontier.truncate(qp.k);
        frontier
    }

    // ========================================================================
    // Batch driver
    // ========================================================================

    /// Run a batch of queries in parallel.
    ///
    /// Returns `Q x k` matrices of original point ids and squared distances.
    /// Rows with fewer than `k` eligible hits are padded with id 0 and
    /// distance infinity.
    pub fn batch_search(
        &self,
        queries: ArrayView2<'_, f32>,
        ranges: &[FilterRange<F>],
        strategy: SearchStrategy,
        qp: &QueryParams,
    ) -> Result<(Array2<u32>, Array2<f32>)> {
        if qp.k == 0 {
            return Err(SpanDBError::Parameter("k must be at least 1".into()));
        }
        if queries.ncols() != self.dim() {
            return Err(SpanDBError::ShapeMismatch {
                context: "query matrix columns",
                expected: self.dim(),
                actual: queries.ncols(),
            });
        }
        if ranges.len() != queries.nrows() {
            return Err(SpanDBError::ShapeMismatch {
                context: "filter ranges",
                expected: queries.nrows(),
                actual: ranges.len(),
            });
        }

        let num_queries = queries.nrows();
        let k = qp.k;

        let rows: Vec<(Vec<u32>, Vec<f32>)> = (0..num_queries)
            .into_par_iter()
            .map(|i| {
                let query: Vec<f32> = queries.row(i).iter().copied().collect();
                let mut hits = self.search_sorted(&query, ranges[i], strategy, qp);
                for hit in hits.iter_mut() {
                    hit.id = self.layout.original_id(hit.id);
                }
                hits.sort_unstable();

                let mut ids = vec![PAD_ID; k];
                let mut dists = vec![f32::INFINITY; k];
                for (slot, hit) in hits.iter().take(k).enumerate() {
                    ids[slot] = hit.id;
                    dists[slot] = hit.distance;
                }
                (ids, dists)
            })
            .collect();

        let mut ids_flat = Vec::with_capacity(num_queries * k);
        let mut dists_flat = Vec::with_capacity(num_queries * k);
        for (ids, dists) in rows {
            ids_flat.extend(ids);
            dists_flat.extend(dists);
        }

        let ids = Array2::from_shape_vec((num_queries, k), ids_flat)
            .map_err(|e| SpanDBError::Internal(format!("result shape: {e}")))?;
        let dists = Array2::from_shape_vec((num_queries, k), dists_flat)
            .map_err(|e| SpanDBError::Internal(format!("result shape: {e}")))?;
        Ok((ids, dists))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};

    type Tree = RangeFilterTree<f32>;

    fn line_tree(n: usize, cutoff: usize) -> Tree {
        let points = Array2::from_shape_fn((n, 2), |(i, _)| i as f32);
        let filters: Vec<f32> = (0..n).map(|i| i as f32).collect();
        Tree::build(points.view(), &filters, TreeConfig::with_cutoff(cutoff)).unwrap()
    }

    const ALL: [SearchStrategy; 3] = [
        SearchStrategy::FenwickTree,
        SearchStrategy::OptimizedPostfilter,
        SearchStrategy::ThreeSplit,
    ];

    #[test]
    fn trivial_single_point() {
        let points = array![[1.0f32, 0.0]];
        let tree = Tree::build(points.view(), &[0.5f32], TreeConfig::with_cutoff(1)).unwrap();
        let qp = QueryParams::with_k(1);

        for strategy in ALL {
            let (ids, dists) = tree
                .batch_search(points.view(), &[(0.0, 1.0)], strategy, &qp)
                .unwrap();
            assert_eq!(ids[[0, 0]], 0, "{strategy}");
            assert_eq!(dists[[0, 0]], 0.0, "{strategy}");
        }
    }

    #[test]
    fn empty_intersection_pads_with_sentinels() {
        let points = array![[1.0f32, 0.0], [2.0, 0.0], [3.0, 0.0]];
        let tree =
            Tree::build(points.view(), &[1.0f32, 2.0, 3.0], TreeConfig::with_cutoff(1)).unwrap();
        let qp = QueryParams::with_k(2);

        let queries = array![[1.0f32, 0.0]];
        for strategy in ALL {
            let (ids, dists) = tree
                .batch_search(queries.view(), &[(10.0, 20.0)], strategy, &qp)
                .unwrap();
            assert_eq!(ids.row(0).to_vec(), vec![0, 0], "{strategy}");
            assert!(dists.row(0).iter().all(|d| d.is_infinite()), "{strategy}");
        }
    }

    #[test]
    fn asymmetric_boundary_scenario() {
        let points = Array2::from_shape_fn((4, 2), |(i, _)| i as f32);
        let tree = Tree::build(
            points.view(),
            &[1.0f32, 2.0, 2.0, 3.0],
            TreeConfig::with_cutoff(1),
        )
        .unwrap();
        let qp = QueryParams::with_k(4);

        for strategy in ALL {
            // [1, 2] resolves to the empty window [1, 1)
            let hits = tree.search(&[0.0, 0.0], (1.0, 2.0), strategy, &qp).unwrap();
            assert!(hits.is_empty(), "{strategy}");

            // [0.5, 2] resolves to [0, 1): exactly sorted id 0
            let hits = tree.search(&[0.0, 0.0], (0.5, 2.0), strategy, &qp).unwrap();
            assert_eq!(hits.len(), 1, "{strategy}");
            assert_eq!(hits[0].id, 0, "{strategy}");
        }
    }

    #[test]
    fn fenwick_plan_covers_window_exactly() {
        let tree = line_tree(8, 2);
        // widths 2, 4, 8, 16; window [1, 7)
        let plan = tree.fenwick_plan((1, 7));

        let mut covered: Vec<bool> = vec![false; 8];
        for &(level, bucket) in &plan.buckets {
            let w = tree.pyramid.width(level);
            for i in bucket * w..(bucket + 1) * w {
                assert!(!covered[i], "overlap at {i}");
                assert!((1..7).contains(&i), "bucket spills to {i}");
                covered[i] = true;
            }
        }
        for &(start, end) in &plan.residues {
            for i in start..end {
                assert!(!covered[i], "residue overlap at {i}");
                covered[i] = true;
            }
        }
        assert!(covered[1..7].iter().all(|&c| c));
        assert!(!covered[0] && !covered[7]);
    }

    #[test]
    fn three_split_on_aligned_window_matches_exact() {
        let tree = line_tree(16, 2);
        let qp = QueryParams::with_k(4);
        // range (-1, 8) resolves to window [0, 8), exactly the level-2
        // bucket 0, so the center search is the whole plan
        let hits = tree
            .search(&[4.0, 4.0], (-1.0, 8.0), SearchStrategy::ThreeSplit, &qp)
            .unwrap();
        let exact = tree
            .search(&[4.0, 4.0], (-1.0, 8.0), SearchStrategy::FenwickTree, &qp)
            .unwrap();
        assert_eq!(hits, exact);
    }

    #[test]
    fn results_are_distance_then_id_ordered() {
        // two points equidistant from the query
        let points = array![[1.0f32, 0.0], [-1.0, 0.0], [3.0, 0.0]];
        let tree =
            Tree::build(points.view(), &[1.0f32, 2.0, 3.0], TreeConfig::with_cutoff(1)).unwrap();
        let qp = QueryParams::with_k(3);

        for strategy in ALL {
            let hits = tree.search(&[0.0, 0.0], (0.0, 4.0), strategy, &qp).unwrap();
            assert!(
                hits.windows(2).all(|w| w[0] < w[1]),
                "{strategy}: not (distance, id) ordered"
            );
        }

        // the exact strategies see all three points; the equidistant pair
        // comes back in ascending id order
        for strategy in [SearchStrategy::FenwickTree, SearchStrategy::OptimizedPostfilter] {
            let hits = tree.search(&[0.0, 0.0], (0.0, 4.0), strategy, &qp).unwrap();
            let ids: Vec<u32> = hits.iter().map(|h| h.id).collect();
            assert_eq!(ids, vec![0, 1, 2], "{strategy}");
        }
    }

    #[test]
    fn remapped_ids_point_at_original_rows() {
        // filters deliberately unsorted in the input
        let points = array![[0.0f32, 0.0], [1.0, 0.0], [2.0, 0.0], [3.0, 0.0]];
        let filters = [3.0f32, 1.0, 4.0, 2.0];
        let tree = Tree::build(points.view(), &filters, TreeConfig::with_cutoff(1)).unwrap();
        let qp = QueryParams::with_k(1);

        // nearest point to [3, 0] with filter in (0.5, 2.5) is row 3
        let hits = tree
            .search(&[3.0, 0.0], (0.5, 2.5), SearchStrategy::FenwickTree, &qp)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 3);
    }

    #[test]
    fn rejects_degenerate_parameters() {
        let points = array![[1.0f32, 0.0]];
        assert!(Tree::build(points.view(), &[0.5f32], TreeConfig::with_cutoff(0)).is_err());

        let tree = Tree::build(points.view(), &[0.5f32], TreeConfig::default()).unwrap();
        let qp = QueryParams::with_k(0);
        assert!(tree
            .search(&[1.0, 0.0], (0.0, 1.0), SearchStrategy::FenwickTree, &qp)
            .is_err());
        assert!(tree
            .batch_search(points.view(), &[(0.0, 1.0)], SearchStrategy::FenwickTree, &qp)
            .is_err());

        let qp = QueryParams::with_k(1);
        assert!(tree
            .search(&[1.0, 0.0, 9.9], (0.0, 1.0), SearchStrategy::FenwickTree, &qp)
            .is_err());
        let wide = array![[1.0f32, 0.0, 0.0]];
        assert!(tree
            .batch_search(wide.view(), &[(0.0, 1.0)], SearchStrategy::FenwickTree, &qp)
            .is_err());
        assert!(tree
            .batch_search(points.view(), &[], SearchStrategy::FenwickTree, &qp)
            .is_err());
    }
}
