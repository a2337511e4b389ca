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

//! Filter-sorted point layout and range resolution
//!
//! One-time reorder of the input points into non-decreasing filter order.
//! The sort permutation is stable, so tied filter values keep their input
//! order and builds are deterministic. After the gather, every component
//! above this one works in sorted coordinate space; `original_id` is the
//! only way back.
//!
//! Range resolution maps a filter interval `[lo, hi]` to the half-open
//! sorted-id window `[first_gt(lo), first_ge(hi))`. The asymmetry is
//! deliberate: strictly-greater on the left, greater-or-equal on the right.
//! A range `[1, 2]` over filter values `1, 2, 2, 3` resolves to the empty
//! window `[1, 1)`.

use std::sync::Arc;

use ndarray::ArrayView2;
use rayon::prelude::*;
use tracing::{debug, warn};

use spandb_core::{FilterRange, FilterValue, Result, SpanDBError};

use crate::store::PointSet;

/// Smallest index `i` with `values[i] > x`, else `values.len()`
pub(crate) fn first_gt<F: FilterValue>(values: &[F], x: F) -> usize {
    values.partition_point(|v| *v <= x)
}

/// Smallest index `i` with `values[i] >= x`, else `values.len()`
pub(crate) fn first_ge<F: FilterValue>(values: &[F], x: F) -> usize {
    values.partition_point(|v| *v < x)
}

/// Points reordered by non-decreasing filter value
pub struct SortedLayout<F> {
    points: Arc<PointSet>,
    filter_values: Vec<F>,
    original_id: Vec<u32>,
}

impl<F: FilterValue> SortedLayout<F> {
    /// Sort the input by filter value and gather the rows.
    ///
    /// `points` is `n x d` row-major; `filters` must have length `n`.
    pub fn build(points: ArrayView2<'_, f32>, filters: &[F]) -> Result<Self> {
        let n = points.nrows();
        let dim = points.ncols();

        if n == 0 {
            return Err(SpanDBError::Parameter(
                "cannot build an index over zero points".into(),
            ));
        }
        if dim == 0 {
            return Err(SpanDBError::Parameter(
                "point dimension must be at least 1".into(),
            ));
        }
        if filters.len() != n {
            return Err(SpanDBError::ShapeMismatch {
                context: "filter values",
                expected: n,
                actual: filters.len(),
            });
        }

        let mut perm: Vec<u32> = (0..n as u32).collect();
        // sort_by is stable: ties keep input order
        perm.sort_by(|&a, &b| {
            filters[a as usize]
                .partial_cmp(&filters[b as usize])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut data = vec![0.0f32; n * dim];
        data.par_chunks_mut(dim)
            .enumerate()
            .for_each(|(sorted_id, row)| {
                let src = points.row(perm[sorted_id] as usize);
                for (dst, v) in row.iter_mut().zip(src.iter()) {
                    *dst = *v;
                }
            });

        let filter_values: Vec<F> = perm.iter().map(|&i| filters[i as usize]).collect();

        Ok(Self {
            points: Arc::new(PointSet::new(data, dim)),
            filter_values,
            original_id: perm,
        })
    }

    pub fn len(&self) -> usize {
        self.filter_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filter_values.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.points.dim()
    }

    /// The gathered, filter-sorted point storage
    pub fn points(&self) -> &Arc<PointSet> {
        &self.points
    }

    /// Non-decreasing filter values in sorted coordinate space
    pub fn filter_values(&self) -> &[F] {
        &self.filter_values
    }

    /// Map a sorted id back to the caller's input index
    pub fn original_id(&self, sorted_id: u32) -> u32 {
        self.original_id[sorted_id as usize]
    }

    /// The full sorted-to-original permutation
    pub fn original_ids(&self) -> &[u32] {
        &self.original_id
    }

    /// Smallest sorted id with filter value strictly greater than `x`
    pub fn first_gt(&self, x: F) -> usize {
        first_gt(&self.filter_values, x)
    }

    /// Smallest sorted id with filter value greater than or equal to `x`
    pub fn first_ge(&self, x: F) -> usize {
        first_ge(&self.filter_values, x)
    }

    /// Resolve a filter interval to its eligible sorted-id window
    /// `[first_gt(lo), first_ge(hi))`.
    ///
    /// Returns `None` when the window is empty. An interval entirely outside
    /// the indexed filter span is logged as a warning; a window emptied by
    /// the boundary convention (e.g. a point query landing on tied values)
    /// is only a debug event. Neither is an error.
    pub fn window(&self, range: &FilterRange<F>) -> Option<(usize, usize)> {
        let (lo, hi) = *range;
        let front = self.filter_values[0];
        let back = self.filter_values[self.len() - 1];

        if hi < front || lo > back {
            warn!(
                "query range ({lo}, {hi}) is entirely outside the indexed \
                 filter span ({front}, {back}); returning empty result"
            );
            return None;
        }

        let inclusive_start = self.first_gt(lo);
        let exclusive_end = self.first_ge(hi);
        if inclusive_start >= exclusive_end {
            debug!(
                "query range ({lo}, {hi}) resolves to an empty sorted window \
                 [{inclusive_start}, {exclusive_end})"
            );
            return None;
        }
        Some((inclusive_start, exclusive_end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn layout_of(filters: &[f32]) -> SortedLayout<f32> {
        let n = filters.len();
        let points = Array2::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f32);
        SortedLayout::build(points.view(), filters).unwrap()
    }

    #[test]
    fn boundary_helpers_on_small_inputs() {
        let empty: [f32; 0] = [];
        assert_eq!(first_gt(&empty, 1.0), 0);
        assert_eq!(first_ge(&empty, 1.0), 0);

        let one = [0.5f32];
        assert_eq!(first_gt(&one, 0.0), 0);
        assert_eq!(first_gt(&one, 0.5), 1);
        assert_eq!(first_ge(&one, 0.5), 0);
        assert_eq!(first_ge(&one, 1.0), 1);
    }

    #[test]
    fn asymmetric_boundary_on_ties() {
        let layout = layout_of(&[1.0, 2.0, 2.0, 3.0]);

        // [1, 2] -> [first_gt(1), first_ge(2)) = [1, 1): empty
        assert_eq!(layout.first_gt(1.0), 1);
        assert_eq!(layout.first_ge(2.0), 1);
        assert_eq!(layout.window(&(1.0, 2.0)), None);

        // [0.5, 2] -> [0, 1): exactly sorted id 0
        assert_eq!(layout.window(&(0.5, 2.0)), Some((0, 1)));

        // point query on a tie is empty by convention
        assert_eq!(layout.window(&(2.0, 2.0)), None);
    }

    #[test]
    fn out_of_range_window_is_none() {
        let layout = layout_of(&[1.0, 2.0, 3.0]);
        assert_eq!(layout.window(&(10.0, 20.0)), None);
        assert_eq!(layout.window(&(-5.0, 0.0)), None);
        assert_eq!(layout.window(&(0.0, 10.0)), Some((0, 3)));
    }

    #[test]
    fn sort_is_stable_and_permutation_is_bijective() {
        let filters = [3.0f32, 1.0, 2.0, 1.0, 2.0, 1.0];
        let layout = layout_of(&filters);

        // non-decreasing
        let sorted = layout.filter_values();
        assert!(sorted.windows(2).all(|w| w[0] <= w[1]));

        // stable: the three 1.0s keep input order 1, 3, 5
        assert_eq!(&layout.original_ids()[0..3], &[1, 3, 5]);

        // bijection
        let mut seen = vec![false; filters.len()];
        for &id in layout.original_ids() {
            assert!(!seen[id as usize]);
            seen[id as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn gather_moves_rows_with_their_filters() {
        let filters = [2.0f32, 0.0, 1.0];
        let layout = layout_of(&filters);
        // input row i is [2i, 2i+1]; sorted order is rows 1, 2, 0
        assert_eq!(layout.points().point(0), &[2.0, 3.0]);
        assert_eq!(layout.points().point(1), &[4.0, 5.0]);
        assert_eq!(layout.points().point(2), &[0.0, 1.0]);
    }

    #[test]
    fn build_rejects_bad_shapes() {
        let points = Array2::<f32>::zeros((3, 2));
        assert!(SortedLayout::build(points.view(), &[1.0f32, 2.0]).is_err());

        let empty = Array2::<f32>::zeros((0, 2));
        let no_filters: [f32; 0] = [];
        assert!(SortedLayout::build(empty.view(), &no_filters).is_err());
    }
}
