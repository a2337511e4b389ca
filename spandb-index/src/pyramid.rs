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

//! Multi-resolution bucket pyramid
//!
//! Level `j` covers the sorted points with contiguous buckets of width
//! `cutoff * 2^j`; the last bucket of a level may be short. Widths double
//! until one reaches `2n`, so the coarsest level always holds a single
//! bucket spanning the whole set. Every (level, bucket) pair owns one
//! sub-index built from exactly its slice.
//!
//! Bucket builds are independent, so each level's sub-indices are
//! constructed in parallel.

use std::marker::PhantomData;
use std::sync::Arc;

use rayon::prelude::*;

use spandb_core::FilterValue;

use crate::layout::SortedLayout;
use crate::store::SubsetView;
use crate::subindex::SubIndex;

pub struct BucketPyramid<F, S> {
    widths: Vec<usize>,
    levels: Vec<Vec<S>>,
    _filter: PhantomData<F>,
}

/// Shape summary for diagnostics and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyramidStats {
    pub num_levels: usize,
    pub bucket_widths: Vec<usize>,
    pub buckets_per_level: Vec<usize>,
}

impl<F: FilterValue, S: SubIndex<F>> BucketPyramid<F, S> {
    /// Build all levels over the sorted layout.
    ///
    /// `cutoff` is the finest bucket width and must be at least 1.
    pub fn build(layout: &SortedLayout<F>, cutoff: usize) -> Self {
        debug_assert!(cutoff >= 1);
        let n = layout.len();

        let mut widths = Vec::new();
        let mut levels = Vec::new();

        let mut width = cutoff;
        loop {
            let num_buckets = n.div_ceil(width);
            let sub_indices: Vec<S> = (0..num_buckets)
                .into_par_iter()
                .map(|bucket| {
                    let start = bucket * width;
                    let end = (start + width).min(n);
                    let ids: Vec<u32> = (start as u32..end as u32).collect();
                    let subset = SubsetView::new(Arc::clone(layout.points()), ids);
                    let filters = layout.filter_values()[start..end].to_vec();
                    S::build(subset, filters)
                })
                .collect();

            widths.push(width);
            levels.push(sub_indices);

            if width >= 2 * n {
                break;
            }
            width *= 2;
        }

        Self {
            widths,
            levels,
            _filter: PhantomData,
        }
    }

    pub fn num_levels(&self) -> usize {
        self.widths.len()
    }

    /// Bucket width of level `j`
    pub fn width(&self, level: usize) -> usize {
        self.widths[level]
    }

    pub fn widths(&self) -> &[usize] {
        &self.widths
    }

    /// Number of buckets at level `j`
    pub fn num_buckets(&self, level: usize) -> usize {
        self.levels[level].len()
    }

    /// The sub-index owned by (level, bucket)
    pub fn get(&self, level: usize, bucket: usize) -> &S {
        &self.levels[level][bucket]
    }

    pub fn stats(&self) -> PyramidStats {
        PyramidStats {
            num_levels: self.num_levels(),
            bucket_widths: self.widths.clone(),
            buckets_per_level: self.levels.iter().map(Vec::len).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefilter::PrefilterIndex;
    use ndarray::Array2;

    fn pyramid_for(n: usize, cutoff: usize) -> BucketPyramid<f32, PrefilterIndex<f32>> {
        let points = Array2::from_shape_fn((n, 2), |(i, _)| i as f32);
        let filters: Vec<f32> = (0..n).map(|i| i as f32).collect();
        let layout = SortedLayout::build(points.view(), &filters).unwrap();
        BucketPyramid::build(&layout, cutoff)
    }

    #[test]
    fn widths_double_until_two_n() {
        let pyramid = pyramid_for(8, 2);
        assert_eq!(pyramid.widths(), &[2, 4, 8, 16]);
        assert_eq!(pyramid.stats().buckets_per_level, vec![4, 2, 1, 1]);
    }

    #[test]
    fn single_point_gets_two_levels() {
        let pyramid = pyramid_for(1, 1);
        assert_eq!(pyramid.widths(), &[1, 2]);
        assert_eq!(pyramid.stats().buckets_per_level, vec![1, 1]);
    }

    #[test]
    fn coarsest_width_brackets_two_n() {
        for n in [1, 3, 7, 8, 33, 100] {
            let pyramid = pyramid_for(n, 2);
            let m = pyramid.num_levels();
            assert!(pyramid.width(m - 1) >= 2 * n);
            if m > 1 {
                assert!(pyramid.width(m - 2) < 2 * n);
            }
        }
    }

    #[test]
    fn buckets_cover_contiguously() {
        let pyramid = pyramid_for(33, 4);
        for level in 0..pyramid.num_levels() {
            let w = pyramid.width(level);
            let buckets = pyramid.num_buckets(level);
            assert_eq!(buckets, 33usize.div_ceil(w));
            // last bucket is the only short one
            for b in 0..buckets {
                let start = b * w;
                let end = (start + w).min(33);
                assert!(end > start);
                if b + 1 < buckets {
                    assert_eq!(end - start, w);
                }
            }
        }
    }
}
