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

//! Prefilter sub-index: resolve the eligible slice first, then scan it
//!
//! Buckets hold a contiguous slice of the filter-sorted points, so the
//! eligible population for any range is itself a contiguous local slice
//! found by two binary searches. Scanning that slice is exact and, at
//! bucket granularity, fast enough that no graph is worth building. This
//! is the tree's default sub-index.

use spandb_core::{FilterRange, FilterValue, Neighbor, QueryParams};

use crate::layout::{first_ge, first_gt};
use crate::store::SubsetView;
use crate::subindex::SubIndex;

pub struct PrefilterIndex<F> {
    subset: SubsetView,
    filters: Vec<F>,
}

impl<F: FilterValue> PrefilterIndex<F> {
    /// Local half-open range of points eligible for `range`
    fn eligible(&self, range: FilterRange<F>) -> (usize, usize) {
        let start = first_gt(&self.filters, range.0);
        let end = first_ge(&self.filters, range.1);
        (start, end.max(start))
    }
}

impl<F: FilterValue> SubIndex<F> for PrefilterIndex<F> {
    fn build(subset: SubsetView, filters: Vec<F>) -> Self {
        debug_assert_eq!(subset.len(), filters.len());
        Self { subset, filters }
    }

    fn query(&self, query: &[f32], range: FilterRange<F>, qp: &QueryParams) -> Vec<Neighbor> {
        let (start, end) = self.eligible(range);

        let mut hits: Vec<Neighbor> = (start..end)
            .map(|local| Neighbor::new(self.subset.global_id(local), self.subset.distance(local, query)))
            .collect();

        hits.sort_unstable();
        hits.truncate(qp.k);
        hits
    }
}
