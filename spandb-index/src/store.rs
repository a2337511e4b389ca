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

//! Dense point storage and the distance kernel
//!
//! `PointSet` is a dumb row-major `f32` buffer: the sorted layout gathers
//! into it once at build time and it is read-only afterwards. Sub-indices
//! see their bucket through a `SubsetView`, which shares the buffer via
//! `Arc` and translates bucket-local ids back to sorted coordinate space.

use std::sync::Arc;

/// Squared Euclidean distance, 4-way unrolled.
///
/// Four independent accumulators keep the FP dependency chains short enough
/// for the compiler to vectorize; squared distance preserves the ordering of
/// true L2 so the sqrt is never taken.
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut acc = [0.0f32; 4];
    let chunks = a.len() / 4;

    for i in 0..chunks {
        let base = i * 4;
        for lane in 0..4 {
            let d = a[base + lane] - b[base + lane];
            acc[lane] += d * d;
        }
    }
    let mut sum = acc[0] + acc[1] + acc[2] + acc[3];
    for i in chunks * 4..a.len() {
        let d = a[i] - b[i];
        sum += d * d;
    }
    sum
}

/// Immutable dense vector storage, row-major
#[derive(Debug)]
pub struct PointSet {
    data: Vec<f32>,
    dim: usize,
    len: usize,
}

impl PointSet {
    /// Wrap a row-major buffer of `len * dim` floats
    pub fn new(data: Vec<f32>, dim: usize) -> Self {
        debug_assert!(dim > 0);
        debug_assert_eq!(data.len() % dim, 0);
        let len = data.len() / dim;
        Self { data, dim, len }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow row `i`
    pub fn point(&self, i: usize) -> &[f32] {
        let start = i * self.dim;
        &self.data[start..start + self.dim]
    }

    /// Squared distance from row `i` to `q`
    pub fn distance(&self, i: usize, q: &[f32]) -> f32 {
        l2_squared(self.point(i), q)
    }
}

/// Non-owning view over a contiguous or scattered subset of a `PointSet`.
///
/// Local ids `0..len` address the subset; `global_id` translates back to the
/// owning set's coordinate space. The view keeps the point set alive, so a
/// sub-index holding one never dangles.
#[derive(Debug, Clone)]
pub struct SubsetView {
    points: Arc<PointSet>,
    ids: Arc<[u32]>,
}

impl SubsetView {
    pub fn new(points: Arc<PointSet>, ids: Vec<u32>) -> Self {
        debug_assert!(ids.iter().all(|&i| (i as usize) < points.len()));
        Self {
            points,
            ids: ids.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.points.dim()
    }

    /// Translate a local id to the owning set's coordinate space
    pub fn global_id(&self, local: usize) -> u32 {
        self.ids[local]
    }

    /// Borrow the vector at local id `local`
    pub fn point(&self, local: usize) -> &[f32] {
        self.points.point(self.ids[local] as usize)
    }

    /// Squared distance from the vector at local id `local` to `q`
    pub fn distance(&self, local: usize, q: &[f32]) -> f32 {
        self.points.distance(self.ids[local] as usize, q)
    }
}
