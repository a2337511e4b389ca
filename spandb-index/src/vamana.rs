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

//! Vamana (DiskANN-style) postfiltering sub-index
//!
//! A single-layer graph per bucket: medoid entry point, greedy beam search,
//! RobustPrune(α) neighbor selection with backedge accumulation. Filtered
//! queries run the postfilter loop: beam-search the whole bucket, keep the
//! hits whose filter value falls in range, and if the range starves the
//! result set, double the beam and retry up to `postfiltering_max_beam`.
//! Very selective ranges skip the graph entirely — the eligible slice is
//! contiguous in a bucket, and scanning it exactly is cheaper than beam
//! search once it fits inside the beam.
//!
//! Construction is deterministic: insertion order comes from a fixed-seed
//! RNG, so identical inputs build identical graphs.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use smallvec::SmallVec;

use spandb_core::{FilterRange, FilterValue, Neighbor, QueryParams};

use crate::layout::{first_ge, first_gt};
use crate::store::SubsetView;
use crate::subindex::SubIndex;

/// Maximum out-degree (R in the DiskANN paper)
const MAX_DEGREE: usize = 32;
/// Degree a node may reach through backedges before it is re-pruned
const DEGREE_BOUND: usize = 48;
/// Pruning parameter: higher keeps longer edges, fewer hops
const ALPHA: f32 = 1.2;
/// Beam width used while building the graph
const BUILD_BEAM: usize = 64;
/// Fixed shuffle seed so builds are reproducible
const BUILD_SEED: u64 = 0x5eed;

/// Beam entry ordered by distance, ties by id for deterministic pops
#[derive(Clone, Copy)]
struct Candidate {
    distance: f32,
    id: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

pub struct VamanaIndex<F> {
    subset: SubsetView,
    filters: Vec<F>,
    /// Adjacency by local id
    graph: Vec<SmallVec<[u32; MAX_DEGREE]>>,
    medoid: u32,
}

impl<F: FilterValue> VamanaIndex<F> {
    /// Local id of the point nearest the bucket centroid
    fn find_medoid(subset: &SubsetView) -> u32 {
        let n = subset.len();
        let dim = subset.dim();

        let mut centroid = vec![0.0f32; dim];
        for i in 0..n {
            for (c, v) in centroid.iter_mut().zip(subset.point(i)) {
                *c += v;
            }
        }
        for c in centroid.iter_mut() {
            *c /= n as f32;
        }

        let mut best = 0u32;
        let mut best_dist = f32::INFINITY;
        for i in 0..n {
            let d = subset.distance(i, &centroid);
            if d < best_dist {
                best_dist = d;
                best = i as u32;
            }
        }
        best
    }

    /// Greedy beam search over the current graph.
    ///
    /// Returns the `beam` best candidates seen, ascending by distance. The
    /// visited frontier stops expanding once the nearest unexpanded
    /// candidate exceeds `cut` times the current beam bound, or after
    /// `limit` expansions.
    fn beam_search(&self, query: &[f32], beam: usize, qp: &QueryParams) -> Vec<Candidate> {
        let n = self.subset.len();
        let mut visited = vec![false; n];

        // min-heap of candidates to expand
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        // max-heap of the best `beam` candidates seen
        let mut best: BinaryHeap<Candidate> = BinaryHeap::with_capacity(beam + 1);

        let start = Candidate {
            distance: self.subset.distance(self.medoid as usize, query),
            id: self.medoid,
        };
        visited[self.medoid as usize] = true;
        frontier.push(Reverse(start));
        best.push(start);

        let mut expanded = 0usize;
        while let Some(Reverse(current)) = frontier.pop() {
            if best.len() >= beam {
                let bound = best.peek().map(|c| c.distance).unwrap_or(f32::INFINITY);
                if current.distance > bound * qp.cut {
                    break;
                }
            }
            if expanded >= qp.limit {
                break;
            }
            expanded += 1;

            for &nb in self.graph[current.id as usize]
                .iter()
                .take(qp.degree_limit)
            {
                if visited[nb as usize] {
                    continue;
                }
                visited[nb as usize] = true;

                let cand = Candidate {
                    distance: self.subset.distance(nb as usize, query),
                    id: nb,
                };
                if best.len() < beam || best.peek().is_some_and(|worst| cand < *worst) {
                    best.push(cand);
                    if best.len() > beam {
                        best.pop();
                    }
                    frontier.push(Reverse(cand));
                }
            }
        }

        best.into_sorted_vec()
    }

    /// RobustPrune: keep at most `MAX_DEGREE` diverse neighbors.
    ///
    /// Selecting a candidate discards every remaining candidate that is
    /// `ALPHA` times closer to it than to the node being pruned, which is
    /// what creates the long edges Vamana relies on.
    fn robust_prune(&self, node: u32, mut candidates: Vec<Candidate>) -> SmallVec<[u32; MAX_DEGREE]> {
        candidates.sort_unstable();
        candidates.dedup_by_key(|c| c.id);
        candidates.retain(|c| c.id != node);

        let mut selected: SmallVec<[u32; MAX_DEGREE]> = SmallVec::new();
        while let Some(pick) = candidates.first().copied() {
            selected.push(pick.id);
            if selected.len() >= MAX_DEGREE {
                break;
            }
            let pick_point = self.subset.point(pick.id as usize);
            candidates.retain(|c| {
                if c.id == pick.id {
                    return false;
                }
                let d_pick = crate::store::l2_squared(pick_point, self.subset.point(c.id as usize));
                ALPHA * d_pick > c.distance
            });
        }
        selected
    }

    /// Re-prune a node whose degree overflowed through backedges
    fn reprune(&mut self, node: u32) {
        let candidates: Vec<Candidate> = self.graph[node as usize]
            .iter()
            .map(|&nb| Candidate {
                distance: crate::store::l2_squared(
                    self.subset.point(node as usize),
                    self.subset.point(nb as usize),
                ),
                id: nb,
            })
            .collect();
        self.graph[node as usize] = self.robust_prune(node, candidates);
    }
}

impl<F: FilterValue> SubIndex<F> for VamanaIndex<F> {
    fn build(subset: SubsetView, filters: Vec<F>) -> Self {
        debug_assert_eq!(subset.len(), filters.len());
        let n = subset.len();

        let medoid = Self::find_medoid(&subset);
        let mut index = Self {
            subset,
            filters,
            graph: vec![SmallVec::new(); n],
            medoid,
        };

        if n <= 1 {
            return index;
        }

        let mut order: Vec<u32> = (0..n as u32).filter(|&i| i != medoid).collect();
        let mut rng = StdRng::seed_from_u64(BUILD_SEED);
        order.shuffle(&mut rng);

        let build_qp = QueryParams {
            limit: usize::MAX,
            degree_limit: DEGREE_BOUND,
            ..QueryParams::default()
        };

        for &node in &order {
            let query = index.subset.point(node as usize).to_vec();
            let candidates = index.beam_search(&query, BUILD_BEAM, &build_qp);
            let neighbors = index.robust_prune(node, candidates);

            for &nb in &neighbors {
                index.graph[nb as usize].push(node);
                if index.graph[nb as usize].len() > DEGREE_BOUND {
                    index.reprune(nb);
                }
            }
            index.graph[node as usize] = neighbors;
        }

        index
    }

    fn query(&self, query: &[f32], range: FilterRange<F>, qp: &QueryParams) -> Vec<Neighbor> {
        let lo = first_gt(&self.filters, range.0);
        let hi = first_ge(&self.filters, range.1);
        if lo >= hi {
            return Vec::new();
        }

        let n = self.subset.len();
        let eligible = hi - lo;
        let target = qp.k.min(eligible);
        let mut beam = qp.beam_size.max(qp.k) * qp.final_beam_multiply.max(1);

        // Selectivity fallback: the eligible slice is contiguous, so when it
        // fits inside the beam an exact scan beats the graph walk.
        if eligible <= beam {
            let mut hits: Vec<Neighbor> = (lo..hi)
                .map(|local| {
                    Neighbor::new(self.subset.global_id(local), self.subset.distance(local, query))
                })
                .collect();
            hits.sort_unstable();
            hits.truncate(qp.k);
            return hits;
        }

        loop {
            let candidates = self.beam_search(query, beam.min(n), qp);
            let mut hits: Vec<Neighbor> = candidates
                .iter()
                .filter(|c| (lo..hi).contains(&(c.id as usize)))
                .map(|c| Neighbor::new(self.subset.global_id(c.id as usize), c.distance))
                .collect();
            hits.sort_unstable();
            hits.truncate(qp.k);

            if hits.len() >= target || beam >= qp.postfiltering_max_beam || beam >= n {
                return hits;
            }
            beam *= 2;
        }
    }
}
