//! Overhang selection for multi-part assemblies.
//!
//! One length-`L` overhang is picked per region so that the chosen set is as
//! mutually distinct as possible, measured by pairwise Hamming distance.

use crate::error::{Result, SynbioError};
use itertools::Itertools;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};
use tracing::debug;

/// All distinct substrings of length `len` of `seq`.
pub fn get_overhangs(seq: &str, len: usize) -> BTreeSet<String> {
    let chars = seq.chars().collect::<Vec<_>>();
    if len == 0 || chars.len() < len {
        return BTreeSet::new();
    }
    chars
        .windows(len)
        .map(|w| w.iter().collect::<String>())
        .collect()
}

fn hamming(a: &str, b: &str) -> u32 {
    a.chars().zip(b.chars()).filter(|(x, y)| x != y).count() as u32
}

/// A complete choice of one overhang per region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverhangSolution {
    pub overhangs: Vec<String>,
    /// Upper-triangular pairwise Hamming distances.
    pub distances: Vec<Vec<u32>>,
    pub score: f64,
}

#[derive(Debug, Clone)]
struct Assignment {
    overhangs: Vec<String>,
    distances: Vec<Vec<u32>>,
}

impl Assignment {
    fn root(regions: usize) -> Self {
        Self {
            overhangs: vec![],
            distances: vec![vec![0; regions]; regions],
        }
    }

    fn extend(&self, overhang: &str) -> Self {
        let ix = self.overhangs.len();
        let mut distances = self.distances.clone();
        for (i, prev) in self.overhangs.iter().enumerate() {
            distances[i][ix] = hamming(prev, overhang);
        }
        let mut overhangs = self.overhangs.clone();
        overhangs.push(overhang.to_string());
        Self {
            overhangs,
            distances,
        }
    }

    fn norm(&self) -> f64 {
        self.distances
            .iter()
            .flatten()
            .map(|&d| (d as f64) * (d as f64))
            .sum::<f64>()
            .sqrt()
    }
}

#[derive(Debug, Clone)]
enum SearchNode {
    Partial(Assignment),
    Complete(Assignment),
}

#[derive(Debug)]
struct Queued {
    score: f64,
    order: u64,
    node: SearchNode,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Max-heap: larger norm first, then earlier insertion.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Best-first search for overhang sets, most distinct first.
///
/// Stops once the best complete set reaches distance `len` between every
/// pair, or once `min(min_solutions, possible combinations)` sets are
/// complete. Returns the complete sets found, best first.
pub fn find_overhangs(
    seqs: &[&str],
    len: usize,
    min_solutions: usize,
) -> Result<Vec<OverhangSolution>> {
    if len == 0 {
        return Err(SynbioError::InvalidParameter(
            "overhang length must be at least 1".to_string(),
        ));
    }
    let regions = seqs.len();
    let per_region = seqs
        .iter()
        .map(|s| get_overhangs(s, len).into_iter().collect_vec())
        .collect_vec();
    let ideal = (0..regions)
        .map(|i| {
            (0..regions)
                .map(|j| if j > i { len as u32 } else { 0 })
                .collect_vec()
        })
        .collect_vec();
    let possible = per_region
        .iter()
        .try_fold(1usize, |acc, set| acc.checked_mul(set.len()))
        .unwrap_or(usize::MAX);
    let wanted = min_solutions.min(possible).max(1);

    let mut counter = 0u64;
    let mut push = |heap: &mut BinaryHeap<Queued>, assignment: Assignment| {
        let score = assignment.norm();
        let node = if assignment.overhangs.len() == regions {
            SearchNode::Complete(assignment)
        } else {
            SearchNode::Partial(assignment)
        };
        heap.push(Queued {
            score,
            order: counter,
            node,
        });
        counter += 1;
    };

    let mut frontier = BinaryHeap::new();
    push(&mut frontier, Assignment::root(regions));
    let mut completed: BinaryHeap<Queued> = BinaryHeap::new();

    while let Some(Queued { score, order, node }) = frontier.pop() {
        match node {
            SearchNode::Complete(assignment) => {
                // No set can score above the ideal one, so it ends the search.
                let is_ideal = assignment.distances == ideal;
                completed.push(Queued {
                    score,
                    order,
                    node: SearchNode::Complete(assignment),
                });
                if is_ideal || completed.len() >= wanted {
                    break;
                }
            }
            SearchNode::Partial(assignment) => {
                let next = assignment.overhangs.len();
                for candidate in &per_region[next] {
                    if assignment.overhangs.contains(candidate) {
                        continue;
                    }
                    push(&mut frontier, assignment.extend(candidate));
                }
            }
        }
    }

    if completed.is_empty() {
        return Err(SynbioError::NoOverhangSolution(format!(
            "{regions} region(s) with overhang length {len}"
        )));
    }
    debug!(
        "overhang search finished with {} solution(s), {} node(s) left",
        completed.len(),
        frontier.len()
    );

    let mut ret = completed.into_sorted_vec();
    ret.reverse();
    Ok(ret
        .into_iter()
        .filter_map(|q| match q.node {
            SearchNode::Complete(a) => Some(OverhangSolution {
                overhangs: a.overhangs,
                distances: a.distances,
                score: q.score,
            }),
            SearchNode::Partial(_) => None,
        })
        .collect())
}
