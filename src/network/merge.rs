//! Geometric merge strategy.
//!
//! Tracks are densified and every vertex is snapped onto a shared node graph:
//! a vertex reuses the nearest existing node within the snap tolerance or
//! creates a new one. Consecutive vertices become edges, so overlapping tracks
//! collapse onto the same edges. Edges are then merged into maximal chains
//! (breaking at junctions and dead ends) and chains below the minimum segment
//! length are dropped.
//!
//! Node output positions are the mean of all vertices snapped to them, which
//! pulls parallel GPS traces onto a common centerline.

use std::collections::{BTreeMap, BTreeSet};

use geo::{Coord, LineString};
use log::{debug, warn};
use rstar::{PointDistance, RTree};
use thiserror::Error;

use super::{Contribution, NetworkSegment};
use crate::config::NetworkConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Stage};
use crate::geo_utils::{coord_distance, densify, line_length};
use crate::ingest::Track;
use crate::spatial_index::IndexedPoint;

/// Maximum hops searched for an existing path before adding a shortcut edge.
const MAX_DETOUR_HOPS: usize = 3;

/// A polyline together with the tracks it stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedChain {
    pub coords: Vec<Coord<f64>>,
    /// Indices into the input track slice
    pub tracks: BTreeSet<usize>,
}

impl MergedChain {
    pub fn from_track(index: usize, track: &Track) -> Self {
        Self {
            coords: track.geometry.0.clone(),
            tracks: BTreeSet::from([index]),
        }
    }

    pub fn length_m(&self) -> f64 {
        self.coords
            .windows(2)
            .map(|w| coord_distance(w[0], w[1]))
            .sum()
    }
}

/// Why chain merging could not produce a usable result.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MergeFailure {
    #[error("chain walk exceeded {0} edges")]
    RunawayWalk(usize),
    #[error("merged chain has a non-finite vertex")]
    NonFinite,
    #[error("{0} edges produced no chains")]
    NoChains(usize),
}

#[derive(Debug, Clone)]
struct Edge {
    a: usize,
    b: usize,
    tracks: BTreeSet<usize>,
}

struct SnapGraph {
    tolerance: f64,
    anchors: Vec<Coord<f64>>,
    sums: Vec<(f64, f64, u32)>,
    tree: RTree<IndexedPoint>,
    /// neighbor node -> edge index, ordered for deterministic walks
    adjacency: Vec<BTreeMap<usize, usize>>,
    edges: Vec<Edge>,
}

impl SnapGraph {
    fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            anchors: Vec::new(),
            sums: Vec::new(),
            tree: RTree::new(),
            adjacency: Vec::new(),
            edges: Vec::new(),
        }
    }

    fn snap(&mut self, c: Coord<f64>) -> usize {
        let query = [c.x, c.y];
        let tol_sq = self.tolerance * self.tolerance;
        let existing = self
            .tree
            .nearest_neighbor(&query)
            .filter(|p| p.distance_2(&query) <= tol_sq)
            .map(|p| p.idx);

        let idx = match existing {
            Some(idx) => idx,
            None => {
                let idx = self.anchors.len();
                self.anchors.push(c);
                self.sums.push((0.0, 0.0, 0));
                self.adjacency.push(BTreeMap::new());
                self.tree.insert(IndexedPoint { idx, x: c.x, y: c.y });
                idx
            }
        };
        let sum = &mut self.sums[idx];
        sum.0 += c.x;
        sum.1 += c.y;
        sum.2 += 1;
        idx
    }

    fn position(&self, node: usize) -> Coord<f64> {
        let (sx, sy, n) = self.sums[node];
        if n == 0 {
            return self.anchors[node];
        }
        Coord {
            x: sx / n as f64,
            y: sy / n as f64,
        }
    }

    fn connect(&mut self, a: usize, b: usize, tracks: &BTreeSet<usize>) {
        if a == b {
            return;
        }
        if let Some(&e) = self.adjacency[a].get(&b) {
            self.edges[e].tracks.extend(tracks.iter().copied());
            return;
        }
        // A vertex that skipped past a node would add a shortcut parallel to
        // an existing path; reuse the path instead.
        if let Some(path) = self.existing_path(a, b) {
            for e in path {
                self.edges[e].tracks.extend(tracks.iter().copied());
            }
            return;
        }

        let e = self.edges.len();
        self.edges.push(Edge {
            a,
            b,
            tracks: tracks.clone(),
        });
        self.adjacency[a].insert(b, e);
        self.adjacency[b].insert(a, e);
    }

    /// Short path from `a` to `b` that is not much longer than the direct hop.
    fn existing_path(&self, a: usize, b: usize) -> Option<Vec<usize>> {
        let direct = coord_distance(self.anchors[a], self.anchors[b]);
        let budget = direct * 1.5 + self.tolerance;
        let mut path = Vec::new();
        let mut visited = vec![a];
        self.search(a, b, 0.0, budget, &mut path, &mut visited)
            .then_some(path)
    }

    fn search(
        &self,
        current: usize,
        target: usize,
        walked: f64,
        budget: f64,
        path: &mut Vec<usize>,
        visited: &mut Vec<usize>,
    ) -> bool {
        if path.len() >= MAX_DETOUR_HOPS {
            return false;
        }
        for (&next, &e) in &self.adjacency[current] {
            if visited.contains(&next) {
                continue;
            }
            let step = walked + coord_distance(self.anchors[current], self.anchors[next]);
            if step > budget {
                continue;
            }
            path.push(e);
            if next == target {
                return true;
            }
            visited.push(next);
            if self.search(next, target, step, budget, path, visited) {
                return true;
            }
            visited.pop();
            path.pop();
        }
        false
    }

    fn add_line(&mut self, line: &MergedChain) {
        let dense = densify(&line.coords, self.tolerance / 2.0);
        let mut prev: Option<usize> = None;
        for c in dense {
            let node = self.snap(c);
            if let Some(p) = prev {
                self.connect(p, node, &line.tracks);
            }
            prev = Some(node);
        }
    }

    fn degree(&self, node: usize) -> usize {
        self.adjacency[node].len()
    }

    fn chains(&self) -> Result<Vec<MergedChain>, MergeFailure> {
        let mut used = vec![false; self.edges.len()];
        let mut chains = Vec::new();

        // Open chains start at dead ends and junctions
        for start in 0..self.anchors.len() {
            let degree = self.degree(start);
            if degree == 0 || degree == 2 {
                continue;
            }
            for (&next, &e) in &self.adjacency[start] {
                if !used[e] {
                    chains.push(self.walk(start, next, e, &mut used)?);
                }
            }
        }

        // Whatever is left forms closed rings
        for e in 0..self.edges.len() {
            if !used[e] {
                let (a, b) = (self.edges[e].a, self.edges[e].b);
                chains.push(self.walk(a, b, e, &mut used)?);
            }
        }

        if chains.is_empty() && !self.edges.is_empty() {
            return Err(MergeFailure::NoChains(self.edges.len()));
        }
        Ok(chains)
    }

    fn walk(
        &self,
        start: usize,
        next: usize,
        first_edge: usize,
        used: &mut [bool],
    ) -> Result<MergedChain, MergeFailure> {
        used[first_edge] = true;
        let mut nodes = vec![start, next];
        let mut tracks = self.edges[first_edge].tracks.clone();
        let mut current = next;
        let mut steps = 1;

        while current != start && self.degree(current) == 2 {
            let Some((&n2, &e2)) = self.adjacency[current].iter().find(|&(_, &e)| !used[e]) else {
                break;
            };
            used[e2] = true;
            tracks.extend(self.edges[e2].tracks.iter().copied());
            nodes.push(n2);
            current = n2;
            steps += 1;
            if steps > self.edges.len() {
                return Err(MergeFailure::RunawayWalk(self.edges.len()));
            }
        }

        let coords: Vec<Coord<f64>> = nodes.iter().map(|&n| self.position(n)).collect();
        if coords.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return Err(MergeFailure::NonFinite);
        }
        Ok(MergedChain { coords, tracks })
    }
}

/// Snap lines onto a shared node graph and merge the result into maximal chains.
///
/// Chains are not length-filtered; the caller decides what is too short.
pub fn merge_lines(lines: &[MergedChain], snap_tolerance_m: f64) -> Result<Vec<MergedChain>, MergeFailure> {
    let mut graph = SnapGraph::new(snap_tolerance_m);
    for line in lines {
        graph.add_line(line);
    }
    debug!(
        "[Network] Snap graph: {} lines -> {} nodes, {} edges",
        lines.len(),
        graph.anchors.len(),
        graph.edges.len()
    );
    graph.chains()
}

/// Merge, or hand back the unmerged input when merging fails.
pub(super) fn merge_or_fallback(
    lines: Vec<MergedChain>,
    snap_tolerance_m: f64,
    context: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<MergedChain> {
    let outcome = merge_lines(&lines, snap_tolerance_m);
    resolve_merge(lines, outcome, context, diagnostics)
}

/// Take the merged chains, or on failure record it and keep `lines` as they are.
pub(super) fn resolve_merge(
    lines: Vec<MergedChain>,
    outcome: Result<Vec<MergedChain>, MergeFailure>,
    context: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<MergedChain> {
    match outcome {
        Ok(chains) => chains,
        Err(failure) => {
            warn!(
                "[Network] {} failed ({}), keeping {} unmerged pieces",
                context,
                failure,
                lines.len()
            );
            diagnostics.push(Diagnostic::new(
                Stage::Network,
                DiagnosticKind::MergeFallback,
                format!("{context}: {failure}; kept {} unmerged pieces", lines.len()),
            ));
            lines
        }
    }
}

/// Turn chains into numbered segments, dropping those below the minimum length.
pub(super) fn chains_to_segments(
    chains: Vec<MergedChain>,
    tracks: &[Track],
    min_segment_length_m: f64,
) -> Vec<NetworkSegment> {
    chains
        .into_iter()
        .filter(|chain| chain.coords.len() >= 2)
        .map(|chain| {
            let geometry = LineString::new(chain.coords);
            (line_length(&geometry), geometry, chain.tracks)
        })
        .filter(|(length, _, _)| *length >= min_segment_length_m && *length > 0.0)
        .enumerate()
        .map(|(id, (_, geometry, members))| {
            let contributions = members
                .iter()
                .filter_map(|&i| tracks.get(i))
                .map(|t| Contribution {
                    track_id: t.id.clone(),
                    length_m: t.length_m,
                })
                .collect();
            NetworkSegment::new(id, geometry, contributions)
        })
        .collect()
}

pub(super) fn build(tracks: &[Track], config: &NetworkConfig) -> (Vec<NetworkSegment>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let lines: Vec<MergedChain> = tracks
        .iter()
        .enumerate()
        .map(|(i, t)| MergedChain::from_track(i, t))
        .collect();

    let chains = merge_or_fallback(lines, config.snap_tolerance_m, "geometric merge", &mut diagnostics);
    debug!("[Network] {} merged chains before length filter", chains.len());
    (
        chains_to_segments(chains, tracks, config.min_segment_length_m),
        diagnostics,
    )
}
