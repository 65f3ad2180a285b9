//! Grid-partitioned geometric merge.
//!
//! Tracks are cut into per-cell pieces (each piece overlaps the next cell by
//! one densified step), every cell is merged independently, and a final merge
//! over all cell outputs stitches chains across cell boundaries. The stitch
//! pass only starts once every cell has finished.

use std::collections::BTreeMap;

use geo::{BoundingRect, Coord};
use log::{debug, info};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::merge::{chains_to_segments, merge_or_fallback, MergedChain};
use super::NetworkSegment;
use crate::config::NetworkConfig;
use crate::diagnostics::Diagnostic;
use crate::geo_utils::densify;
use crate::ingest::Track;

type CellKey = (i64, i64);

struct Grid {
    min_x: f64,
    min_y: f64,
    cell_size: f64,
}

impl Grid {
    fn covering(tracks: &[Track], cell_size: f64) -> Option<Self> {
        let (min_x, min_y) = tracks
            .iter()
            .filter_map(|t| t.geometry.bounding_rect())
            .fold(None, |acc: Option<(f64, f64)>, r| {
                let (x, y) = (r.min().x, r.min().y);
                Some(acc.map_or((x, y), |(ax, ay)| (ax.min(x), ay.min(y))))
            })?;
        Some(Self {
            min_x,
            min_y,
            cell_size,
        })
    }

    fn cell_of(&self, c: Coord<f64>) -> CellKey {
        (
            ((c.x - self.min_x) / self.cell_size).floor() as i64,
            ((c.y - self.min_y) / self.cell_size).floor() as i64,
        )
    }
}

/// Cut a densified track into maximal per-cell runs.
fn split_into_cells(
    grid: &Grid,
    index: usize,
    coords: &[Coord<f64>],
    cells: &mut BTreeMap<CellKey, Vec<MergedChain>>,
) {
    let mut run: Vec<Coord<f64>> = Vec::new();
    let mut run_cell: Option<CellKey> = None;

    for &c in coords {
        let cell = grid.cell_of(c);
        match run_cell {
            Some(current) if current != cell => {
                // Carry the crossing vertex into both pieces so they touch
                run.push(c);
                flush(current, index, std::mem::take(&mut run), cells);
                run.push(c);
                run_cell = Some(cell);
            }
            Some(_) => run.push(c),
            None => {
                run.push(c);
                run_cell = Some(cell);
            }
        }
    }
    if let Some(current) = run_cell {
        flush(current, index, run, cells);
    }
}

fn flush(
    cell: CellKey,
    index: usize,
    coords: Vec<Coord<f64>>,
    cells: &mut BTreeMap<CellKey, Vec<MergedChain>>,
) {
    if coords.len() >= 2 {
        cells.entry(cell).or_default().push(MergedChain {
            coords,
            tracks: [index].into_iter().collect(),
        });
    }
}

fn merge_cell(
    key: CellKey,
    pieces: Vec<MergedChain>,
    snap_tolerance_m: f64,
) -> (Vec<MergedChain>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let context = format!("cell ({}, {}) merge", key.0, key.1);
    let chains = merge_or_fallback(pieces, snap_tolerance_m, &context, &mut diagnostics);
    (chains, diagnostics)
}

pub(super) fn build(tracks: &[Track], config: &NetworkConfig) -> (Vec<NetworkSegment>, Vec<Diagnostic>) {
    let Some(grid) = Grid::covering(tracks, config.grid_cell_size_m) else {
        return (Vec::new(), Vec::new());
    };

    let step = config.snap_tolerance_m / 2.0;
    let mut cells: BTreeMap<CellKey, Vec<MergedChain>> = BTreeMap::new();
    for (i, track) in tracks.iter().enumerate() {
        let dense = densify(&track.geometry.0, step);
        split_into_cells(&grid, i, &dense, &mut cells);
    }
    info!(
        "[Network] Grid merge: {} tracks over {} cells ({}m)",
        tracks.len(),
        cells.len(),
        config.grid_cell_size_m
    );

    let cell_list: Vec<(CellKey, Vec<MergedChain>)> = cells.into_iter().collect();
    let tolerance = config.snap_tolerance_m;

    #[cfg(feature = "parallel")]
    let cell_results: Vec<(Vec<MergedChain>, Vec<Diagnostic>)> = cell_list
        .into_par_iter()
        .map(|(key, pieces)| merge_cell(key, pieces, tolerance))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let cell_results: Vec<(Vec<MergedChain>, Vec<Diagnostic>)> = cell_list
        .into_iter()
        .map(|(key, pieces)| merge_cell(key, pieces, tolerance))
        .collect();

    let mut diagnostics = Vec::new();
    let mut cell_chains = Vec::new();
    for (chains, notes) in cell_results {
        cell_chains.extend(chains);
        diagnostics.extend(notes);
    }
    debug!("[Network] {} cell chains before stitching", cell_chains.len());

    let stitched = merge_or_fallback(cell_chains, tolerance, "boundary stitch", &mut diagnostics);
    (
        chains_to_segments(stitched, tracks, config.min_segment_length_m),
        diagnostics,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::line_length;
    use crate::ingest::{LengthClass, TrackShape};
    use geo::LineString;

    fn track(id: &str, coords: Vec<(f64, f64)>) -> Track {
        let geometry = LineString::from(coords);
        let length_m = line_length(&geometry);
        Track {
            id: id.into(),
            source_id: id.into(),
            category: None,
            geometry,
            length_m,
            shape: TrackShape::PointToPoint,
            length_class: LengthClass::Short,
        }
    }

    #[test]
    fn test_split_pieces_touch_across_cells() {
        let grid = Grid {
            min_x: 0.0,
            min_y: 0.0,
            cell_size: 100.0,
        };
        let coords = densify(&[Coord { x: 10.0, y: 50.0 }, Coord { x: 290.0, y: 50.0 }], 20.0);
        let mut cells = BTreeMap::new();
        split_into_cells(&grid, 0, &coords, &mut cells);
        assert_eq!(cells.len(), 3);
        let first = &cells[&(0, 0)][0];
        let second = &cells[&(1, 0)][0];
        assert_eq!(first.coords.last(), second.coords.first());
    }

    #[test]
    fn test_line_crossing_cells_is_stitched() {
        let tracks = vec![
            track("a", vec![(0.0, 0.0), (3000.0, 0.0)]),
            track("b", vec![(0.0, 20.0), (3000.0, 20.0)]),
        ];
        let config = NetworkConfig {
            grid_cell_size_m: 1000.0,
            min_segment_length_m: 500.0,
            ..NetworkConfig::default()
        };
        let (segments, diagnostics) = build(&tracks, &config);
        assert!(diagnostics.is_empty());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].ride_count, 2);
        assert!(segments[0].length_m > 2800.0);
    }
}
