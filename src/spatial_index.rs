//! R-tree indexed geometry and spatial query utilities.
//!
//! Coordinates are planar meters, so squared Euclidean distance is the
//! native metric for every query.

use geo::{Coord, Line, Point};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geo_utils::distance_to_line;

/// A planar point with its index for R-tree queries
#[derive(Debug, Clone, Copy)]
pub struct IndexedPoint {
    pub idx: usize,
    pub x: f64,
    pub y: f64,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.x, self.y])
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.x - point[0];
        let dy = self.y - point[1];
        dx * dx + dy * dy
    }
}

/// One straight piece of a larger geometry, tagged with its owner's index
#[derive(Debug, Clone, Copy)]
pub struct IndexedLine {
    pub owner: usize,
    pub line: Line<f64>,
}

impl RTreeObject for IndexedLine {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.line.start.x, self.line.start.y],
            [self.line.end.x, self.line.end.y],
        )
    }
}

impl PointDistance for IndexedLine {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let d = distance_to_line(Point::new(point[0], point[1]), &self.line);
        d * d
    }
}

/// Build R-tree from planar coordinates for efficient spatial queries
pub fn build_point_tree(coords: &[Coord<f64>]) -> RTree<IndexedPoint> {
    let indexed: Vec<IndexedPoint> = coords
        .iter()
        .enumerate()
        .map(|(i, c)| IndexedPoint {
            idx: i,
            x: c.x,
            y: c.y,
        })
        .collect();
    RTree::bulk_load(indexed)
}

/// Build R-tree over the line pieces of several owners.
pub fn build_line_tree<'a, I>(owners: I) -> RTree<IndexedLine>
where
    I: IntoIterator<Item = (usize, &'a geo::LineString<f64>)>,
{
    let pieces: Vec<IndexedLine> = owners
        .into_iter()
        .flat_map(|(owner, ls)| ls.lines().map(move |line| IndexedLine { owner, line }))
        .collect();
    RTree::bulk_load(pieces)
}

/// Indices of all points within `radius` of `center` (inclusive), ascending.
pub fn points_within(tree: &RTree<IndexedPoint>, center: Coord<f64>, radius: f64) -> Vec<usize> {
    let mut found: Vec<usize> = tree
        .locate_within_distance([center.x, center.y], radius * radius)
        .map(|p| p.idx)
        .collect();
    found.sort_unstable();
    found
}

/// Owners with any piece within `radius` of `center`, ascending and unique.
pub fn owners_within(tree: &RTree<IndexedLine>, center: Coord<f64>, radius: f64) -> Vec<usize> {
    let mut found: Vec<usize> = tree
        .locate_within_distance([center.x, center.y], radius * radius)
        .map(|piece| piece.owner)
        .collect();
    found.sort_unstable();
    found.dedup();
    found
}

/// Nearest owner to `center` and its distance, if within `max_distance`.
pub fn nearest_owner(
    tree: &RTree<IndexedLine>,
    center: Coord<f64>,
    max_distance: f64,
) -> Option<(usize, f64)> {
    let query = [center.x, center.y];
    tree.nearest_neighbor(&query).and_then(|piece| {
        let d = piece.distance_2(&query).sqrt();
        (d <= max_distance).then_some((piece.owner, d))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;

    #[test]
    fn test_points_within_inclusive() {
        let coords = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 25.0, y: 0.0 },
        ];
        let tree = build_point_tree(&coords);
        assert_eq!(points_within(&tree, Coord { x: 0.0, y: 0.0 }, 10.0), vec![0, 1]);
    }

    #[test]
    fn test_owner_queries() {
        let a = line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0)];
        let b = line_string![(x: 0.0, y: 50.0), (x: 100.0, y: 50.0)];
        let tree = build_line_tree(vec![(0, &a), (1, &b)]);

        assert_eq!(owners_within(&tree, Coord { x: 50.0, y: 10.0 }, 15.0), vec![0]);
        assert_eq!(owners_within(&tree, Coord { x: 50.0, y: 25.0 }, 30.0), vec![0, 1]);

        let (owner, d) = nearest_owner(&tree, Coord { x: 50.0, y: 40.0 }, 100.0).unwrap();
        assert_eq!(owner, 1);
        assert!((d - 10.0).abs() < 1e-9);
        assert!(nearest_owner(&tree, Coord { x: 50.0, y: 300.0 }, 100.0).is_none());
    }
}
