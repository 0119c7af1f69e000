//! R*-tree index over cloud points for neighbourhood queries.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// A cloud point stored in the tree.
pub(crate) struct IndexedPoint {
    pub position: [f64; 3],
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        let dz = self.position[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

pub(crate) struct PointIndex {
    tree: RTree<IndexedPoint>,
}

impl PointIndex {
    pub fn build(points: &[[f64; 3]]) -> Self {
        let items = points
            .iter()
            .map(|&position| IndexedPoint { position })
            .collect();
        Self {
            tree: RTree::bulk_load(items),
        }
    }

    /// The `k` nearest points to `query`, nearest first. Includes `query`
    /// itself when it is a cloud point.
    pub fn nearest(&self, query: &[f64; 3], k: usize) -> impl Iterator<Item = &IndexedPoint> {
        self.tree.nearest_neighbor_iter(query).take(k)
    }

    /// Number of points within `radius` of `query`, including `query` itself
    /// when it is a cloud point.
    pub fn count_within(&self, query: &[f64; 3], radius: f64) -> usize {
        self.tree
            .locate_within_distance(*query, radius * radius)
            .count()
    }
}
