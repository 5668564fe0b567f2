//! R-tree indexed observation types.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::Observation;

/// An observation's planar position with its index in the bucket
#[derive(Debug, Clone, Copy)]
pub struct IndexedPoint {
    pub idx: usize,
    pub lng: f64,
    pub lat: f64,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lng, self.lat])
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlng = self.lng - point[0];
        let dlat = self.lat - point[1];
        dlng * dlng + dlat * dlat
    }
}

/// Build R-tree over a bucket's `(longitude, latitude)` coordinates
pub fn build_rtree(observations: &[Observation]) -> RTree<IndexedPoint> {
    let indexed: Vec<IndexedPoint> = observations
        .iter()
        .enumerate()
        .map(|(i, o)| IndexedPoint {
            idx: i,
            lng: o.longitude,
            lat: o.latitude,
        })
        .collect();
    RTree::bulk_load(indexed)
}
