use rstar::{RTree, RTreeObject, AABB};

use crate::feature::FeatureRef;
use crate::geometry::{LatLng, LatLngBounds};

/// An entry in the R-tree, referencing a candidate by its position in the candidate list.
#[derive(Debug, Clone)]
pub struct SpatialEntry {
    /// Index into the candidate list.
    pub candidate_index: usize,
    pub position: LatLng,
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position.to_xy())
    }
}

/// Spatial index for viewport culling of point candidates.
///
/// Entries with a NaN or infinite coordinate are never indexed; they cannot
/// fall inside any bounds.
pub struct SpatialIndex {
    tree: RTree<SpatialEntry>,
}

impl SpatialIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// Bulk-load an index from entries.
    pub fn build(entries: Vec<SpatialEntry>) -> Self {
        let entries = entries.into_iter().filter(|e| e.position.is_finite()).collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Index every candidate, keyed by its position in `candidates`.
    pub fn from_features(candidates: &[FeatureRef]) -> Self {
        let entries = candidates
            .iter()
            .enumerate()
            .map(|(candidate_index, f)| SpatialEntry {
                candidate_index,
                position: f.lat_lng(),
            })
            .collect();
        Self::build(entries)
    }

    /// Insert a single entry.
    pub fn insert(&mut self, entry: SpatialEntry) {
        if !entry.position.is_finite() {
            log::debug!("Skipping candidate {} with non-finite position", entry.candidate_index);
            return;
        }
        self.tree.insert(entry);
    }

    /// Candidate indices inside `bounds` (edges included), in ascending
    /// order so callers see insertion order.
    pub fn query_bounds(&self, bounds: &LatLngBounds) -> Vec<usize> {
        let envelope = AABB::from_corners(bounds.south_west.to_xy(), bounds.north_east.to_xy());
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope(&envelope)
            .map(|e| e.candidate_index)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// True when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}
