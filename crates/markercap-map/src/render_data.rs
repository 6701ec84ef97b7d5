use serde::{Deserialize, Serialize};

use markercap_core::{AttachState, BoundedLayer, Feature, FeatureLayer, LatLngBounds, Properties};

use crate::viewport::Viewport;

/// A visible feature, ready to be drawn by the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderMarker {
    pub id: u64,
    pub lat: f64,
    pub lng: f64,
    pub properties: Properties,
    /// Kept on screen by an open popup or expanded cluster.
    pub pinned: bool,
}

impl RenderMarker {
    pub fn from_feature(feature: &Feature) -> Self {
        let p = feature.lat_lng();
        Self {
            id: feature.id().get(),
            lat: p.lat,
            lng: p.lng,
            properties: feature.properties().clone(),
            pinned: feature.is_pinned(),
        }
    }
}

/// Snapshot of one layer for one view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderFrame {
    pub viewport: Viewport,
    pub bounds: LatLngBounds,
    pub state: AttachState,
    pub candidate_count: usize,
    pub markers: Vec<RenderMarker>,
}

impl RenderFrame {
    pub fn capture<D: FeatureLayer + Default>(layer: &BoundedLayer<D>, viewport: Viewport) -> Self {
        Self {
            viewport,
            bounds: viewport.bounds(),
            state: layer.state(),
            candidate_count: layer.len(),
            markers: layer
                .visible()
                .iter()
                .map(|f| RenderMarker::from_feature(f))
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markercap_core::{LatLng, LayerOptions};

    #[test]
    fn test_render_marker_copies_feature() {
        let f = Feature::new(LatLng::new(1.5, 2.5)).with_property("name", "a");
        f.open_popup();
        let m = RenderMarker::from_feature(&f);
        assert_eq!(m.id, f.id().get());
        assert_eq!((m.lat, m.lng), (1.5, 2.5));
        assert_eq!(m.properties["name"], "a");
        assert!(m.pinned);
    }

    #[test]
    fn test_capture_detached_layer() {
        let layer: BoundedLayer = BoundedLayer::with_features(
            vec![Feature::new(LatLng::new(0.0, 0.0)).into_ref()],
            LayerOptions::default(),
        );
        let frame = RenderFrame::capture(&layer, Viewport::new(100.0, 100.0));
        assert_eq!(frame.state, AttachState::Detached);
        assert_eq!(frame.candidate_count, 1);
        assert!(frame.markers.is_empty());

        let json = frame.to_json().unwrap();
        assert!(json.contains("\"Detached\""));
    }
}
