use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use markercap_core::filters;
use markercap_core::{BoundedLayer, LatLng, LayerOptions};
use markercap_io::GeoJsonReader;
use markercap_map::map::as_host;
use markercap_map::{InMemoryMap, Viewport};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../tests/fixtures")
        .join(name)
}

fn names(layer: &BoundedLayer) -> Vec<String> {
    layer
        .visible()
        .iter()
        .map(|f| f.property("name").and_then(|v| v.as_str()).unwrap_or_default().to_string())
        .collect()
}

#[test]
fn test_fixture_through_layer() {
    let file = File::open(fixture("places.geojson")).unwrap();
    let features = GeoJsonReader::new(BufReader::new(file)).read().unwrap();
    assert_eq!(features.len(), 5);

    let map = InMemoryMap::shared(
        Viewport::new(1024.0, 768.0).with_view(LatLng::new(48.8566, 2.3522), 15.0),
    );
    let mut options = LayerOptions::default().with_max_markers(2usize);
    options.display_filter = filters::property_not_equals("active", false);
    let mut layer: BoundedLayer = BoundedLayer::with_features(features, options);
    layer.add_to(&as_host(&map));

    assert_eq!(names(&layer), vec!["Cafe du Marais", "Notre-Dame"]);
    assert_eq!(layer.len(), 5);
}
