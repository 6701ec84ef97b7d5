use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::geometry::LatLng;

/// Key-value properties attached to a feature (the GeoJSON `properties` object).
pub type Properties = Map<String, Value>;

/// Shared handle to a caller-owned feature.
pub type FeatureRef = Rc<Feature>;

static NEXT_FEATURE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable feature identity. Ids are stamped when the feature is constructed,
/// so a larger id always belongs to a newer feature. The order in which
/// features are later added to a layer does not change their ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureId(u64);

impl FeatureId {
    fn next() -> Self {
        Self(NEXT_FEATURE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw stamp value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A renderable point with a coordinate and a property bag.
///
/// Popup and cluster-expansion state are toggled by the host UI through a
/// shared reference, so they live in `Cell`s.
#[derive(Debug)]
pub struct Feature {
    id: FeatureId,
    lat_lng: LatLng,
    properties: Properties,
    popup_open: Cell<bool>,
    expanded: Cell<bool>,
}

impl Feature {
    pub fn new(lat_lng: LatLng) -> Self {
        Self {
            id: FeatureId::next(),
            lat_lng,
            properties: Properties::new(),
            popup_open: Cell::new(false),
            expanded: Cell::new(false),
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn into_ref(self) -> FeatureRef {
        Rc::new(self)
    }

    pub fn id(&self) -> FeatureId {
        self.id
    }

    pub fn lat_lng(&self) -> LatLng {
        self.lat_lng
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn open_popup(&self) {
        self.popup_open.set(true);
    }

    pub fn close_popup(&self) {
        self.popup_open.set(false);
    }

    pub fn is_popup_open(&self) -> bool {
        self.popup_open.get()
    }

    pub fn set_expanded(&self, expanded: bool) {
        self.expanded.set(expanded);
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded.get()
    }

    /// Pinned features are kept on screen by viewport cleanup.
    pub fn is_pinned(&self) -> bool {
        self.is_popup_open() || self.is_expanded()
    }
}
