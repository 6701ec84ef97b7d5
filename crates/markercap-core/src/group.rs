use uuid::Uuid;

use crate::feature::{FeatureId, FeatureRef};
use crate::host::{FeatureLayer, LayerId};

/// An ordered, identity-deduplicated set of features. This is the default
/// delegate a [`BoundedLayer`](crate::BoundedLayer) mirrors its visible set into.
#[derive(Debug)]
pub struct FeatureGroup {
    id: LayerId,
    features: Vec<FeatureRef>,
}

impl FeatureGroup {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            features: Vec::new(),
        }
    }

    pub fn contains(&self, id: FeatureId) -> bool {
        self.features.iter().any(|f| f.id() == id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn ids(&self) -> Vec<FeatureId> {
        self.features.iter().map(|f| f.id()).collect()
    }
}

impl Default for FeatureGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureLayer for FeatureGroup {
    fn layer_id(&self) -> LayerId {
        self.id
    }

    fn add_feature(&mut self, feature: FeatureRef) {
        if !self.contains(feature.id()) {
            self.features.push(feature);
        }
    }

    fn remove_feature(&mut self, feature: &FeatureRef) {
        self.features.retain(|f| f.id() != feature.id());
    }

    fn clear_features(&mut self) {
        self.features.clear();
    }

    fn each_feature(&self, f: &mut dyn FnMut(&FeatureRef)) {
        for feature in &self.features {
            f(feature);
        }
    }
}
