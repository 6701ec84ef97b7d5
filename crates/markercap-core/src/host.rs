//! Capabilities the layer consumes from its host map, and the feature
//! container capability it both consumes (delegate) and provides.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::feature::FeatureRef;
use crate::geometry::LatLngBounds;

/// Identity of a layer registered with a host map.
pub type LayerId = Uuid;

/// Token returned by [`HostMap::on_view_changed`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

/// Payload of the host's "view changed" (move end / zoom end) event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewChange {
    pub zoom: f64,
    pub bounds: LatLngBounds,
}

/// The map a layer is attached to.
pub trait HostMap {
    fn zoom(&self) -> f64;
    /// Currently visible geographic bounds.
    fn bounds(&self) -> LatLngBounds;
    fn add_layer(&mut self, layer: LayerId);
    fn remove_layer(&mut self, layer: LayerId);
    fn has_layer(&self, layer: LayerId) -> bool;
    /// Subscribe `target` to view-changed events.
    fn on_view_changed(&mut self, target: LayerId) -> ListenerId;
    fn off(&mut self, listener: ListenerId);
}

/// Shared handle to a host map. Everything runs on the UI thread.
pub type SharedMap = Rc<RefCell<dyn HostMap>>;

/// A container of features the host can draw.
pub trait FeatureLayer {
    fn layer_id(&self) -> LayerId;
    fn add_feature(&mut self, feature: FeatureRef);
    fn remove_feature(&mut self, feature: &FeatureRef);
    fn clear_features(&mut self);
    fn each_feature(&self, f: &mut dyn FnMut(&FeatureRef));

    /// Snapshot of the current contents in iteration order.
    fn features(&self) -> Vec<FeatureRef> {
        let mut out = Vec::new();
        self.each_feature(&mut |f| out.push(FeatureRef::clone(f)));
        out
    }
}

/// Receiver of view-changed events dispatched by the host.
pub trait ViewChangeHandler {
    /// The id the handler subscribed with.
    fn layer_id(&self) -> LayerId;
    fn on_view_changed(&mut self, change: &ViewChange);
}
