use std::cell::RefCell;
use std::rc::Rc;

use markercap_core::{
    HostMap, LatLng, LatLngBounds, LayerId, ListenerId, SharedMap, ViewChange, ViewChangeHandler,
};

use crate::viewport::Viewport;

/// A host map that lives entirely in memory: a viewport, the ordered list of
/// attached layer ids, and view-changed listeners.
#[derive(Debug)]
pub struct InMemoryMap {
    viewport: Viewport,
    layers: Vec<LayerId>,
    listeners: Vec<(ListenerId, LayerId)>,
    next_listener: u64,
}

impl InMemoryMap {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            layers: Vec::new(),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Wrap a new map for sharing with layers.
    pub fn shared(viewport: Viewport) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new(viewport)))
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn set_view(&mut self, center: LatLng, zoom: f64) {
        self.viewport.center = center;
        self.viewport.set_zoom(zoom);
        log::debug!("View set to {:?} @ zoom {}", center, self.viewport.zoom);
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.viewport.set_zoom(zoom);
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.viewport.pan(dx, dy);
    }

    pub fn fit_bounds(&mut self, bounds: &LatLngBounds) {
        self.viewport.fit_bounds(bounds);
    }

    pub fn layer_ids(&self) -> &[LayerId] {
        &self.layers
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Layers subscribed to view changes, in subscription order.
    pub fn subscribers(&self) -> Vec<LayerId> {
        self.listeners.iter().map(|(_, target)| *target).collect()
    }

    pub fn view_change(&self) -> ViewChange {
        ViewChange {
            zoom: self.viewport.zoom,
            bounds: self.viewport.bounds(),
        }
    }
}

impl HostMap for InMemoryMap {
    fn zoom(&self) -> f64 {
        self.viewport.zoom
    }

    fn bounds(&self) -> LatLngBounds {
        self.viewport.bounds()
    }

    fn add_layer(&mut self, layer: LayerId) {
        if !self.layers.contains(&layer) {
            self.layers.push(layer);
        }
    }

    fn remove_layer(&mut self, layer: LayerId) {
        self.layers.retain(|l| *l != layer);
    }

    fn has_layer(&self, layer: LayerId) -> bool {
        self.layers.contains(&layer)
    }

    fn on_view_changed(&mut self, target: LayerId) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.listeners.push((id, target));
        id
    }

    fn off(&mut self, listener: ListenerId) {
        self.listeners.retain(|(id, _)| *id != listener);
    }
}

/// Coerce a concrete map handle into the shared trait-object handle layers hold.
pub fn as_host(map: &Rc<RefCell<InMemoryMap>>) -> SharedMap {
    map.clone()
}

/// Fire a view-changed event at every subscribed handler, in subscription
/// order. Returns how many handler calls were made.
///
/// The map is only borrowed while the subscriber list is read, so handlers
/// are free to add or remove layers on it.
pub fn dispatch(map: &RefCell<InMemoryMap>, handlers: &mut [&mut dyn ViewChangeHandler]) -> usize {
    let (change, subscribers) = {
        let m = map.borrow();
        (m.view_change(), m.subscribers())
    };

    let mut calls = 0;
    for target in subscribers {
        for handler in handlers.iter_mut() {
            if handler.layer_id() == target {
                handler.on_view_changed(&change);
                calls += 1;
            }
        }
    }
    calls
}
