use std::collections::HashSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::feature::{FeatureId, FeatureRef};
use crate::geometry::LatLngBounds;
use crate::group::FeatureGroup;
use crate::host::{FeatureLayer, LayerId, ListenerId, SharedMap, ViewChange, ViewChangeHandler};
use crate::options::{LayerOptions, MarkerLimit};
use crate::spatial::{SpatialEntry, SpatialIndex};

/// Where the layer stands with respect to a host map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachState {
    Detached,
    Attached,
    /// Attached to a map but removed from it because the zoom left the configured range.
    AutoHidden,
}

/// A layer that keeps every candidate feature but only mirrors a capped,
/// filtered, sorted subset of the ones inside the viewport into its delegate.
///
/// The delegate is created fresh on every [`add_to`](Self::add_to) and is
/// what the host actually draws.
pub struct BoundedLayer<D: FeatureLayer + Default = FeatureGroup> {
    id: LayerId,
    options: LayerOptions,
    /// Insertion-ordered; duplicates allowed.
    candidates: Vec<FeatureRef>,
    /// Lazily rebuilt after removals. `None` means stale.
    index: Option<SpatialIndex>,
    map: Option<SharedMap>,
    listener: Option<ListenerId>,
    delegate: Option<D>,
    state: AttachState,
}

impl<D: FeatureLayer + Default> BoundedLayer<D> {
    /// Create an empty, detached layer.
    pub fn new(options: LayerOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            options,
            candidates: Vec::new(),
            index: None,
            map: None,
            listener: None,
            delegate: None,
            state: AttachState::Detached,
        }
    }

    /// Create a detached layer seeded with `features` in the given order.
    pub fn with_features(features: impl IntoIterator<Item = FeatureRef>, options: LayerOptions) -> Self {
        let mut layer = Self::new(options);
        layer.candidates.extend(features);
        layer
    }

    /// Id the layer registers under on a host map.
    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Current options, including any cap set through [`set_max_markers`](Self::set_max_markers).
    pub fn options(&self) -> &LayerOptions {
        &self.options
    }

    /// Current attachment state.
    pub fn state(&self) -> AttachState {
        self.state
    }

    /// True while the layer is attached and not auto-hidden.
    pub fn is_on_map(&self) -> bool {
        self.state == AttachState::Attached
    }

    /// The map this layer was added to, while attached or auto-hidden.
    pub fn map(&self) -> Option<&SharedMap> {
        self.map.as_ref()
    }

    /// The delegate created by the last [`add_to`](Self::add_to).
    pub fn delegate(&self) -> Option<&D> {
        self.delegate.as_ref()
    }

    /// Features currently mirrored into the delegate.
    pub fn visible(&self) -> Vec<FeatureRef> {
        self.delegate
            .as_ref()
            .map(|d| d.features())
            .unwrap_or_default()
    }

    // ── Candidate set ────────────────────────────────────────────────

    /// Append a candidate and, if the layer is on a map, recompute.
    pub fn add(&mut self, feature: FeatureRef) {
        if let Some(index) = self.index.as_mut() {
            index.insert(SpatialEntry {
                candidate_index: self.candidates.len(),
                position: feature.lat_lng(),
            });
        }
        self.candidates.push(feature);
        if self.state == AttachState::Attached {
            self.update();
        }
    }

    /// Remove the first candidate with the same identity. Unknown features are ignored.
    pub fn remove(&mut self, feature: &FeatureRef) {
        let Some(pos) = self.candidates.iter().position(|f| f.id() == feature.id()) else {
            return;
        };
        self.candidates.remove(pos);
        self.index = None;
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.remove_feature(feature);
        }
    }

    /// Forget every candidate. Whatever the delegate shows stays until the next update.
    pub fn clear(&mut self) {
        self.candidates.clear();
        self.index = None;
    }

    /// Candidates in insertion order, duplicates included.
    pub fn list(&self) -> &[FeatureRef] {
        &self.candidates
    }

    /// Number of candidates, duplicates included.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Visit every candidate in insertion order.
    ///
    /// The callback must not mutate the candidate set; the shared borrow
    /// held for the duration of the call rules that out.
    pub fn for_each(&self, mut f: impl FnMut(&FeatureRef)) {
        for feature in &self.candidates {
            f(feature);
        }
    }

    /// Replace the cap, but only when a cap is already configured. Takes
    /// effect on the next update.
    pub fn set_max_markers(&mut self, limit: impl Into<MarkerLimit>) {
        if self.options.max_markers.is_some() {
            self.options.max_markers = Some(limit.into());
        } else {
            log::debug!("Layer {}: no cap configured, ignoring set_max_markers", self.id);
        }
    }

    // ── Map attachment ───────────────────────────────────────────────

    /// Attach to `map`: register the layer and a fresh delegate, subscribe to
    /// view changes, then run an update.
    pub fn add_to(&mut self, map: &SharedMap) {
        if self.state != AttachState::Detached {
            self.remove_from_map();
        }

        let delegate = D::default();
        {
            let mut m = map.borrow_mut();
            m.add_layer(self.id);
            m.add_layer(delegate.layer_id());
            self.listener = Some(m.on_view_changed(self.id));
        }
        self.delegate = Some(delegate);
        self.map = Some(Rc::clone(map));
        self.state = AttachState::Attached;
        log::info!("Layer {} attached ({} candidates)", self.id, self.candidates.len());

        self.update();
    }

    /// Detach from the current map: clear the delegate, unregister both
    /// layers and drop the view listener. No-op when detached.
    pub fn remove_from_map(&mut self) {
        let Some(map) = self.map.take() else {
            return;
        };

        let delegate_id = self.delegate.as_ref().map(|d| d.layer_id());
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.clear_features();
        }

        let mut m = map.borrow_mut();
        if m.has_layer(self.id) {
            m.remove_layer(self.id);
        }
        if let Some(id) = delegate_id {
            if m.has_layer(id) {
                m.remove_layer(id);
            }
        }
        if let Some(listener) = self.listener.take() {
            m.off(listener);
        }
        self.state = AttachState::Detached;
        log::info!("Layer {} detached", self.id);
    }

    /// Apply the zoom gate for `zoom` and return whether the layer is on the
    /// map afterwards.
    ///
    /// Leaving `[min_zoom, max_zoom]` removes the layer and its delegate from
    /// the map and clears the delegate; the view listener stays registered
    /// so that coming back into range restores them.
    pub fn check_zoom(&mut self, zoom: f64) -> bool {
        let Some(map) = self.map.clone() else {
            return false;
        };
        let delegate_id = self.delegate.as_ref().map(|d| d.layer_id());

        if !self.options.zoom_in_range(zoom) {
            let mut m = map.borrow_mut();
            if m.has_layer(self.id) {
                m.remove_layer(self.id);
                if let Some(id) = delegate_id {
                    m.remove_layer(id);
                }
                if let Some(delegate) = self.delegate.as_mut() {
                    delegate.clear_features();
                }
                self.state = AttachState::AutoHidden;
                log::info!(
                    "Layer {} auto-hidden at zoom {} (range {}..={})",
                    self.id,
                    zoom,
                    self.options.min_zoom,
                    self.options.max_zoom
                );
            }
        } else if self.state == AttachState::AutoHidden {
            let mut m = map.borrow_mut();
            if !m.has_layer(self.id) {
                m.add_layer(self.id);
                if let Some(id) = delegate_id {
                    m.add_layer(id);
                }
            }
            self.state = AttachState::Attached;
            log::info!("Layer {} shown again at zoom {}", self.id, zoom);
        }

        let on_map = map.borrow().has_layer(self.id);
        on_map
    }

    // ── Recompute ────────────────────────────────────────────────────

    /// Run the zoom gate (when auto-hide is on) and, if the layer is on the
    /// map, recompute the visible set. Safe to call repeatedly for the same view.
    pub fn update(&mut self) {
        if self.state == AttachState::Detached {
            return;
        }
        if self.options.auto_hide {
            let zoom = match &self.map {
                Some(map) => map.borrow().zoom(),
                None => return,
            };
            if !self.check_zoom(zoom) {
                return;
            }
        }
        if self.state == AttachState::Attached {
            self.recompute();
        }
    }

    fn recompute(&mut self) {
        let bounds = match &self.map {
            Some(map) => map.borrow().bounds(),
            None => return,
        };
        let limit = self.options.max_markers.as_ref().map(MarkerLimit::resolve);
        let selection = self.select(&bounds);
        let candidate_ids: HashSet<FeatureId> = self.candidates.iter().map(|f| f.id()).collect();

        let Some(delegate) = self.delegate.as_mut() else {
            return;
        };
        let filter = &self.options.display_filter;
        let sort = &self.options.display_sort;

        // Pinned members (open popup or expanded) skip the viewport test only.
        let mut pinned: Vec<FeatureRef> = Vec::new();
        for feature in delegate.features() {
            if feature.is_pinned()
                && candidate_ids.contains(&feature.id())
                && filter(feature.properties())
            {
                pinned.push(feature);
            } else {
                delegate.remove_feature(&feature);
            }
        }
        if let Some(n) = limit.filter(|n| pinned.len() > *n) {
            pinned.sort_by(|a, b| sort(a.as_ref(), b.as_ref()));
            for feature in pinned.split_off(n) {
                delegate.remove_feature(&feature);
            }
        }
        let retained: HashSet<FeatureId> = pinned.iter().map(|f| f.id()).collect();

        let budget = limit.map(|n| n - retained.len());
        let mut added = 0;
        for feature in selection {
            if budget.is_some_and(|b| added >= b) {
                break;
            }
            if retained.contains(&feature.id()) {
                continue;
            }
            delegate.add_feature(feature);
            added += 1;
        }

        log::debug!(
            "Layer {}: {} shown ({} retained) of {} candidates, cap {:?}",
            self.id,
            added + retained.len(),
            retained.len(),
            candidate_ids.len(),
            limit
        );
    }

    /// Candidates inside `bounds` that pass the display filter, one entry per
    /// identity, in display order.
    fn select(&mut self, bounds: &LatLngBounds) -> Vec<FeatureRef> {
        let index = self
            .index
            .get_or_insert_with(|| SpatialIndex::from_features(&self.candidates));
        let hits = index.query_bounds(bounds);

        let filter = &self.options.display_filter;
        let mut seen: HashSet<FeatureId> = HashSet::new();
        let mut selection: Vec<FeatureRef> = hits
            .into_iter()
            .map(|i| &self.candidates[i])
            .filter(|f| seen.insert(f.id()))
            .filter(|f| filter(f.properties()))
            .cloned()
            .collect();

        let sort = &self.options.display_sort;
        selection.sort_by(|a, b| sort(a.as_ref(), b.as_ref()));
        selection
    }
}

impl<D: FeatureLayer + Default> FeatureLayer for BoundedLayer<D> {
    fn layer_id(&self) -> LayerId {
        self.id
    }

    fn add_feature(&mut self, feature: FeatureRef) {
        self.add(feature);
    }

    fn remove_feature(&mut self, feature: &FeatureRef) {
        self.remove(feature);
    }

    fn clear_features(&mut self) {
        self.clear();
    }

    fn each_feature(&self, f: &mut dyn FnMut(&FeatureRef)) {
        self.for_each(f);
    }
}

impl<D: FeatureLayer + Default> ViewChangeHandler for BoundedLayer<D> {
    fn layer_id(&self) -> LayerId {
        self.id
    }

    fn on_view_changed(&mut self, change: &ViewChange) {
        log::trace!("Layer {}: view changed, zoom {}", self.id, change.zoom);
        self.update();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Feature;
    use crate::geometry::LatLng;
    use crate::host::HostMap;
    use std::cell::RefCell;

    /// Minimal host: fixed bounds, adjustable zoom, layer and listener registry.
    struct StubMap {
        zoom: f64,
        bounds: LatLngBounds,
        layers: Vec<LayerId>,
        listeners: Vec<ListenerId>,
        next_listener: u64,
    }

    impl StubMap {
        fn shared(zoom: f64) -> (Rc<RefCell<StubMap>>, SharedMap) {
            let map = Rc::new(RefCell::new(StubMap {
                zoom,
                bounds: LatLngBounds::new(LatLng::new(0.0, 0.0), LatLng::new(10.0, 10.0)),
                layers: Vec::new(),
                listeners: Vec::new(),
                next_listener: 0,
            }));
            let shared: SharedMap = map.clone();
            (map, shared)
        }
    }

    impl HostMap for StubMap {
        fn zoom(&self) -> f64 {
            self.zoom
        }

        fn bounds(&self) -> LatLngBounds {
            self.bounds
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

        fn on_view_changed(&mut self, _target: LayerId) -> ListenerId {
            self.next_listener += 1;
            let id = ListenerId(self.next_listener);
            self.listeners.push(id);
            id
        }

        fn off(&mut self, listener: ListenerId) {
            self.listeners.retain(|l| *l != listener);
        }
    }

    fn inside() -> FeatureRef {
        Feature::new(LatLng::new(5.0, 5.0)).into_ref()
    }

    fn outside() -> FeatureRef {
        Feature::new(LatLng::new(50.0, 50.0)).into_ref()
    }

    #[test]
    fn test_initial_state_detached() {
        let layer: BoundedLayer = BoundedLayer::new(LayerOptions::default());
        assert_eq!(layer.state(), AttachState::Detached);
        assert!(layer.visible().is_empty());
    }

    #[test]
    fn test_add_while_detached_does_not_render() {
        let mut layer: BoundedLayer = BoundedLayer::new(LayerOptions::default());
        layer.add(inside());
        assert_eq!(layer.len(), 1);
        assert!(layer.delegate().is_none());
    }

    #[test]
    fn test_attach_registers_layer_and_listener() {
        let (map, shared) = StubMap::shared(14.0);
        let mut layer: BoundedLayer = BoundedLayer::new(LayerOptions::default());
        layer.add(inside());
        layer.add_to(&shared);

        assert_eq!(layer.state(), AttachState::Attached);
        let delegate_id = layer.delegate().unwrap().layer_id();
        assert!(map.borrow().has_layer(layer.id()));
        assert!(map.borrow().has_layer(delegate_id));
        assert_eq!(map.borrow().listeners.len(), 1);
        assert_eq!(layer.visible().len(), 1);
    }

    #[test]
    fn test_add_while_attached_recomputes() {
        let (_map, shared) = StubMap::shared(14.0);
        let mut layer: BoundedLayer = BoundedLayer::new(LayerOptions::default());
        layer.add_to(&shared);
        assert!(layer.visible().is_empty());

        let f = inside();
        layer.add(f.clone());
        assert_eq!(layer.visible()[0].id(), f.id());

        layer.add(outside());
        assert_eq!(layer.visible().len(), 1);
    }

    #[test]
    fn test_remove_drops_from_delegate() {
        let (_map, shared) = StubMap::shared(14.0);
        let mut layer: BoundedLayer = BoundedLayer::new(LayerOptions::default());
        let f = inside();
        layer.add(f.clone());
        layer.add_to(&shared);
        assert_eq!(layer.visible().len(), 1);

        layer.remove(&f);
        assert!(layer.is_empty());
        assert!(layer.visible().is_empty());
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut layer: BoundedLayer = BoundedLayer::new(LayerOptions::default());
        layer.add(inside());
        layer.remove(&inside());
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn test_remove_only_first_duplicate() {
        let mut layer: BoundedLayer = BoundedLayer::new(LayerOptions::default());
        let f = inside();
        layer.add(f.clone());
        layer.add(f.clone());
        assert_eq!(layer.len(), 2);
        layer.remove(&f);
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn test_duplicates_count_once_against_cap() {
        let (_map, shared) = StubMap::shared(14.0);
        let mut layer: BoundedLayer =
            BoundedLayer::new(LayerOptions::default().with_max_markers(2usize));
        let a = inside();
        let b = inside();
        layer.add(a.clone());
        layer.add(a.clone());
        layer.add(b.clone());
        layer.add_to(&shared);
        let ids: Vec<FeatureId> = layer.visible().iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec![b.id(), a.id()]);
    }

    #[test]
    fn test_clear_keeps_delegate_until_update() {
        let (_map, shared) = StubMap::shared(14.0);
        let mut layer: BoundedLayer = BoundedLayer::new(LayerOptions::default());
        layer.add(inside());
        layer.add_to(&shared);

        layer.clear();
        assert!(layer.list().is_empty());
        assert_eq!(layer.visible().len(), 1);

        layer.update();
        assert!(layer.visible().is_empty());
    }

    #[test]
    fn test_set_max_markers_guard() {
        let mut capped: BoundedLayer = BoundedLayer::new(LayerOptions::default());
        capped.set_max_markers(7usize);
        assert_eq!(
            capped.options().max_markers.as_ref().map(MarkerLimit::resolve),
            Some(7)
        );

        let mut uncapped: BoundedLayer =
            BoundedLayer::new(LayerOptions::default().without_max_markers());
        uncapped.set_max_markers(7usize);
        assert!(uncapped.options().max_markers.is_none());
    }

    #[test]
    fn test_set_max_markers_waits_for_next_update() {
        let (_map, shared) = StubMap::shared(14.0);
        let mut layer: BoundedLayer =
            BoundedLayer::new(LayerOptions::default().with_max_markers(3usize));
        for _ in 0..5 {
            layer.add(inside());
        }
        layer.add_to(&shared);
        assert_eq!(layer.visible().len(), 3);

        layer.set_max_markers(1usize);
        assert_eq!(layer.visible().len(), 3);
        layer.update();
        assert_eq!(layer.visible().len(), 1);
    }

    #[test]
    fn test_check_zoom_without_map() {
        let mut layer: BoundedLayer = BoundedLayer::new(LayerOptions::default());
        assert!(!layer.check_zoom(14.0));
    }

    #[test]
    fn test_attach_below_min_zoom_auto_hides() {
        let (map, shared) = StubMap::shared(5.0);
        let mut layer: BoundedLayer = BoundedLayer::new(LayerOptions::default());
        layer.add(inside());
        layer.add_to(&shared);

        assert_eq!(layer.state(), AttachState::AutoHidden);
        assert!(!map.borrow().has_layer(layer.id()));
        assert!(layer.visible().is_empty());
        // Listener stays so the layer can come back.
        assert_eq!(map.borrow().listeners.len(), 1);
    }

    #[test]
    fn test_auto_hide_disabled_ignores_zoom() {
        let (map, shared) = StubMap::shared(1.0);
        let mut layer: BoundedLayer =
            BoundedLayer::new(LayerOptions::default().with_auto_hide(false));
        layer.add(inside());
        layer.add_to(&shared);
        assert_eq!(layer.state(), AttachState::Attached);
        assert!(map.borrow().has_layer(layer.id()));
        assert_eq!(layer.visible().len(), 1);
    }

    #[test]
    fn test_remove_from_map_cleans_up() {
        let (map, shared) = StubMap::shared(14.0);
        let mut layer: BoundedLayer = BoundedLayer::new(LayerOptions::default());
        layer.add(inside());
        layer.add_to(&shared);
        let delegate_id = layer.delegate().unwrap().layer_id();

        layer.remove_from_map();
        assert_eq!(layer.state(), AttachState::Detached);
        assert!(layer.map().is_none());
        assert!(layer.visible().is_empty());
        assert!(!map.borrow().has_layer(layer.id()));
        assert!(!map.borrow().has_layer(delegate_id));
        assert!(map.borrow().listeners.is_empty());
        assert_eq!(layer.len(), 1);

        // Second call is a no-op.
        layer.remove_from_map();
        assert_eq!(layer.state(), AttachState::Detached);
    }

    #[test]
    fn test_reattach_creates_fresh_delegate() {
        let (map, shared) = StubMap::shared(14.0);
        let mut layer: BoundedLayer = BoundedLayer::new(LayerOptions::default());
        layer.add(inside());
        layer.add_to(&shared);
        let first = layer.delegate().unwrap().layer_id();

        layer.add_to(&shared);
        let second = layer.delegate().unwrap().layer_id();
        assert_ne!(first, second);
        assert!(!map.borrow().has_layer(first));
        assert!(map.borrow().has_layer(second));
        assert_eq!(map.borrow().listeners.len(), 1);
    }

    #[test]
    fn test_pinned_members_never_exceed_cap() {
        let (_map, shared) = StubMap::shared(14.0);
        let features: Vec<FeatureRef> = (0..4).map(|_| inside()).collect();
        let mut layer: BoundedLayer = BoundedLayer::with_features(
            features.clone(),
            LayerOptions::default().with_max_markers(2usize),
        );
        layer.add_to(&shared);
        features[3].open_popup();
        features[2].set_expanded(true);

        layer.set_max_markers(1usize);
        layer.update();
        // Both pinned, only one slot: the newest wins.
        let visible = layer.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id(), features[3].id());

        layer.set_max_markers(0usize);
        layer.update();
        assert!(layer.visible().is_empty());
    }

    #[test]
    fn test_pinned_member_dropped_after_clear() {
        let (_map, shared) = StubMap::shared(14.0);
        let f = inside();
        let mut layer: BoundedLayer = BoundedLayer::new(LayerOptions::default());
        layer.add(f.clone());
        layer.add_to(&shared);
        f.open_popup();

        layer.clear();
        layer.update();
        assert!(layer.visible().is_empty());
    }

    #[test]
    fn test_pinned_member_dropped_when_filter_rejects_it() {
        let (_map, shared) = StubMap::shared(14.0);
        let shown = Rc::new(std::cell::Cell::new(true));
        let toggle = Rc::clone(&shown);
        let f = inside();
        let mut layer: BoundedLayer =
            BoundedLayer::new(LayerOptions::default().with_filter(move |_| toggle.get()));
        layer.add(f.clone());
        layer.add_to(&shared);
        assert_eq!(layer.visible().len(), 1);

        f.set_expanded(true);
        shown.set(false);
        layer.update();
        assert!(layer.visible().is_empty());
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn test_non_finite_candidate_is_never_shown() {
        let (_map, shared) = StubMap::shared(14.0);
        let mut layer: BoundedLayer =
            BoundedLayer::with_features((0..100).map(|_| inside()), LayerOptions::default());
        let broken = Feature::new(LatLng::new(f64::NAN, 0.0)).into_ref();
        layer.add(broken.clone());
        layer.add_to(&shared);
        assert_eq!(layer.visible().len(), 100);

        layer.add(Feature::new(LatLng::new(5.0, f64::INFINITY)).into_ref());
        assert_eq!(layer.visible().len(), 100);
        assert!(layer.visible().iter().all(|f| f.id() != broken.id()));
        assert_eq!(layer.len(), 102);
    }

    #[test]
    fn test_feature_layer_surface() {
        let mut layer: BoundedLayer = BoundedLayer::new(LayerOptions::default());
        let f = inside();
        layer.add_feature(f.clone());
        let mut seen = Vec::new();
        layer.each_feature(&mut |x| seen.push(x.id()));
        assert_eq!(seen, vec![f.id()]);
        layer.remove_feature(&f);
        assert!(layer.is_empty());
        layer.add_feature(f);
        layer.clear_features();
        assert!(layer.is_empty());
    }
}
