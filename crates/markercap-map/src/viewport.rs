use serde::{Deserialize, Serialize};

use markercap_core::{LatLng, LatLngBounds};

/// Width of a tile in pixels; at zoom 0 the whole 360° fits in one tile.
pub const TILE_SIZE: f64 = 256.0;
pub const MIN_ZOOM: f64 = 0.0;
pub const MAX_ZOOM: f64 = 22.0;

/// Current view of a map canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: LatLng,
    /// Zoom level; each step doubles the scale.
    pub zoom: f64,
    /// Canvas width in pixels.
    pub width_px: f64,
    /// Canvas height in pixels.
    pub height_px: f64,
}

impl Viewport {
    pub fn new(width_px: f64, height_px: f64) -> Self {
        Self {
            center: LatLng::new(0.0, 0.0),
            zoom: MIN_ZOOM,
            width_px,
            height_px,
        }
    }

    pub fn with_view(mut self, center: LatLng, zoom: f64) -> Self {
        self.center = center;
        self.set_zoom(zoom);
        self
    }

    pub fn degrees_per_pixel(&self) -> f64 {
        360.0 / (TILE_SIZE * 2f64.powf(self.zoom))
    }

    /// Pan by a delta in screen pixels (y grows downwards).
    pub fn pan(&mut self, dx: f64, dy: f64) {
        let dpp = self.degrees_per_pixel();
        self.center = self.center.translate(dy * dpp, -dx * dpp);
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn zoom_by(&mut self, delta: f64) {
        self.set_zoom(self.zoom + delta);
    }

    /// Zoom by `delta` keeping the point under the given screen position fixed.
    pub fn zoom_at(&mut self, screen_x: f64, screen_y: f64, delta: f64) {
        let anchor = self.screen_to_lat_lng(screen_x, screen_y);
        self.zoom_by(delta);
        let moved = self.screen_to_lat_lng(screen_x, screen_y);
        self.center = self
            .center
            .translate(anchor.lat - moved.lat, anchor.lng - moved.lng);
    }

    /// Center on `bounds` at the largest whole zoom that fits it with a 10% margin.
    pub fn fit_bounds(&mut self, bounds: &LatLngBounds) {
        let span_lat = bounds.north() - bounds.south();
        let span_lng = bounds.east() - bounds.west();
        self.center = bounds.center();
        if span_lat <= 0.0 && span_lng <= 0.0 {
            return;
        }

        let zoom_for = |span: f64, px: f64| {
            if span <= 0.0 {
                MAX_ZOOM
            } else {
                (360.0 * px * 0.9 / (TILE_SIZE * span)).log2()
            }
        };
        let zoom = zoom_for(span_lng, self.width_px).min(zoom_for(span_lat, self.height_px));
        self.set_zoom(zoom.floor());
    }

    pub fn screen_to_lat_lng(&self, screen_x: f64, screen_y: f64) -> LatLng {
        let dpp = self.degrees_per_pixel();
        LatLng::new(
            self.center.lat - (screen_y - self.height_px / 2.0) * dpp,
            self.center.lng + (screen_x - self.width_px / 2.0) * dpp,
        )
    }

    pub fn lat_lng_to_screen(&self, p: &LatLng) -> (f64, f64) {
        let dpp = self.degrees_per_pixel();
        (
            (p.lng - self.center.lng) / dpp + self.width_px / 2.0,
            (self.center.lat - p.lat) / dpp + self.height_px / 2.0,
        )
    }

    /// Geographic bounds of the visible canvas.
    pub fn bounds(&self) -> LatLngBounds {
        LatLngBounds::new(
            self.screen_to_lat_lng(0.0, self.height_px),
            self.screen_to_lat_lng(self.width_px, 0.0),
        )
    }
}
