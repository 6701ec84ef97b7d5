use serde::{Deserialize, Serialize};

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn translate(&self, dlat: f64, dlng: f64) -> Self {
        Self {
            lat: self.lat + dlat,
            lng: self.lng + dlng,
        }
    }

    /// False when either component is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Coordinate as an `[x, y]` pair (`[lng, lat]`), the order used by the spatial index.
    pub fn to_xy(&self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}

/// An axis-aligned geographic rectangle, inclusive on every edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    /// Build bounds from any two opposite corners.
    pub fn new(a: LatLng, b: LatLng) -> Self {
        Self {
            south_west: LatLng::new(a.lat.min(b.lat), a.lng.min(b.lng)),
            north_east: LatLng::new(a.lat.max(b.lat), a.lng.max(b.lng)),
        }
    }

    /// Smallest bounds covering every point; `None` for an empty slice.
    pub fn from_points(points: &[LatLng]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bounds = Self::new(*first, *first);
        for p in rest {
            bounds = bounds.extend(p);
        }
        Some(bounds)
    }

    pub fn south(&self) -> f64 {
        self.south_west.lat
    }

    pub fn west(&self) -> f64 {
        self.south_west.lng
    }

    pub fn north(&self) -> f64 {
        self.north_east.lat
    }

    pub fn east(&self) -> f64 {
        self.north_east.lng
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south() + self.north()) / 2.0,
            (self.west() + self.east()) / 2.0,
        )
    }

    pub fn contains(&self, p: &LatLng) -> bool {
        p.lat >= self.south() && p.lat <= self.north() && p.lng >= self.west() && p.lng <= self.east()
    }

    /// Smallest bounds covering `self` and `p`.
    pub fn extend(&self, p: &LatLng) -> Self {
        Self {
            south_west: LatLng::new(self.south().min(p.lat), self.west().min(p.lng)),
            north_east: LatLng::new(self.north().max(p.lat), self.east().max(p.lng)),
        }
    }
}
