use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feature::{Feature, Properties};

/// Three-way comparator used to order features before truncation.
pub type DisplaySort = Box<dyn Fn(&Feature, &Feature) -> Ordering>;

/// Predicate over a feature's properties. Rejected features stay in the
/// candidate set; they are only kept off screen.
pub type DisplayFilter = Box<dyn Fn(&Properties) -> bool>;

pub const DEFAULT_MAX_MARKERS: usize = 500;
pub const DEFAULT_MIN_ZOOM: f64 = 13.0;

/// The cap on simultaneously rendered features.
pub enum MarkerLimit {
    Fixed(usize),
    /// Evaluated once at the start of every recompute.
    Dynamic(Box<dyn Fn() -> usize>),
}

impl MarkerLimit {
    pub fn dynamic(f: impl Fn() -> usize + 'static) -> Self {
        MarkerLimit::Dynamic(Box::new(f))
    }

    pub fn resolve(&self) -> usize {
        match self {
            MarkerLimit::Fixed(n) => *n,
            MarkerLimit::Dynamic(f) => f(),
        }
    }
}

impl From<usize> for MarkerLimit {
    fn from(n: usize) -> Self {
        MarkerLimit::Fixed(n)
    }
}

impl fmt::Debug for MarkerLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerLimit::Fixed(n) => f.debug_tuple("Fixed").field(n).finish(),
            MarkerLimit::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Newest features first (descending identity).
///
/// "Newest" means most recently constructed: a feature built early but added
/// to a layer late still sorts as old. Use [`LayerOptions::with_sort`] with a
/// property-based comparator when insertion time matters.
pub fn newest_first(a: &Feature, b: &Feature) -> Ordering {
    b.id().cmp(&a.id())
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptionsError {
    #[error("invalid zoom range: min_zoom {min} is greater than max_zoom {max}")]
    InvalidZoomRange { min: f64, max: f64 },

    #[error("zoom bound must be a number, got NaN for {field}")]
    NotANumber { field: &'static str },
}

/// Serializable subset of [`LayerOptions`] (everything except the closures).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerSettings {
    /// `None` disables the cap entirely.
    pub max_markers: Option<usize>,
    pub auto_hide: bool,
    pub min_zoom: f64,
    /// `None` means unbounded.
    pub max_zoom: Option<f64>,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            max_markers: Some(DEFAULT_MAX_MARKERS),
            auto_hide: true,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: None,
        }
    }
}

impl LayerSettings {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.min_zoom.is_nan() {
            return Err(OptionsError::NotANumber { field: "min_zoom" });
        }
        if let Some(max) = self.max_zoom {
            if max.is_nan() {
                return Err(OptionsError::NotANumber { field: "max_zoom" });
            }
            if self.min_zoom > max {
                return Err(OptionsError::InvalidZoomRange {
                    min: self.min_zoom,
                    max,
                });
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Layer configuration. Fixed at construction except for the cap, which
/// can be replaced with [`BoundedLayer::set_max_markers`](crate::BoundedLayer::set_max_markers).
pub struct LayerOptions {
    pub max_markers: Option<MarkerLimit>,
    pub display_sort: DisplaySort,
    pub display_filter: DisplayFilter,
    /// Detach the layer from the map while the zoom is outside `[min_zoom, max_zoom]`.
    pub auto_hide: bool,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            max_markers: Some(MarkerLimit::Fixed(DEFAULT_MAX_MARKERS)),
            display_sort: Box::new(newest_first),
            display_filter: Box::new(|_: &Properties| true),
            auto_hide: true,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: f64::INFINITY,
        }
    }
}

impl LayerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &LayerSettings) -> Result<Self, OptionsError> {
        settings.validate()?;
        Ok(Self {
            max_markers: settings.max_markers.map(MarkerLimit::Fixed),
            auto_hide: settings.auto_hide,
            min_zoom: settings.min_zoom,
            max_zoom: settings.max_zoom.unwrap_or(f64::INFINITY),
            ..Self::default()
        })
    }

    pub fn with_max_markers(mut self, limit: impl Into<MarkerLimit>) -> Self {
        self.max_markers = Some(limit.into());
        self
    }

    pub fn without_max_markers(mut self) -> Self {
        self.max_markers = None;
        self
    }

    pub fn with_sort(mut self, sort: impl Fn(&Feature, &Feature) -> Ordering + 'static) -> Self {
        self.display_sort = Box::new(sort);
        self
    }

    pub fn with_filter(mut self, filter: impl Fn(&Properties) -> bool + 'static) -> Self {
        self.display_filter = Box::new(filter);
        self
    }

    pub fn with_auto_hide(mut self, auto_hide: bool) -> Self {
        self.auto_hide = auto_hide;
        self
    }

    pub fn with_zoom_range(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn zoom_in_range(&self, zoom: f64) -> bool {
        zoom >= self.min_zoom && zoom <= self.max_zoom
    }
}

impl fmt::Debug for LayerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerOptions")
            .field("max_markers", &self.max_markers)
            .field("auto_hide", &self.auto_hide)
            .field("min_zoom", &self.min_zoom)
            .field("max_zoom", &self.max_zoom)
            .finish_non_exhaustive()
    }
}
