//! # markercap core
//!
//! A bounded viewport layer for map views: it keeps every candidate point
//! feature, and on each view change mirrors only the features inside the
//! viewport that pass a display filter, sorted and capped, into a delegate
//! layer the host draws. Includes the zoom-range auto-hide gate, the
//! popup/cluster retention rule, and the capability traits the host map
//! and delegate layers implement.

pub mod geometry;
pub mod feature;
pub mod options;
pub mod filters;
pub mod host;
pub mod group;
pub mod spatial;
pub mod layer;

pub use feature::{Feature, FeatureId, FeatureRef, Properties};
pub use geometry::{LatLng, LatLngBounds};
pub use group::FeatureGroup;
pub use host::{FeatureLayer, HostMap, LayerId, ListenerId, SharedMap, ViewChange, ViewChangeHandler};
pub use layer::{AttachState, BoundedLayer};
pub use options::{LayerOptions, LayerSettings, MarkerLimit, OptionsError};
