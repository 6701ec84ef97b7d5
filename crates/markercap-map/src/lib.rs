//! # markercap map
//!
//! A small in-memory host for [`markercap_core::BoundedLayer`]: viewport
//! state and pan/zoom math, a [`HostMap`](markercap_core::HostMap)
//! implementation that tracks attached layers and view listeners, event
//! dispatch, and JSON-serializable render frames for a front end.
//!
//! Bounds use a plain linear degrees-per-pixel scale; no map projection is
//! applied.

pub mod viewport;
pub mod map;
pub mod render_data;

pub use map::{dispatch, InMemoryMap};
pub use render_data::{RenderFrame, RenderMarker};
pub use viewport::Viewport;
