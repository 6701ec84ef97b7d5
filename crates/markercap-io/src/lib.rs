//! # markercap I/O
//!
//! Readers that turn GeoJSON documents into candidate features for a
//! bounded layer.

pub mod geojson;

pub use geojson::{read_features, GeoJsonError, GeoJsonReader};
