//! GeoJSON reader.
//!
//! Accepts a `FeatureCollection`, a single `Feature`, or a bare JSON array of
//! features. Each `Point` feature becomes one candidate; coordinates are
//! `[longitude, latitude]` as GeoJSON prescribes. Features with any other
//! geometry are skipped since the layer only places point markers.

use std::io::{self, Read};

use serde_json::Value;
use thiserror::Error;

use markercap_core::{Feature, FeatureRef, LatLng, Properties};

// ── Errors ────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum GeoJsonError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid GeoJSON document: {message}")]
    InvalidDocument { message: String },

    #[error("Invalid coordinates in feature {index}")]
    InvalidCoordinates { index: usize },
}

// ── Reader ────────────────────────────────────────────────────────────

pub struct GeoJsonReader<R: Read> {
    reader: R,
}

impl<R: Read> GeoJsonReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read the whole document and return its point features in document order.
    pub fn read(&mut self) -> Result<Vec<FeatureRef>, GeoJsonError> {
        let mut text = String::new();
        self.reader.read_to_string(&mut text)?;
        let doc: Value = serde_json::from_str(&text)?;

        let raw = feature_list(&doc)?;
        let mut features = Vec::with_capacity(raw.len());
        let mut skipped = 0;
        for (index, value) in raw.iter().enumerate() {
            match read_feature(index, value)? {
                Some(f) => features.push(f.into_ref()),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            log::warn!("Skipped {} non-point features", skipped);
        }
        log::info!("Read {} point features", features.len());
        Ok(features)
    }
}

/// Convenience wrapper around [`GeoJsonReader`] for in-memory text.
pub fn read_features(text: &str) -> Result<Vec<FeatureRef>, GeoJsonError> {
    GeoJsonReader::new(text.as_bytes()).read()
}

fn invalid(message: impl Into<String>) -> GeoJsonError {
    GeoJsonError::InvalidDocument {
        message: message.into(),
    }
}

fn feature_list(doc: &Value) -> Result<Vec<&Value>, GeoJsonError> {
    match doc {
        Value::Array(items) => Ok(items.iter().collect()),
        Value::Object(obj) => match obj.get("type").and_then(Value::as_str) {
            Some("FeatureCollection") => match obj.get("features") {
                Some(Value::Array(items)) => Ok(items.iter().collect()),
                _ => Err(invalid("FeatureCollection without a features array")),
            },
            Some("Feature") => Ok(vec![doc]),
            Some(other) => Err(invalid(format!("unsupported top-level type {:?}", other))),
            None => Err(invalid("missing \"type\" member")),
        },
        _ => Err(invalid("expected an object or an array")),
    }
}

/// `Ok(None)` for features that are valid but not points.
fn read_feature(index: usize, value: &Value) -> Result<Option<Feature>, GeoJsonError> {
    let obj = value
        .as_object()
        .ok_or_else(|| invalid(format!("feature {} is not an object", index)))?;
    if obj.get("type").and_then(Value::as_str) != Some("Feature") {
        return Err(invalid(format!("feature {} has no \"type\": \"Feature\"", index)));
    }

    let geometry = match obj.get("geometry") {
        Some(Value::Object(g)) => g,
        Some(Value::Null) | None => {
            log::debug!("Feature {} has no geometry", index);
            return Ok(None);
        }
        Some(_) => return Err(invalid(format!("feature {} geometry is not an object", index))),
    };

    match geometry.get("type").and_then(Value::as_str) {
        Some("Point") => {}
        Some(other) => {
            log::debug!("Feature {} is a {}, skipping", index, other);
            return Ok(None);
        }
        None => return Err(invalid(format!("feature {} geometry has no type", index))),
    }

    let lat_lng = point_coordinates(geometry.get("coordinates"))
        .ok_or(GeoJsonError::InvalidCoordinates { index })?;

    let properties = match obj.get("properties") {
        Some(Value::Object(p)) => p.clone(),
        Some(Value::Null) | None => Properties::new(),
        Some(_) => return Err(invalid(format!("feature {} properties is not an object", index))),
    };

    Ok(Some(Feature::new(lat_lng).with_properties(properties)))
}

fn point_coordinates(value: Option<&Value>) -> Option<LatLng> {
    let coords = value?.as_array()?;
    if coords.len() < 2 {
        return None;
    }
    let lng = coords[0].as_f64()?;
    let lat = coords[1].as_f64()?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return None;
    }
    Some(LatLng::new(lat, lng))
}
