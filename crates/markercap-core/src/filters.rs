//! Building blocks for display filters.

use serde_json::Value;

use crate::feature::Properties;
use crate::options::DisplayFilter;

/// Passes only when every filter passes. An empty list accepts everything.
pub fn all_of(filters: Vec<DisplayFilter>) -> DisplayFilter {
    Box::new(move |properties: &Properties| filters.iter().all(|f| f(properties)))
}

/// Passes when `key` is present and equal to `value`.
pub fn property_equals(key: &str, value: impl Into<Value>) -> DisplayFilter {
    let key = key.to_string();
    let value = value.into();
    Box::new(move |properties: &Properties| properties.get(&key) == Some(&value))
}

/// Rejects features whose `key` equals `value`; a missing key passes.
pub fn property_not_equals(key: &str, value: impl Into<Value>) -> DisplayFilter {
    let key = key.to_string();
    let value = value.into();
    Box::new(move |properties: &Properties| properties.get(&key) != Some(&value))
}
