use serde::Serialize;
use std::collections::BTreeMap;

/// Scalar diagnostics keyed by `"<prefix>/<name>"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Metrics(BTreeMap<String, f32>);

impl Metrics {
    pub fn record(&mut self, prefix: &str, name: &str, value: f32) {
        self.0.insert(format!("{prefix}/{name}"), value);
    }

    pub fn get(&self, key: &str) -> Option<f32> {
        self.0.get(key).copied()
    }

    pub fn extend(&mut self, other: Metrics) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(key, value)| (key.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
