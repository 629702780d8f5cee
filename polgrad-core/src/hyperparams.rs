use crate::error::{ObjectiveError, Result};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HyperparamValue {
    Float(f64),
    Nested(Hyperparams),
}

/// Frozen snapshot of an objective's tunables.
///
/// Snapshots are rebuilt from the live fields every time they are requested and there is no way to
/// mutate one in place: the `with_*` methods consume the snapshot and return a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Hyperparams(BTreeMap<String, HyperparamValue>);

impl Hyperparams {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_float(mut self, name: &str, value: f64) -> Self {
        self.0.insert(name.to_owned(), HyperparamValue::Float(value));
        self
    }

    pub fn with_nested(mut self, name: &str, value: Hyperparams) -> Self {
        self.0.insert(name.to_owned(), HyperparamValue::Nested(value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&HyperparamValue> {
        self.0.get(name)
    }

    pub fn float(&self, name: &str) -> Result<f64> {
        match self.0.get(name) {
            Some(HyperparamValue::Float(value)) => Ok(*value),
            Some(HyperparamValue::Nested(_)) => Err(ObjectiveError::config(format!(
                "hyperparameter '{name}' is a nested snapshot, expected a float"
            ))),
            None => Err(ObjectiveError::config(format!(
                "missing hyperparameter '{name}'"
            ))),
        }
    }

    /// Nested snapshot under `name`, empty if absent.
    pub fn nested(&self, name: &str) -> Hyperparams {
        match self.0.get(name) {
            Some(HyperparamValue::Nested(nested)) => nested.clone(),
            _ => Hyperparams::empty(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HyperparamValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
