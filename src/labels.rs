//! Static label injection.
//!
//! Operator-configured labels are added to every sample of every endpoint.
//! An extra label always overrides an upstream label with the same key, and
//! extra labels are emitted after the upstream labels in key order, so an
//! unchanged upstream always relabels to byte-identical output.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::exposition::{is_valid_label_name, MetricFamily, Sample};

/// Rejected extra label key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelError {
    #[error("invalid label name '{0}'")]
    InvalidName(String),

    #[error("label name '{0}' is reserved (names starting with '__')")]
    Reserved(String),
}

/// Validated, immutable set of labels injected into every sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraLabels {
    /// Sorted by key, keys unique.
    labels: Vec<(String, String)>,
}

impl ExtraLabels {
    /// Validates and orders the given labels. A repeated key keeps its last value.
    pub fn new<I, K, V>(labels: I) -> Result<Self, LabelError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut sorted = BTreeMap::new();
        for (key, value) in labels {
            let key = key.into();
            if !is_valid_label_name(&key) {
                return Err(LabelError::InvalidName(key));
            }
            if key.starts_with("__") {
                return Err(LabelError::Reserved(key));
            }
            sorted.insert(key, value.into());
        }
        Ok(Self {
            labels: sorted.into_iter().collect(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Relabels borrowed families without touching them. An empty label set
    /// hands the input back unchanged.
    pub fn inject<'a>(&self, families: &'a [MetricFamily]) -> Cow<'a, [MetricFamily]> {
        if self.is_empty() {
            return Cow::Borrowed(families);
        }
        Cow::Owned(
            families
                .iter()
                .map(|family| MetricFamily {
                    name: family.name.clone(),
                    help: family.help.clone(),
                    kind: family.kind,
                    samples: family
                        .samples
                        .iter()
                        .map(|sample| Sample {
                            name: sample.name.clone(),
                            labels: self.relabel(&sample.labels),
                            value: sample.value,
                            timestamp_ms: sample.timestamp_ms,
                        })
                        .collect(),
                })
                .collect(),
        )
    }

    /// Relabels owned families.
    pub fn apply(&self, mut families: Vec<MetricFamily>) -> Vec<MetricFamily> {
        if self.is_empty() {
            return families;
        }
        for sample in families.iter_mut().flat_map(|f| f.samples.iter_mut()) {
            sample.labels = self.relabel(&sample.labels);
        }
        families
    }

    fn relabel(&self, upstream: &[(String, String)]) -> Vec<(String, String)> {
        let mut labels = Vec::with_capacity(upstream.len() + self.labels.len());
        labels.extend(
            upstream
                .iter()
                .filter(|(key, _)| self.get(key).is_none())
                .cloned(),
        );
        labels.extend(self.labels.iter().cloned());
        labels
    }
}
