//! Inbound keyed occurrence events.

use crate::validation::{Validate, ValidationResult, combine_validations, validators};
use crate::window::TimestampMs;
use serde::{Deserialize, Serialize};

/// One occurrence of `key` at `occurred_at`, counted `weight` times.
///
/// Events are consumed once by ingestion and never stored verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub key: String,
    pub occurred_at: TimestampMs,
    #[serde(default = "default_weight")]
    pub weight: u64,
}

const fn default_weight() -> u64 {
    1
}

impl Event {
    /// An event with weight 1.
    pub fn new(key: impl Into<String>, occurred_at: TimestampMs) -> Self {
        Self {
            key: key.into(),
            occurred_at,
            weight: default_weight(),
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: u64) -> Self {
        self.weight = weight;
        self
    }
}

/// Structural checks only; timestamp slack depends on the clock and is
/// checked by the aggregator.
impl Validate for Event {
    fn validate(&self) -> ValidationResult {
        combine_validations(vec![
            validators::not_empty("key", &self.key),
            validators::in_range("weight", self.weight, 1, u64::MAX),
        ])
    }
}
