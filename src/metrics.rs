//! Named numeric counters shared by the pipeline components.

use std::collections::BTreeMap;

/// Named `f64` counters. Missing names read as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counters {
    values: BTreeMap<String, f64>,
}

impl Counters {
    /// Increment `name` by one.
    pub fn bump(&mut self, name: &str) {
        self.add(name, 1.0);
    }

    pub fn add(&mut self, name: &str, amount: f64) {
        *self.values.entry(name.to_string()).or_insert(0.0) += amount;
    }

    /// Keep the larger of the current value and `value`.
    pub fn max(&mut self, name: &str, value: f64) {
        let slot = self.values.entry(name.to_string()).or_insert(value);
        if value > *slot {
            *slot = value;
        }
    }

    pub fn get(&self, name: &str) -> f64 {
        self.values.get(name).copied().unwrap_or(0.0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.values.clone()
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }
}

/// `num / den`, or zero when `den` is zero.
pub fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
