use alloc::collections::BTreeMap;
use alloc::collections::btree_map;
use alloc::string::String;
use core::ops::{Add, AddAssign};
use serde::{Deserialize, Serialize};

/// Named measurements taken during one sampling tick.
///
/// Merging is last-writer-wins: a measurement added later replaces an earlier
/// one with the same name, disjoint names are unioned.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(transparent)]
pub struct Reading {
    measurements: BTreeMap<String, f64>,
}

impl Reading {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`add_measurement`](Self::add_measurement)
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.add_measurement(name, value);
        self
    }

    pub fn add_measurement(&mut self, name: &str, value: f64) -> &mut Self {
        self.measurements.insert(String::from(name), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.measurements.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, f64> {
        self.measurements.iter()
    }

    /// Fold `other` into `self`, overwriting duplicates with `other`'s values
    pub fn merge(&mut self, other: Reading) {
        self.measurements.extend(other.measurements);
    }
}

impl<'a> IntoIterator for &'a Reading {
    type Item = (&'a String, &'a f64);
    type IntoIter = btree_map::Iter<'a, String, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Add for Reading {
    type Output = Reading;

    fn add(mut self, rhs: Reading) -> Reading {
        self.merge(rhs);
        self
    }
}

impl AddAssign for Reading {
    fn add_assign(&mut self, rhs: Reading) {
        self.merge(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_measurement_overwrites_earlier() {
        let mut reading = Reading::new().with("temperature", 21.5);
        reading.add_measurement("temperature", 22.0);

        assert_eq!(reading.len(), 1);
        assert_eq!(reading.get("temperature"), Some(22.0));
    }

    #[test]
    fn test_merge_is_last_writer_wins() {
        let first = Reading::new().with("temperature", 20.0).with("humidity", 55.0);
        let second = Reading::new().with("humidity", 60.0).with("lux", 300.0);

        let merged = first + second;

        assert_eq!(merged.get("temperature"), Some(20.0));
        assert_eq!(merged.get("humidity"), Some(60.0));
        assert_eq!(merged.get("lux"), Some(300.0));
    }

    #[test]
    fn test_disjoint_sources_are_unioned() {
        let mut total = Reading::new();
        total += Reading::new().with("temperature", 18.0);
        total += Reading::new().with("noise", 61.2);
        total += Reading::new().with("co", 0.4).with("smoke", 0.1);

        assert_eq!(total.len(), 4);
        let names: alloc::vec::Vec<&str> = total.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["co", "noise", "smoke", "temperature"]);
    }

    #[test]
    fn test_missing_measurement() {
        assert!(Reading::new().is_empty());
        assert_eq!(Reading::new().get("gas"), None);
    }
}
