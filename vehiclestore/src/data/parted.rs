use std::collections::{BTreeMap, HashMap};

use crate::buckets::create_timed_key;

/// Result of a bucket range scan over an index.
///
/// `hours` is ascending and parallel to `values_on_each_hour`;
/// `hours_by_value` maps every id to the sorted buckets it appears in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartedKeyValues {
    pub hours: Vec<i64>,
    pub values_on_each_hour: Vec<Vec<String>>,
    pub hours_by_value: HashMap<String, Vec<i64>>,
}

impl PartedKeyValues {
    pub fn is_empty(&self) -> bool {
        self.hours.is_empty()
    }

    /// One `"<hour>:<id>"` key per (id, hour) pair.
    pub fn timed_keys(&self) -> Vec<String> {
        self.hours_by_value
            .iter()
            .flat_map(|(value, hours)| hours.iter().map(move |hour| create_timed_key(*hour, value)))
            .collect()
    }

    /// Timed keys of a single id, empty if the id was not seen.
    pub fn timed_keys_of(&self, value: &str) -> Vec<String> {
        self.hours_by_value
            .get(value)
            .map(|hours| hours.iter().map(|hour| create_timed_key(*hour, value)).collect())
            .unwrap_or_default()
    }
}

impl FromIterator<(i64, String)> for PartedKeyValues {
    fn from_iter<I: IntoIterator<Item = (i64, String)>>(iter: I) -> Self {
        let mut by_hour: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        let mut hours_by_value: HashMap<String, Vec<i64>> = HashMap::new();
        for (hour, value) in iter {
            hours_by_value.entry(value.clone()).or_default().push(hour);
            by_hour.entry(hour).or_default().push(value);
        }
        for hours in hours_by_value.values_mut() {
            hours.sort_unstable();
            hours.dedup();
        }

        let (hours, values_on_each_hour): (Vec<i64>, Vec<Vec<String>>) =
            by_hour.into_iter().unzip();
        Self {
            hours,
            values_on_each_hour,
            hours_by_value,
        }
    }
}
