use crate::error::ChoroplethError;
use chrono::{DateTime, NaiveDate};
use geo::MultiPolygon;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// Business id -> record. Iteration order drives tooltip order.
pub type Businesses = KeyedMap<BusinessRecord>;

/// Neighborhood name -> precomputed averages.
pub type Aggregates = KeyedMap<NeighborhoodAggregate>;

/// String-keyed mapping that iterates the way a JavaScript object does:
/// array-index keys (`"0"`, `"999"`, `"1001"`) first in ascending numeric
/// order, then every other key in insertion order.
///
/// Read access goes through `Deref` to the underlying `IndexMap`; mutation
/// only through [`KeyedMap::insert`] so the order cannot be broken.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct KeyedMap<V>(IndexMap<String, V>);

impl<V> KeyedMap<V> {
    pub fn new() -> Self {
        KeyedMap(IndexMap::new())
    }

    /// Insert or replace. A replaced key keeps its position.
    pub fn insert(&mut self, key: String, value: V) -> Option<V> {
        let reorder = array_index(&key).is_some();
        let previous = self.0.insert(key, value);
        if reorder && previous.is_none() {
            self.reorder();
        }
        previous
    }

    fn from_file_order(map: IndexMap<String, V>) -> Self {
        let mut keyed = KeyedMap(map);
        keyed.reorder();
        keyed
    }

    fn reorder(&mut self) {
        // IndexMap::sort_by is stable, so named keys keep insertion order
        self.0.sort_by(|a, _, b, _| key_rank(a).cmp(&key_rank(b)));
    }
}

/// Canonical array index: decimal without leading zeros, below 2^32 - 1.
fn array_index(key: &str) -> Option<u32> {
    let n: u32 = key.parse().ok()?;
    (n != u32::MAX && n.to_string() == key).then_some(n)
}

fn key_rank(key: &str) -> (bool, u32) {
    match array_index(key) {
        Some(n) => (false, n),
        None => (true, 0),
    }
}

impl<V> Default for KeyedMap<V> {
    fn default() -> Self {
        KeyedMap::new()
    }
}

impl<V> Deref for KeyedMap<V> {
    type Target = IndexMap<String, V>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a, V> IntoIterator for &'a KeyedMap<V> {
    type Item = (&'a String, &'a V);
    type IntoIter = indexmap::map::Iter<'a, String, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<V> FromIterator<(String, V)> for KeyedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        KeyedMap::from_file_order(iter.into_iter().collect())
    }
}

impl<V, const N: usize> From<[(String, V); N]> for KeyedMap<V> {
    fn from(entries: [(String, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for KeyedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IndexMap::<String, V>::deserialize(deserializer).map(KeyedMap::from_file_order)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BusinessRecord {
    pub business_data: BusinessData,
    #[serde(default)]
    pub inspection_data: Vec<InspectionEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BusinessData {
    pub name: String,
    pub neighborhood: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InspectionEntry {
    pub date: InspectionDate,
    // null and a missing key both mean "not scored yet"
    #[serde(rename = "Score", default)]
    pub score: Option<f64>,
}

/// Orderable inspection date.
///
/// Numbers and digit-only strings are taken as-is (`20160503` stays
/// `20160503`, `12.5` stays `12.5`); RFC 3339 timestamps and `YYYY-MM-DD`
/// dates become UTC epoch milliseconds. Always finite.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(try_from = "RawDate", into = "f64")]
pub struct InspectionDate(pub f64);

impl PartialEq for InspectionDate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for InspectionDate {}

impl PartialOrd for InspectionDate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InspectionDate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDate {
    Number(f64),
    Text(String),
}

impl TryFrom<RawDate> for InspectionDate {
    type Error = ChoroplethError;

    fn try_from(raw: RawDate) -> Result<Self, Self::Error> {
        match raw {
            RawDate::Number(v) if v.is_finite() => Ok(InspectionDate(v)),
            RawDate::Number(v) => Err(ChoroplethError::InvalidDate(v.to_string())),
            RawDate::Text(s) => s.parse(),
        }
    }
}

impl FromStr for InspectionDate {
    type Err = ChoroplethError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(InspectionDate)
                .ok_or_else(|| ChoroplethError::InvalidDate(s.to_string()));
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
            return Ok(InspectionDate(ts.timestamp_millis() as f64));
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| InspectionDate(dt.and_utc().timestamp_millis() as f64))
            .ok_or_else(|| ChoroplethError::InvalidDate(s.to_string()))
    }
}

impl From<InspectionDate> for f64 {
    fn from(date: InspectionDate) -> f64 {
        date.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct NeighborhoodAggregate {
    pub avg_inspection_score: f64,
    pub avg_violation_score: f64,
}

/// Which aggregate field drives the fill colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSelection {
    #[default]
    Inspections,
    Violations,
}

impl MetricSelection {
    pub const ALL: [MetricSelection; 2] = [MetricSelection::Inspections, MetricSelection::Violations];

    pub fn value_of(self, aggregate: &NeighborhoodAggregate) -> f64 {
        match self {
            MetricSelection::Inspections => aggregate.avg_inspection_score,
            MetricSelection::Violations => aggregate.avg_violation_score,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetricSelection::Inspections => "inspections",
            MetricSelection::Violations => "violations",
        }
    }

    /// The metric the dropdown flips to.
    pub fn other(self) -> MetricSelection {
        match self {
            MetricSelection::Inspections => MetricSelection::Violations,
            MetricSelection::Violations => MetricSelection::Inspections,
        }
    }
}

impl fmt::Display for MetricSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricSelection {
    type Err = ChoroplethError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "inspections" => Ok(MetricSelection::Inspections),
            "violations" => Ok(MetricSelection::Violations),
            other => Err(ChoroplethError::UnknownMetric(other.to_string())),
        }
    }
}

/// One tooltip row: the selected scored inspection of a business.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredInspection {
    pub business_id: String,
    pub business_name: String,
    pub score: f64,
    pub date: InspectionDate,
}

#[derive(Debug, Clone)]
pub struct Boundary {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}
