//! Per-neighborhood derivations over the loaded datasets.
//!
//! Nothing here mutates its inputs; every function returns freshly derived
//! values so that switching metrics back and forth is reproducible.

use crate::error::{ChoroplethError, ChoroplethResult};
use crate::types::{
    Aggregates, Businesses, MetricSelection, NeighborhoodAggregate, ScoredInspection,
};
use serde::{Deserialize, Serialize};

/// Which scored inspection represents a business once its entries are
/// sorted by ascending date.
///
/// `Earliest` keeps the first one (what the widget has always shown),
/// `Latest` keeps the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InspectionPick {
    #[default]
    Earliest,
    Latest,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DomainBounds {
    pub min: f64,
    pub max: f64,
}

impl DomainBounds {
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// One entry per business in `neighborhood` that has at least one scored
/// inspection, in the mapping's iteration order.
pub fn latest_scored_inspections(
    neighborhood: &str,
    businesses: &Businesses,
    pick: InspectionPick,
) -> Vec<ScoredInspection> {
    businesses
        .iter()
        .filter(|(_, record)| record.business_data.neighborhood == neighborhood)
        .filter_map(|(id, record)| {
            let mut scored: Vec<_> = record
                .inspection_data
                .iter()
                .filter_map(|entry| entry.score.map(|score| (entry.date, score)))
                .collect();
            // stable: equal dates keep input order
            scored.sort_by_key(|(date, _)| *date);

            let (date, score) = match pick {
                InspectionPick::Earliest => scored.first(),
                InspectionPick::Latest => scored.last(),
            }
            .copied()?;

            Some(ScoredInspection {
                business_id: id.clone(),
                business_name: record.business_data.name.clone(),
                score,
                date,
            })
        })
        .collect()
}

/// Min and max of `metric` across every neighborhood, used as the colour
/// scale domain.
pub fn color_domain_bounds(
    metric: MetricSelection,
    aggregates: &Aggregates,
) -> ChoroplethResult<DomainBounds> {
    let mut values = Vec::with_capacity(aggregates.len());
    for (name, aggregate) in aggregates {
        let value = metric.value_of(aggregate);
        if !value.is_finite() {
            return Err(ChoroplethError::NonFiniteScore { name: name.clone(), metric });
        }
        values.push(value);
    }
    values.sort_by(f64::total_cmp);

    match (values.first(), values.last()) {
        (Some(&min), Some(&max)) => Ok(DomainBounds { min, max }),
        _ => Err(ChoroplethError::EmptyDataset { metric }),
    }
}

pub fn lookup_aggregate<'a>(
    name: &str,
    aggregates: &'a Aggregates,
) -> ChoroplethResult<&'a NeighborhoodAggregate> {
    aggregates
        .get(name)
        .ok_or_else(|| ChoroplethError::UnknownNeighborhood { name: name.to_string() })
}
