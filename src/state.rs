//! Pure render state: what the map should look like for one metric.

use crate::aggregate::{color_domain_bounds, lookup_aggregate, DomainBounds};
use crate::data::Datasets;
use crate::error::ChoroplethResult;
use crate::scale::{Color, ColorStyle, LegendEntry, QuantizeScale};
use crate::types::MetricSelection;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureFill {
    pub name: String,
    /// Metric value, `None` when the boundary has no aggregate.
    pub value: Option<f64>,
    pub color: Color,
}

impl FeatureFill {
    pub fn matched(&self) -> bool {
        self.value.is_some()
    }
}

/// Colour scale, per-boundary fills and legend for one metric. Replaced
/// wholesale on every metric switch.
#[derive(Debug, Clone, Serialize)]
pub struct RenderState {
    pub metric: MetricSelection,
    pub domain: DomainBounds,
    pub fills: Vec<FeatureFill>,
    pub legend: Vec<LegendEntry>,
    #[serde(skip)]
    pub scale: QuantizeScale,
}

impl RenderState {
    pub fn fill_for(&self, name: &str) -> Option<&FeatureFill> {
        self.fills.iter().find(|fill| fill.name == name)
    }

    /// Fills whose colour differs from `previous` (or that it lacks).
    pub fn changed_fills<'a>(&'a self, previous: &RenderState) -> Vec<&'a FeatureFill> {
        self.fills
            .iter()
            .filter(|fill| previous.fill_for(&fill.name).map(|old| old.color != fill.color).unwrap_or(true))
            .collect()
    }

    pub fn unmatched(&self) -> impl Iterator<Item = &str> {
        self.fills.iter().filter(|fill| !fill.matched()).map(|fill| fill.name.as_str())
    }
}

pub fn compute_render_state(
    metric: MetricSelection,
    datasets: &Datasets,
    style: &ColorStyle,
) -> ChoroplethResult<RenderState> {
    let domain = color_domain_bounds(metric, &datasets.aggregates)?;
    let scale = QuantizeScale::new(domain, style.palette.clone())?;

    let fills = datasets
        .boundaries
        .boundaries()
        .iter()
        .map(|boundary| match lookup_aggregate(&boundary.name, &datasets.aggregates) {
            Ok(aggregate) => {
                let value = metric.value_of(aggregate);
                FeatureFill {
                    name: boundary.name.clone(),
                    value: Some(value),
                    color: scale.color(value).clone(),
                }
            }
            Err(err) => {
                warn!("{}, using neutral colour", err);
                FeatureFill {
                    name: boundary.name.clone(),
                    value: None,
                    color: style.neutral.clone(),
                }
            }
        })
        .collect();

    debug!(metric = %metric, min = domain.min, max = domain.max, "computed render state");

    Ok(RenderState {
        metric,
        domain,
        fills,
        legend: scale.legend(),
        scale,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ChoroplethError;
    use crate::spatial::tests::square;
    use crate::types::{Aggregates, Businesses, NeighborhoodAggregate};

    pub(crate) fn sample_datasets() -> Datasets {
        let aggregates = Aggregates::from([
            (
                "Mission".to_string(),
                NeighborhoodAggregate { avg_inspection_score: 80.0, avg_violation_score: 4.0 },
            ),
            (
                "SoMa".to_string(),
                NeighborhoodAggregate { avg_inspection_score: 95.0, avg_violation_score: 1.0 },
            ),
        ]);
        let boundaries = vec![
            square("Mission", 0.0, 0.0, 1.0),
            square("SoMa", 1.0, 0.0, 1.0),
            square("Treasure Island", 3.0, 3.0, 1.0),
        ];
        Datasets::new(Businesses::new(), aggregates, boundaries)
    }

    #[test]
    fn test_fills_follow_scale() {
        let datasets = sample_datasets();
        let state = compute_render_state(MetricSelection::Inspections, &datasets, &ColorStyle::default()).unwrap();

        assert_eq!(state.domain, DomainBounds { min: 80.0, max: 95.0 });
        assert_eq!(state.fills.len(), 3);
        assert_eq!(state.fill_for("Mission").unwrap().color.hex(), "#fff5f0");
        assert_eq!(state.fill_for("SoMa").unwrap().color.hex(), "#67000d");
        assert_eq!(state.legend.len(), 9);
    }

    #[test]
    fn test_unknown_neighborhood_gets_neutral_colour() {
        let datasets = sample_datasets();
        let style = ColorStyle::default();
        let state = compute_render_state(MetricSelection::Violations, &datasets, &style).unwrap();

        let island = state.fill_for("Treasure Island").unwrap();
        assert!(!island.matched());
        assert_eq!(island.color, style.neutral);
        assert_eq!(state.unmatched().collect::<Vec<_>>(), vec!["Treasure Island"]);
    }

    #[test]
    fn test_changed_fills_between_metrics() {
        let datasets = sample_datasets();
        let style = ColorStyle::default();
        let inspections = compute_render_state(MetricSelection::Inspections, &datasets, &style).unwrap();
        let violations = compute_render_state(MetricSelection::Violations, &datasets, &style).unwrap();

        // the two matched neighborhoods swap ends of the scale
        let changed: Vec<_> = violations.changed_fills(&inspections).iter().map(|f| f.name.clone()).collect();
        assert_eq!(changed, vec!["Mission".to_string(), "SoMa".to_string()]);
        assert!(inspections.changed_fills(&inspections).is_empty());
    }

    #[test]
    fn test_empty_aggregates_is_an_error() {
        let datasets = Datasets::new(Businesses::new(), Aggregates::new(), vec![square("A", 0.0, 0.0, 1.0)]);
        let err = compute_render_state(MetricSelection::Inspections, &datasets, &ColorStyle::default()).unwrap_err();
        assert!(matches!(err, ChoroplethError::EmptyDataset { .. }));
    }
}
