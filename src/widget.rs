//! The choropleth widget as a small state machine over immutable datasets.
//!
//! The widget is either showing inspection or violation averages. Each
//! metric change computes a complete new [`RenderState`], hands it to the
//! rendering surface, and only then replaces the one it holds, so a failed
//! switch leaves the previous map in place. Hover events never change state.

use crate::aggregate::InspectionPick;
use crate::data::Datasets;
use crate::scale::ColorStyle;
use crate::state::{compute_render_state, RenderState};
use crate::tooltip::TooltipModel;
use crate::types::MetricSelection;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    ShowingInspections,
    ShowingViolations,
}

impl From<MetricSelection> for WidgetState {
    fn from(metric: MetricSelection) -> Self {
        match metric {
            MetricSelection::Inspections => WidgetState::ShowingInspections,
            MetricSelection::Violations => WidgetState::ShowingViolations,
        }
    }
}

/// Where render states end up: a map layer, files on disk, a test recorder.
pub trait RenderSurface {
    /// Draw `state`. `previous` is the state being replaced, `None` on the
    /// initial render.
    fn apply(&mut self, state: &RenderState, datasets: &Datasets, previous: Option<&RenderState>) -> Result<()>;
}

pub struct ChoroplethWidget<S: RenderSurface> {
    datasets: Arc<Datasets>,
    style: ColorStyle,
    pick: InspectionPick,
    surface: S,
    current: RenderState,
}

impl<S: RenderSurface> ChoroplethWidget<S> {
    /// Computes and applies the initial render.
    pub fn new(
        datasets: Arc<Datasets>,
        style: ColorStyle,
        pick: InspectionPick,
        initial: MetricSelection,
        mut surface: S,
    ) -> Result<Self> {
        let current = compute_render_state(initial, &datasets, &style)
            .with_context(|| format!("Initial {} render failed", initial))?;
        surface.apply(&current, &datasets, None)?;
        info!("Widget showing {}", initial);

        Ok(ChoroplethWidget { datasets, style, pick, surface, current })
    }

    pub fn state(&self) -> WidgetState {
        self.current.metric.into()
    }

    pub fn render_state(&self) -> &RenderState {
        &self.current
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Dropdown change: recompute everything for `selection`.
    pub fn on_metric_change(&mut self, selection: MetricSelection) -> Result<&RenderState> {
        let next = compute_render_state(selection, &self.datasets, &self.style)
            .with_context(|| format!("Switching to {} failed", selection))?;
        self.surface.apply(&next, &self.datasets, Some(&self.current))?;

        info!(
            "Widget switched {} -> {} ({} fills changed)",
            self.current.metric,
            selection,
            next.changed_fills(&self.current).len()
        );
        self.current = next;
        Ok(&self.current)
    }

    pub fn on_hover(&self, neighborhood: &str) -> TooltipModel {
        debug!("hover {}", neighborhood);
        TooltipModel::build(neighborhood, &self.datasets.businesses, self.pick)
    }

    /// Hover by coordinate; `None` outside every boundary.
    pub fn on_hover_at(&self, lon: f64, lat: f64) -> Option<TooltipModel> {
        let boundary = self.datasets.boundaries.locate(lon, lat)?;
        Some(self.on_hover(&boundary.name))
    }
}
