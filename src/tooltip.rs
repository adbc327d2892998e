use crate::aggregate::{latest_scored_inspections, InspectionPick};
use crate::types::{Businesses, ScoredInspection};
use serde::Serialize;
use std::fmt::Write;

/// Hover content for one neighborhood.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TooltipModel {
    pub neighborhood: String,
    pub inspections: Vec<ScoredInspection>,
}

impl TooltipModel {
    pub fn build(neighborhood: &str, businesses: &Businesses, pick: InspectionPick) -> Self {
        TooltipModel {
            neighborhood: neighborhood.to_string(),
            inspections: latest_scored_inspections(neighborhood, businesses, pick),
        }
    }

    /// Header plus a two-column name/score table.
    pub fn to_html(&self) -> String {
        let mut html = format!(
            "<h1 class='chloropleth-tooltip-header'>{}</h1><table>",
            html_escape(&self.neighborhood)
        );
        for row in &self.inspections {
            let _ = write!(
                html,
                "<tr><td>{}</td><td>{}</td></tr>",
                html_escape(&row.business_name),
                format_score(row.score)
            );
        }
        html.push_str("</table>");
        html
    }
}

/// Whole scores print without a fractional part.
fn format_score(score: f64) -> String {
    if score.fract() == 0.0 && score.abs() < 1e15 {
        format!("{}", score as i64)
    } else {
        score.to_string()
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
