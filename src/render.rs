use crate::aggregate::InspectionPick;
use crate::data::Datasets;
use crate::scale::LegendEntry;
use crate::state::RenderState;
use crate::tooltip::TooltipModel;
use crate::widget::RenderSurface;
use anyhow::{anyhow, Context, Result};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use image::{ImageBuffer, Rgba, RgbaImage};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const FILL_OPACITY: f64 = 0.6;
const STROKE_WEIGHT: u32 = 3;
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
/// Largest raster edge, in pixels, either way.
pub const MAX_RASTER_EDGE: u32 = 8192;

/// Boundaries as GeoJSON features carrying their fill for `state`.
pub fn styled_features(state: &RenderState, datasets: &Datasets) -> FeatureCollection {
    let features = datasets
        .boundaries
        .boundaries()
        .iter()
        .filter_map(|boundary| {
            let fill = state.fill_for(&boundary.name)?;
            let mut properties = JsonObject::new();
            properties.insert("name".to_string(), json!(boundary.name));
            properties.insert("metric".to_string(), json!(state.metric));
            properties.insert("value".to_string(), json!(fill.value));
            properties.insert("fill".to_string(), json!(fill.color.hex()));
            properties.insert("fill_opacity".to_string(), json!(FILL_OPACITY));
            properties.insert("weight".to_string(), json!(STROKE_WEIGHT));

            Some(Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&boundary.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect();

    FeatureCollection { bbox: None, features, foreign_members: None }
}

/// Rasterise the filled boundaries in Web Mercator, `width` pixels wide.
pub fn render_raster(state: &RenderState, datasets: &Datasets, width: u32) -> Result<RgbaImage> {
    let bounds = datasets
        .boundaries
        .bounds()
        .ok_or_else(|| anyhow!("No boundary polygons to rasterise"))?;
    if width == 0 || bounds.width() <= 0.0 || bounds.height() <= 0.0 {
        return Err(anyhow!("Degenerate raster: width {} over {:?}", width, bounds));
    }
    if width > MAX_RASTER_EDGE {
        return Err(anyhow!("Raster width {} exceeds {} pixels", width, MAX_RASTER_EDGE));
    }

    let x_min = bounds.min().x;
    let x_span = bounds.width();
    let y_top = mercator_y(bounds.max().y);
    let y_span = y_top - mercator_y(bounds.min().y);
    let height = ((width as f64) * y_span / x_span.to_radians()).ceil().max(1.0);
    if !height.is_finite() || height > MAX_RASTER_EDGE as f64 {
        return Err(anyhow!(
            "Boundaries {:?} at width {} need a raster {} pixels tall (limit {})",
            bounds,
            width,
            height,
            MAX_RASTER_EDGE
        ));
    }
    let height = height as u32;

    let colors: HashMap<&str, Rgba<u8>> = state
        .fills
        .iter()
        .map(|fill| {
            let mut c = fill.color.rgba();
            c.0[3] = (FILL_OPACITY * 255.0).round() as u8;
            (fill.name.as_str(), c)
        })
        .collect();

    let rows: Vec<Vec<Rgba<u8>>> = (0..height)
        .into_par_iter()
        .map(|py| {
            let lat = inverse_mercator_y(y_top - (py as f64 + 0.5) / height as f64 * y_span);
            (0..width)
                .map(|px| {
                    let lon = x_min + (px as f64 + 0.5) / width as f64 * x_span;
                    datasets
                        .boundaries
                        .locate(lon, lat)
                        .and_then(|b| colors.get(b.name.as_str()).copied())
                        .unwrap_or(TRANSPARENT)
                })
                .collect()
        })
        .collect();

    let mut img: RgbaImage = ImageBuffer::new(width, height);
    for (py, row) in rows.into_iter().enumerate() {
        for (px, pixel) in row.into_iter().enumerate() {
            img.put_pixel(px as u32, py as u32, pixel);
        }
    }
    Ok(img)
}

// Web Mercator y in radians-scale units
fn mercator_y(lat: f64) -> f64 {
    let lat_rad = lat.to_radians();
    (lat_rad.tan() + 1.0 / lat_rad.cos()).ln()
}

fn inverse_mercator_y(y: f64) -> f64 {
    (2.0 * y.exp().atan() - PI / 2.0).to_degrees()
}

#[derive(Serialize)]
struct LegendFile<'a> {
    metric: &'a str,
    min: f64,
    max: f64,
    entries: &'a [LegendEntry],
}

/// Writes every applied state under `<dir>/<metric>/`.
pub struct FileSurface {
    dir: PathBuf,
    raster_width: u32,
    written: Vec<PathBuf>,
}

impl FileSurface {
    pub fn new(dir: impl Into<PathBuf>, raster_width: u32) -> Self {
        FileSurface { dir: dir.into(), raster_width, written: Vec::new() }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write_json<T: Serialize>(&mut self, path: PathBuf, value: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(value)?;
        fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;
        self.written.push(path);
        Ok(())
    }

    /// One tooltip per boundary, independent of the metric shown.
    pub fn write_tooltips(&mut self, datasets: &Datasets, pick: InspectionPick) -> Result<()> {
        fs::create_dir_all(&self.dir).context("Failed to create output directory")?;
        let tooltips: Vec<TooltipModel> = datasets
            .boundaries
            .boundaries()
            .iter()
            .map(|b| TooltipModel::build(&b.name, &datasets.businesses, pick))
            .collect();
        self.write_json(self.dir.join("tooltips.json"), &tooltips)
    }
}

impl RenderSurface for FileSurface {
    fn apply(&mut self, state: &RenderState, datasets: &Datasets, previous: Option<&RenderState>) -> Result<()> {
        let metric_dir = self.dir.join(state.metric.as_str());
        fs::create_dir_all(&metric_dir).context("Failed to create metric directory")?;

        if let Some(previous) = previous {
            info!(
                "Rendering {} ({} of {} fills differ from {})",
                state.metric,
                state.changed_fills(previous).len(),
                state.fills.len(),
                previous.metric
            );
        } else {
            info!("Rendering {}", state.metric);
        }

        self.write_json(metric_dir.join("choropleth.geojson"), &styled_features(state, datasets))?;
        self.write_json(
            metric_dir.join("legend.json"),
            &LegendFile {
                metric: state.metric.as_str(),
                min: state.domain.min,
                max: state.domain.max,
                entries: &state.legend,
            },
        )?;

        let png = metric_dir.join("choropleth.png");
        save_png(&render_raster(state, datasets, self.raster_width)?, &png)?;
        self.written.push(png);
        Ok(())
    }
}

fn save_png(img: &RgbaImage, path: &Path) -> Result<()> {
    img.save(path).with_context(|| format!("Failed to save raster {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::ColorStyle;
    use crate::state::compute_render_state;
    use crate::state::tests::sample_datasets;
    use crate::types::{Aggregates, Boundary, Businesses, MetricSelection, NeighborhoodAggregate};
    use geo::{polygon, MultiPolygon};

    #[test]
    fn test_styled_features_carry_fill() {
        let datasets = sample_datasets();
        let state = compute_render_state(MetricSelection::Inspections, &datasets, &ColorStyle::default()).unwrap();
        let fc = styled_features(&state, &datasets);

        assert_eq!(fc.features.len(), 3);
        let soma = fc
            .features
            .iter()
            .find(|f| f.property("name").and_then(|v| v.as_str()) == Some("SoMa"))
            .unwrap();
        assert_eq!(soma.property("fill").and_then(|v| v.as_str()), Some("#67000d"));
        assert_eq!(soma.property("value").and_then(|v| v.as_f64()), Some(95.0));
        assert_eq!(soma.property("metric").and_then(|v| v.as_str()), Some("inspections"));

        let island = fc
            .features
            .iter()
            .find(|f| f.property("name").and_then(|v| v.as_str()) == Some("Treasure Island"))
            .unwrap();
        assert!(island.property("value").unwrap().is_null());
    }

    #[test]
    fn test_raster_colours_pixels_inside_boundaries() {
        let datasets = sample_datasets();
        let state = compute_render_state(MetricSelection::Inspections, &datasets, &ColorStyle::default()).unwrap();
        let img = render_raster(&state, &datasets, 40).unwrap();

        assert_eq!(img.width(), 40);
        assert!(img.height() >= 40);
        // bottom-left corner lies in Mission (lightest red), top-left is empty
        let bottom_left = img.get_pixel(1, img.height() - 2);
        assert_eq!(&bottom_left.0[..3], &[0xff, 0xf5, 0xf0]);
        assert_eq!(bottom_left.0[3], 153);
        assert_eq!(*img.get_pixel(1, 1), TRANSPARENT);
    }

    #[test]
    fn test_raster_rejects_oversized_output() {
        let strip = Boundary {
            name: "Strip".to_string(),
            geometry: MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 0.0001, y: 0.0),
                (x: 0.0001, y: 1.0),
                (x: 0.0, y: 1.0),
                (x: 0.0, y: 0.0),
            ]]),
        };
        let aggregates = Aggregates::from([(
            "Strip".to_string(),
            NeighborhoodAggregate { avg_inspection_score: 90.0, avg_violation_score: 2.0 },
        )]);
        let datasets = Datasets::new(Businesses::new(), aggregates, vec![strip]);
        let state = compute_render_state(MetricSelection::Inspections, &datasets, &ColorStyle::default()).unwrap();

        let err = render_raster(&state, &datasets, 1024).unwrap_err();
        assert!(err.to_string().contains("pixels tall"));
        assert!(render_raster(&state, &datasets, MAX_RASTER_EDGE + 1).is_err());
    }

    #[test]
    fn test_mercator_round_trip() {
        for lat in [-60.0, 0.0, 37.77, 51.5] {
            assert!((inverse_mercator_y(mercator_y(lat)) - lat).abs() < 1e-9);
        }
    }

    #[test]
    fn test_file_surface_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let datasets = sample_datasets();
        let state = compute_render_state(MetricSelection::Violations, &datasets, &ColorStyle::default()).unwrap();

        let mut surface = FileSurface::new(dir.path(), 32);
        surface.apply(&state, &datasets, None).unwrap();
        surface.write_tooltips(&datasets, InspectionPick::Earliest).unwrap();

        for rel in ["violations/choropleth.geojson", "violations/legend.json", "violations/choropleth.png", "tooltips.json"] {
            assert!(dir.path().join(rel).exists(), "missing {}", rel);
        }
        assert_eq!(surface.written().len(), 4);

        let legend: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("violations/legend.json")).unwrap()).unwrap();
        assert_eq!(legend["metric"], "violations");
        assert_eq!(legend["entries"].as_array().unwrap().len(), 9);
    }
}
