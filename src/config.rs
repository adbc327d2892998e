use crate::aggregate::InspectionPick;
use crate::scale::{ColorStyle, DEFAULT_NEUTRAL, REDS_9};
use crate::types::MetricSelection;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub style: StyleConfig,
    #[serde(default)]
    pub map: MapConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub businesses: PathBuf,
    pub aggregates: PathBuf, // .json or .csv
    pub boundaries: PathBuf, // .geojson / .json or .shp
    #[serde(default = "default_name_property")]
    pub boundary_name_property: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AggregationConfig {
    #[serde(default)]
    pub inspection_pick: InspectionPick,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StyleConfig {
    #[serde(default)]
    pub initial_metric: MetricSelection,
    pub palette: Option<Vec<String>>, // Hex codes, defaults to Reds[9]
    #[serde(default = "default_neutral")]
    pub neutral_color: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MapConfig {
    #[serde(default = "default_center")]
    pub center: [f64; 2], // [lat, lon]
    #[serde(default = "default_zoom")]
    pub zoom: u8,
    #[serde(default = "default_tile_url")]
    pub tile_url: String,
    #[serde(default = "default_attribution")]
    pub attribution: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
    #[serde(default = "default_raster_width")]
    pub raster_width: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

fn default_name_property() -> String {
    "name".to_string()
}

fn default_neutral() -> String {
    DEFAULT_NEUTRAL.to_string()
}

fn default_center() -> [f64; 2] {
    [37.7749, -122.4194]
}

fn default_zoom() -> u8 {
    13
}

fn default_tile_url() -> String {
    "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string()
}

fn default_attribution() -> String {
    "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors".to_string()
}

fn default_raster_width() -> u32 {
    1024
}

impl Default for StyleConfig {
    fn default() -> Self {
        StyleConfig {
            initial_metric: MetricSelection::default(),
            palette: None,
            neutral_color: default_neutral(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        MapConfig {
            center: default_center(),
            zoom: default_zoom(),
            tile_url: default_tile_url(),
            attribution: default_attribution(),
        }
    }
}

impl StyleConfig {
    pub fn color_style(&self) -> Result<ColorStyle> {
        let style = match &self.palette {
            Some(palette) => ColorStyle::new(palette.as_slice(), &self.neutral_color),
            None => ColorStyle::new(&REDS_9[..], &self.neutral_color),
        };
        style.context("Invalid [style] colours")
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [input]
        businesses = "data/restaurant_data.json"
        aggregates = "data/chloropleth_data.json"
        boundaries = "data/sf.geojson"

        [output]
        dir = "output"

        [server]
        port = 3000
    "#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.input.boundary_name_property, "name");
        assert_eq!(config.aggregation.inspection_pick, InspectionPick::Earliest);
        assert_eq!(config.style.initial_metric, MetricSelection::Inspections);
        assert_eq!(config.map.zoom, 13);
        assert_eq!(config.output.raster_width, 1024);

        let style = config.style.color_style().unwrap();
        assert_eq!(style.palette.len(), 9);
        assert_eq!(style.neutral.hex(), "#bdbdbd");
    }

    #[test]
    fn test_style_overrides() {
        let content = format!(
            "{}\n[aggregation]\ninspection_pick = \"latest\"\n[style]\ninitial_metric = \"violations\"\npalette = [\"#ffffff\", \"#000000\"]\n",
            MINIMAL
        );
        let config = AppConfig::from_toml(&content).unwrap();
        assert_eq!(config.aggregation.inspection_pick, InspectionPick::Latest);
        assert_eq!(config.style.initial_metric, MetricSelection::Violations);
        assert_eq!(config.style.color_style().unwrap().palette.len(), 2);
    }

    #[test]
    fn test_bad_colour_and_metric_rejected() {
        let bad_colour = format!("{}\n[style]\nneutral_color = \"grey\"\n", MINIMAL);
        let config = AppConfig::from_toml(&bad_colour).unwrap();
        assert!(config.style.color_style().is_err());

        let bad_metric = format!("{}\n[style]\ninitial_metric = \"ratings\"\n", MINIMAL);
        assert!(AppConfig::from_toml(&bad_metric).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load_from_file(Path::new("does/not/exist.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
