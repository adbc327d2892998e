use crate::config::InputConfig;
use crate::spatial::BoundaryIndex;
use crate::types::{Aggregates, Boundary, Businesses, NeighborhoodAggregate};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use geo::MultiPolygon;
use serde::Deserialize;
use shapefile::Reader;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

/// Everything the widget renders from. Loaded once, never mutated.
pub struct Datasets {
    pub businesses: Businesses,
    pub aggregates: Aggregates,
    pub boundaries: BoundaryIndex,
}

impl Datasets {
    pub fn new(businesses: Businesses, aggregates: Aggregates, boundaries: Vec<Boundary>) -> Self {
        Datasets {
            businesses,
            aggregates,
            boundaries: BoundaryIndex::new(boundaries),
        }
    }
}

pub fn load_data(input: &InputConfig) -> Result<Datasets> {
    info!("Loading data...");

    let businesses = load_businesses(&input.businesses)?;
    info!("Loaded {} businesses", businesses.len());

    let aggregates = load_aggregates(&input.aggregates)?;
    info!("Loaded aggregate scores for {} neighborhoods", aggregates.len());

    let boundaries = load_boundaries(&input.boundaries, &input.boundary_name_property)?;
    info!("Loaded {} boundary features", boundaries.len());

    let unmatched = boundaries.iter().filter(|b| !aggregates.contains_key(&b.name)).count();
    if unmatched > 0 {
        warn!("{} boundary features have no aggregate scores and will use the neutral colour", unmatched);
    }

    Ok(Datasets::new(businesses, aggregates, boundaries))
}

fn extension_of(path: &Path) -> Result<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .ok_or_else(|| anyhow!("Input file {:?} has no extension", path))
}

pub fn load_businesses(path: &Path) -> Result<Businesses> {
    let file = File::open(path).with_context(|| format!("Failed to open business data: {:?}", path))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse business data: {:?}", path))
}

pub fn load_aggregates(path: &Path) -> Result<Aggregates> {
    match extension_of(path)?.as_str() {
        "json" => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open aggregate data: {:?}", path))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Failed to parse aggregate data: {:?}", path))
        }
        "csv" => load_aggregates_csv(path),
        other => Err(anyhow!("Unsupported aggregate format: {}", other)),
    }
}

#[derive(Deserialize)]
struct AggregateRow {
    #[serde(alias = "neighborhood")]
    name: String,
    avg_inspection_score: f64,
    avg_violation_score: f64,
}

fn load_aggregates_csv(path: &Path) -> Result<Aggregates> {
    let file = File::open(path).with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let mut aggregates = Aggregates::new();
    for (line, row) in rdr.deserialize::<AggregateRow>().enumerate() {
        let row = row.with_context(|| format!("Bad aggregate row {} in {:?}", line + 1, path))?;
        if row.name.is_empty() {
            continue;
        }
        aggregates.insert(
            row.name,
            NeighborhoodAggregate {
                avg_inspection_score: row.avg_inspection_score,
                avg_violation_score: row.avg_violation_score,
            },
        );
    }
    Ok(aggregates)
}

pub fn load_boundaries(path: &Path, name_property: &str) -> Result<Vec<Boundary>> {
    match extension_of(path)?.as_str() {
        "shp" => load_shapefile(path, name_property),
        "json" | "geojson" => load_geojson(path, name_property),
        other => Err(anyhow!("Unsupported geometry format: {}", other)),
    }
}

fn load_shapefile(path: &Path, name_property: &str) -> Result<Vec<Boundary>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut boundaries = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let name = match record.get(name_property) {
            Some(shapefile::dbase::FieldValue::Character(Some(s))) => s.trim().to_string(),
            Some(shapefile::dbase::FieldValue::Character(None)) => continue,
            Some(_) => return Err(anyhow!("Shapefile name field '{}' must be a string", name_property)),
            None => return Err(anyhow!("Name field '{}' not found in Shapefile", name_property)),
        };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygon {}: {:?}", name, e))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM {}: {:?}", name, e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ {}: {:?}", name, e))?,
            _ => {
                warn!("Skipping non-polygon shape for {}", name);
                continue;
            }
        };

        boundaries.push(Boundary { name, geometry });
    }

    Ok(boundaries)
}

fn load_geojson(path: &Path, name_property: &str) -> Result<Vec<Boundary>> {
    use geojson::GeoJson;

    let file = File::open(path).with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let geojson = GeoJson::from_reader(BufReader::new(file)).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("Boundary GeoJSON must be a FeatureCollection")),
    };

    let mut boundaries = Vec::new();

    for feature in collection.features {
        let name = match feature.properties.as_ref().and_then(|props| props.get(name_property)) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                warn!("Skipping boundary feature without a '{}' property", name_property);
                continue;
            }
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let converted: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geometry of {}: {:?}", name, e))?;
                match converted {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => {
                        warn!("Skipping non-polygon boundary {}", name);
                        continue;
                    }
                }
            }
            None => continue,
        };

        boundaries.push(Boundary { name, geometry });
    }

    Ok(boundaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(dir: &tempfile::TempDir, file_name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(file_name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_aggregates_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "agg.csv",
            "neighborhood,avg_inspection_score,avg_violation_score\nMission, 80.5, 2.0\nSoMa,95,1.25\n",
        );
        let aggregates = load_aggregates(&path).unwrap();
        assert_eq!(aggregates.len(), 2);
        assert_eq!(aggregates["Mission"].avg_inspection_score, 80.5);
        assert_eq!(aggregates["SoMa"].avg_violation_score, 1.25);
    }

    #[test]
    fn test_geojson_skips_unnamed_and_non_polygon_features() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "b.geojson",
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"name": "Mission"},
                 "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
                {"type": "Feature", "properties": {"other": "x"},
                 "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
                {"type": "Feature", "properties": {"name": "Pier"},
                 "geometry": {"type": "Point", "coordinates": [3, 3]}}
            ]}"#,
        );
        let boundaries = load_boundaries(&path, "name").unwrap();
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].name, "Mission");
    }

    #[test]
    fn test_unsupported_formats() {
        assert!(load_boundaries(Path::new("areas.kml"), "name").is_err());
        assert!(load_aggregates(Path::new("scores.xlsx")).is_err());
        assert!(load_aggregates(Path::new("no_extension")).is_err());
    }
}
