use crate::map::{Lod, MapRenderer};
use anyhow::{Context, Result};
use geojson::{GeoJson, Geometry, Value};
use std::fs;
use std::path::Path;

/// Load whichever basemap GeoJSON layers exist in `dir` into the renderer.
/// Missing files are skipped, broken ones are logged and skipped.
pub fn load_basemap(renderer: &mut MapRenderer, dir: &Path) {
    let coastline_files = [
        ("ne_110m_coastline.json", Lod::Low),
        ("ne_50m_coastline.json", Lod::Medium),
        ("ne_10m_coastline.json", Lod::High),
        ("coastline.json", Lod::High),
    ];

    for (filename, lod) in coastline_files {
        let path = dir.join(filename);
        if path.exists() {
            if let Err(e) = load_lines(&path, |line| renderer.add_coastline(line, lod)) {
                tracing::warn!("failed to load {}: {:#}", filename, e);
            }
        }
    }

    let border_files = [
        ("ne_50m_borders.json", Lod::Medium),
        ("ne_10m_borders.json", Lod::High),
    ];

    for (filename, lod) in border_files {
        let path = dir.join(filename);
        if path.exists() {
            if let Err(e) = load_lines(&path, |line| renderer.add_border(line, lod)) {
                tracing::warn!("failed to load {}: {:#}", filename, e);
            }
        }
    }

    // Street network exported for the hunt's cities, drawn only up close
    let streets_path = dir.join("streets.json");
    if streets_path.exists() {
        if let Err(e) = load_lines(&streets_path, |line| renderer.add_street(line)) {
            tracing::warn!("failed to load streets: {:#}", e);
        }
    }

    tracing::debug!(dir = %dir.display(), loaded = renderer.has_data(), "basemap scan finished");
}

fn load_lines<F>(path: &Path, add_line: F) -> Result<()>
where
    F: FnMut(Vec<(f64, f64)>),
{
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let geojson: GeoJson = content.parse()?;
    process_geojson_lines(&geojson, add_line);
    Ok(())
}

/// Walk a GeoJSON document and hand every line (or polygon ring) to `add_line`
fn process_geojson_lines<F>(geojson: &GeoJson, mut add_line: F)
where
    F: FnMut(Vec<(f64, f64)>),
{
    match geojson {
        GeoJson::FeatureCollection(fc) => {
            for feature in &fc.features {
                if let Some(ref geometry) = feature.geometry {
                    process_geometry_lines(geometry, &mut add_line);
                }
            }
        }
        GeoJson::Feature(f) => {
            if let Some(ref geometry) = f.geometry {
                process_geometry_lines(geometry, &mut add_line);
            }
        }
        GeoJson::Geometry(geometry) => {
            process_geometry_lines(geometry, &mut add_line);
        }
    }
}

fn process_geometry_lines<F>(geometry: &Geometry, add_line: &mut F)
where
    F: FnMut(Vec<(f64, f64)>),
{
    let to_line = |coords: &Vec<Vec<f64>>| -> Vec<(f64, f64)> {
        coords
            .iter()
            .filter(|c| c.len() >= 2)
            .map(|c| (c[0], c[1]))
            .collect()
    };

    match &geometry.value {
        Value::LineString(coords) => add_line(to_line(coords)),
        Value::MultiLineString(lines) => {
            for coords in lines {
                add_line(to_line(coords));
            }
        }
        Value::Polygon(rings) => {
            for ring in rings {
                add_line(to_line(ring));
            }
        }
        Value::MultiPolygon(polygons) => {
            for rings in polygons {
                for ring in rings {
                    add_line(to_line(ring));
                }
            }
        }
        Value::GeometryCollection(geometries) => {
            for g in geometries {
                process_geometry_lines(g, add_line);
            }
        }
        _ => {}
    }
}

/// Coarse south-eastern Baltic coastline, used when no basemap files are present
pub fn generate_coarse_coastline(renderer: &mut MapRenderer) {
    // Gdańsk bay to Klaipėda, then the Curonian and Vistula spits
    renderer.add_coastline(
        vec![
            (18.55, 54.45), (18.80, 54.37), (19.25, 54.33), (19.65, 54.45),
            (19.90, 54.63), (19.93, 54.95), (20.35, 54.95), (20.55, 54.97),
            (21.00, 55.28), (21.10, 55.72),
        ],
        Lod::Low,
    );
    renderer.add_coastline(
        vec![
            (18.95, 54.35), (19.40, 54.40), (19.75, 54.55), (19.90, 54.63),
        ],
        Lod::Low,
    );
    renderer.add_coastline(
        vec![
            (20.55, 54.97), (20.80, 55.10), (20.95, 55.28), (21.12, 55.70),
        ],
        Lod::Low,
    );
}
