use crate::braille::BrailleCanvas;
use crate::map::geometry::{draw_line, draw_ring};
use crate::map::projection::Viewport;
use crate::port::MarkerSpec;

/// A geographic line (sequence of lon/lat coordinates)
pub type LineString = Vec<(f64, f64)>;

/// Level of detail for basemap data
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lod {
    Low,    // 110m - region
    Medium, // 50m - country
    High,   // 10m and local exports - city
}

impl Lod {
    /// Select LOD based on zoom level
    pub fn from_level(level: f64) -> Self {
        if level < 6.0 {
            Lod::Low
        } else if level < 10.0 {
            Lod::Medium
        } else {
            Lod::High
        }
    }
}

/// Streets only make sense once individual blocks are distinguishable
const STREET_MIN_LEVEL: f64 = 13.0;

/// Display settings for map layers
#[derive(Clone, Debug)]
pub struct DisplaySettings {
    pub show_coastlines: bool,
    pub show_borders: bool,
    pub show_streets: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            show_coastlines: true,
            show_borders: true,
            show_streets: true,
        }
    }
}

/// A place marker placed on the character grid
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerLabel {
    pub col: u16,
    pub row: u16,
    pub place_id: String,
    pub text: String,
    pub solved: bool,
    pub selected: bool,
}

/// Rendered map, one canvas per colour plus marker labels on top
pub struct MapLayers {
    pub coastlines: BrailleCanvas,
    pub borders: BrailleCanvas,
    pub streets: BrailleCanvas,
    pub highlight: BrailleCanvas,
    pub markers: Vec<MarkerLabel>,
}

/// Map renderer with multi-resolution basemap data
pub struct MapRenderer {
    coastlines_low: Vec<LineString>,
    coastlines_medium: Vec<LineString>,
    coastlines_high: Vec<LineString>,
    borders_medium: Vec<LineString>,
    borders_high: Vec<LineString>,
    streets: Vec<LineString>,
    pub settings: DisplaySettings,
}

impl MapRenderer {
    pub fn new() -> Self {
        Self {
            coastlines_low: Vec::new(),
            coastlines_medium: Vec::new(),
            coastlines_high: Vec::new(),
            borders_medium: Vec::new(),
            borders_high: Vec::new(),
            streets: Vec::new(),
            settings: DisplaySettings::default(),
        }
    }

    /// Finest coastline set available at or below the given LOD
    fn coastlines(&self, lod: Lod) -> &[LineString] {
        let candidates: [&Vec<LineString>; 3] = match lod {
            Lod::High => [&self.coastlines_high, &self.coastlines_medium, &self.coastlines_low],
            Lod::Medium => [&self.coastlines_medium, &self.coastlines_low, &self.coastlines_high],
            Lod::Low => [&self.coastlines_low, &self.coastlines_medium, &self.coastlines_high],
        };
        candidates
            .into_iter()
            .find(|set| !set.is_empty())
            .map(|set| set.as_slice())
            .unwrap_or(&[])
    }

    fn borders(&self, lod: Lod) -> &[LineString] {
        if lod == Lod::High && !self.borders_high.is_empty() {
            &self.borders_high
        } else {
            &self.borders_medium
        }
    }

    /// Render basemap and markers for a `width` x `height` character area
    pub fn render(
        &self,
        width: usize,
        height: usize,
        viewport: &Viewport,
        markers: &[MarkerSpec],
        selected: Option<&str>,
    ) -> MapLayers {
        let lod = Lod::from_level(viewport.level);
        let mut layers = MapLayers {
            coastlines: BrailleCanvas::new(width, height),
            borders: BrailleCanvas::new(width, height),
            streets: BrailleCanvas::new(width, height),
            highlight: BrailleCanvas::new(width, height),
            markers: Vec::new(),
        };

        if self.settings.show_streets && viewport.level >= STREET_MIN_LEVEL {
            for line in &self.streets {
                draw_linestring(&mut layers.streets, line, viewport);
            }
        }

        if self.settings.show_coastlines {
            for line in self.coastlines(lod) {
                draw_linestring(&mut layers.coastlines, line, viewport);
            }
        }

        if self.settings.show_borders {
            for line in self.borders(lod) {
                draw_linestring(&mut layers.borders, line, viewport);
            }
        }

        for marker in markers {
            let (px, py) = viewport.project(marker.lng, marker.lat);
            if !viewport.is_visible(px, py) {
                continue;
            }
            let is_selected = selected == Some(marker.place_id.as_str());
            if is_selected {
                draw_ring(&mut layers.highlight, px, py, 6);
            }
            layers.markers.push(MarkerLabel {
                col: (px / 2) as u16,
                row: (py / 4) as u16,
                place_id: marker.place_id.clone(),
                text: marker.order.to_string(),
                solved: marker.solved,
                selected: is_selected,
            });
        }

        layers
    }

    /// Add coastline data at a specific LOD
    pub fn add_coastline(&mut self, line: LineString, lod: Lod) {
        match lod {
            Lod::Low => self.coastlines_low.push(line),
            Lod::Medium => self.coastlines_medium.push(line),
            Lod::High => self.coastlines_high.push(line),
        }
    }

    /// Add border data at a specific LOD
    pub fn add_border(&mut self, line: LineString, lod: Lod) {
        match lod {
            Lod::High => self.borders_high.push(line),
            Lod::Medium | Lod::Low => self.borders_medium.push(line),
        }
    }

    pub fn add_street(&mut self, line: LineString) {
        self.streets.push(line);
    }

    /// Check if any coastline data is loaded
    pub fn has_data(&self) -> bool {
        !self.coastlines_low.is_empty()
            || !self.coastlines_medium.is_empty()
            || !self.coastlines_high.is_empty()
    }

    pub fn toggle_borders(&mut self) {
        self.settings.show_borders = !self.settings.show_borders;
    }

    pub fn toggle_streets(&mut self) {
        self.settings.show_streets = !self.settings.show_streets;
    }

    pub fn toggle_coastlines(&mut self) {
        self.settings.show_coastlines = !self.settings.show_coastlines;
    }
}

impl Default for MapRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Draw a linestring with viewport culling
fn draw_linestring(canvas: &mut BrailleCanvas, line: &LineString, viewport: &Viewport) {
    let mut prev: Option<(i32, i32)> = None;

    for &(lon, lat) in line {
        let point = viewport.project(lon, lat);
        if let Some(from) = prev {
            // Skip wrap-around jumps and off-screen segments
            let span = ((point.0 - from.0).abs() + (point.1 - from.1).abs()) as usize;
            if span < viewport.width.max(1) * 4 && viewport.line_might_be_visible(from, point) {
                draw_line(canvas, from, point);
            }
        }
        prev = Some(point);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(id: &str, order: u32, lat: f64, lng: f64, solved: bool) -> MarkerSpec {
        MarkerSpec {
            place_id: id.to_string(),
            order,
            title: id.to_string(),
            lat,
            lng,
            solved,
        }
    }

    #[test]
    fn test_markers_outside_view_are_dropped() {
        let renderer = MapRenderer::new();
        let vp = Viewport::new(20.5, 54.7, 14.0, 80, 80);
        let markers = [
            marker("near", 1, 54.7, 20.5, false),
            marker("far", 2, 53.67, 23.82, true),
        ];
        let layers = renderer.render(40, 20, &vp, &markers, Some("near"));
        assert_eq!(layers.markers.len(), 1);
        let label = &layers.markers[0];
        assert_eq!((label.col, label.row), (20, 10));
        assert_eq!(label.text, "1");
        assert!(label.selected);
    }

    #[test]
    fn test_lod_thresholds() {
        assert_eq!(Lod::from_level(3.0), Lod::Low);
        assert_eq!(Lod::from_level(8.0), Lod::Medium);
        assert_eq!(Lod::from_level(15.0), Lod::High);
    }

    #[test]
    fn test_coastline_falls_back_to_coarser_set() {
        let mut renderer = MapRenderer::new();
        renderer.add_coastline(vec![(20.0, 54.0), (21.0, 55.0)], Lod::Low);
        assert_eq!(renderer.coastlines(Lod::High).len(), 1);
        renderer.add_coastline(vec![(20.0, 54.0), (20.5, 54.5)], Lod::High);
        assert_eq!(renderer.coastlines(Lod::High)[0][1], (20.5, 54.5));
    }
}
