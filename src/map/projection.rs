use std::f64::consts::PI;

/// Braille pixels spanned by the whole world at level 0. A Braille dot is
/// about a quarter of a 256px web tile's pixel, so levels read like web map zooms.
const TILE_PIXELS: f64 = 64.0;

pub const MIN_LEVEL: f64 = 1.0;
pub const MAX_LEVEL: f64 = 19.0;

/// Web Mercator latitude limit
const MAX_LAT: f64 = 85.051_128;

/// Viewport representing the visible map area and zoom level
#[derive(Clone, Debug, PartialEq)]
pub struct Viewport {
    /// Center longitude (-180 to 180)
    pub center_lon: f64,
    /// Center latitude (-85 to 85)
    pub center_lat: f64,
    /// Zoom level, same scale as slippy-map zooms (1 = world, 19 = street)
    pub level: f64,
    /// Canvas pixel width
    pub width: usize,
    /// Canvas pixel height
    pub height: usize,
}

/// Normalized Web Mercator coordinates in [0, 1)
#[inline(always)]
fn mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = (lon + 180.0) / 360.0;
    let lat_rad = lat.clamp(-MAX_LAT, MAX_LAT).to_radians();
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0;
    (x, y)
}

#[inline(always)]
fn inverse_mercator(x: f64, y: f64) -> (f64, f64) {
    let lon = x * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();
    (lon, lat)
}

impl Viewport {
    pub fn new(center_lon: f64, center_lat: f64, level: f64, width: usize, height: usize) -> Self {
        Self {
            center_lon,
            center_lat: center_lat.clamp(-MAX_LAT, MAX_LAT),
            level: level.clamp(MIN_LEVEL, MAX_LEVEL),
            width,
            height,
        }
    }

    /// Jump to a center and level, keeping the canvas size
    pub fn set_view(&mut self, lat: f64, lon: f64, level: f64) {
        self.center_lat = lat.clamp(-MAX_LAT, MAX_LAT);
        self.center_lon = lon;
        self.level = level.clamp(MIN_LEVEL, MAX_LEVEL);
    }

    /// World width in Braille pixels at the current level
    #[inline(always)]
    fn world_size(&self) -> f64 {
        TILE_PIXELS * self.level.exp2()
    }

    /// Pan the viewport by pixel delta
    pub fn pan(&mut self, dx: i32, dy: i32) {
        let size = self.world_size();
        let (cx, cy) = mercator(self.center_lon, self.center_lat);
        let x = (cx + dx as f64 / size).rem_euclid(1.0);
        let y = (cy + dy as f64 / size).clamp(0.0, 1.0);
        let (lon, lat) = inverse_mercator(x, y);
        self.center_lon = lon;
        self.center_lat = lat.clamp(-MAX_LAT, MAX_LAT);
    }

    /// Zoom in one level
    pub fn zoom_in(&mut self) {
        self.level = (self.level + 1.0).min(MAX_LEVEL);
    }

    /// Zoom out one level
    pub fn zoom_out(&mut self) {
        self.level = (self.level - 1.0).max(MIN_LEVEL);
    }

    /// Zoom in towards a specific pixel location
    pub fn zoom_in_at(&mut self, px: i32, py: i32) {
        self.zoom_at(px, py, 1.0);
    }

    /// Zoom out from a specific pixel location
    pub fn zoom_out_at(&mut self, px: i32, py: i32) {
        self.zoom_at(px, py, -1.0);
    }

    /// Change level while keeping the point under (px, py) fixed
    fn zoom_at(&mut self, px: i32, py: i32, delta: f64) {
        let (lon, lat) = self.unproject(px, py);
        self.level = (self.level + delta).clamp(MIN_LEVEL, MAX_LEVEL);
        let (new_px, new_py) = self.project(lon, lat);
        self.pan(new_px - px, new_py - py);
    }

    /// Unproject pixel coordinates back to geographic coordinates (lon, lat)
    pub fn unproject(&self, px: i32, py: i32) -> (f64, f64) {
        let size = self.world_size();
        let (cx, cy) = mercator(self.center_lon, self.center_lat);
        let x = (px as f64 - self.width as f64 / 2.0) / size + cx;
        let y = (py as f64 - self.height as f64 / 2.0) / size + cy;
        inverse_mercator(x, y)
    }

    /// Project a geographic coordinate (lon, lat) to pixel coordinates
    pub fn project(&self, lon: f64, lat: f64) -> (i32, i32) {
        let size = self.world_size();
        let (x, y) = mercator(lon, lat);
        let (cx, cy) = mercator(self.center_lon, self.center_lat);
        let px = ((x - cx) * size + self.width as f64 / 2.0).round();
        let py = ((y - cy) * size + self.height as f64 / 2.0).round();
        (
            px.clamp(i32::MIN as f64, i32::MAX as f64) as i32,
            py.clamp(i32::MIN as f64, i32::MAX as f64) as i32,
        )
    }

    /// Point between `self` and `target` at fraction `t` (0..=1), interpolated
    /// in Mercator space so the path looks straight on screen
    pub fn interpolate(&self, target: &Viewport, t: f64) -> Viewport {
        let t = t.clamp(0.0, 1.0);
        let (ax, ay) = mercator(self.center_lon, self.center_lat);
        let (bx, by) = mercator(target.center_lon, target.center_lat);
        let (lon, lat) = inverse_mercator(ax + (bx - ax) * t, ay + (by - ay) * t);
        Viewport {
            center_lon: lon,
            center_lat: lat,
            level: self.level + (target.level - self.level) * t,
            width: self.width,
            height: self.height,
        }
    }

    /// Check if a projected point is inside the canvas
    pub fn is_visible(&self, px: i32, py: i32) -> bool {
        px >= 0 && px < self.width as i32 && py >= 0 && py < self.height as i32
    }

    /// Check if a line segment might be visible (rough bounding box check)
    pub fn line_might_be_visible(&self, p1: (i32, i32), p2: (i32, i32)) -> bool {
        let min_x = p1.0.min(p2.0);
        let max_x = p1.0.max(p2.0);
        let min_y = p1.1.min(p2.1);
        let max_y = p1.1.max(p2.1);

        max_x >= 0
            && min_x < self.width as i32
            && max_y >= 0
            && min_y < self.height as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_center() {
        let vp = Viewport::new(20.45, 54.71, 13.0, 100, 80);
        assert_eq!(vp.project(20.45, 54.71), (50, 40));
    }

    #[test]
    fn test_unproject_inverts_project() {
        let vp = Viewport::new(23.81, 53.67, 15.0, 200, 120);
        let (px, py) = vp.project(23.83, 53.68);
        let (lon, lat) = vp.unproject(px, py);
        assert!((lon - 23.83).abs() < 1e-4);
        assert!((lat - 53.68).abs() < 1e-4);
    }

    #[test]
    fn test_pan() {
        let mut vp = Viewport::new(20.0, 54.0, 10.0, 100, 100);
        vp.pan(10, 0);
        assert!(vp.center_lon > 20.0);
        vp.pan(0, 10);
        assert!(vp.center_lat < 54.0);
    }

    #[test]
    fn test_level_is_clamped() {
        let mut vp = Viewport::new(0.0, 0.0, 19.0, 100, 100);
        vp.zoom_in();
        assert_eq!(vp.level, MAX_LEVEL);
        vp.set_view(0.0, 0.0, -3.0);
        assert_eq!(vp.level, MIN_LEVEL);
    }

    #[test]
    fn test_zoom_at_keeps_point_fixed() {
        let mut vp = Viewport::new(20.5, 54.7, 12.0, 200, 200);
        let before = vp.unproject(30, 40);
        vp.zoom_in_at(30, 40);
        let after = vp.unproject(30, 40);
        assert!((before.0 - after.0).abs() < 1e-3);
        assert!((before.1 - after.1).abs() < 1e-3);
    }

    #[test]
    fn test_interpolate_endpoints() {
        let a = Viewport::new(20.0, 54.0, 13.0, 100, 100);
        let b = Viewport::new(21.0, 55.0, 13.0, 100, 100);
        let mid = a.interpolate(&b, 0.5);
        assert!(mid.center_lon > 20.0 && mid.center_lon < 21.0);
        let end = a.interpolate(&b, 1.0);
        assert!((end.center_lat - 55.0).abs() < 1e-9);
    }
}
