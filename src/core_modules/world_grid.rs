// THEORY:
// The `world_grid` module owns the lat/lng partition of the visible map
// extent. It is the owner and operator of the two grid-line vectors: nothing
// else mutates them, and they are regenerated wholesale on every view change
// rather than patched incrementally.
//
// Key architectural principles:
// 1.  **Zoom-Locked Density**: At zoom z the whole world is divided into
//     `9 * 2^(z-3)` latitude bands and `18 * 2^(z-3)` longitude bands, so
//     the tick length halves exactly each time the zoom increases by one and
//     the on-screen line spacing stays roughly constant.
// 2.  **Aligned Ticks**: Every line coordinate is an exact multiple of the
//     tick length. The walk starts from the tick multiple at or just beyond
//     the viewport's top-left corner (truncating division) and steps by one
//     tick until the bottom-right corner is passed.
// 3.  **Total Function**: Recalculation is a deterministic function of zoom
//     and viewport. It never fails; at the minimum zoom the vectors may be
//     empty or singleton, which downstream consumers read as "no enclosing
//     cell".

use tracing::debug;

use crate::core_modules::geo::LatLng;
use crate::core_modules::mapper::{CoordinateMapper, Viewport};

/// One line of constant latitude or longitude: its coordinate in degrees and
/// its projected position on the canvas, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLine {
    pub coordinate: f64,
    pub pixel: f64,
}

/// The visible lat/lng partition. Latitude lines are ordered descending by
/// coordinate (screen top to bottom), longitude lines ascending (left to
/// right), each strictly one tick apart.
#[derive(Debug, Clone, Default)]
pub struct WorldGrid {
    pub lat_lines: Vec<GridLine>,
    pub lng_lines: Vec<GridLine>,
}

/// Tick lengths in degrees for latitude and longitude at `zoom`.
pub fn tick_lengths(zoom: u32) -> (f64, f64) {
    let doublings = f64::powi(2.0, zoom as i32 - 3);
    let total_lat_lines = 9.0 * doublings;
    let total_lng_lines = 18.0 * doublings;
    (180.0 / total_lat_lines, 360.0 / total_lng_lines)
}

impl WorldGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds both line vectors for the current zoom and viewport.
    pub fn recalculate(&mut self, mapper: &dyn CoordinateMapper, viewport: Viewport) {
        let zoom = mapper.zoom();
        let (tick_lat, tick_lng) = tick_lengths(zoom);
        let top_left = mapper.pixel_to_geo(viewport.top_left());
        let bot_right = mapper.pixel_to_geo(viewport.bot_right());
        let top_lat_line = tick_lat * (top_left.lat / tick_lat).trunc();
        let left_lng_line = tick_lng * (top_left.lng / tick_lng).trunc();
        debug!(zoom, tick_lat, tick_lng, "grid recalculated");

        self.lat_lines.clear();
        self.lng_lines.clear();

        let mut lat = top_lat_line;
        while lat > bot_right.lat {
            let pixel = mapper.geo_to_pixel(LatLng::new(lat, 0.0)).y;
            self.lat_lines.push(GridLine {
                coordinate: lat,
                pixel,
            });
            lat -= tick_lat;
        }

        let mut lng = left_lng_line;
        while lng < bot_right.lng {
            let pixel = mapper.geo_to_pixel(LatLng::new(0.0, lng)).x;
            self.lng_lines.push(GridLine {
                coordinate: lng,
                pixel,
            });
            lng += tick_lng;
        }
    }

    /// True when the grid is too sparse to bound any cell.
    pub fn is_degenerate(&self) -> bool {
        self.lat_lines.len() < 2 || self.lng_lines.len() < 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::geo::LatLng;
    use crate::core_modules::mapper::WebMercatorMapper;

    fn mapper_at(zoom: u32) -> (WebMercatorMapper, Viewport) {
        let viewport = Viewport::new(1024, 768);
        (
            WebMercatorMapper::centered(zoom, LatLng::new(20.0, 10.0), viewport),
            viewport,
        )
    }

    #[test]
    fn tick_length_halves_per_zoom_step() {
        for zoom in 3..17 {
            let (lat_a, lng_a) = tick_lengths(zoom);
            let (lat_b, lng_b) = tick_lengths(zoom + 1);
            assert_eq!(lat_a / lat_b, 2.0);
            assert_eq!(lng_a / lng_b, 2.0);
        }
    }

    #[test]
    fn coordinates_are_exact_tick_multiples() {
        let (mapper, viewport) = mapper_at(7);
        let (tick_lat, tick_lng) = tick_lengths(7);
        let mut grid = WorldGrid::new();
        grid.recalculate(&mapper, viewport);

        assert!(!grid.is_degenerate());
        for line in &grid.lat_lines {
            let steps = line.coordinate / tick_lat;
            assert!((steps - steps.round()).abs() < 1e-9, "lat {}", line.coordinate);
        }
        for line in &grid.lng_lines {
            let steps = line.coordinate / tick_lng;
            assert!((steps - steps.round()).abs() < 1e-9, "lng {}", line.coordinate);
        }
    }

    #[test]
    fn line_count_tracks_viewport_span() {
        let (mapper, viewport) = mapper_at(6);
        let (tick_lat, tick_lng) = tick_lengths(6);
        let mut grid = WorldGrid::new();
        grid.recalculate(&mapper, viewport);

        let top_left = mapper.pixel_to_geo(viewport.top_left());
        let bot_right = mapper.pixel_to_geo(viewport.bot_right());
        let lat_span = top_left.lat - bot_right.lat;
        let lng_span = bot_right.lng - top_left.lng;

        let expected_lat = (lat_span / tick_lat).ceil() as i64;
        let expected_lng = (lng_span / tick_lng).ceil() as i64;
        assert!((grid.lat_lines.len() as i64 - expected_lat).abs() <= 1);
        assert!((grid.lng_lines.len() as i64 - expected_lng).abs() <= 1);
    }

    #[test]
    fn lines_are_ordered_and_evenly_spaced() {
        let (mapper, viewport) = mapper_at(8);
        let (tick_lat, tick_lng) = tick_lengths(8);
        let mut grid = WorldGrid::new();
        grid.recalculate(&mapper, viewport);

        for pair in grid.lat_lines.windows(2) {
            let step = pair[0].coordinate - pair[1].coordinate;
            assert!((step - tick_lat).abs() < 1e-9);
            assert!(pair[0].pixel < pair[1].pixel);
        }
        for pair in grid.lng_lines.windows(2) {
            let step = pair[1].coordinate - pair[0].coordinate;
            assert!((step - tick_lng).abs() < 1e-9);
            assert!(pair[0].pixel < pair[1].pixel);
        }
    }

    #[test]
    fn recalculate_is_idempotent() {
        let (mapper, viewport) = mapper_at(9);
        let mut grid = WorldGrid::new();
        grid.recalculate(&mapper, viewport);
        let lat_first = grid.lat_lines.clone();
        let lng_first = grid.lng_lines.clone();

        grid.recalculate(&mapper, viewport);
        assert_eq!(grid.lat_lines, lat_first);
        assert_eq!(grid.lng_lines, lng_first);
    }
}
