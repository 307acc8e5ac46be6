// THEORY:
// The `mapper` module is the seam between the engine and whatever map widget
// hosts it. The host owns tiles, panning, and zoom physics; the engine only
// needs three things from it: pixel -> geo, geo -> pixel, and the current
// zoom level. `CoordinateMapper` captures exactly that contract, and the
// rest of the engine is written against the trait so any projection-capable
// host can drive it.
//
// `WebMercatorMapper` is the standard spherical-Mercator implementation of
// the contract. The runner and the test suites use it directly; it is the
// same slippy-map math every tile provider uses, so its pixel <-> geo
// conversions are exact inverses at the resolution the grid math cares
// about.

use std::f64::consts::PI;

use crate::core_modules::geo::LatLng;

const TILE_SIZE: f64 = 256.0;

/// A position on the overlay canvas, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle on the overlay canvas, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// The visible canvas extent, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel of the top-left viewport corner.
    pub fn top_left(&self) -> PixelPoint {
        PixelPoint::new(0.0, 0.0)
    }

    /// Pixel of the bottom-right viewport corner (inclusive).
    pub fn bot_right(&self) -> PixelPoint {
        PixelPoint::new(self.width as f64 - 1.0, self.height as f64 - 1.0)
    }
}

/// The projection contract supplied by the hosting map widget.
pub trait CoordinateMapper {
    fn pixel_to_geo(&self, pixel: PixelPoint) -> LatLng;
    fn geo_to_pixel(&self, geo: LatLng) -> PixelPoint;
    fn zoom(&self) -> u32;
}

/// Spherical-Mercator projection over a viewport: canvas pixel (0, 0) maps
/// to a fixed world-pixel origin at the current zoom.
#[derive(Debug, Clone, Copy)]
pub struct WebMercatorMapper {
    zoom: u32,
    origin_x: f64,
    origin_y: f64,
}

impl WebMercatorMapper {
    /// A mapper whose viewport is centered on `center` at `zoom`.
    pub fn centered(zoom: u32, center: LatLng, viewport: Viewport) -> Self {
        let world = Self {
            zoom,
            origin_x: 0.0,
            origin_y: 0.0,
        };
        let center_px = world.geo_to_world_pixel(center);
        Self {
            zoom,
            origin_x: center_px.x - viewport.width as f64 / 2.0,
            origin_y: center_px.y - viewport.height as f64 / 2.0,
        }
    }

    fn world_size(&self) -> f64 {
        TILE_SIZE * f64::powi(2.0, self.zoom as i32)
    }

    fn geo_to_world_pixel(&self, geo: LatLng) -> PixelPoint {
        let world = self.world_size();
        let x = (geo.lng + 180.0) / 360.0 * world;
        let lat_rad = geo.lat.to_radians();
        let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * world;
        PixelPoint::new(x, y)
    }
}

impl CoordinateMapper for WebMercatorMapper {
    fn pixel_to_geo(&self, pixel: PixelPoint) -> LatLng {
        let world = self.world_size();
        let x = pixel.x + self.origin_x;
        let y = pixel.y + self.origin_y;
        let lng = x / world * 360.0 - 180.0;
        let lat = (PI * (1.0 - 2.0 * y / world)).sinh().atan().to_degrees();
        LatLng::new(lat, lng)
    }

    fn geo_to_pixel(&self, geo: LatLng) -> PixelPoint {
        let world_px = self.geo_to_world_pixel(geo);
        PixelPoint::new(world_px.x - self.origin_x, world_px.y - self.origin_y)
    }

    fn zoom(&self) -> u32 {
        self.zoom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_and_geo_conversions_are_inverses() {
        let mapper =
            WebMercatorMapper::centered(6, LatLng::new(37.5, -3.25), Viewport::new(1280, 800));

        for &(x, y) in &[(0.0, 0.0), (640.0, 400.0), (1279.0, 799.0), (17.0, 512.0)] {
            let geo = mapper.pixel_to_geo(PixelPoint::new(x, y));
            let back = mapper.geo_to_pixel(geo);
            assert!((back.x - x).abs() < 1e-6, "x drifted: {} -> {}", x, back.x);
            assert!((back.y - y).abs() < 1e-6, "y drifted: {} -> {}", y, back.y);
        }
    }

    #[test]
    fn centered_viewport_puts_center_mid_canvas() {
        let center = LatLng::new(12.0, 77.5);
        let mapper = WebMercatorMapper::centered(8, center, Viewport::new(1000, 600));

        let px = mapper.geo_to_pixel(center);
        assert!((px.x - 500.0).abs() < 1e-9);
        assert!((px.y - 300.0).abs() < 1e-9);
    }

    #[test]
    fn latitude_decreases_down_the_canvas() {
        let mapper =
            WebMercatorMapper::centered(5, LatLng::new(0.0, 0.0), Viewport::new(800, 600));

        let north = mapper.pixel_to_geo(PixelPoint::new(400.0, 100.0));
        let south = mapper.pixel_to_geo(PixelPoint::new(400.0, 500.0));
        assert!(north.lat > south.lat);
    }
}
