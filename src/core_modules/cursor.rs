// THEORY:
// The `cursor` module answers one question: which grid cell, if any, is
// under the pointer right now? It converts the pointer pixel to lat/lng
// through the host projection and scans the two line vectors for the unique
// pair of consecutive lines that bracket it.
//
// The bracket test is strict on both sides. A pointer sitting exactly on a
// grid line belongs to neither adjacent open interval and resolves to no
// cell at all; the tests pin that boundary behavior on purpose. Both scans
// exclude the final line, since there is no line after it to close a cell.

use crate::core_modules::geo::{LatLng, Region};
use crate::core_modules::mapper::{CoordinateMapper, PixelPoint, PixelRect};
use crate::core_modules::world_grid::{GridLine, WorldGrid};

/// The grid cell enclosing the pointer: its canvas rectangle and its
/// geographic region at the current zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub rect: PixelRect,
    pub region: Region,
}

/// Resolves the pointer to its enclosing grid cell, or `None` when the
/// pointer is outside the grid (or exactly on a line).
pub fn grid_cell_at(
    mapper: &dyn CoordinateMapper,
    pointer: PixelPoint,
    grid: &WorldGrid,
) -> Option<GridCell> {
    let pointer_geo = mapper.pixel_to_geo(pointer);

    let lat_index = bracket_index(&grid.lat_lines, |upper, lower| {
        upper.coordinate > pointer_geo.lat && lower.coordinate < pointer_geo.lat
    })?;
    let lng_index = bracket_index(&grid.lng_lines, |left, right| {
        left.coordinate < pointer_geo.lng && right.coordinate > pointer_geo.lng
    })?;

    let lat = &grid.lat_lines[lat_index..=lat_index + 1];
    let lng = &grid.lng_lines[lng_index..=lng_index + 1];

    Some(GridCell {
        rect: PixelRect {
            x: lng[0].pixel,
            w: lng[1].pixel - lng[0].pixel,
            y: lat[0].pixel,
            h: lat[1].pixel - lat[0].pixel,
        },
        region: Region::new(
            mapper.zoom(),
            LatLng::new(lat[0].coordinate, lng[0].coordinate),
            LatLng::new(lat[1].coordinate, lng[1].coordinate),
        ),
    })
}

/// Index of the first line pair satisfying `between`, excluding the final
/// line (which has no successor to bound a cell).
fn bracket_index<F>(lines: &[GridLine], between: F) -> Option<usize>
where
    F: Fn(&GridLine, &GridLine) -> bool,
{
    lines.windows(2).position(|pair| between(&pair[0], &pair[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::mapper::Viewport;

    /// Equirectangular test projection: degrees scale linearly to pixels, so
    /// conversions are exact and boundary cases can be hit dead-on.
    struct LinearMapper {
        zoom: u32,
        top_left: LatLng,
        px_per_degree: f64,
    }

    impl CoordinateMapper for LinearMapper {
        fn pixel_to_geo(&self, pixel: PixelPoint) -> LatLng {
            LatLng::new(
                self.top_left.lat - pixel.y / self.px_per_degree,
                self.top_left.lng + pixel.x / self.px_per_degree,
            )
        }

        fn geo_to_pixel(&self, geo: LatLng) -> PixelPoint {
            PixelPoint::new(
                (geo.lng - self.top_left.lng) * self.px_per_degree,
                (self.top_left.lat - geo.lat) * self.px_per_degree,
            )
        }

        fn zoom(&self) -> u32 {
            self.zoom
        }
    }

    fn setup() -> (LinearMapper, WorldGrid) {
        // Zoom 7: tick length 1.25 degrees on both axes. 16 px per degree
        // keeps every line coordinate and pixel exactly representable.
        let mapper = LinearMapper {
            zoom: 7,
            top_left: LatLng::new(20.0, 10.0),
            px_per_degree: 16.0,
        };
        let mut grid = WorldGrid::new();
        grid.recalculate(&mapper, Viewport::new(1024, 768));
        (mapper, grid)
    }

    #[test]
    fn interior_pointer_resolves_to_bracketing_lines() {
        let (mapper, grid) = setup();
        // Dead center of the cell south-east of (18.75, 11.25).
        let pointer = mapper.geo_to_pixel(LatLng::new(18.125, 11.875));
        let cell = grid_cell_at(&mapper, pointer, &grid).expect("pointer should be in grid");

        assert_eq!(cell.region.top_left, LatLng::new(18.75, 11.25));
        assert_eq!(cell.region.bot_right, LatLng::new(17.5, 12.5));
        assert_eq!(cell.region.zoom, 7);
        assert_eq!(cell.rect.w, 1.25 * 16.0);
        assert_eq!(cell.rect.h, 1.25 * 16.0);
    }

    #[test]
    fn pointer_exactly_on_a_line_matches_no_cell() {
        let (mapper, grid) = setup();
        // Latitude exactly on a grid line, longitude mid-cell.
        let on_lat_line = mapper.geo_to_pixel(LatLng::new(18.75, 11.875));
        assert_eq!(grid_cell_at(&mapper, on_lat_line, &grid), None);

        // Longitude exactly on a grid line, latitude mid-cell.
        let on_lng_line = mapper.geo_to_pixel(LatLng::new(18.125, 11.25));
        assert_eq!(grid_cell_at(&mapper, on_lng_line, &grid), None);
    }

    #[test]
    fn pointer_past_the_last_line_matches_no_cell() {
        let (mapper, grid) = setup();
        let south_of_everything = mapper.geo_to_pixel(LatLng::new(
            grid.lat_lines.last().unwrap().coordinate - 1.0,
            11.875,
        ));

        assert_eq!(grid_cell_at(&mapper, south_of_everything, &grid), None);
    }

    #[test]
    fn degenerate_grid_resolves_nothing() {
        let (mapper, _) = setup();
        let empty = WorldGrid::new();

        assert_eq!(
            grid_cell_at(&mapper, PixelPoint::new(100.0, 100.0), &empty),
            None
        );
    }
}
