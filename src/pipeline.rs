// THEORY:
// The `pipeline` module is the top-level API of the engine. It owns every
// piece of per-frame state (the world grid, the selection tool, the
// activity window, and the latest query response) and turns them into a
// complete overlay description once per frame.
//
// The pipeline is the single writer: query responses arrive as whole values
// and replace the previous one, input events mutate the selection tool, and
// `render_frame` reads everything and emits draw ops. Nothing here blocks
// and nothing here fails; transport problems never reach this layer.

use std::time::Duration;

use crate::core_modules::activity::{ActivityMonitor, DEFAULT_WINDOW_CAPACITY};
use crate::core_modules::aggregate::{self, RegionStatus};
use crate::core_modules::canvas::{self, CanvasGrid, Color, DrawOp, Label};
use crate::core_modules::geo::{CountTotals, LatLng, QueryRequest, QueryResponse};
use crate::core_modules::mapper::{CoordinateMapper, PixelPoint, PixelRect, Viewport};
use crate::core_modules::selection::{SelectionAction, SelectionController, SelectionIntent};
use crate::core_modules::world_grid::WorldGrid;

// Re-export the overlay vocabulary for consumers of the crate.
pub use crate::core_modules::activity::{ActivitySample, ChartScale};
pub use crate::core_modules::aggregate::max_devices_at;
pub use crate::core_modules::cursor::{GridCell, grid_cell_at};
pub use crate::core_modules::selection::{MIN_SELECTABLE_ZOOM, SelectionState};

/// Deepest zoom the backend is asked for: two levels past the display zoom.
const QUERY_ZOOM_HEADROOM: u32 = 2;
const MAX_QUERY_ZOOM: u32 = 18;

/// Tunable engine configuration. `from_env` lets the runner override the
/// defaults per environment.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub backend_url: String,
    pub window_width: u32,
    pub window_height: u32,
    pub center: LatLng,
    pub zoom: u32,
    pub frame_rate: u32,
    pub query_interval: Duration,
    pub activity_capacity: usize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8080".into(),
            window_width: 1280,
            window_height: 800,
            center: LatLng::new(0.0, 0.0),
            zoom: 3,
            frame_rate: 30,
            query_interval: Duration::from_millis(250),
            activity_capacity: DEFAULT_WINDOW_CAPACITY,
        }
    }
}

impl OverlayConfig {
    /// Defaults overridden by `TWINMAP_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend_url: std::env::var("TWINMAP_BACKEND_URL").unwrap_or(defaults.backend_url),
            window_width: env_parse("TWINMAP_WIDTH", defaults.window_width),
            window_height: env_parse("TWINMAP_HEIGHT", defaults.window_height),
            center: LatLng::new(
                env_parse("TWINMAP_LAT", defaults.center.lat),
                env_parse("TWINMAP_LNG", defaults.center.lng),
            ),
            // The world grid is undefined below zoom 3.
            zoom: env_parse("TWINMAP_ZOOM", defaults.zoom).max(3),
            frame_rate: defaults.frame_rate,
            query_interval: defaults.query_interval,
            activity_capacity: defaults.activity_capacity,
        }
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.window_width, self.window_height)
    }
}

/// The engine: all mutable overlay state plus the per-frame draw pass.
pub struct OverlayPipeline {
    viewport: Viewport,
    canvas_grid: CanvasGrid,
    world_grid: WorldGrid,
    selection: SelectionController,
    activity: ActivityMonitor,
    query_response: QueryResponse,
}

impl OverlayPipeline {
    pub fn new(config: &OverlayConfig, now_ms: u64) -> Self {
        let viewport = config.viewport();
        Self {
            viewport,
            canvas_grid: CanvasGrid::new(viewport.width as f64, viewport.height as f64),
            world_grid: WorldGrid::new(),
            selection: SelectionController::new(),
            activity: ActivityMonitor::new(config.activity_capacity, now_ms),
            query_response: QueryResponse::default(),
        }
    }

    pub fn selection(&self) -> &SelectionController {
        &self.selection
    }

    pub fn query_response(&self) -> &QueryResponse {
        &self.query_response
    }

    /// Map pan/zoom notification: the grid is rebuilt wholesale.
    pub fn view_changed(&mut self, mapper: &dyn CoordinateMapper) {
        self.world_grid.recalculate(mapper, self.viewport);
    }

    /// Window resize: rescale the dashboard tick space and rebuild the grid.
    pub fn resize(&mut self, mapper: &dyn CoordinateMapper, viewport: Viewport) {
        self.viewport = viewport;
        self.canvas_grid
            .resize(viewport.width as f64, viewport.height as f64);
        self.view_changed(mapper);
    }

    /// A completed device query replaces the previous response wholesale.
    pub fn apply_query_response(&mut self, response: QueryResponse) {
        self.query_response = response;
    }

    /// The POST body for the next device query: the visible extent, asked
    /// for at two zoom levels past the display zoom (capped at the deepest
    /// zoom the backend models).
    pub fn query_request(&self, mapper: &dyn CoordinateMapper) -> QueryRequest {
        QueryRequest {
            zoom: (mapper.zoom() + QUERY_ZOOM_HEADROOM).min(MAX_QUERY_ZOOM),
            top_left: mapper.pixel_to_geo(self.viewport.top_left()),
            bot_right: mapper.pixel_to_geo(self.viewport.bot_right()),
        }
    }

    /// Tool-select keys: `C`reate, `D`elete, `H`appy, `S`ad.
    pub fn key_pressed(&mut self, key: char, zoom: u32) {
        let action = match key {
            'C' => SelectionAction::Create,
            'D' => SelectionAction::Delete,
            'H' => SelectionAction::Happy,
            'S' => SelectionAction::Sad,
            _ => return,
        };
        self.selection.toggle(action, zoom);
    }

    /// Rate keys: `R` steps up, `r` steps down.
    pub fn key_typed(&mut self, key: char) {
        match key {
            'R' => self.selection.increase_rate(),
            'r' => self.selection.decrease_rate(),
            _ => {}
        }
    }

    /// Pointer confirmation. Emits at most one intent and always leaves the
    /// tool idle; the caller forwards the intent to the backend.
    pub fn confirm_selection(
        &mut self,
        mapper: &dyn CoordinateMapper,
        pointer: PixelPoint,
    ) -> Option<SelectionIntent> {
        let cell = grid_cell_at(mapper, pointer, &self.world_grid);
        self.selection.confirm(cell.as_ref())
    }

    /// One frame: advance the activity clock, then describe the complete
    /// overlay as draw ops for the hosting surface.
    pub fn render_frame(
        &mut self,
        mapper: &dyn CoordinateMapper,
        pointer: PixelPoint,
        now_ms: u64,
    ) -> Vec<DrawOp> {
        self.selection.enforce_zoom(mapper.zoom());
        self.activity.update(now_ms, &self.query_response.totals());

        let mut ops = vec![DrawOp::Clear];
        self.draw_grid_lines(&mut ops);
        self.draw_device_selections(&mut ops, mapper);
        self.draw_dashboard(&mut ops, mapper, pointer);
        self.draw_pointer_overlay(&mut ops, mapper, pointer);
        self.draw_activity_chart(&mut ops);
        ops
    }

    fn draw_grid_lines(&self, ops: &mut Vec<DrawOp>) {
        let right = self.viewport.width as f64 - 1.0;
        let bottom = self.viewport.height as f64 - 1.0;
        for line in &self.world_grid.lat_lines {
            ops.push(DrawOp::Line {
                x1: 0.0,
                y1: line.pixel,
                x2: right,
                y2: line.pixel,
                stroke: canvas::GRID_LINE,
                weight: 0.5,
            });
        }
        for line in &self.world_grid.lng_lines {
            ops.push(DrawOp::Line {
                x1: line.pixel,
                y1: 0.0,
                x2: line.pixel,
                y2: bottom,
                stroke: canvas::GRID_LINE,
                weight: 0.5,
            });
        }
    }

    fn draw_device_selections(&self, ops: &mut Vec<DrawOp>, mapper: &dyn CoordinateMapper) {
        for summary in &self.query_response.region_summaries {
            let top_left = mapper.geo_to_pixel(summary.region.top_left);
            let bot_right = mapper.geo_to_pixel(summary.region.bot_right);
            let status = aggregate::status(summary);

            if aggregate::is_partial(summary) {
                // Sparse cell: a map-pin diamond at the cell center.
                let cx = top_left.x + (bot_right.x - top_left.x) / 2.0;
                let cy = top_left.y + (bot_right.y - top_left.y) / 2.0;
                ops.push(DrawOp::Quad {
                    points: [
                        (cx, cy),
                        (cx - 10.0, cy - 20.0),
                        (cx, cy - 30.0),
                        (cx + 10.0, cy - 20.0),
                    ],
                    fill: marker_color(status),
                });
            } else {
                ops.push(DrawOp::FillRect {
                    rect: PixelRect {
                        x: top_left.x,
                        y: top_left.y,
                        w: bot_right.x - top_left.x,
                        h: bot_right.y - top_left.y,
                    },
                    fill: region_color(status),
                });
            }
        }
    }

    fn draw_dashboard(
        &self,
        ops: &mut Vec<DrawOp>,
        mapper: &dyn CoordinateMapper,
        pointer: PixelPoint,
    ) {
        let grid = &self.canvas_grid;
        let zoom = mapper.zoom();
        let pointer_geo = mapper.pixel_to_geo(pointer);
        let height = 1.2;
        let border = 0.2;

        let dashboard_label = |x: f64, y: f64, w: f64, h: f64, key: &str, value: String| Label {
            x,
            y,
            w,
            h,
            border,
            key: Some(key.into()),
            key_color: Some(canvas::DASHBOARD_KEY),
            value: Some(value),
            value_color: Some(canvas::DASHBOARD_VALUE),
            bg: Some(canvas::DASHBOARD_BG),
        };

        // The operator-facing zoom counts down as the map zooms in.
        let display_zoom = 19i64 - zoom as i64;
        ops.push(
            dashboard_label(2.0, 0.1, 5.0, height, "Zoom", display_zoom.to_string())
                .to_draw_op(grid),
        );
        ops.push(
            dashboard_label(7.05, 0.1, 8.0, height, "Lat", format!("{:.8}", pointer_geo.lat))
                .to_draw_op(grid),
        );
        ops.push(
            dashboard_label(15.1, 0.1, 8.0, height, "Lng", format!("{:.8}", pointer_geo.lng))
                .to_draw_op(grid),
        );
        ops.push(
            dashboard_label(
                2.0,
                1.4,
                9.5,
                height - 0.15,
                "Device density",
                canvas::format_count(max_devices_at(zoom) as i64),
            )
            .to_draw_op(grid),
        );

        self.draw_selection_instructions(ops, zoom);
        self.draw_selection_counts(ops);
    }

    fn draw_selection_instructions(&self, ops: &mut Vec<DrawOp>, zoom: u32) {
        if !SelectionController::selectable_at(zoom) {
            return;
        }
        let grid = &self.canvas_grid;
        let right = grid.ticks_horizontal;
        let height = 1.2;
        let border = 0.2;
        let offset_y = |line: usize| 0.1 + line as f64 * 1.3;

        ops.push(
            Label {
                x: right - 10.2,
                y: offset_y(0),
                w: 5.2,
                h: height,
                border,
                key: Some("Rate +'R' -'r'".into()),
                key_color: Some(canvas::DASHBOARD_VALUE),
                bg: Some(canvas::RATE_KEY_BG),
                ..Label::default()
            }
            .to_draw_op(grid),
        );
        ops.push(
            Label {
                x: right - 5.0,
                y: offset_y(0),
                w: 5.0,
                h: height,
                border,
                value: Some(format!(
                    "{}/s",
                    canvas::format_count(self.selection.rate() as i64)
                )),
                value_color: Some(canvas::DASHBOARD_VALUE),
                bg: Some(canvas::DASHBOARD_BG),
                ..Label::default()
            }
            .to_draw_op(grid),
        );

        let rows = [
            ("'c'", "create", canvas::SELECTION_CREATE),
            ("'d'", "delete", canvas::SELECTION_DELETE),
            ("'h'", "happy", canvas::SELECTION_HAPPY),
            ("'s'", "sad", canvas::SELECTION_SAD),
        ];
        for (line, (key, name, key_bg)) in rows.into_iter().enumerate() {
            let y = offset_y(line + 1);
            ops.push(
                Label {
                    x: right - 6.0,
                    y,
                    w: 1.7,
                    h: height,
                    border,
                    key: Some(key.into()),
                    key_color: Some(canvas::DASHBOARD_VALUE),
                    bg: Some(key_bg),
                    ..Label::default()
                }
                .to_draw_op(grid),
            );
            ops.push(
                Label {
                    x: right - 4.3,
                    y,
                    w: 4.3,
                    h: height,
                    border,
                    value: Some(name.into()),
                    value_color: Some(canvas::DASHBOARD_VALUE),
                    bg: Some(canvas::DASHBOARD_BG),
                    ..Label::default()
                }
                .to_draw_op(grid),
            );
        }

        if let Some(action) = self.selection.armed_action() {
            let row = match action {
                SelectionAction::Create => 1,
                SelectionAction::Delete => 2,
                SelectionAction::Happy => 3,
                SelectionAction::Sad => 4,
            };
            ops.push(
                Label {
                    x: right - 16.1,
                    y: offset_y(row),
                    w: 10.0,
                    h: height,
                    border,
                    value: Some(format!(
                        "{} devices",
                        canvas::format_count(max_devices_at(zoom) as i64)
                    )),
                    value_color: Some(canvas::DASHBOARD_VALUE),
                    bg: Some(canvas::DASHBOARD_BG),
                    ..Label::default()
                }
                .to_draw_op(grid),
            );
        }
    }

    fn draw_selection_counts(&self, ops: &mut Vec<DrawOp>) {
        let grid = &self.canvas_grid;
        let in_view = CountTotals::sum_of(&self.query_response.region_summaries);
        let world = self.query_response.totals();
        let height = 1.2;

        let count_label = |x: f64, y: f64, key: &str, count: u64| {
            Label {
                x,
                y,
                w: 20.0,
                h: height,
                border: 0.2,
                key: Some(key.into()),
                key_color: Some(canvas::DASHBOARD_KEY),
                value: Some(canvas::format_count(count as i64)),
                value_color: Some(canvas::DASHBOARD_VALUE),
                bg: Some(canvas::DASHBOARD_BG),
            }
            .to_draw_op(grid)
        };

        let bottom = grid.ticks_vertical;
        ops.push(count_label(1.0, bottom - 4.6, "Devices in view", in_view.device_count));
        ops.push(count_label(1.0, bottom - 3.3, "Happy status", in_view.happy_count));
        ops.push(count_label(1.0, bottom - 2.0, "Sad status", in_view.sad_count));

        let right = grid.ticks_horizontal - 21.0;
        ops.push(count_label(right, bottom - 4.6, "Devices worldwide", world.device_count));
        ops.push(count_label(right, bottom - 3.3, "Happy status", world.happy_count));
        ops.push(count_label(right, bottom - 2.0, "Sad status", world.sad_count));
    }

    fn draw_pointer_overlay(
        &self,
        ops: &mut Vec<DrawOp>,
        mapper: &dyn CoordinateMapper,
        pointer: PixelPoint,
    ) {
        let Some(cell) = grid_cell_at(mapper, pointer, &self.world_grid) else {
            return;
        };
        match self.selection.armed_action() {
            Some(action) => self.draw_armed_preview(ops, &cell, action, mapper.zoom()),
            None => self.draw_counts_under_pointer(ops, &cell),
        }
    }

    fn draw_armed_preview(
        &self,
        ops: &mut Vec<DrawOp>,
        cell: &GridCell,
        action: SelectionAction,
        zoom: u32,
    ) {
        ops.push(DrawOp::FillRect {
            rect: cell.rect,
            fill: action_color(action),
        });

        // Estimated time to run the command over the whole cell.
        let density = max_devices_at(zoom);
        let duration_sec =
            (density as f64 / self.selection.rate() as f64).round() as u64;
        if duration_sec > 0 {
            let grid = &self.canvas_grid;
            ops.push(
                Label {
                    x: grid.to_grid_x(cell.rect.x),
                    y: grid.to_grid_y(cell.rect.y),
                    w: grid.to_grid_length(cell.rect.w),
                    h: 1.0,
                    border: 0.15,
                    key: Some(canvas::format_duration(duration_sec)),
                    key_color: Some(canvas::DURATION_FG),
                    bg: Some(canvas::DURATION_BG),
                    ..Label::default()
                }
                .to_draw_op(grid),
            );
        }
    }

    fn draw_counts_under_pointer(&self, ops: &mut Vec<DrawOp>, cell: &GridCell) {
        let counts = aggregate::counts_within(&cell.region, &self.query_response.region_summaries);
        if counts.device_count == 0 {
            return;
        }

        ops.push(DrawOp::OutlineRect {
            rect: cell.rect,
            stroke: canvas::CURSOR_OUTLINE,
            weight: 2.0,
        });

        let grid = &self.canvas_grid;
        let x = grid.to_grid_x(cell.rect.x);
        let y = grid.to_grid_y(cell.rect.y);
        let w = grid.to_grid_length(cell.rect.w);
        let h = 1.0;
        let count_label = |text: String, y: f64, color: Color| {
            Label {
                x,
                y,
                w,
                h,
                border: 0.1,
                key: Some(text),
                key_color: Some(color),
                bg: Some(canvas::COUNT_BG),
                ..Label::default()
            }
            .to_draw_op(grid)
        };

        let mut y_offset = y;
        ops.push(count_label(
            canvas::format_count(counts.device_count as i64),
            y_offset,
            canvas::COUNT_DEVICE,
        ));
        if counts.happy_count > 0 && counts.happy_count != counts.device_count {
            y_offset += h + 0.05;
            ops.push(count_label(
                format!("{}-H", canvas::format_count(counts.happy_count as i64)),
                y_offset,
                canvas::COUNT_HAPPY,
            ));
        }
        if counts.sad_count > 0 && counts.sad_count != counts.device_count {
            y_offset += h + 0.05;
            ops.push(count_label(
                format!("{}-S", canvas::format_count(counts.sad_count as i64)),
                y_offset,
                canvas::COUNT_SAD,
            ));
        }
    }

    fn draw_activity_chart(&self, ops: &mut Vec<DrawOp>) {
        let grid = &self.canvas_grid;
        let vertical_offset = 5.0;
        let inset = 22.0;
        let width = grid.ticks_horizontal - 2.0 * inset;
        let height = vertical_offset - 0.5;
        let x = inset;
        let y = grid.ticks_vertical - vertical_offset;

        let scale = self.activity.scale();
        let range = scale.range() as f64;
        let y_axis = y + height * scale.pos as f64 / range;

        ops.push(grid.fill_rect(x, y, width, height, canvas::DASHBOARD_BG));
        ops.push(grid.line(x, y_axis, x + width, y_axis, canvas::CHART_AXIS, 1.0));

        // Quarter-range gridlines walking out from the axis.
        let tick = 0.25
            * if scale.pos > -scale.neg {
                y_axis - y
            } else {
                y + height - y_axis
            };
        if tick > 0.0 {
            let mut y_tick = y_axis - tick;
            while y_tick > y {
                ops.push(grid.line(x, y_tick, x + width, y_tick, canvas::CHART_TICK, 0.75));
                y_tick -= tick;
            }
            y_tick = y_axis + tick;
            while y_tick < y + height {
                ops.push(grid.line(x, y_tick, x + width, y_tick, canvas::CHART_TICK, 0.75));
                y_tick += tick;
            }
        }

        let samples = self.activity.samples();
        let bar_width = width / samples.len() as f64 / 2.0;
        let range_height = height / range;
        let bar = |i: usize, offset: f64, delta: i64, color: Color, ops: &mut Vec<DrawOp>| {
            if delta == 0 {
                return;
            }
            let bar_top = delta.max(0) as f64;
            let bar_bot = delta.min(0) as f64;
            let bar_x = x + i as f64 * bar_width * 2.0 + offset;
            let bar_y = y + (scale.pos as f64 - bar_top) * range_height;
            ops.push(grid.fill_rect(
                bar_x,
                bar_y,
                bar_width,
                (bar_top - bar_bot) * range_height,
                color,
            ));
        };
        for (i, sample) in samples.iter().enumerate() {
            bar(i, 0.0, sample.happy_delta, canvas::CHART_HAPPY, ops);
            bar(i, bar_width, sample.sad_delta, canvas::CHART_SAD, ops);
        }

        let scale_label = |text: String, y: f64| {
            Label {
                x,
                y,
                w: 3.0,
                h: 0.8,
                border: 0.1,
                key: Some(text),
                key_color: Some(canvas::CHART_LABEL_FG),
                bg: Some(canvas::CHART_LABEL_BG),
                ..Label::default()
            }
            .to_draw_op(grid)
        };
        ops.push(scale_label(canvas::format_count(scale.pos), y));
        ops.push(scale_label(
            canvas::format_count(scale.neg),
            grid.ticks_vertical - 1.3,
        ));
    }
}

fn action_color(action: SelectionAction) -> Color {
    match action {
        SelectionAction::Create => canvas::SELECTION_CREATE,
        SelectionAction::Delete => canvas::SELECTION_DELETE,
        SelectionAction::Happy => canvas::SELECTION_HAPPY,
        SelectionAction::Sad => canvas::SELECTION_SAD,
    }
}

fn region_color(status: RegionStatus) -> Color {
    match status {
        RegionStatus::Happy => canvas::REGION_HAPPY,
        RegionStatus::Sad => canvas::REGION_SAD,
        RegionStatus::Mixed => canvas::REGION_MIXED,
    }
}

fn marker_color(status: RegionStatus) -> Color {
    match status {
        RegionStatus::Happy => canvas::MARKER_HAPPY,
        RegionStatus::Sad => canvas::MARKER_SAD,
        RegionStatus::Mixed => canvas::MARKER_MIXED,
    }
}

/// An environment variable parsed into `T`, or the fallback.
fn env_parse<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(fallback)
}
