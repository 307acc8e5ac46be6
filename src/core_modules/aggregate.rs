// THEORY:
// The `aggregate` module summarizes backend region reports against an
// arbitrary query rectangle, in practice the grid cell under the pointer.
// It is a pure layer over already-fetched data: no state, no failure modes,
// an empty overlap set simply sums to zero.
//
// Two classification rules ride along with the reduction:
// 1.  **Status**: a region is Happy when it has happy devices and no sad
//     ones, Sad in the mirrored case, and Mixed otherwise. The status picks
//     the overlay color for the region.
// 2.  **Partial**: a region holding fewer than half the theoretical maximum
//     device count for its zoom (`4^(18 - zoom)`) is rendered as a point
//     marker instead of a filled rectangle, signaling a sparse cell.
//
// The overlap test rejects only when one rectangle is strictly beyond the
// other, so regions that touch edge-to-edge still count as overlapping.
// That inclusive boundary is deliberately different from the strict
// pointer-cell test in `cursor`; both policies are pinned by tests.

use crate::core_modules::geo::{CountTotals, Region, RegionSummary};

/// Highest zoom the backend models; one device per cell at this zoom.
pub const MAX_ZOOM: u32 = 18;

/// How a region's devices lean, for overlay coloring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionStatus {
    Happy,
    Sad,
    Mixed,
}

/// True unless one rectangle lies strictly above, below, left, or right of
/// the other. Edge-to-edge contact counts as overlapping.
pub fn overlaps(a: &Region, b: &Region) -> bool {
    let strictly_above = a.bot_right.lat > b.top_left.lat;
    let strictly_below = a.top_left.lat < b.bot_right.lat;
    let strictly_left = a.bot_right.lng < b.top_left.lng;
    let strictly_right = a.top_left.lng > b.bot_right.lng;
    !(strictly_above || strictly_below || strictly_left || strictly_right)
}

/// Sums whole-region counts over every summary overlapping `query`.
/// Overlap fraction is irrelevant: any overlap contributes the full counts.
pub fn counts_within(query: &Region, summaries: &[RegionSummary]) -> CountTotals {
    CountTotals::sum_of(
        summaries
            .iter()
            .filter(|summary| overlaps(query, &summary.region)),
    )
}

pub fn status(summary: &RegionSummary) -> RegionStatus {
    if summary.happy_count > 0 && summary.sad_count == 0 {
        RegionStatus::Happy
    } else if summary.happy_count == 0 && summary.sad_count > 0 {
        RegionStatus::Sad
    } else {
        RegionStatus::Mixed
    }
}

/// Theoretical maximum device count for a cell at `zoom`.
pub fn max_devices_at(zoom: u32) -> u64 {
    4u64.pow(MAX_ZOOM.saturating_sub(zoom))
}

/// True when the summary holds fewer than half its cell's maximum devices;
/// such regions render as point markers rather than filled rectangles.
pub fn is_partial(summary: &RegionSummary) -> bool {
    0.5 > summary.device_count as f64 / max_devices_at(summary.region.zoom) as f64
}
