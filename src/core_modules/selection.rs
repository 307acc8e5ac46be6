// THEORY:
// The `selection` module is the state machine behind the operator's area
// selection tool. The tool is either `Idle` or `Armed` with one of four
// actions; arming is only meaningful once the map is zoomed in far enough
// that a single cell holds a bounded device population, so the controller
// snaps back to `Idle` whenever the zoom drops below the selectable
// threshold.
//
// Confirming while armed emits at most one `SelectionIntent` (the resolved
// cell region, the active action, and the current rate) and always returns
// the tool to `Idle`, whether or not the pointer resolved to a cell. The
// intent is fire-and-forget: transport, retries, and response ordering are
// someone else's problem.
//
// Rate adjustment steps by the magnitude of the rate's own leading decimal
// digit (at 3,400 a step is 1,000; at 340 it is 100), which gives coarse
// control at large magnitudes and fine control at small ones.

use serde::{Deserialize, Serialize};

use crate::core_modules::cursor::GridCell;

/// Lowest zoom at which area selection is allowed. At zoom 8 a cell holds at
/// most 4^(18 - 8) = 1,048,576 devices.
pub const MIN_SELECTABLE_ZOOM: u32 = 8;

pub const MIN_RATE: u64 = 100;
pub const MAX_RATE: u64 = 10_000_000;
const DEFAULT_RATE: u64 = 1_000;

/// The four bulk commands an area selection can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionAction {
    Create,
    Delete,
    Happy,
    Sad,
}

/// One confirmed area selection, in the flat JSON shape the backend
/// `selection` endpoint expects. Created on confirmation, sent once,
/// then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionIntent {
    pub action: SelectionAction,
    pub rate: u64,
    pub zoom: u32,
    pub top_left_lat: f64,
    pub top_left_lng: f64,
    pub bot_right_lat: f64,
    pub bot_right_lng: f64,
}

/// Tool state: idle, or armed with a pending action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionState {
    #[default]
    Idle,
    Armed(SelectionAction),
}

#[derive(Debug, Clone)]
pub struct SelectionController {
    state: SelectionState,
    rate: u64,
}

impl Default for SelectionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionController {
    pub fn new() -> Self {
        Self {
            state: SelectionState::Idle,
            rate: DEFAULT_RATE,
        }
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn armed_action(&self) -> Option<SelectionAction> {
        match self.state {
            SelectionState::Armed(action) => Some(action),
            SelectionState::Idle => None,
        }
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Whether the selection tool may be armed at this zoom.
    pub fn selectable_at(zoom: u32) -> bool {
        zoom >= MIN_SELECTABLE_ZOOM
    }

    /// A tool-select command: toggles between idle and armed. Ignored when
    /// the zoom is below the selectable threshold.
    pub fn toggle(&mut self, action: SelectionAction, zoom: u32) {
        if !Self::selectable_at(zoom) {
            return;
        }
        self.state = match self.state {
            SelectionState::Idle => SelectionState::Armed(action),
            SelectionState::Armed(_) => SelectionState::Idle,
        };
    }

    /// Forces the tool back to idle whenever the zoom drops below the
    /// selectable threshold. Called once per frame.
    pub fn enforce_zoom(&mut self, zoom: u32) {
        if !Self::selectable_at(zoom) {
            self.state = SelectionState::Idle;
        }
    }

    /// A confirm event. Emits an intent only when armed and the pointer
    /// resolved to a cell; exits the armed state either way.
    pub fn confirm(&mut self, cell: Option<&GridCell>) -> Option<SelectionIntent> {
        let SelectionState::Armed(action) = self.state else {
            return None;
        };
        self.state = SelectionState::Idle;

        let cell = cell?;
        Some(SelectionIntent {
            action,
            rate: self.rate,
            zoom: cell.region.zoom,
            top_left_lat: cell.region.top_left.lat,
            top_left_lng: cell.region.top_left.lng,
            bot_right_lat: cell.region.bot_right.lat,
            bot_right_lng: cell.region.bot_right.lng,
        })
    }

    /// Steps the rate up by the magnitude of its leading decimal digit,
    /// capped at `MAX_RATE`.
    pub fn increase_rate(&mut self) {
        self.rate += leading_digit_magnitude(self.rate);
        self.rate = self.rate.min(MAX_RATE);
    }

    /// Steps the rate down by the magnitude of its leading decimal digit,
    /// floored at `MIN_RATE`.
    pub fn decrease_rate(&mut self) {
        self.rate = self.rate.saturating_sub(decrement_magnitude(self.rate));
        self.rate = self.rate.max(MIN_RATE);
    }
}

/// Magnitude of the leading decimal digit for increments: 100 for rates in
/// the hundreds, 1,000 in the thousands, and so on.
fn leading_digit_magnitude(rate: u64) -> u64 {
    let mut magnitude = MAX_RATE;
    while magnitude > MIN_RATE && rate < magnitude {
        magnitude /= 10;
    }
    magnitude
}

/// Decrement magnitude: one decade below the value's own bracket, so a rate
/// sitting exactly on a decade boundary steps down into the decade beneath
/// it (10,000 steps by 1,000, not 10,000).
fn decrement_magnitude(rate: u64) -> u64 {
    let mut magnitude = MAX_RATE;
    while magnitude > MIN_RATE && rate <= magnitude {
        magnitude /= 10;
    }
    magnitude
}
