use crate::error::Error;
use serde::Serialize;
use std::fmt;

pub(crate) const DEFAULT_DOWN_ABOVE: &str = "100";
pub(crate) const DEFAULT_UP_BELOW: &str = "60";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Stage {
    Down,
    Up,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Down => "down",
            Self::Up => "up",
        })
    }
}

/// Everything the counter remembers between frames.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct RepState {
    pub(crate) stage: Stage,
    pub(crate) count: u32,
    /// Set when a rep is counted, cleared when the arm goes back down.
    pub(crate) has_counted: bool,
}

impl Default for RepState {
    fn default() -> Self {
        Self {
            stage: Stage::Down,
            count: 0,
            has_counted: false,
        }
    }
}

/// Elbow angles, in degrees, that drive the stage changes.
///
/// Angles between the two thresholds leave the stage alone.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct Thresholds {
    down_above: f32,
    up_below: f32,
}

impl Thresholds {
    pub(crate) fn new(down_above: f32, up_below: f32) -> Result<Self, Error> {
        if up_below < down_above {
            Ok(Self {
                down_above,
                up_below,
            })
        } else {
            Err(Error::InvertedThresholds {
                up_below,
                down_above,
            })
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            down_above: 100.0,
            up_below: 60.0,
        }
    }
}

/// What an update did to the state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Transition {
    /// The arm is extended: stage is Down and the next curl may count.
    Lowered,
    /// A rep was counted; carries the new total.
    Rep(u32),
    /// Nothing changed.
    Hold,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RepCounter {
    thresholds: Thresholds,
    state: RepState,
}

impl RepCounter {
    pub(crate) fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            state: RepState::default(),
        }
    }

    pub(crate) fn state(&self) -> RepState {
        self.state
    }

    /// Feed one elbow angle into the state machine.
    ///
    /// Any angle above the down threshold resets the stage to Down and clears the
    /// counted flag, even when the stage already is Down. An angle below the up
    /// threshold counts a rep only from Down with the flag clear. A NaN angle fails
    /// both comparisons and holds.
    pub(crate) fn update(&mut self, angle: f32) -> Transition {
        let Thresholds {
            down_above,
            up_below,
        } = self.thresholds;
        let state = &mut self.state;

        if angle > down_above {
            state.stage = Stage::Down;
            state.has_counted = false;
            Transition::Lowered
        } else if angle < up_below && state.stage == Stage::Down && !state.has_counted {
            state.stage = Stage::Up;
            state.count += 1;
            state.has_counted = true;
            Transition::Rep(state.count)
        } else {
            Transition::Hold
        }
    }
}
