//! # BCP Clock Core Library
//!
//! This library drives a tournament round clock on a 32×8 addressable LED
//! matrix. It polls Best Coast Pairings (BCP) for an event's status and shows
//! the event name, the current round number, or a live countdown for the
//! current round with a progress strip along the bottom row.
//!
//! ## Layers
//!
//! - [`framebuffer`]: the pixel grid and its serpentine mapping onto the strip
//! - [`font`]: bitmap glyph fonts read from disk, one glyph at a time
//! - [`round_strip`]: the round progress strip on row 7
//! - [`countdown`]: countdown text, placement and threshold colors
//! - [`timers`]: the four role-tagged timer slots
//! - [`display_state`]: the state machine that owns everything above
//! - [`scheduler`]: the message queue and the loop that drains it
//!
//! ## Collaborators
//!
//! The state machine talks to the outside world through three traits so it
//! can run against real services or test doubles:
//! - [`event::EventSource`]: BCP overview and round timer data
//! - [`platform::Platform`]: wall clock and network address
//! - [`platform::ConfigPortal`]: the configuration server and its saved flag
//!
//! ## Data Flow
//! 1. **Refresh**: fetch overview (and the round timer while running) →
//!    [`EventSnapshot`] → pick the display state
//! 2. **Countdown**: every tick, `endTime - now` → formatted time + strip
//! 3. **Button**: configuration splash → watch for a saved config → restart

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// Module declarations
pub mod button;
pub mod config;
pub mod countdown;
pub mod display_state;
pub mod event;
pub mod font;
pub mod framebuffer;
pub mod platform;
pub mod renderer;
pub mod round_strip;
pub mod scheduler;
pub mod timers;

#[cfg(test)]
mod tests;

/// Progress of an event as reported by BCP.
///
/// Rounds are 1-based. Before the event starts BCP may report no current
/// round at all, which decodes as 0.
///
/// # Example
/// ```
/// use bcp_clock_lib::EventStatus;
///
/// let status = EventStatus { started: true, ended: false, current_round: 2, number_of_rounds: 5 };
/// assert!(status.is_running());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventStatus {
    pub started: bool,
    pub ended: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub current_round: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub number_of_rounds: i32,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl EventStatus {
    /// Started and not yet ended
    pub fn is_running(&self) -> bool {
        self.started && !self.ended
    }
}

/// The part of the BCP event overview the clock uses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventOverview {
    pub name: String,
    pub status: EventStatus,
}

/// Timer of the current round.
///
/// `end_time` is absolute, so the remaining time is always computed against
/// the wall clock and never drifts with the tick rate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundTimer {
    /// Full length of the round in seconds
    pub timer_length: i64,
    pub end_time: DateTime<Utc>,
}

/// Everything one refresh learned about the event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventSnapshot {
    pub name: String,
    pub status: EventStatus,
    /// Present only while the event runs and the round has a timer
    pub timer: Option<RoundTimer>,
}
