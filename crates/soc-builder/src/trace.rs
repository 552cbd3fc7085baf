//! Edge-by-edge reset traces for inspecting POR and external reset timing.

use std::fmt;
use std::str::FromStr;

use soc_core::ResetSequencer;

/// Interval of clock edges during which the external reset request is high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestWindow {
    /// Edge before which the request rises.
    pub assert_at: u64,
    /// Edge before which the request falls.
    pub release_at: u64,
}

impl RequestWindow {
    const fn covers(self, edge: u64) -> bool {
        self.assert_at <= edge && edge < self.release_at
    }
}

impl FromStr for RequestWindow {
    type Err = String;

    /// Parses `START..END`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once("..")
            .ok_or_else(|| format!("expected START..END, got '{s}'"))?;
        let parse = |text: &str| {
            text.trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid edge '{text}': {e}"))
        };
        let window = Self {
            assert_at: parse(start)?,
            release_at: parse(end)?,
        };
        if window.release_at < window.assert_at {
            return Err(format!("window '{s}' ends before it starts"));
        }
        Ok(window)
    }
}

/// Change of the system reset level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResetEvent {
    /// Edge count after which the new level holds.
    pub edge: u64,
    /// New system reset level.
    pub system_reset: bool,
}

impl fmt::Display for ResetEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = if self.system_reset {
            "asserted"
        } else {
            "released"
        };
        write!(f, "edge {:>8}: system reset {level}", self.edge)
    }
}

/// Runs `sequencer` for `edges` clock edges, driving the external request
/// from `requests`, and returns every reset transition.
///
/// The first event is the power-on level at edge 0.
#[must_use]
pub fn trace_reset(
    mut sequencer: ResetSequencer,
    edges: u64,
    requests: &[RequestWindow],
) -> Vec<ResetEvent> {
    let mut events = vec![ResetEvent {
        edge: 0,
        system_reset: sequencer.system_reset(),
    }];
    for edge in 0..edges {
        sequencer.set_external_request(requests.iter().any(|w| w.covers(edge)));
        sequencer.tick();
        let level = sequencer.system_reset();
        if events.last().is_some_and(|e| e.system_reset != level) {
            events.push(ResetEvent {
                edge: sequencer.edges(),
                system_reset: level,
            });
        }
    }
    events
}
