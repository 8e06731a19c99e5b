// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Merges track event streams into one tick-ordered timeline and converts ticks to seconds.

use tracing::warn;

use super::{RawEventKind, RawTimelineEvent, TrackEvent};

/// Tempo used until the first tempo event: 120 beats per minute.
pub const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

/// Concatenates every track's events and orders them by absolute tick. Events sharing a tick
/// keep their original relative order (track order, then position within the track).
pub fn merge(tracks: &[Vec<TrackEvent>]) -> Vec<RawTimelineEvent> {
    let mut merged = Vec::with_capacity(tracks.iter().map(Vec::len).sum());

    for track in tracks {
        let mut tick = 0u64;
        for event in track {
            tick += event.delta as u64;
            merged.push(RawTimelineEvent {
                tick,
                kind: event.kind,
            });
        }
    }

    // sort_by_key is stable, which the sustain and polyphony handling rely on.
    merged.sort_by_key(|event| event.tick);
    merged
}

/// Tracks the running tempo while sweeping the timeline in tick order and accumulates elapsed
/// seconds one tick delta at a time, since tempo can change anywhere.
#[derive(Clone, Debug)]
pub struct TempoMap {
    ticks_per_quarter: u16,
    micros_per_quarter: u32,
    last_tick: u64,
    elapsed: f64,
}

impl TempoMap {
    pub fn new(ticks_per_quarter: u16) -> TempoMap {
        if ticks_per_quarter == 0 {
            warn!("Timing base of zero ticks per quarter note, using one");
        }
        TempoMap {
            ticks_per_quarter: ticks_per_quarter.max(1),
            micros_per_quarter: DEFAULT_MICROS_PER_QUARTER,
            last_tick: 0,
            elapsed: 0.0,
        }
    }

    /// Seconds covered by a single tick at the current tempo.
    pub fn seconds_per_tick(&self) -> f64 {
        self.micros_per_quarter as f64 / self.ticks_per_quarter as f64 / 1_000_000.0
    }

    /// Moves to the given tick and returns the elapsed seconds at that tick.
    pub fn advance(&mut self, tick: u64) -> f64 {
        if tick > self.last_tick {
            self.elapsed += (tick - self.last_tick) as f64 * self.seconds_per_tick();
            self.last_tick = tick;
        }
        self.elapsed
    }

    /// Applies a tempo event. A zero tempo is ignored.
    pub fn set_tempo(&mut self, micros_per_quarter: u32) {
        if micros_per_quarter == 0 {
            warn!(tick = self.last_tick, "Ignoring tempo event with zero length");
            return;
        }
        self.micros_per_quarter = micros_per_quarter;
    }

    /// Consumes a timeline event: advances time and applies it if it is a tempo change.
    /// Returns the event's time in seconds.
    pub fn apply(&mut self, event: &RawTimelineEvent) -> f64 {
        let now = self.advance(event.tick);
        if let RawEventKind::Tempo { micros_per_quarter } = event.kind {
            self.set_tempo(micros_per_quarter);
        }
        now
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn micros_per_quarter(&self) -> u32 {
        self.micros_per_quarter
    }

    /// Returns the current tempo in beats per minute.
    pub fn bpm(&self) -> f64 {
        60_000_000.0 / self.micros_per_quarter as f64
    }
}
