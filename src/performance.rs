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

//! Symbolic performance data: per-track raw events, the merged timeline, and the
//! seconds-based note and control change events the renderer consumes.

mod mapper;
mod midi;
mod timeline;

pub use mapper::{map_events, MappedEvents, MapperOptions, MapperStats, NoteMapper};
pub use timeline::{merge, TempoMap, DEFAULT_MICROS_PER_QUARTER};

/// The sustain pedal controller number.
pub const SUSTAIN_CONTROLLER: u8 = 0x40;

/// Number of MIDI channels.
pub const CHANNEL_COUNT: usize = 16;

/// A raw event as read from a track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawEventKind {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// Pitch bend, centered on zero. Carried through the timeline but not applied to notes.
    PitchBend { channel: u8, value: i16 },
    Tempo { micros_per_quarter: u32 },
}

/// A raw event with its delta time in ticks since the previous event on the same track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackEvent {
    pub delta: u32,
    pub kind: RawEventKind,
}

impl TrackEvent {
    pub fn new(delta: u32, kind: RawEventKind) -> TrackEvent {
        TrackEvent { delta, kind }
    }
}

/// A raw event positioned on the merged timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawTimelineEvent {
    /// Absolute tick from the start of the performance.
    pub tick: u64,
    pub kind: RawEventKind,
}

/// A multi-track performance with a fixed timing base.
#[derive(Clone, Debug)]
pub struct Performance {
    ticks_per_quarter: u16,
    tracks: Vec<Vec<TrackEvent>>,
}

impl Performance {
    pub fn new(ticks_per_quarter: u16, tracks: Vec<Vec<TrackEvent>>) -> Performance {
        Performance {
            ticks_per_quarter,
            tracks,
        }
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.ticks_per_quarter
    }

    pub fn tracks(&self) -> &[Vec<TrackEvent>] {
        &self.tracks
    }

    /// Returns the total number of events across all tracks.
    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(Vec::len).sum()
    }
}

/// A sounded note.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteEvent {
    /// Start time in seconds.
    pub onset: f64,
    /// Time in seconds until the note was released. Never negative.
    pub duration: f64,
    pub channel: u8,
    pub note: u8,
    /// Velocity normalized to 0.0..=1.0.
    pub velocity: f32,
}

impl NoteEvent {
    pub fn new(onset: f64, duration: f64, channel: u8, note: u8, velocity: f32) -> NoteEvent {
        NoteEvent {
            onset,
            duration,
            channel,
            note,
            velocity,
        }
    }

    /// Returns the time in seconds the note is released.
    pub fn end(&self) -> f64 {
        self.onset + self.duration
    }
}

/// A controller value change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlChangeEvent {
    /// Time in seconds.
    pub time: f64,
    pub channel: u8,
    pub controller: u8,
    /// Value normalized to 0.0..=1.0.
    pub value: f32,
}

impl ControlChangeEvent {
    pub fn new(time: f64, channel: u8, controller: u8, value: f32) -> ControlChangeEvent {
        ControlChangeEvent {
            time,
            channel,
            controller,
            value,
        }
    }
}
