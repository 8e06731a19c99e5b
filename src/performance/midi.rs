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

//! Reads performances from Standard MIDI Files.
use std::fs;
use std::path::Path;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use tracing::{debug, info};

use super::{Performance, RawEventKind, TrackEvent};
use crate::error::RenderError;

impl Performance {
    /// Reads and parses a Standard MIDI File.
    pub fn from_file(path: &Path) -> Result<Performance, RenderError> {
        let bytes = fs::read(path)?;
        let performance = Performance::from_smf_bytes(&bytes)?;
        info!(
            path = path.display().to_string(),
            tracks = performance.tracks().len(),
            events = performance.event_count(),
            "Loaded performance"
        );
        Ok(performance)
    }

    /// Parses an in-memory Standard MIDI File. Events the renderer has no use for are dropped and
    /// their delta times folded into the next kept event.
    pub fn from_smf_bytes(bytes: &[u8]) -> Result<Performance, RenderError> {
        let smf = Smf::parse(bytes)?;
        let ticks_per_quarter = match smf.header.timing {
            Timing::Metrical(ticks) => ticks.as_int(),
            Timing::Timecode(..) => return Err(RenderError::UnsupportedTiming),
        };

        let tracks = smf
            .tracks
            .iter()
            .map(|track| {
                let mut events = Vec::with_capacity(track.len());
                let mut carried = 0u32;
                for event in track {
                    carried = carried.saturating_add(event.delta.as_int());
                    if let Some(kind) = convert(&event.kind) {
                        events.push(TrackEvent::new(carried, kind));
                        carried = 0;
                    }
                }
                events
            })
            .collect::<Vec<_>>();

        debug!(
            format = ?smf.header.format,
            ticks_per_quarter,
            "Parsed MIDI file"
        );
        Ok(Performance::new(ticks_per_quarter, tracks))
    }
}

fn convert(kind: &TrackEventKind) -> Option<RawEventKind> {
    match kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } => Some(RawEventKind::NoteOn {
                    channel,
                    key: key.as_int(),
                    velocity: vel.as_int(),
                }),
                MidiMessage::NoteOff { key, vel } => Some(RawEventKind::NoteOff {
                    channel,
                    key: key.as_int(),
                    velocity: vel.as_int(),
                }),
                MidiMessage::Controller { controller, value } => {
                    Some(RawEventKind::ControlChange {
                        channel,
                        controller: controller.as_int(),
                        value: value.as_int(),
                    })
                }
                MidiMessage::PitchBend { bend } => Some(RawEventKind::PitchBend {
                    channel,
                    value: bend.as_int(),
                }),
                _ => None,
            }
        }
        TrackEventKind::Meta(MetaMessage::Tempo(micros_per_quarter)) => Some(RawEventKind::Tempo {
            micros_per_quarter: micros_per_quarter.as_int(),
        }),
        _ => None,
    }
}
