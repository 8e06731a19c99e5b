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

//! Turns the merged timeline into note and control change events in seconds.
//!
//! The mapper is a small state machine. Each channel tracks a sustain flag and a hold-set of
//! notes started while the pedal is down. Each (channel, key) pair has a LIFO stack of pending
//! onsets that note-offs pop from.
use tracing::{debug, info, warn};

use super::timeline::{merge, TempoMap};
use super::{
    ControlChangeEvent, NoteEvent, RawEventKind, RawTimelineEvent, TrackEvent, CHANNEL_COUNT,
    SUSTAIN_CONTROLLER,
};
use crate::bank::NOTE_COUNT;
use crate::config::RenderOptions;

/// The subset of render options the mapper reads.
#[derive(Clone, Copy, Debug)]
pub struct MapperOptions {
    /// Emit control change events for controllers other than sustain.
    pub enable_cc: bool,
    /// Maximum pending onsets per (channel, key) and held notes per channel. Zero is unlimited.
    pub polyphony_limit: usize,
}

impl Default for MapperOptions {
    fn default() -> Self {
        MapperOptions {
            enable_cc: true,
            polyphony_limit: 0,
        }
    }
}

impl From<&RenderOptions> for MapperOptions {
    fn from(options: &RenderOptions) -> Self {
        MapperOptions {
            enable_cc: options.enable_cc(),
            polyphony_limit: options.polyphony_limit(),
        }
    }
}

/// Counters describing onsets that never became notes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MapperStats {
    /// Onsets discarded by the polyphony limit.
    pub evicted: usize,
    /// Onsets still pending or held when the timeline ended.
    pub unterminated: usize,
    /// Note-offs with no pending onset.
    pub unmatched: usize,
}

/// The mapper's output. Notes are sorted by onset.
#[derive(Clone, Debug, Default)]
pub struct MappedEvents {
    pub notes: Vec<NoteEvent>,
    pub control_changes: Vec<ControlChangeEvent>,
    pub stats: MapperStats,
}

#[derive(Clone, Copy, Debug)]
struct PendingNote {
    onset: f64,
    key: u8,
    velocity: f32,
}

#[derive(Clone, Debug, Default)]
struct ChannelState {
    sustain: bool,
    held: Vec<PendingNote>,
}

/// Stateful note and control change mapper. Feed it timeline events in tick order and call
/// `finish` once the timeline is exhausted.
pub struct NoteMapper {
    options: MapperOptions,
    tempo: TempoMap,
    channels: Vec<ChannelState>,
    /// Pending onsets indexed by `channel * NOTE_COUNT + key`.
    active: Vec<Vec<PendingNote>>,
    notes: Vec<NoteEvent>,
    control_changes: Vec<ControlChangeEvent>,
    stats: MapperStats,
}

impl NoteMapper {
    pub fn new(ticks_per_quarter: u16, options: MapperOptions) -> NoteMapper {
        NoteMapper {
            options,
            tempo: TempoMap::new(ticks_per_quarter),
            channels: vec![ChannelState::default(); CHANNEL_COUNT],
            active: vec![Vec::new(); CHANNEL_COUNT * NOTE_COUNT],
            notes: Vec::new(),
            control_changes: Vec::new(),
            stats: MapperStats::default(),
        }
    }

    /// Processes a single timeline event.
    pub fn process(&mut self, event: &RawTimelineEvent) {
        let now = self.tempo.apply(event);

        match event.kind {
            RawEventKind::NoteOn {
                channel,
                key,
                velocity,
            } => {
                if !valid(channel, key) {
                    return;
                }
                if velocity == 0 {
                    self.note_off(now, channel, key);
                } else {
                    self.note_on(now, channel, key, velocity);
                }
            }
            RawEventKind::NoteOff { channel, key, .. } => {
                if valid(channel, key) {
                    self.note_off(now, channel, key);
                }
            }
            RawEventKind::ControlChange {
                channel,
                controller,
                value,
            } => {
                if !valid(channel, 0) {
                    return;
                }
                if controller == SUSTAIN_CONTROLLER {
                    self.sustain(now, channel, value >= 64);
                } else if self.options.enable_cc {
                    self.control_changes.push(ControlChangeEvent::new(
                        now,
                        channel,
                        controller,
                        value.min(127) as f32 / 127.0,
                    ));
                }
            }
            RawEventKind::PitchBend { .. } | RawEventKind::Tempo { .. } => {}
        }
    }

    fn note_on(&mut self, now: f64, channel: u8, key: u8, velocity: u8) {
        let pending = PendingNote {
            onset: now,
            key,
            velocity: velocity.min(127) as f32 / 127.0,
        };
        let limit = self.options.polyphony_limit;
        let state = &mut self.channels[channel as usize];

        if state.sustain {
            if limit > 0 && state.held.len() >= limit {
                debug!(channel, key, "Hold set full, dropping note");
                self.stats.evicted += 1;
                return;
            }
            state.held.push(pending);
            return;
        }

        let stack = &mut self.active[slot(channel, key)];
        if limit > 0 {
            while stack.len() >= limit {
                stack.remove(0);
                self.stats.evicted += 1;
            }
        }
        stack.push(pending);
    }

    fn note_off(&mut self, now: f64, channel: u8, key: u8) {
        match self.active[slot(channel, key)].pop() {
            Some(pending) => self.emit(now, channel, pending),
            None => self.stats.unmatched += 1,
        }
    }

    fn sustain(&mut self, now: f64, channel: u8, on: bool) {
        let held = {
            let state = &mut self.channels[channel as usize];
            state.sustain = on;
            if on {
                return;
            }
            std::mem::take(&mut state.held)
        };

        for pending in held {
            self.emit(now, channel, pending);
        }
    }

    fn emit(&mut self, now: f64, channel: u8, pending: PendingNote) {
        self.notes.push(NoteEvent::new(
            pending.onset,
            (now - pending.onset).max(0.0),
            channel,
            pending.key,
            pending.velocity,
        ));
    }

    /// Drops anything still pending and returns the mapped events with notes sorted by onset.
    pub fn finish(mut self) -> MappedEvents {
        let unterminated = self.active.iter().map(Vec::len).sum::<usize>()
            + self.channels.iter().map(|c| c.held.len()).sum::<usize>();
        if unterminated > 0 {
            debug!(unterminated, "Dropping notes never released");
        }
        self.stats.unterminated = unterminated;

        self.notes.sort_by(|a, b| a.onset.total_cmp(&b.onset));

        MappedEvents {
            notes: self.notes,
            control_changes: self.control_changes,
            stats: self.stats,
        }
    }
}

fn slot(channel: u8, key: u8) -> usize {
    channel as usize * NOTE_COUNT + key as usize
}

fn valid(channel: u8, key: u8) -> bool {
    if (channel as usize) < CHANNEL_COUNT && (key as usize) < NOTE_COUNT {
        true
    } else {
        warn!(channel, key, "Skipping event with out of range channel or key");
        false
    }
}

/// Merges the tracks and maps the resulting timeline in a single forward sweep.
pub fn map_events(
    tracks: &[Vec<TrackEvent>],
    ticks_per_quarter: u16,
    options: MapperOptions,
) -> MappedEvents {
    let timeline = merge(tracks);
    let mut mapper = NoteMapper::new(ticks_per_quarter, options);
    for event in timeline.iter() {
        mapper.process(event);
    }
    let mapped = mapper.finish();

    info!(
        timeline_events = timeline.len(),
        notes = mapped.notes.len(),
        control_changes = mapped.control_changes.len(),
        evicted = mapped.stats.evicted,
        "Mapped performance"
    );
    mapped
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn on(delta: u32, key: u8, velocity: u8) -> TrackEvent {
        TrackEvent::new(
            delta,
            RawEventKind::NoteOn {
                channel: 0,
                key,
                velocity,
            },
        )
    }

    fn off(delta: u32, key: u8) -> TrackEvent {
        TrackEvent::new(
            delta,
            RawEventKind::NoteOff {
                channel: 0,
                key,
                velocity: 0,
            },
        )
    }

    fn cc(delta: u32, controller: u8, value: u8) -> TrackEvent {
        TrackEvent::new(
            delta,
            RawEventKind::ControlChange {
                channel: 0,
                controller,
                value,
            },
        )
    }

    fn limited(polyphony_limit: usize) -> MapperOptions {
        MapperOptions {
            enable_cc: true,
            polyphony_limit,
        }
    }

    #[test]
    fn test_simple_note() {
        // 480 ticks per quarter at 120 bpm is 960 ticks per second.
        let tracks = vec![vec![on(480, 60, 127), off(960, 60)]];

        let mapped = map_events(&tracks, 480, MapperOptions::default());

        assert_eq!(mapped.notes.len(), 1);
        let note = mapped.notes[0];
        assert!((note.onset - 0.5).abs() < 1e-9);
        assert!((note.duration - 1.0).abs() < 1e-9);
        assert_eq!(note.note, 60);
        assert_eq!(note.velocity, 1.0);
    }

    #[test]
    fn test_zero_velocity_note_on_is_note_off() {
        let tracks = vec![vec![on(0, 64, 100), on(96, 64, 0)]];

        let mapped = map_events(&tracks, 480, MapperOptions::default());

        assert_eq!(mapped.notes.len(), 1);
        assert!((mapped.notes[0].duration - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_sustain_defers_release() {
        let tracks = vec![vec![
            cc(0, SUSTAIN_CONTROLLER, 127),
            on(96, 60, 100),
            off(96, 60),
            cc(288, SUSTAIN_CONTROLLER, 0),
        ]];

        let mapped = map_events(&tracks, 480, MapperOptions::default());

        assert_eq!(mapped.notes.len(), 1);
        let note = mapped.notes[0];
        assert!((note.onset - 0.1).abs() < 1e-9);
        assert!((note.duration - 0.4).abs() < 1e-9);
        // The sustain controller itself is never forwarded.
        assert!(mapped.control_changes.is_empty());
    }

    #[test]
    fn test_sustain_flush_keeps_insertion_order() {
        let tracks = vec![vec![
            cc(0, SUSTAIN_CONTROLLER, 100),
            on(10, 62, 100),
            on(10, 60, 100),
            cc(10, SUSTAIN_CONTROLLER, 10),
        ]];

        let mapped = map_events(&tracks, 480, MapperOptions::default());
        let keys: Vec<u8> = mapped.notes.iter().map(|n| n.note).collect();

        assert_eq!(keys, vec![62, 60]);
    }

    #[test]
    fn test_polyphony_keeps_newest() {
        let tracks = vec![vec![on(0, 60, 100), on(48, 60, 90), off(48, 60)]];

        let mapped = map_events(&tracks, 480, limited(1));

        assert_eq!(mapped.notes.len(), 1);
        assert!((mapped.notes[0].onset - 0.05).abs() < 1e-9);
        assert_eq!(mapped.stats.evicted, 1);
        assert_eq!(mapped.stats.unterminated, 0);
    }

    #[test]
    fn test_unlimited_polyphony_pairs_lifo() {
        let tracks = vec![vec![
            on(0, 60, 100),
            on(48, 60, 90),
            off(48, 60),
            off(48, 60),
        ]];

        let mapped = map_events(&tracks, 480, MapperOptions::default());

        assert_eq!(mapped.notes.len(), 2);
        // The first note-off closes the most recent onset.
        assert!((mapped.notes[0].onset - 0.0).abs() < 1e-9);
        assert!((mapped.notes[0].duration - 0.15).abs() < 1e-9);
        assert!((mapped.notes[1].onset - 0.05).abs() < 1e-9);
        assert!((mapped.notes[1].duration - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_full_hold_set_drops_incoming() {
        let tracks = vec![vec![
            cc(0, SUSTAIN_CONTROLLER, 127),
            on(10, 60, 100),
            on(10, 61, 100),
            cc(10, SUSTAIN_CONTROLLER, 0),
        ]];

        let mapped = map_events(&tracks, 480, limited(1));

        assert_eq!(mapped.notes.len(), 1);
        assert_eq!(mapped.notes[0].note, 60);
        assert_eq!(mapped.stats.evicted, 1);
    }

    #[test]
    fn test_unmatched_note_off_dropped() {
        let tracks = vec![vec![off(0, 60), on(10, 61, 100)]];

        let mapped = map_events(&tracks, 480, MapperOptions::default());

        assert!(mapped.notes.is_empty());
        assert_eq!(mapped.stats.unmatched, 1);
        assert_eq!(mapped.stats.unterminated, 1);
    }

    #[test]
    fn test_control_changes_normalized() {
        let tracks = vec![vec![cc(0, 0x07, 127), cc(480, 0x0a, 0)]];

        let mapped = map_events(&tracks, 480, MapperOptions::default());

        let changes = &mapped.control_changes;
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0], ControlChangeEvent::new(0.0, 0, 0x07, 1.0));
        assert_eq!(changes[1].controller, 0x0a);
        assert_eq!(changes[1].value, 0.0);
        assert!((changes[1].time - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_control_changes_disabled() {
        let tracks = vec![vec![cc(0, 0x07, 127)]];
        let options = MapperOptions {
            enable_cc: false,
            polyphony_limit: 0,
        };

        let mapped = map_events(&tracks, 480, options);

        assert!(mapped.control_changes.is_empty());
    }

    #[test]
    fn test_tempo_change_mid_note() {
        let tracks = vec![
            vec![
                TrackEvent::new(
                    480,
                    RawEventKind::Tempo {
                        micros_per_quarter: 1_000_000,
                    },
                ),
            ],
            vec![on(0, 60, 100), off(960, 60)],
        ];

        let mapped = map_events(&tracks, 480, MapperOptions::default());

        assert!((mapped.notes[0].duration - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_channel_skipped() {
        let tracks = vec![vec![TrackEvent::new(
            0,
            RawEventKind::NoteOn {
                channel: 16,
                key: 60,
                velocity: 100,
            },
        )]];

        let mapped = map_events(&tracks, 480, MapperOptions::default());

        assert!(mapped.notes.is_empty());
        assert_eq!(mapped.stats.unterminated, 0);
    }

    #[test]
    fn test_random_onsets_are_accounted_for() {
        let mut rng = StdRng::seed_from_u64(42);

        for limit in [0, 1, 3] {
            let mut track = Vec::new();
            let mut onsets = 0;
            for _ in 0..2000 {
                let delta = rng.gen_range(0..20);
                let key = rng.gen_range(58..62);
                let event = match rng.gen_range(0..10) {
                    0 => cc(delta, SUSTAIN_CONTROLLER, rng.gen_range(0..128)),
                    1..=4 => off(delta, key),
                    _ => {
                        onsets += 1;
                        on(delta, key, rng.gen_range(1..128))
                    }
                };
                track.push(event);
            }

            let mapped = map_events(&[track], 96, limited(limit));

            assert_eq!(
                mapped.notes.len() + mapped.stats.evicted + mapped.stats.unterminated,
                onsets
            );
            assert!(mapped.notes.iter().all(|n| n.duration >= 0.0));
            assert!(mapped
                .notes
                .windows(2)
                .all(|w| w[0].onset <= w[1].onset));
        }
    }
}
