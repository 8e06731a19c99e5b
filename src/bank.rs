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

//! Instrument bank model and the per-note instrument table built from it.
//!
//! The bank mirrors the SoundFont layout: presets hold zones that point at instruments, and
//! instrument zones carry generators plus the raw 16-bit sample they play. Only the pieces the
//! renderer reads are modelled.

mod sf2;
mod table;

use std::sync::Arc;

pub use table::{InstrumentSample, InstrumentTable, NOTE_COUNT};

/// An inclusive MIDI key range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyRange {
    pub lo: u8,
    pub hi: u8,
}

impl KeyRange {
    pub fn new(lo: u8, hi: u8) -> KeyRange {
        KeyRange { lo, hi }
    }

    /// Returns true if the note falls within the range.
    pub fn contains(&self, note: u8) -> bool {
        self.lo <= note && note <= self.hi
    }
}

/// Returns true if the note is within the range, treating a missing range as the full keyboard.
fn in_range(range: Option<KeyRange>, note: u8) -> bool {
    range.map_or(true, |range| range.contains(note))
}

/// Generator values set on an instrument zone. Unset generators take the bank defaults.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Generators {
    /// Key range filter generator.
    pub key_range: Option<KeyRange>,
    /// Root key that replaces the sample's original pitch.
    pub overriding_root_key: Option<i32>,
    /// Fine tuning in cents.
    pub fine_tune: Option<i32>,
    /// Coarse tuning in semitones.
    pub coarse_tune: Option<i32>,
    /// Volume envelope attack time in timecents.
    pub attack_time: Option<f64>,
    /// Volume envelope release time in timecents.
    pub release_time: Option<f64>,
    /// Initial attenuation in centibels.
    pub initial_attenuation: Option<f64>,
    /// Fixed velocity (0..=127) used for every note played through this zone.
    pub velocity: Option<u8>,
}

/// Sample header fields that affect pitch and rate.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleHeader {
    /// Native sample rate in Hz.
    pub sample_rate: u32,
    /// The MIDI key the sample was recorded at.
    pub original_pitch: Option<u8>,
    /// Pitch correction in cents.
    pub pitch_correction: i32,
}

/// A mono 16-bit sample.
#[derive(Clone, Debug)]
pub struct SampleData {
    pub header: SampleHeader,
    pub pcm: Arc<[i16]>,
}

#[derive(Clone, Debug, Default)]
pub struct InstrumentZone {
    pub key_range: Option<KeyRange>,
    pub generators: Generators,
    pub sample: Option<Arc<SampleData>>,
}

impl InstrumentZone {
    fn matches(&self, note: u8) -> bool {
        in_range(self.key_range, note) && in_range(self.generators.key_range, note)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Instrument {
    pub zones: Vec<InstrumentZone>,
}

impl Instrument {
    /// Returns the zone for the note, falling back to the first zone when none matches.
    pub fn zone_for(&self, note: u8) -> Option<&InstrumentZone> {
        self.zones
            .iter()
            .find(|zone| zone.matches(note))
            .or_else(|| self.zones.first())
    }
}

#[derive(Clone, Debug, Default)]
pub struct PresetZone {
    pub key_range: Option<KeyRange>,
    pub instrument: Option<Arc<Instrument>>,
}

#[derive(Clone, Debug, Default)]
pub struct Preset {
    pub bank: u16,
    pub program: u16,
    pub zones: Vec<PresetZone>,
}

impl Preset {
    /// Returns the zone for the note, falling back to the first zone when none matches.
    pub fn zone_for(&self, note: u8) -> Option<&PresetZone> {
        self.zones
            .iter()
            .find(|zone| in_range(zone.key_range, note))
            .or_else(|| self.zones.first())
    }
}

/// A loaded instrument bank.
#[derive(Clone, Debug, Default)]
pub struct InstrumentBank {
    pub presets: Vec<Preset>,
}

impl InstrumentBank {
    pub fn new(presets: Vec<Preset>) -> InstrumentBank {
        InstrumentBank { presets }
    }

    /// Finds the preset with the given bank and program numbers.
    pub fn preset(&self, bank: u16, program: u16) -> Option<&Preset> {
        self.presets
            .iter()
            .find(|preset| preset.bank == bank && preset.program == program)
    }
}
