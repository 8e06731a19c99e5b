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

//! Builds the 128-entry instrument table: one pitch-shifted, rate-converted sample per note.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use super::{InstrumentBank, InstrumentZone, Preset};
use crate::config::{Envelope, RenderOptions};
use crate::error::RenderError;

/// Number of MIDI note numbers covered by an instrument table.
pub const NOTE_COUNT: usize = 128;

/// Root key used when neither the zone nor the sample header supplies one.
const DEFAULT_ROOT_KEY: f64 = 60.0;

/// A note's sample at the output rate plus the parameters used to synthesize it.
#[derive(Clone, Debug)]
pub struct InstrumentSample {
    left: Arc<[f32]>,
    right: Arc<[f32]>,
    /// Attack time in seconds.
    attack: f64,
    /// Release time in seconds.
    release: f64,
    /// Linear gain applied to every sample.
    attenuation: f32,
    /// Fixed velocity (0.0..=1.0) replacing the note's own velocity.
    velocity: Option<f32>,
}

impl InstrumentSample {
    /// Creates a sample that plays the same PCM on both channels.
    pub fn mono(
        pcm: Vec<f32>,
        attack: f64,
        release: f64,
        attenuation: f32,
        velocity: Option<f32>,
    ) -> InstrumentSample {
        let pcm: Arc<[f32]> = pcm.into();
        InstrumentSample {
            left: pcm.clone(),
            right: pcm,
            attack,
            release,
            attenuation,
            velocity,
        }
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    /// Returns the number of frames in the sample.
    pub fn len(&self) -> usize {
        self.left.len().min(self.right.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn attack(&self) -> f64 {
        self.attack
    }

    pub fn release(&self) -> f64 {
        self.release
    }

    pub fn attenuation(&self) -> f32 {
        self.attenuation
    }

    pub fn velocity(&self) -> Option<f32> {
        self.velocity
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        let shared = Arc::ptr_eq(&self.left, &self.right);
        let channels = if shared { 1 } else { 2 };
        self.len() * channels * std::mem::size_of::<f32>()
    }
}

/// Immutable per-note samples shared read-only by every render worker.
#[derive(Clone, Debug)]
pub struct InstrumentTable {
    samples: Vec<InstrumentSample>,
    sample_rate: u32,
}

impl InstrumentTable {
    /// Resolves and converts a sample for every note from the configured preset.
    pub fn build(
        bank: &InstrumentBank,
        options: &RenderOptions,
    ) -> Result<InstrumentTable, RenderError> {
        let start = Instant::now();
        let preset_config = options.preset();
        let sample_rate = options.sample_rate();
        let envelope = options.envelope();

        info!(
            bank = preset_config.bank(),
            program = preset_config.program(),
            sample_rate,
            "Building instrument table"
        );

        let preset = bank.preset(preset_config.bank(), preset_config.program());
        let samples = (0..NOTE_COUNT as u8)
            .into_par_iter()
            .map(|note| {
                let preset = preset.ok_or_else(|| RenderError::MissingInstrumentData {
                    note,
                    reason: format!(
                        "no such preset {:03}:{:03}",
                        preset_config.bank(),
                        preset_config.program()
                    ),
                })?;
                build_note(preset, note, sample_rate, &envelope)
            })
            .collect::<Result<Vec<InstrumentSample>, RenderError>>()?;

        let table = InstrumentTable {
            samples,
            sample_rate,
        };
        info!(
            memory_kb = table.memory_size() / 1024,
            elapsed_ms = start.elapsed().as_millis(),
            "Instrument table built"
        );
        Ok(table)
    }

    /// Creates a table from already converted samples, indexed by note number.
    pub fn from_samples(samples: Vec<InstrumentSample>, sample_rate: u32) -> InstrumentTable {
        InstrumentTable {
            samples,
            sample_rate,
        }
    }

    /// Returns the sample for the given note.
    pub fn get(&self, note: u8) -> Option<&InstrumentSample> {
        self.samples.get(note as usize)
    }

    /// Returns the sample rate the table was converted to.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the total memory used by the converted samples.
    pub fn memory_size(&self) -> usize {
        self.samples.iter().map(|s| s.memory_size()).sum()
    }
}

/// Resolves the zone chain for a note and converts its sample to the output rate and pitch.
fn build_note(
    preset: &Preset,
    note: u8,
    sample_rate: u32,
    envelope: &Envelope,
) -> Result<InstrumentSample, RenderError> {
    let missing = |reason: &str| RenderError::MissingInstrumentData {
        note,
        reason: reason.to_string(),
    };

    let preset_zone = preset
        .zone_for(note)
        .ok_or_else(|| missing("no preset zone matches the note"))?;
    let instrument = preset_zone
        .instrument
        .as_ref()
        .ok_or_else(|| missing("no instrument in preset zone"))?;
    let zone = instrument
        .zone_for(note)
        .ok_or_else(|| missing("no instrument zone matches the note"))?;
    let sample = zone
        .sample
        .as_ref()
        .ok_or_else(|| missing("no sample for instrument zone"))?;
    if sample.header.sample_rate == 0 {
        return Err(missing("sample has a zero sample rate"));
    }

    let pcm: Vec<f32> = sample.pcm.iter().map(|&s| s as f32 / 32768.0).collect();
    let root = effective_root(zone);
    let converted = resample(
        &transpose(&pcm, root, note),
        sample.header.sample_rate,
        sample_rate,
    );

    let generators = &zone.generators;
    let (attack, release) = if envelope.uses_bank() {
        (
            generators.attack_time.map_or(0.0, timecents_to_seconds),
            generators.release_time.map_or(0.0, timecents_to_seconds),
        )
    } else {
        (envelope.attack(), envelope.release())
    };

    debug!(
        note,
        root,
        native_rate = sample.header.sample_rate,
        frames = converted.len(),
        "Converted note sample"
    );

    Ok(InstrumentSample::mono(
        converted,
        attack,
        release,
        generators
            .initial_attenuation
            .map_or(1.0, centibels_to_gain),
        generators.velocity.map(|v| v as f32 / 127.0),
    ))
}

/// The fractional key the zone's sample sounds at once tuning is applied.
fn effective_root(zone: &InstrumentZone) -> f64 {
    let generators = &zone.generators;
    let header = zone.sample.as_ref().map(|s| &s.header);
    let root = generators
        .overriding_root_key
        .filter(|key| (0..=127).contains(key))
        .map(|key| key as f64)
        .or_else(|| header.and_then(|h| h.original_pitch).map(f64::from))
        .unwrap_or(DEFAULT_ROOT_KEY);
    let fine = generators.fine_tune.unwrap_or(0) + header.map_or(0, |h| h.pitch_correction);
    let coarse = generators.coarse_tune.unwrap_or(0);

    root - fine as f64 / 100.0 - coarse as f64
}

/// Converts an SF2 time in timecents to seconds.
pub fn timecents_to_seconds(timecents: f64) -> f64 {
    2f64.powf(timecents / 1200.0)
}

/// Converts an SF2 attenuation in centibels to a linear gain.
pub fn centibels_to_gain(centibels: f64) -> f32 {
    10f64.powf(-(centibels / 10.0) / 20.0) as f32
}

/// Linearly interpolates the data at a fractional position. Taps past either end read as silence.
fn interpolate(data: &[f32], position: f64) -> f32 {
    let lower = position.floor();
    let upper = position.ceil();
    let frac = (position - lower) as f32;
    let a = data.get(lower as usize).copied().unwrap_or(0.0);
    let b = data.get(upper as usize).copied().unwrap_or(0.0);
    a + (b - a) * frac
}

/// Shifts the pitch of a sample recorded at `root` so that it sounds at `note`, stretching or
/// compressing it in time.
pub(crate) fn transpose(data: &[f32], root: f64, note: u8) -> Vec<f32> {
    let ratio = 2f64.powf((note as f64 - root) / 12.0);
    let len = (data.len() as f64 / ratio).floor() as usize;

    (0..len)
        .map(|i| interpolate(data, i as f64 * ratio))
        .collect()
}

/// Converts a sample from its native rate to the output rate.
pub(crate) fn resample(data: &[f32], native_rate: u32, output_rate: u32) -> Vec<f32> {
    let ratio = output_rate as f64 / native_rate as f64;
    let len = (data.len() as f64 * ratio).floor() as usize;

    (0..len)
        .map(|i| interpolate(data, i as f64 / ratio))
        .collect()
}
