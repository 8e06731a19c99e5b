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

//! Loads SoundFont 2 banks through rustysynth, flattening its resolved regions into the bank model.

use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use rustysynth::SoundFont;
use tracing::{debug, info, warn};

use super::{
    Generators, Instrument, InstrumentBank, InstrumentZone, KeyRange, Preset, PresetZone,
    SampleData, SampleHeader,
};
use crate::error::RenderError;

/// Native rate assumed when a region points at a missing sample header.
const FALLBACK_SAMPLE_RATE: u32 = 44100;

impl InstrumentBank {
    /// Loads an SF2 file from disk.
    pub fn from_file(path: &Path) -> Result<InstrumentBank, RenderError> {
        info!(path = ?path, "Loading SoundFont");
        let bytes = fs::read(path)?;
        InstrumentBank::from_sf2_bytes(&bytes)
    }

    /// Parses an SF2 image held in memory.
    pub fn from_sf2_bytes(bytes: &[u8]) -> Result<InstrumentBank, RenderError> {
        let mut cursor = Cursor::new(bytes);
        let soundfont = SoundFont::new(&mut cursor)
            .map_err(|e| RenderError::SoundFont(format!("{:?}", e)))?;
        Ok(convert(&soundfont))
    }
}

fn convert(soundfont: &SoundFont) -> InstrumentBank {
    let wave_data = soundfont.get_wave_data();
    let sample_headers = soundfont.get_sample_headers();

    // Regions frequently share a sample; keep one copy per distinct slice of wave data.
    let mut sample_cache: HashMap<(usize, usize), Arc<SampleData>> = HashMap::new();
    let mut instruments: Vec<Arc<Instrument>> = Vec::new();

    for instrument in soundfont.get_instruments() {
        let mut zones = Vec::new();
        for region in instrument.get_regions() {
            let start = region.get_sample_start().max(0) as usize;
            let end = region.get_sample_end().max(0) as usize;
            let sample = if start < end && end <= wave_data.len() {
                let sample_rate = sample_headers
                    .get(region.get_sample_id())
                    .map_or(FALLBACK_SAMPLE_RATE, |h| h.get_sample_rate().max(0) as u32);
                let sample = sample_cache.entry((start, end)).or_insert_with(|| {
                    Arc::new(SampleData {
                        // rustysynth folds the header's pitch correction into the fine tune
                        // and resolves the root key, so neither is repeated here.
                        header: SampleHeader {
                            sample_rate,
                            original_pitch: None,
                            pitch_correction: 0,
                        },
                        pcm: Arc::from(&wave_data[start..end]),
                    })
                });
                Some(sample.clone())
            } else {
                warn!(start, end, "Instrument region has no usable sample data");
                None
            };

            zones.push(InstrumentZone {
                key_range: Some(key_range(
                    region.get_key_range_start(),
                    region.get_key_range_end(),
                )),
                generators: Generators {
                    key_range: None,
                    overriding_root_key: Some(region.get_root_key()),
                    fine_tune: Some(region.get_fine_tune()),
                    coarse_tune: Some(region.get_coarse_tune()),
                    attack_time: seconds_to_timecents(region.get_attack_volume_envelope() as f64),
                    release_time: seconds_to_timecents(
                        region.get_release_volume_envelope() as f64,
                    ),
                    // rustysynth reports attenuation in decibels.
                    initial_attenuation: Some(region.get_initial_attenuation() as f64 * 10.0),
                    // rustysynth does not expose the fixed velocity generator.
                    velocity: None,
                },
                sample,
            });
        }
        instruments.push(Arc::new(Instrument { zones }));
    }

    let presets: Vec<Preset> = soundfont
        .get_presets()
        .iter()
        .map(|preset| Preset {
            bank: preset.get_bank_number().max(0) as u16,
            program: preset.get_patch_number().max(0) as u16,
            zones: preset
                .get_regions()
                .iter()
                .map(|region| PresetZone {
                    key_range: Some(key_range(
                        region.get_key_range_start(),
                        region.get_key_range_end(),
                    )),
                    instrument: instruments.get(region.get_instrument_id()).cloned(),
                })
                .collect(),
        })
        .collect();

    debug!(
        presets = presets.len(),
        instruments = instruments.len(),
        samples = sample_cache.len(),
        "SoundFont converted"
    );

    InstrumentBank::new(presets)
}

fn key_range(start: i32, end: i32) -> KeyRange {
    KeyRange::new(start.clamp(0, 127) as u8, end.clamp(0, 127) as u8)
}

/// Converts seconds back to timecents. Zero seconds has no timecent value.
fn seconds_to_timecents(seconds: f64) -> Option<f64> {
    (seconds > 0.0).then(|| 1200.0 * seconds.log2())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::table::timecents_to_seconds;

    #[test]
    fn test_invalid_soundfont() {
        let result = InstrumentBank::from_sf2_bytes(b"RIFF\0\0\0\0nope");
        assert!(matches!(result, Err(RenderError::SoundFont(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = InstrumentBank::from_file(Path::new("/nonexistent/bank.sf2"));
        assert!(matches!(result, Err(RenderError::Io(_))));
    }

    #[test]
    fn test_timecents_round_trip() {
        for seconds in [0.001, 0.25, 1.0, 3.5] {
            let timecents = seconds_to_timecents(seconds).unwrap();
            assert!((timecents_to_seconds(timecents) - seconds).abs() < 1e-9);
        }
        assert_eq!(seconds_to_timecents(0.0), None);
    }

    #[test]
    fn test_key_range_clamps() {
        assert_eq!(key_range(-5, 200), KeyRange::new(0, 127));
        assert_eq!(key_range(36, 48), KeyRange::new(36, 48));
    }
}
