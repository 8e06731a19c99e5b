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

//! Builders for the fixtures shared across the crate's tests.
use std::sync::Arc;

use midly::num::{u15, u28};
use midly::{Format, Header, MetaMessage, Smf, Timing, TrackEventKind};

use crate::bank::{
    Instrument, InstrumentBank, InstrumentSample, InstrumentTable, InstrumentZone, Preset,
    PresetZone, SampleData, SampleHeader, NOTE_COUNT,
};

/// A bank with a single preset (bank 0, program 0) whose one zone plays a constant-valued
/// sample rooted at middle C.
pub fn flat_bank(native_rate: u32, len: usize, value: i16) -> InstrumentBank {
    let sample = SampleData {
        header: SampleHeader {
            sample_rate: native_rate,
            original_pitch: Some(60),
            pitch_correction: 0,
        },
        pcm: vec![value; len].into(),
    };
    let instrument = Instrument {
        zones: vec![InstrumentZone {
            sample: Some(Arc::new(sample)),
            ..Default::default()
        }],
    };

    InstrumentBank::new(vec![Preset {
        bank: 0,
        program: 0,
        zones: vec![PresetZone {
            key_range: None,
            instrument: Some(Arc::new(instrument)),
        }],
    }])
}

/// A table where every note plays `seconds` of unity-valued PCM with the given envelope.
pub fn flat_table(sample_rate: u32, seconds: f64, attack: f64, release: f64) -> InstrumentTable {
    let len = (seconds * sample_rate as f64) as usize;
    let samples = (0..NOTE_COUNT)
        .map(|_| InstrumentSample::mono(vec![1.0; len], attack, release, 1.0, None))
        .collect();
    InstrumentTable::from_samples(samples, sample_rate)
}

/// Serializes tracks into a parallel-format Standard MIDI File, terminating each track.
pub fn smf_bytes(ticks_per_quarter: u16, tracks: Vec<Vec<midly::TrackEvent<'static>>>) -> Vec<u8> {
    let tracks = tracks
        .into_iter()
        .map(|mut track| {
            track.push(midly::TrackEvent {
                delta: u28::from(0_u32),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            });
            track
        })
        .collect();
    let header = Header {
        format: Format::Parallel,
        timing: Timing::Metrical(u15::from(ticks_per_quarter)),
    };

    let mut bytes = Vec::new();
    Smf { header, tracks }
        .write_std(&mut bytes)
        .expect("in-memory SMF write");
    bytes
}

/// Root mean square of a signal.
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|&x| x * x).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
