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

//! Fixed-size binary records carrying note events to the render workers.
//!
//! Each record is 12 bytes, big-endian:
//!
//! | bytes | field |
//! |-------|-------|
//! | 0..4  | onset in samples (u32) |
//! | 4..8  | duration in samples (u32) |
//! | 8     | record type tag |
//! | 9     | channel |
//! | 10    | note number |
//! | 11    | velocity, 0..=127 |
//!
//! Records are written in the order given, which callers keep sorted by onset.
use thiserror::Error;

use crate::performance::NoteEvent;

/// The size in bytes of one packed record.
pub const RECORD_SIZE: usize = 12;

/// Tag identifying a note record.
pub const NOTE_RECORD: u8 = 0x01;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer of {0} bytes is not a whole number of records")]
    TruncatedBuffer(usize),

    #[error("unknown record type {tag:#04x} at byte {offset}")]
    UnknownRecordType { tag: u8, offset: usize },
}

/// A note event in integer sample units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackedNoteRecord {
    pub onset: u32,
    pub duration: u32,
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
}

impl PackedNoteRecord {
    /// Quantizes a note event at the given sample rate. Times are floored to whole samples and
    /// saturate at the u32 range.
    pub fn from_note(note: &NoteEvent, sample_rate: u32) -> PackedNoteRecord {
        PackedNoteRecord {
            onset: to_samples(note.onset, sample_rate),
            duration: to_samples(note.duration, sample_rate),
            channel: note.channel,
            note: note.note,
            velocity: (note.velocity.clamp(0.0, 1.0) * 127.0).round() as u8,
        }
    }

    /// Returns the velocity normalized to 0.0..=1.0.
    pub fn velocity_f32(&self) -> f32 {
        self.velocity as f32 / 127.0
    }

    pub fn end(&self) -> u64 {
        self.onset as u64 + self.duration as u64
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.onset.to_be_bytes());
        out.extend_from_slice(&self.duration.to_be_bytes());
        out.push(NOTE_RECORD);
        out.push(self.channel);
        out.push(self.note);
        out.push(self.velocity);
    }
}

fn to_samples(seconds: f64, sample_rate: u32) -> u32 {
    // Float to int casts saturate and map NaN to zero.
    (seconds * sample_rate as f64).floor() as u32
}

/// Encodes note events into packed records.
pub fn encode(notes: &[NoteEvent], sample_rate: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(notes.len() * RECORD_SIZE);
    for note in notes {
        PackedNoteRecord::from_note(note, sample_rate).write(&mut out);
    }
    out
}

/// Encodes already-quantized records.
pub fn encode_records(records: &[PackedNoteRecord]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.len() * RECORD_SIZE);
    for record in records {
        record.write(&mut out);
    }
    out
}

/// Decodes a buffer of packed records.
pub fn decode(bytes: &[u8]) -> Result<Vec<PackedNoteRecord>, CodecError> {
    if bytes.len() % RECORD_SIZE != 0 {
        return Err(CodecError::TruncatedBuffer(bytes.len()));
    }

    bytes
        .chunks_exact(RECORD_SIZE)
        .enumerate()
        .map(|(i, record)| {
            let tag = record[8];
            if tag != NOTE_RECORD {
                return Err(CodecError::UnknownRecordType {
                    tag,
                    offset: i * RECORD_SIZE + 8,
                });
            }
            Ok(PackedNoteRecord {
                onset: u32::from_be_bytes([record[0], record[1], record[2], record[3]]),
                duration: u32::from_be_bytes([record[4], record[5], record[6], record[7]]),
                channel: record[9],
                note: record[10],
                velocity: record[11],
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn test_byte_layout() {
        let note = NoteEvent::new(1.0, 0.5, 3, 60, 1.0);

        let bytes = encode(&[note], 48000);

        assert_eq!(
            bytes,
            vec![0x00, 0x00, 0xbb, 0x80, 0x00, 0x00, 0x5d, 0xc0, 0x01, 0x03, 0x3c, 0x7f]
        );
    }

    #[test]
    fn test_quantization() {
        let note = NoteEvent::new(0.99999, 0.000_01, 0, 1, 0.5);

        let record = PackedNoteRecord::from_note(&note, 48000);

        assert_eq!(record.onset, 47999);
        assert_eq!(record.duration, 0);
        assert_eq!(record.velocity, 64);
        assert!((record.velocity_f32() - 64.0 / 127.0).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_times_saturate() {
        let note = NoteEvent::new(1e12, -1.0, 0, 1, 2.0);

        let record = PackedNoteRecord::from_note(&note, 48000);

        assert_eq!(record.onset, u32::MAX);
        assert_eq!(record.duration, 0);
        assert_eq!(record.velocity, 127);
    }

    #[test]
    fn test_records_survive_encoding() {
        let mut rng = StdRng::seed_from_u64(1);
        let records: Vec<PackedNoteRecord> = (0..500)
            .map(|_| PackedNoteRecord {
                onset: rng.gen(),
                duration: rng.gen(),
                channel: rng.gen_range(0..16),
                note: rng.gen_range(0..128),
                velocity: rng.gen_range(0..128),
            })
            .collect();

        let bytes = encode_records(&records);

        assert_eq!(bytes.len(), records.len() * RECORD_SIZE);
        assert_eq!(decode(&bytes).unwrap(), records);
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(decode(&[]).unwrap(), vec![]);
    }

    #[test]
    fn test_truncated_buffer() {
        let bytes = encode(&[NoteEvent::new(0.0, 1.0, 0, 60, 1.0)], 48000);

        assert_eq!(
            decode(&bytes[..RECORD_SIZE - 1]),
            Err(CodecError::TruncatedBuffer(11))
        );
    }

    #[test]
    fn test_unknown_record_type() {
        let mut bytes = encode(
            &[
                NoteEvent::new(0.0, 1.0, 0, 60, 1.0),
                NoteEvent::new(1.0, 1.0, 0, 62, 1.0),
            ],
            48000,
        );
        bytes[RECORD_SIZE + 8] = 0x02;

        assert_eq!(
            decode(&bytes),
            Err(CodecError::UnknownRecordType {
                tag: 0x02,
                offset: 20
            })
        );
    }
}
