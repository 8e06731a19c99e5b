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

//! Errors raised while loading instruments and rendering a performance.

use crate::codec::CodecError;
use crate::config::ConfigError;

/// Every way a load or render can fail. A render either fully succeeds or fails with one of
/// these; there is no partially rendered output.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The instrument bank could not supply a preset, zone, instrument or sample for a note.
    #[error("missing instrument data for note {note}: {reason}")]
    MissingInstrumentData { note: u8, reason: String },

    /// Rendering was requested before an instrument bank was loaded.
    #[error("no instrument bank has been loaded")]
    BankNotLoaded,

    /// The performance produced no note events.
    #[error("there are no note events in this performance")]
    EmptyPerformance,

    /// A render worker failed. Results from the remaining workers are discarded.
    #[error("render worker {worker} failed: {source}")]
    WorkerFailure {
        worker: usize,
        #[source]
        source: Box<RenderError>,
    },

    /// A packed record referenced a note with no instrument sample.
    #[error("no instrument sample for note {0}")]
    UnknownInstrument(u8),

    #[error("event codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("unable to build render thread pool: {0}")]
    ThreadPool(String),

    #[error("MIDI parse error: {0}")]
    Midi(#[from] midly::Error),

    /// Only metrical (ticks per quarter note) timing is supported.
    #[error("SMPTE timecode timing is not supported")]
    UnsupportedTiming,

    #[error("SoundFont load error: {0}")]
    SoundFont(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
