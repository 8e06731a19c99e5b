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

//! Parallel rendering of note events against an instrument table.
//!
//! A render merges and maps the performance, packs the notes into fixed-size records, and hands
//! contiguous slices of those records to a pool of workers. Each worker renders into a private
//! buffer covering just the samples its notes touch. The private buffers are summed into the
//! output in slice order before the master limiter runs over the result, so output only depends
//! on the events and the configured thread count.
mod chorus;
mod control;
mod limiter;
mod worker;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use hound::{SampleFormat, WavSpec, WavWriter};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{info, warn};

pub use chorus::ChorusProcessor;
pub use control::{ChannelControls, ControlSnapshot, Controller};
pub use limiter::MasterLimiter;

use self::worker::{render_slice, RenderContext};
use crate::bank::{InstrumentBank, InstrumentTable};
use crate::codec::{self, RECORD_SIZE};
use crate::config::RenderOptions;
use crate::error::RenderError;
use crate::performance::{map_events, ControlChangeEvent, MapperOptions, NoteEvent, Performance};

/// Rendered stereo audio.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StereoBuffer {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: u32,
}

impl StereoBuffer {
    /// Number of frames.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.sample_rate.max(1) as f64
    }

    /// Writes the buffer as a two channel 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), RenderError> {
        let spec = WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(path, spec)?;
        for (left, right) in self.left.iter().zip(self.right.iter()) {
            writer.write_sample(*left)?;
            writer.write_sample(*right)?;
        }
        writer.finalize()?;

        info!(
            path = path.display().to_string(),
            frames = self.len(),
            "Wrote WAV file"
        );
        Ok(())
    }
}

/// Renders performances with a single loaded instrument.
pub struct Renderer {
    options: RenderOptions,
    table: Option<Arc<InstrumentTable>>,
}

impl Renderer {
    /// Creates a renderer with no instrument loaded.
    pub fn new(options: RenderOptions) -> Renderer {
        Renderer {
            options,
            table: None,
        }
    }

    /// Creates a renderer around an already built instrument table.
    pub fn with_table(options: RenderOptions, table: Arc<InstrumentTable>) -> Renderer {
        if table.sample_rate() != options.sample_rate() {
            warn!(
                table_rate = table.sample_rate(),
                configured_rate = options.sample_rate(),
                "Instrument table rate differs from the configured rate, rendering at the table rate"
            );
        }
        Renderer {
            options,
            table: Some(table),
        }
    }

    /// Builds the instrument table for the configured preset, replacing any previous one.
    pub fn load_bank(&mut self, bank: &InstrumentBank) -> Result<(), RenderError> {
        let table = InstrumentTable::build(bank, &self.options)?;
        self.table = Some(Arc::new(table));
        Ok(())
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn table(&self) -> Option<&Arc<InstrumentTable>> {
        self.table.as_ref()
    }

    /// Renders a multi-track performance.
    pub fn render(&self, performance: &Performance) -> Result<StereoBuffer, RenderError> {
        let mapped = map_events(
            performance.tracks(),
            performance.ticks_per_quarter(),
            MapperOptions::from(&self.options),
        );
        self.render_events(&mapped.notes, &mapped.control_changes)
    }

    /// Renders note and control change events that are already in seconds.
    pub fn render_events(
        &self,
        notes: &[NoteEvent],
        control_changes: &[ControlChangeEvent],
    ) -> Result<StereoBuffer, RenderError> {
        let table = self.table.as_ref().ok_or(RenderError::BankNotLoaded)?;
        if notes.is_empty() {
            return Err(RenderError::EmptyPerformance);
        }
        let start = Instant::now();
        let sample_rate = table.sample_rate();

        let mut notes = notes.to_vec();
        notes.sort_by(|a, b| a.onset.total_cmp(&b.onset));

        // One extra second leaves room for release tails.
        let last_end = notes.iter().map(NoteEvent::end).fold(0.0, f64::max);
        let total_len = (sample_rate as f64 * (last_end + 1.0)).ceil() as usize;

        let controls = ChannelControls::new(control_changes);
        let bytes = codec::encode(&notes, sample_rate);

        let thread_count = self.options.thread_count();
        let chunk_size = notes.len().div_ceil(thread_count);
        info!(
            notes = notes.len(),
            control_changes = control_changes.len(),
            workers = notes.len().div_ceil(chunk_size),
            chunk_size,
            samples = total_len,
            "Rendering"
        );

        let pool = ThreadPoolBuilder::new()
            .num_threads(thread_count)
            .thread_name(|i| format!("sfrender-worker-{i}"))
            .build()
            .map_err(|e| RenderError::ThreadPool(e.to_string()))?;

        let chorus = self.options.chorus();
        let ctx = RenderContext {
            table,
            controls: &controls,
            chorus: &chorus,
            enable_cc: self.options.enable_cc(),
            block_size: self.options.audio_buffer_size(),
        };

        let chunks = pool.install(|| {
            bytes
                .par_chunks(chunk_size * RECORD_SIZE)
                .enumerate()
                .map(|(worker, slice)| {
                    render_slice(worker, slice, &ctx, total_len).map_err(|e| {
                        RenderError::WorkerFailure {
                            worker,
                            source: Box::new(e),
                        }
                    })
                })
                .collect::<Result<Vec<_>, RenderError>>()
        })?;

        let mut left = vec![0.0f32; total_len];
        let mut right = vec![0.0f32; total_len];
        for chunk in chunks.iter() {
            let end = chunk.offset + chunk.left.len();
            for (out, sample) in left[chunk.offset..end].iter_mut().zip(chunk.left.iter()) {
                *out += sample;
            }
            for (out, sample) in right[chunk.offset..end].iter_mut().zip(chunk.right.iter()) {
                *out += sample;
            }
        }

        MasterLimiter::new(&self.options.limiter()).process(&mut left, &mut right);

        info!(
            elapsed_ms = start.elapsed().as_millis(),
            seconds = total_len as f64 / sample_rate as f64,
            "Render complete"
        );
        Ok(StereoBuffer {
            left,
            right,
            sample_rate,
        })
    }
}
