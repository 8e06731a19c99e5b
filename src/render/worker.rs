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

use tracing::{debug, warn};

use super::chorus::ChorusProcessor;
use super::control::{ChannelControls, ControlSnapshot};
use crate::bank::InstrumentTable;
use crate::codec::{self, PackedNoteRecord};
use crate::config::Chorus;
use crate::error::RenderError;
use crate::performance::CHANNEL_COUNT;

/// Read-only state shared by every worker of a render.
pub(super) struct RenderContext<'a> {
    pub table: &'a InstrumentTable,
    pub controls: &'a ChannelControls,
    pub chorus: &'a Chorus,
    pub enable_cc: bool,
    pub block_size: usize,
}

/// A worker's output: stereo samples to be added into the final buffer starting at `offset`.
#[derive(Debug, Default)]
pub(super) struct RenderedChunk {
    pub offset: usize,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

/// Renders one slice of packed note records into a private buffer spanning only the samples
/// those notes touch. Nothing is written at or past `total_len`.
pub(super) fn render_slice(
    worker: usize,
    bytes: &[u8],
    ctx: &RenderContext,
    total_len: usize,
) -> Result<RenderedChunk, RenderError> {
    let records = codec::decode(bytes)?;
    let rate = ctx.table.sample_rate() as f64;

    // Work out the span first so the chunk is allocated once.
    let mut span: Option<(usize, usize)> = None;
    for record in records.iter() {
        let sample = ctx
            .table
            .get(record.note)
            .ok_or(RenderError::UnknownInstrument(record.note))?;
        let start = record.onset as usize;
        if start >= total_len {
            continue;
        }
        let release = (sample.release() * rate).floor() as usize;
        let sounding = sample.len().min(record.duration as usize + release);
        let end = (start + sounding).min(total_len);
        span = Some(match span {
            Some((lo, hi)) => (lo.min(start), hi.max(end)),
            None => (start, end),
        });
    }

    let Some((offset, end)) = span else {
        debug!(worker, records = records.len(), "Worker has nothing to render");
        return Ok(RenderedChunk::default());
    };
    debug!(
        worker,
        records = records.len(),
        first_sample = offset,
        last_sample = end,
        "Rendering slice"
    );

    let mut chunk = RenderedChunk {
        offset,
        left: vec![0.0; end - offset],
        right: vec![0.0; end - offset],
    };
    let mut chorus = if ctx.chorus.enabled() {
        Some(ChorusProcessor::new(ctx.chorus, ctx.table.sample_rate()))
    } else {
        None
    };

    for record in records.iter() {
        render_note(record, ctx, &mut chorus, &mut chunk, total_len)?;
    }

    Ok(chunk)
}

fn render_note(
    record: &PackedNoteRecord,
    ctx: &RenderContext,
    chorus: &mut Option<ChorusProcessor>,
    chunk: &mut RenderedChunk,
    total_len: usize,
) -> Result<(), RenderError> {
    if record.channel as usize >= CHANNEL_COUNT {
        warn!(channel = record.channel, "Skipping record with out of range channel");
        return Ok(());
    }
    let sample = ctx
        .table
        .get(record.note)
        .ok_or(RenderError::UnknownInstrument(record.note))?;

    let rate = ctx.table.sample_rate() as f64;
    let start = record.onset as usize;
    if start >= total_len {
        return Ok(());
    }
    let stop = start + record.duration as usize;
    let attack = (sample.attack() * rate).floor() as usize;
    let release = (sample.release() * rate).floor() as usize;
    let velocity = sample.velocity().unwrap_or_else(|| record.velocity_f32());
    let base_gain = sample.attenuation() * velocity * velocity;

    let (pcm_l, pcm_r) = (sample.left(), sample.right());
    let block_size = ctx.block_size.max(1);

    'blocks: for block_start in (0..sample.len()).step_by(block_size) {
        let controls = if ctx.enable_cc {
            ctx.controls
                .snapshot(record.channel, (start + block_start) as f64 / rate)
        } else {
            ControlSnapshot::default()
        };
        let volume = controls.volume * controls.expression;
        let block_end = (block_start + block_size).min(sample.len());

        for k in block_start..block_end {
            let index = start + k;
            if index >= stop + release || index >= total_len {
                break 'blocks;
            }
            let (dry_l, dry_r) = (pcm_l[k], pcm_r[k]);
            if dry_l == 0.0 && dry_r == 0.0 {
                continue;
            }

            let a = if index >= start + attack {
                1.0
            } else {
                (index - start) as f32 / attack as f32
            };
            let r = if index >= stop {
                1.0 - (index - stop) as f32 / release as f32
            } else {
                1.0
            };
            let gain = base_gain * r * r * a * a * volume;
            let y_l = dry_l * gain * (1.0 - controls.pan);
            let y_r = dry_r * gain * controls.pan;

            let (out_l, out_r) = match chorus {
                Some(chorus) if controls.chorus_send > 0.0 => {
                    chorus.process(y_l, y_r, controls.chorus_send)
                }
                _ => (y_l, y_r),
            };

            let pos = index - chunk.offset;
            chunk.left[pos] += out_l;
            chunk.right[pos] += out_r;
        }
    }

    Ok(())
}
