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

use std::f64::consts::TAU;

use crate::config::Chorus;

/// Stereo modulated delay. Each instance owns its ring buffers, so every render worker runs
/// its own chorus.
pub struct ChorusProcessor {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
    /// LFO phase in cycles, 0.0..1.0.
    phase: f64,
    phase_step: f64,
    /// Modulation depth in samples.
    depth: f64,
    mix: f32,
}

impl ChorusProcessor {
    pub fn new(chorus: &Chorus, sample_rate: u32) -> ChorusProcessor {
        let sample_rate = sample_rate.max(1) as f64;
        let depth = chorus.depth() * sample_rate;
        // 50ms, grown when the modulation could reach further back.
        let len = ((0.05 * sample_rate).ceil() as usize).max((2.0 * depth).ceil() as usize + 2);

        ChorusProcessor {
            buffer_l: vec![0.0; len],
            buffer_r: vec![0.0; len],
            write_pos: 0,
            phase: 0.0,
            phase_step: chorus.rate() / sample_rate,
            depth,
            mix: chorus.mix(),
        }
    }

    /// Processes one stereo sample. `send` is the channel's chorus send level and scales the
    /// configured mix.
    pub fn process(&mut self, left: f32, right: f32, send: f32) -> (f32, f32) {
        self.buffer_l[self.write_pos] = left;
        self.buffer_r[self.write_pos] = right;

        let lfo_l = (self.phase * TAU).sin();
        let lfo_r = ((self.phase + 0.25) * TAU).sin();

        let delay_l = self.depth * (1.0 + lfo_l);
        let delay_r = self.depth * (1.0 + lfo_r);

        let delayed_l = read_interpolated(&self.buffer_l, self.write_pos as f64 - delay_l);
        let delayed_r = read_interpolated(&self.buffer_r, self.write_pos as f64 - delay_r);

        let mix = self.mix * send;
        let out_l = left * (1.0 - mix) + delayed_l * mix;
        let out_r = right * (1.0 - mix) + delayed_r * mix;

        self.phase += self.phase_step;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        self.write_pos = (self.write_pos + 1) % self.buffer_l.len();

        (out_l, out_r)
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer_l.len()
    }

    /// Current LFO phase in cycles.
    pub fn phase(&self) -> f64 {
        self.phase
    }
}

/// Linearly interpolated read at a fractional position, wrapped onto the ring.
fn read_interpolated(buffer: &[f32], pos: f64) -> f32 {
    let len = buffer.len();
    let pos = pos.rem_euclid(len as f64);
    let index = pos as usize;
    let frac = (pos - index as f64) as f32;

    let s0 = buffer[index % len];
    let s1 = buffer[(index + 1) % len];

    s0 + (s1 - s0) * frac
}
