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

use tracing::info;

use crate::config::Limiter;

/// Sample-accurate gain rider over the finished mix. Gain drops quickly when the average stereo
/// magnitude exceeds the threshold and recovers slowly once it falls back below.
///
/// A single gain value carries across the whole buffer, so this pass is strictly sequential.
#[derive(Clone, Debug)]
pub struct MasterLimiter {
    threshold: f32,
    attack: f32,
    release: f32,
    gain: f32,
}

impl MasterLimiter {
    pub fn new(limiter: &Limiter) -> MasterLimiter {
        MasterLimiter {
            threshold: limiter.threshold(),
            attack: limiter.attack(),
            release: limiter.release(),
            gain: 1.0,
        }
    }

    /// Current gain.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Processes one stereo frame, returning the scaled samples.
    #[inline]
    pub fn process_sample(&mut self, left: f32, right: f32) -> (f32, f32) {
        let magnitude = (left.abs() + right.abs()) / 2.0;
        let target = if magnitude > self.threshold {
            self.threshold / magnitude
        } else {
            1.0
        };

        if target < self.gain {
            self.gain -= (self.gain - target) * self.attack;
        } else {
            self.gain += (target - self.gain) * self.release;
        }

        (left * self.gain, right * self.gain)
    }

    /// Limits both channels in place. The slices must be the same length.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        let mut min_gain = self.gain;
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process_sample(*l, *r);
            min_gain = min_gain.min(self.gain);
        }
        info!(samples = left.len(), min_gain, "Limiter applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_signal_untouched() {
        let mut limiter = MasterLimiter::new(&Limiter::default());
        let mut left = vec![0.1; 1000];
        let mut right = vec![-0.2; 1000];

        limiter.process(&mut left, &mut right);

        assert_eq!(limiter.gain(), 1.0);
        assert!(left.iter().all(|&s| s == 0.1));
        assert!(right.iter().all(|&s| s == -0.2));
    }

    #[test]
    fn test_converges_without_overshoot() {
        let threshold = 0.3;
        let mut limiter = MasterLimiter::new(&Limiter::new(threshold, 0.01, 0.0001));
        let mut left = vec![2.0 * threshold; 5000];
        let mut right = vec![-2.0 * threshold; 5000];

        let mut previous = limiter.gain();
        for (l, r) in left.iter().zip(right.iter()) {
            limiter.process_sample(*l, *r);
            let gain = limiter.gain();
            assert!(gain <= previous);
            assert!(gain >= 0.5);
            previous = gain;
        }
        // (1 - 0.01)^5000 leaves nothing measurable.
        assert!((limiter.gain() - 0.5).abs() < 1e-4);

        let mut limiter = MasterLimiter::new(&Limiter::new(threshold, 0.01, 0.0001));
        limiter.process(&mut left, &mut right);
        assert!((left[4999] - threshold).abs() < 1e-4);
        assert!((right[4999] + threshold).abs() < 1e-4);
    }

    #[test]
    fn test_attack_rate() {
        let mut limiter = MasterLimiter::new(&Limiter::new(0.3, 0.5, 0.0001));

        limiter.process_sample(0.6, 0.6);
        assert!((limiter.gain() - 0.75).abs() < 1e-6);
        limiter.process_sample(0.6, 0.6);
        assert!((limiter.gain() - 0.625).abs() < 1e-6);
    }

    #[test]
    fn test_slow_recovery() {
        let mut limiter = MasterLimiter::new(&Limiter::new(0.3, 1.0, 0.1));
        limiter.process_sample(0.6, 0.6);
        assert!((limiter.gain() - 0.5).abs() < 1e-6);

        limiter.process_sample(0.0, 0.0);
        assert!((limiter.gain() - 0.55).abs() < 1e-6);

        for _ in 0..1000 {
            limiter.process_sample(0.0, 0.0);
        }
        assert!((limiter.gain() - 1.0).abs() < 1e-4);
    }
}
