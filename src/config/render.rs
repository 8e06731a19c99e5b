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
use std::path::Path;

use config::{Config, File};
use serde::Deserialize;

use super::error::ConfigError;

const DEFAULT_THREAD_COUNT: usize = 8;
const DEFAULT_SAMPLE_RATE: u32 = 48000;
const DEFAULT_AUDIO_BUFFER_SIZE: usize = 512;

const DEFAULT_CHORUS_RATE: f64 = 0.8;
const DEFAULT_CHORUS_DEPTH: f64 = 0.006;
const DEFAULT_CHORUS_MIX: f32 = 0.5;

const DEFAULT_LIMITER_THRESHOLD: f32 = 0.3;
const DEFAULT_LIMITER_ATTACK: f32 = 0.01;
const DEFAULT_LIMITER_RELEASE: f32 = 0.0001;

const DEFAULT_ENVELOPE_ATTACK: f64 = 0.0;
const DEFAULT_ENVELOPE_RELEASE: f64 = 0.25;

/// A YAML representation of the render configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct RenderOptions {
    /// Number of render workers (default: 8).
    thread_count: Option<usize>,

    /// Output sample rate in Hz (default: 48000).
    sample_rate: Option<u32>,

    /// Whether control change events shape the rendered audio (default: true).
    enable_cc: Option<bool>,

    /// Maximum number of held onsets per channel/note key. Zero means unlimited.
    polyphony_limit: Option<usize>,

    /// Number of samples between control value refreshes (default: 512).
    audio_buffer_size: Option<usize>,

    /// Chorus effect settings.
    chorus: Option<Chorus>,

    /// Master limiter settings.
    limiter: Option<Limiter>,

    /// Note envelope settings.
    envelope: Option<Envelope>,

    /// The preset used for the whole render.
    preset: Option<Preset>,
}

impl RenderOptions {
    /// Parse render options from a config file. The format is inferred from the extension.
    pub fn from_file(path: &Path) -> Result<RenderOptions, ConfigError> {
        let options = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<RenderOptions>()?;
        options.validate()?;
        Ok(options)
    }

    /// Checks that every configured value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let chorus = self.chorus();
        if !(0.0..=1.0).contains(&chorus.mix()) {
            return Err(ConfigError::InvalidValue {
                field: "chorus.mix",
                reason: format!("{} is outside 0.0..=1.0", chorus.mix()),
            });
        }
        if chorus.depth() < 0.0 || !chorus.depth().is_finite() {
            return Err(ConfigError::InvalidValue {
                field: "chorus.depth",
                reason: format!("{} must be a non-negative number of seconds", chorus.depth()),
            });
        }
        if chorus.rate() < 0.0 || !chorus.rate().is_finite() {
            return Err(ConfigError::InvalidValue {
                field: "chorus.rate",
                reason: format!("{} must be a non-negative frequency", chorus.rate()),
            });
        }

        let limiter = self.limiter();
        for (field, value) in [
            ("limiter.attack", limiter.attack()),
            ("limiter.release", limiter.release()),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("{} is outside 0.0..=1.0", value),
                });
            }
        }
        if limiter.threshold() <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "limiter.threshold",
                reason: format!("{} must be positive", limiter.threshold()),
            });
        }

        let envelope = self.envelope();
        if envelope.attack() < 0.0 || envelope.release() < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "envelope",
                reason: "attack and release must not be negative".to_string(),
            });
        }

        Ok(())
    }

    /// Returns the number of render workers (default: 8, minimum 1).
    pub fn thread_count(&self) -> usize {
        self.thread_count.unwrap_or(DEFAULT_THREAD_COUNT).max(1)
    }

    /// Returns the output sample rate (default: 48000).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE).max(1)
    }

    /// Returns whether control changes are honored (default: true).
    pub fn enable_cc(&self) -> bool {
        self.enable_cc.unwrap_or(true)
    }

    /// Returns the polyphony limit per channel/note key (default: 0, unlimited).
    pub fn polyphony_limit(&self) -> usize {
        self.polyphony_limit.unwrap_or(0)
    }

    /// Returns the control refresh block size (default: 512, minimum 1).
    pub fn audio_buffer_size(&self) -> usize {
        self.audio_buffer_size
            .unwrap_or(DEFAULT_AUDIO_BUFFER_SIZE)
            .max(1)
    }

    pub fn chorus(&self) -> Chorus {
        self.chorus.clone().unwrap_or_default()
    }

    pub fn limiter(&self) -> Limiter {
        self.limiter.clone().unwrap_or_default()
    }

    pub fn envelope(&self) -> Envelope {
        self.envelope.clone().unwrap_or_default()
    }

    pub fn preset(&self) -> Preset {
        self.preset.clone().unwrap_or_default()
    }

    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = Some(thread_count);
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_enable_cc(mut self, enable_cc: bool) -> Self {
        self.enable_cc = Some(enable_cc);
        self
    }

    pub fn with_polyphony_limit(mut self, polyphony_limit: usize) -> Self {
        self.polyphony_limit = Some(polyphony_limit);
        self
    }

    pub fn with_audio_buffer_size(mut self, audio_buffer_size: usize) -> Self {
        self.audio_buffer_size = Some(audio_buffer_size);
        self
    }

    pub fn with_chorus(mut self, chorus: Chorus) -> Self {
        self.chorus = Some(chorus);
        self
    }

    pub fn with_limiter(mut self, limiter: Limiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = Some(envelope);
        self
    }

    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = Some(preset);
        self
    }
}

/// Chorus effect settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Chorus {
    enabled: Option<bool>,
    /// LFO rate in Hz.
    rate: Option<f64>,
    /// Modulation depth in seconds.
    depth: Option<f64>,
    /// Wet/dry ratio, from 0.0 (dry only) to 1.0 (wet only).
    mix: Option<f32>,
}

impl Chorus {
    pub fn new(enabled: bool, rate: f64, depth: f64, mix: f32) -> Chorus {
        Chorus {
            enabled: Some(enabled),
            rate: Some(rate),
            depth: Some(depth),
            mix: Some(mix),
        }
    }

    /// A chorus that never processes any samples.
    pub fn disabled() -> Chorus {
        Chorus {
            enabled: Some(false),
            ..Default::default()
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn rate(&self) -> f64 {
        self.rate.unwrap_or(DEFAULT_CHORUS_RATE)
    }

    pub fn depth(&self) -> f64 {
        self.depth.unwrap_or(DEFAULT_CHORUS_DEPTH)
    }

    pub fn mix(&self) -> f32 {
        self.mix.unwrap_or(DEFAULT_CHORUS_MIX)
    }
}

/// Master limiter settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Limiter {
    /// Average stereo magnitude above which gain is reduced.
    threshold: Option<f32>,
    /// Per-sample smoothing factor used when gain decreases.
    attack: Option<f32>,
    /// Per-sample smoothing factor used when gain recovers.
    release: Option<f32>,
}

impl Limiter {
    pub fn new(threshold: f32, attack: f32, release: f32) -> Limiter {
        Limiter {
            threshold: Some(threshold),
            attack: Some(attack),
            release: Some(release),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold.unwrap_or(DEFAULT_LIMITER_THRESHOLD)
    }

    pub fn attack(&self) -> f32 {
        self.attack.unwrap_or(DEFAULT_LIMITER_ATTACK)
    }

    pub fn release(&self) -> f32 {
        self.release.unwrap_or(DEFAULT_LIMITER_RELEASE)
    }
}

/// Note envelope settings shared by every note in the instrument table.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Envelope {
    /// Attack time in seconds.
    attack: Option<f64>,
    /// Release time in seconds.
    release: Option<f64>,
    /// Use each zone's attack and release generators instead of the fixed times.
    from_bank: Option<bool>,
}

impl Envelope {
    pub fn new(attack: f64, release: f64) -> Envelope {
        Envelope {
            attack: Some(attack),
            release: Some(release),
            from_bank: Some(false),
        }
    }

    /// An envelope that takes its times from the instrument bank.
    pub fn from_bank() -> Envelope {
        Envelope {
            from_bank: Some(true),
            ..Default::default()
        }
    }

    pub fn attack(&self) -> f64 {
        self.attack.unwrap_or(DEFAULT_ENVELOPE_ATTACK)
    }

    pub fn release(&self) -> f64 {
        self.release.unwrap_or(DEFAULT_ENVELOPE_RELEASE)
    }

    pub fn uses_bank(&self) -> bool {
        self.from_bank.unwrap_or(false)
    }
}

/// Selects the bank preset used for every note.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Preset {
    bank: Option<u16>,
    program: Option<u16>,
}

impl Preset {
    pub fn new(bank: u16, program: u16) -> Preset {
        Preset {
            bank: Some(bank),
            program: Some(program),
        }
    }

    pub fn bank(&self) -> u16 {
        self.bank.unwrap_or(0)
    }

    pub fn program(&self) -> u16 {
        self.program.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> RenderOptions {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let options = RenderOptions::default();

        assert_eq!(options.thread_count(), 8);
        assert_eq!(options.sample_rate(), 48000);
        assert!(options.enable_cc());
        assert_eq!(options.polyphony_limit(), 0);
        assert_eq!(options.audio_buffer_size(), 512);

        let chorus = options.chorus();
        assert!(chorus.enabled());
        assert_eq!(chorus.rate(), 0.8);
        assert_eq!(chorus.depth(), 0.006);
        assert_eq!(chorus.mix(), 0.5);

        let limiter = options.limiter();
        assert_eq!(limiter.threshold(), 0.3);
        assert_eq!(limiter.attack(), 0.01);
        assert_eq!(limiter.release(), 0.0001);

        let envelope = options.envelope();
        assert_eq!(envelope.attack(), 0.0);
        assert_eq!(envelope.release(), 0.25);
        assert!(!envelope.uses_bank());

        assert_eq!(options.preset().bank(), 0);
        assert_eq!(options.preset().program(), 0);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial() {
        let options = parse(
            r#"
            thread_count: 4
            sample_rate: 44100
            enable_cc: false
            polyphony_limit: 2
            chorus:
              enabled: false
              mix: 0.25
            envelope:
              from_bank: true
            preset:
              program: 19
        "#,
        );

        assert_eq!(options.thread_count(), 4);
        assert_eq!(options.sample_rate(), 44100);
        assert!(!options.enable_cc());
        assert_eq!(options.polyphony_limit(), 2);
        assert_eq!(options.audio_buffer_size(), 512);
        assert!(!options.chorus().enabled());
        assert_eq!(options.chorus().mix(), 0.25);
        assert_eq!(options.chorus().rate(), 0.8);
        assert!(options.envelope().uses_bank());
        assert_eq!(options.preset().bank(), 0);
        assert_eq!(options.preset().program(), 19);
    }

    #[test]
    fn test_zero_counts_are_clamped() {
        let options = RenderOptions::default()
            .with_thread_count(0)
            .with_audio_buffer_size(0)
            .with_sample_rate(0);

        assert_eq!(options.thread_count(), 1);
        assert_eq!(options.audio_buffer_size(), 1);
        assert_eq!(options.sample_rate(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_mix() {
        let options = parse(
            r#"
            chorus:
              mix: 1.5
        "#,
        );

        match options.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "chorus.mix"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_negative_envelope() {
        let options = RenderOptions::default().with_envelope(Envelope::new(-0.1, 0.2));
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "thread_count: 2\nlimiter:\n  threshold: 0.5").unwrap();

        let options = RenderOptions::from_file(file.path()).unwrap();
        assert_eq!(options.thread_count(), 2);
        assert_eq!(options.limiter().threshold(), 0.5);
        assert_eq!(options.limiter().attack(), 0.01);
    }

    #[test]
    fn test_from_file_missing() {
        let result = RenderOptions::from_file(Path::new("/nonexistent/sfrender.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
