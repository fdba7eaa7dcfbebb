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
use std::time::Duration;

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::audio::Audio;
use super::error::ConfigError;
use crate::sequencer::{Subdivision, Timing};

const DEFAULT_TEMPO: f64 = 120.0;
const DEFAULT_LOOKAHEAD: Duration = Duration::from_millis(100);
const DEFAULT_SCHEDULE_INTERVAL: Duration = Duration::from_millis(25);
const DEFAULT_START_DELAY: Duration = Duration::from_millis(50);

/// The configuration for the drum machine.
#[derive(Deserialize, Clone, Debug)]
pub struct Machine {
    /// The audio output.
    audio: Audio,

    /// Tempo in beats per minute. Fixed for the lifetime of the machine.
    tempo: Option<f64>,

    /// Steps per bar, 8 or 16.
    #[serde(default)]
    subdivision: Subdivision,

    /// Where to load the hi-hat sample from: an http(s) URL, a file:// URL or a path.
    hihat_sample: Option<String>,

    /// How far ahead of the audio clock steps are scheduled, e.g. "100ms".
    lookahead: Option<String>,

    /// How often the scheduler wakes up, e.g. "25ms".
    schedule_interval: Option<String>,

    /// Delay between play and the first step, e.g. "50ms".
    start_delay: Option<String>,
}

fn parse_duration(
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => Ok(DurationString::from_string(value.clone())
            .map_err(|reason| ConfigError::Duration {
                field,
                value: value.clone(),
                reason: reason.to_string(),
            })?
            .into()),
        None => Ok(default),
    }
}

impl Machine {
    /// Creates a machine configuration with defaults for everything but the audio output.
    pub fn new(audio: Audio) -> Machine {
        Machine {
            audio,
            tempo: None,
            subdivision: Subdivision::default(),
            hihat_sample: None,
            lookahead: None,
            schedule_interval: None,
            start_delay: None,
        }
    }

    /// Parse a machine configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Machine, ConfigError> {
        let machine = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Machine>()?;
        machine.validate()?;
        Ok(machine)
    }

    /// Checks the values serde can't.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing().map(|_| ())
    }

    pub fn with_tempo(mut self, tempo: f64) -> Machine {
        self.tempo = Some(tempo);
        self
    }

    pub fn with_subdivision(mut self, subdivision: Subdivision) -> Machine {
        self.subdivision = subdivision;
        self
    }

    pub fn with_hihat_sample(mut self, hihat_sample: &str) -> Machine {
        self.hihat_sample = Some(hihat_sample.to_string());
        self
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// The tempo in beats per minute (default: 120).
    pub fn tempo(&self) -> f64 {
        self.tempo.unwrap_or(DEFAULT_TEMPO)
    }

    pub fn subdivision(&self) -> Subdivision {
        self.subdivision
    }

    pub fn hihat_sample(&self) -> Option<&str> {
        self.hihat_sample.as_deref()
    }

    /// The scheduling lookahead (default: 100ms).
    pub fn lookahead(&self) -> Result<Duration, ConfigError> {
        parse_duration("lookahead", &self.lookahead, DEFAULT_LOOKAHEAD)
    }

    /// The scheduler wake-up interval (default: 25ms).
    pub fn schedule_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(
            "schedule_interval",
            &self.schedule_interval,
            DEFAULT_SCHEDULE_INTERVAL,
        )
    }

    /// The delay before the first step (default: 50ms).
    pub fn start_delay(&self) -> Result<Duration, ConfigError> {
        parse_duration("start_delay", &self.start_delay, DEFAULT_START_DELAY)
    }

    /// The transport timing described by this configuration.
    pub fn timing(&self) -> Result<Timing, ConfigError> {
        let bpm = self.tempo();
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(ConfigError::Tempo(bpm));
        }
        Ok(Timing {
            bpm,
            lookahead: self.lookahead()?,
            schedule_interval: self.schedule_interval()?,
            start_delay: self.start_delay()?,
        })
    }
}
