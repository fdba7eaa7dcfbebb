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
use serde::Deserialize;

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_BUFFER_SIZE: usize = 256;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Audio {
    /// The audio device. "default" picks the host's default output, names starting with "mock"
    /// pick a mock sink.
    device: String,

    /// Sample rate in Hz. When unset, cpal devices use their default rate and mock sinks use 44100.
    sample_rate: Option<u32>,

    /// Frames rendered per mixing block (default: 256). Smaller blocks lower latency.
    buffer_size: Option<usize>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            sample_rate: None,
            buffer_size: None,
        }
    }

    /// Returns a copy of this configuration with the sample rate set.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Audio {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the configured sample rate, if any.
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Returns the sample rate, falling back to 44100.
    pub fn sample_rate_or_default(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the mixing block size in frames (default: 256).
    pub fn buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE).max(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let audio = Audio::new("mock-device");
        assert_eq!(audio.device(), "mock-device");
        assert_eq!(audio.sample_rate(), None);
        assert_eq!(audio.sample_rate_or_default(), 44100);
        assert_eq!(audio.buffer_size(), 256);
        assert_eq!(audio.with_sample_rate(48000).sample_rate(), Some(48000));
    }
}
