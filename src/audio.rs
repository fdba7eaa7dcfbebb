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
use std::{error::Error, fmt, sync::Arc};

use crate::config;

pub mod buffer;
pub mod cpal;
pub mod decode;
mod error;
mod filter;
pub mod graph;
pub mod mixer;
pub mod mock;
mod render;
mod thread_priority;

pub use buffer::SampleBuffer;
pub use error::{DecodeError, SchedulingError};
pub use graph::{FilterKind, NodeId, SignalGraph, Waveform};

/// An audio output with its own monotonic clock. Graphs are handed to the sink with absolute
/// start times on that clock and rendered sample-accurately, independent of the thread that
/// scheduled them.
pub trait Sink: fmt::Display + Send + Sync {
    /// The current time of the audio clock in seconds.
    fn now(&self) -> f64;

    /// The sample rate the sink renders at.
    fn sample_rate(&self) -> u32;

    /// Returns true once the sink can accept graphs.
    fn is_ready(&self) -> bool;

    /// How far ahead of `now` the sink may already have rendered, in seconds. A graph starting
    /// sooner than `now() + latency()` can start late.
    fn latency(&self) -> f64;

    /// Schedules a graph for rendering. Graphs starting in the past are moved to start as soon
    /// as possible and still play from their beginning.
    fn schedule(&self, graph: SignalGraph) -> Result<(), SchedulingError>;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Sink>, Box<dyn Error>>;
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::DeviceInfo>, Box<dyn Error>> {
    cpal::list()
}

/// Gets a sink for the configured device.
pub fn get_sink(config: &config::Audio) -> Result<Arc<dyn Sink>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Sink::get(
            device,
            config.sample_rate_or_default(),
        )));
    };

    Ok(Arc::new(cpal::Sink::get(config)?))
}
