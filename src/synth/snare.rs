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
use std::sync::Arc;

use tracing::debug;

use super::{check_trigger, noise, SynthError, Synthesizer, Voice};
use crate::audio::{FilterKind, SampleBuffer, SchedulingError, SignalGraph, Sink, Waveform};

/// Cutoff of the high-pass filter that removes the low end of the rattle.
const NOISE_CUTOFF: f32 = 1000.0;
const NOISE_GAIN: f32 = 1.0;
const NOISE_DECAY: f64 = 0.2;
/// Pitch of the snap at the front of the hit.
const SNAP_FREQUENCY: f32 = 100.0;
const SNAP_GAIN: f32 = 0.7;
const SNAP_DECAY: f64 = 0.1;
/// Envelopes decay toward this instead of zero.
const END_GAIN: f32 = 0.01;
/// Both sources stop here.
const LENGTH: f64 = 0.2;

/// A snare drum: a burst of high-passed white noise for the wires plus a short triangle snap.
pub struct Snare {
    sink: Arc<dyn Sink>,
}

impl Snare {
    pub fn new(sink: Arc<dyn Sink>) -> Snare {
        Snare { sink }
    }

    /// One second of fresh white noise at the sink's rate.
    fn noise_buffer(&self) -> Arc<SampleBuffer> {
        let sample_rate = self.sink.sample_rate();
        Arc::new(SampleBuffer::new(
            noise::generate(sample_rate as usize),
            sample_rate,
        ))
    }

    pub(crate) fn build(&self, time: f64) -> Result<SignalGraph, SchedulingError> {
        let mut graph = SignalGraph::new(Voice::Snare.name());

        let noise = graph.buffer_source(self.noise_buffer());
        let filter = graph.biquad(FilterKind::HighPass, NOISE_CUTOFF);
        let noise_envelope = graph.gain(NOISE_GAIN);
        graph.connect(noise, filter)?;
        graph.connect(filter, noise_envelope)?;
        graph.connect_to_destination(noise_envelope)?;

        let snap = graph.oscillator(Waveform::Triangle);
        let snap_envelope = graph.gain(SNAP_GAIN);
        graph.connect(snap, snap_envelope)?;
        graph.connect_to_destination(snap_envelope)?;

        graph
            .gain_param(noise_envelope)?
            .set_value_at_time(NOISE_GAIN, time)?
            .exponential_ramp_to_value_at_time(END_GAIN, time + NOISE_DECAY)?;
        graph.start(noise, time)?;

        graph
            .frequency(snap)?
            .set_value_at_time(SNAP_FREQUENCY, time)?;
        graph
            .gain_param(snap_envelope)?
            .set_value_at_time(SNAP_GAIN, time)?
            .exponential_ramp_to_value_at_time(END_GAIN, time + SNAP_DECAY)?;
        graph.start(snap, time)?;

        graph.stop(snap, time + LENGTH)?;
        graph.stop(noise, time + LENGTH)?;
        Ok(graph)
    }
}

impl Synthesizer for Snare {
    fn voice(&self) -> Voice {
        Voice::Snare
    }

    fn trigger(&self, time: f64) -> Result<(), SynthError> {
        check_trigger(self.sink.as_ref(), time)?;
        self.sink.schedule(self.build(time)?)?;
        debug!(voice = %Voice::Snare, time, "Voice triggered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::graph::{Automation, NodeKind, Output};
    use crate::audio::mock;

    #[test]
    fn test_snare_recipe() -> Result<(), Box<dyn std::error::Error>> {
        let sink = Arc::new(mock::Sink::manual("mock", 8000));
        Snare::new(sink.clone()).trigger(1.0)?;

        let graphs = sink.scheduled();
        assert_eq!(graphs.len(), 1);
        let graph = &graphs[0];
        assert_eq!(graph.label(), "snare");
        assert_eq!(graph.start_time(), Some(1.0));
        assert_eq!(graph.end_time(), Some(1.2));

        let mut sources = 0;
        for (_, node) in graph.nodes() {
            match node.kind() {
                NodeKind::BufferSource { buffer } => {
                    sources += 1;
                    assert_eq!(buffer.len(), 8000);
                    assert_eq!(buffer.sample_rate(), 8000);
                    assert_eq!(node.start_time(), Some(1.0));
                    assert_eq!(node.stop_time(), Some(1.2));
                }
                NodeKind::Oscillator {
                    waveform,
                    frequency,
                } => {
                    sources += 1;
                    assert_eq!(*waveform, Waveform::Triangle);
                    assert_eq!(frequency.value_at(1.05), 100.0);
                    assert_eq!(node.stop_time(), Some(1.2));
                }
                NodeKind::Biquad {
                    filter, frequency, ..
                } => {
                    assert_eq!(*filter, FilterKind::HighPass);
                    assert_eq!(frequency.value_at(1.0), 1000.0);
                }
                NodeKind::Gain { gain } => {
                    let decays_to = gain.events().last().copied();
                    let feeds_destination = node.outputs().contains(&Output::Destination);
                    assert!(feeds_destination);
                    match decays_to {
                        Some(Automation::ExponentialRamp { value, end_time }) => {
                            assert_eq!(value, 0.01);
                            assert!(end_time == 1.2 || end_time == 1.1);
                        }
                        other => panic!("unexpected envelope {other:?}"),
                    }
                }
            }
        }
        assert_eq!(sources, 2);
        Ok(())
    }

    #[test]
    fn test_each_hit_gets_fresh_noise() -> Result<(), SynthError> {
        let sink = Arc::new(mock::Sink::manual("mock", 4000));
        let snare = Snare::new(sink.clone());
        snare.trigger(0.0)?;
        snare.trigger(0.5)?;

        let buffers: Vec<Arc<SampleBuffer>> = sink
            .scheduled()
            .iter()
            .flat_map(|graph| {
                graph
                    .nodes()
                    .filter_map(|(_, node)| match node.kind() {
                        NodeKind::BufferSource { buffer } => Some(buffer.clone()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(buffers.len(), 2);
        assert!(!Arc::ptr_eq(&buffers[0], &buffers[1]));
        assert_ne!(buffers[0].samples(), buffers[1].samples());
        Ok(())
    }
}
