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

use super::{check_trigger, SynthError, Synthesizer, Voice};
use crate::audio::{SchedulingError, SignalGraph, Sink, Waveform};

/// Pitch at the moment the beater hits.
const START_FREQUENCY: f32 = 150.0;
/// Pitch the sweep decays toward.
const END_FREQUENCY: f32 = 0.01;
const START_GAIN: f32 = 1.0;
/// Exponential ramps can't reach zero, so the envelope ends here.
const END_GAIN: f32 = 0.01;
/// Length of the hit in seconds.
const DECAY: f64 = 0.5;

/// A kick drum: a sine wave whose pitch and volume fall away together.
pub struct Kick {
    sink: Arc<dyn Sink>,
}

impl Kick {
    pub fn new(sink: Arc<dyn Sink>) -> Kick {
        Kick { sink }
    }

    /// Builds the graph for a hit at `time`.
    pub(crate) fn build(&self, time: f64) -> Result<SignalGraph, SchedulingError> {
        let mut graph = SignalGraph::new(Voice::Kick.name());
        let osc = graph.oscillator(Waveform::Sine);
        let gain = graph.gain(START_GAIN);
        graph.connect(osc, gain)?;
        graph.connect_to_destination(gain)?;

        graph
            .frequency(osc)?
            .set_value_at_time(START_FREQUENCY, time)?
            .exponential_ramp_to_value_at_time(END_FREQUENCY, time + DECAY)?;
        graph
            .gain_param(gain)?
            .set_value_at_time(START_GAIN, time)?
            .exponential_ramp_to_value_at_time(END_GAIN, time + DECAY)?;

        graph.start(osc, time)?;
        graph.stop(osc, time + DECAY)?;
        Ok(graph)
    }
}

impl Synthesizer for Kick {
    fn voice(&self) -> Voice {
        Voice::Kick
    }

    fn trigger(&self, time: f64) -> Result<(), SynthError> {
        check_trigger(self.sink.as_ref(), time)?;
        self.sink.schedule(self.build(time)?)?;
        debug!(voice = %Voice::Kick, time, "Voice triggered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::graph::{Automation, NodeKind};
    use crate::audio::mock;

    #[test]
    fn test_kick_recipe() -> Result<(), Box<dyn std::error::Error>> {
        let sink = Arc::new(mock::Sink::manual("mock", 44100));
        let kick = Kick::new(sink.clone());
        kick.trigger(2.0)?;

        let graphs = sink.scheduled();
        assert_eq!(graphs.len(), 1);
        let graph = &graphs[0];
        assert_eq!(graph.label(), "kick");
        assert_eq!(graph.start_time(), Some(2.0));
        assert_eq!(graph.end_time(), Some(2.5));

        let mut saw_oscillator = false;
        let mut saw_gain = false;
        for (_, node) in graph.nodes() {
            match node.kind() {
                NodeKind::Oscillator {
                    waveform,
                    frequency,
                } => {
                    saw_oscillator = true;
                    assert_eq!(*waveform, Waveform::Sine);
                    assert_eq!(node.start_time(), Some(2.0));
                    assert_eq!(node.stop_time(), Some(2.5));
                    assert_eq!(
                        frequency.events(),
                        &[
                            Automation::SetValue {
                                value: 150.0,
                                time: 2.0
                            },
                            Automation::ExponentialRamp {
                                value: 0.01,
                                end_time: 2.5
                            },
                        ]
                    );
                }
                NodeKind::Gain { gain } => {
                    saw_gain = true;
                    assert_eq!(
                        gain.events(),
                        &[
                            Automation::SetValue {
                                value: 1.0,
                                time: 2.0
                            },
                            Automation::ExponentialRamp {
                                value: 0.01,
                                end_time: 2.5
                            },
                        ]
                    );
                }
                other => panic!("unexpected node {other:?}"),
            }
        }
        assert!(saw_oscillator && saw_gain);
        Ok(())
    }

    #[test]
    fn test_overlapping_hits_are_independent() -> Result<(), SynthError> {
        let sink = Arc::new(mock::Sink::manual("mock", 44100));
        let kick = Kick::new(sink.clone());
        kick.trigger(1.0)?;
        kick.trigger(1.1)?;

        assert_eq!(
            sink.scheduled_starts(),
            vec![("kick", 1.0), ("kick", 1.1)]
        );
        Ok(())
    }

    #[test]
    fn test_rejected_graph_is_reported() {
        let sink = Arc::new(mock::Sink::manual("mock", 44100));
        sink.reject("kick");
        let kick = Kick::new(sink.clone());
        assert!(matches!(
            kick.trigger(0.0),
            Err(SynthError::Scheduling(SchedulingError::Rejected("kick", _)))
        ));
    }
}
