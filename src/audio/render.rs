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

use super::filter::Biquad;
use super::graph::{NodeId, NodeKind, Output, SignalGraph, Waveform};

/// Per node render state.
enum NodeState {
    Oscillator { phase: f64 },
    BufferSource,
    Biquad(Biquad),
    Gain,
}

/// Renders a signal graph sample by sample against an absolute sample clock.
pub struct GraphRenderer {
    graph: SignalGraph,
    sample_rate: f64,
    /// Topological order of node indices.
    order: Vec<usize>,
    /// Input node indices for each node.
    inputs: Vec<Vec<usize>>,
    /// Nodes feeding the destination.
    destination: Vec<usize>,
    states: Vec<NodeState>,
    /// Start and stop sample for each source node.
    windows: Vec<Option<(u64, u64)>>,
    values: Vec<f32>,
    start_sample: u64,
    end_sample: u64,
    /// Samples the whole graph has been moved later by.
    offset: u64,
}

fn to_samples(time: f64, sample_rate: f64) -> u64 {
    (time * sample_rate).round().max(0.0) as u64
}

impl GraphRenderer {
    /// Prepares a graph for rendering at the given sample rate.
    pub fn new(graph: SignalGraph, sample_rate: u32) -> GraphRenderer {
        let rate = sample_rate as f64;
        let count = graph.len();
        let mut inputs = vec![Vec::new(); count];
        let mut destination = Vec::new();
        let mut states = Vec::with_capacity(count);
        let mut windows = Vec::with_capacity(count);

        for (id, node) in graph.nodes() {
            for output in node.outputs() {
                match output {
                    Output::Node(to) => inputs[to.index()].push(id.index()),
                    Output::Destination => destination.push(id.index()),
                }
            }

            states.push(match node.kind() {
                NodeKind::Oscillator { .. } => NodeState::Oscillator { phase: 0.0 },
                NodeKind::BufferSource { .. } => NodeState::BufferSource,
                NodeKind::Biquad {
                    filter,
                    frequency,
                    q,
                } => NodeState::Biquad(Biquad::new(
                    *filter,
                    sample_rate,
                    frequency.value_at(0.0),
                    *q,
                )),
                NodeKind::Gain { .. } => NodeState::Gain,
            });

            windows.push(node.start_time().map(|start| {
                let stop = match (node.stop_time(), node.kind()) {
                    (Some(stop), _) => to_samples(stop, rate),
                    (None, NodeKind::BufferSource { buffer }) => {
                        to_samples(start, rate) + buffer.len() as u64
                    }
                    (None, _) => u64::MAX,
                };
                (to_samples(start, rate), stop)
            }));
        }

        let order = topological_order(&inputs);
        let start_sample = graph
            .start_time()
            .map(|start| to_samples(start, rate))
            .unwrap_or(0);
        let end_sample = graph
            .end_time()
            .map(|end| to_samples(end, rate))
            .unwrap_or(u64::MAX);

        GraphRenderer {
            graph,
            sample_rate: rate,
            order,
            inputs,
            destination,
            states,
            windows,
            values: vec![0.0; count],
            start_sample,
            end_sample,
            offset: 0,
        }
    }

    /// Moves a graph that starts before `sample` so that it starts at `sample` instead. Source
    /// windows and automation move with it, so the graph still plays from its beginning.
    pub fn delay_to(&mut self, sample: u64) {
        if self.start_sample >= sample {
            return;
        }
        let shift = sample - self.start_sample;
        self.offset += shift;
        self.start_sample = sample;
        self.end_sample = self.end_sample.saturating_add(shift);
        for (start, stop) in self.windows.iter_mut().flatten() {
            *start += shift;
            *stop = stop.saturating_add(shift);
        }
    }

    pub fn label(&self) -> &'static str {
        self.graph.label()
    }

    /// The first sample at which the graph makes sound.
    pub fn start_sample(&self) -> u64 {
        self.start_sample
    }

    /// Returns true once the graph will produce nothing but silence.
    pub fn is_finished(&self, sample: u64) -> bool {
        sample >= self.end_sample
    }

    /// Renders the destination output for a single absolute sample index.
    pub fn render(&mut self, sample: u64) -> f32 {
        if sample < self.start_sample || sample >= self.end_sample {
            return 0.0;
        }
        let time = (sample - self.offset) as f64 / self.sample_rate;

        for &index in &self.order {
            let input: f32 = self.inputs[index]
                .iter()
                .map(|&from| self.values[from])
                .sum();
            let Some(node) = self.graph.node(NodeId::from_index(index)) else {
                continue;
            };
            let active = self.windows[index]
                .map(|(start, stop)| sample >= start && sample < stop)
                .unwrap_or(false);

            let value = match (node.kind(), &mut self.states[index]) {
                (
                    NodeKind::Oscillator {
                        waveform,
                        frequency,
                    },
                    NodeState::Oscillator { phase },
                ) => {
                    if active {
                        let value = oscillate(*waveform, *phase);
                        *phase = (*phase + frequency.value_at(time) as f64 / self.sample_rate)
                            .rem_euclid(1.0);
                        value
                    } else {
                        0.0
                    }
                }
                (NodeKind::BufferSource { buffer }, NodeState::BufferSource) => {
                    match self.windows[index] {
                        Some((start, _)) if active => buffer
                            .samples()
                            .get((sample - start) as usize)
                            .copied()
                            .unwrap_or(0.0),
                        _ => 0.0,
                    }
                }
                (NodeKind::Biquad { frequency, .. }, NodeState::Biquad(biquad)) => {
                    biquad.set_cutoff(frequency.value_at(time));
                    biquad.process(input)
                }
                (NodeKind::Gain { gain }, NodeState::Gain) => input * gain.value_at(time),
                _ => 0.0,
            };
            self.values[index] = value;
        }

        self.destination
            .iter()
            .map(|&index| self.values[index])
            .sum()
    }
}

fn oscillate(waveform: Waveform, phase: f64) -> f32 {
    match waveform {
        Waveform::Sine => (phase * TAU).sin() as f32,
        // Starts at zero and rises, peaking a quarter cycle in.
        Waveform::Triangle => {
            let shifted = (phase + 0.25).rem_euclid(1.0);
            (1.0 - 4.0 * (shifted - 0.5).abs()) as f32
        }
    }
}

/// Orders nodes so every node comes after all of its inputs. Graphs are acyclic by
/// construction, so every node is emitted.
fn topological_order(inputs: &[Vec<usize>]) -> Vec<usize> {
    let mut order = Vec::with_capacity(inputs.len());
    let mut visited = vec![false; inputs.len()];

    fn visit(index: usize, inputs: &[Vec<usize>], visited: &mut [bool], order: &mut Vec<usize>) {
        if visited[index] {
            return;
        }
        visited[index] = true;
        for &input in &inputs[index] {
            visit(input, inputs, visited, order);
        }
        order.push(index);
    }

    for index in 0..inputs.len() {
        visit(index, inputs, &mut visited, &mut order);
    }
    order
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audio::buffer::SampleBuffer;
    use crate::audio::error::SchedulingError;
    use crate::audio::graph::FilterKind;

    #[test]
    fn test_oscillator_window() -> Result<(), SchedulingError> {
        let mut graph = SignalGraph::new("test");
        let osc = graph.oscillator(Waveform::Sine);
        graph.frequency(osc)?.set_value_at_time(1000.0, 0.0)?;
        graph.connect_to_destination(osc)?;
        graph.start(osc, 0.01)?;
        graph.stop(osc, 0.02)?;

        let mut renderer = GraphRenderer::new(graph, 1000);
        assert_eq!(renderer.start_sample(), 10);
        assert_eq!(renderer.render(9), 0.0);
        assert!(!renderer.is_finished(19));
        assert!(renderer.is_finished(20));
        assert_eq!(renderer.render(20), 0.0);
        Ok(())
    }

    #[test]
    fn test_gain_envelope_applies() -> Result<(), SchedulingError> {
        let mut graph = SignalGraph::new("test");
        let buffer = Arc::new(SampleBuffer::new(vec![1.0; 100], 100));
        let source = graph.buffer_source(buffer);
        let gain = graph.gain(1.0);
        graph.connect(source, gain)?;
        graph.connect_to_destination(gain)?;
        graph
            .gain_param(gain)?
            .set_value_at_time(1.0, 0.0)?
            .exponential_ramp_to_value_at_time(0.01, 1.0)?;
        graph.start(source, 0.0)?;

        let mut renderer = GraphRenderer::new(graph, 100);
        let samples: Vec<f32> = (0..100).map(|n| renderer.render(n)).collect();
        assert_eq!(samples[0], 1.0);
        assert!(samples.windows(2).all(|pair| pair[1] < pair[0]));
        assert!(samples[99] < 0.06);
        assert!(renderer.is_finished(100));
        Ok(())
    }

    #[test]
    fn test_chain_order() -> Result<(), SchedulingError> {
        let mut graph = SignalGraph::new("test");
        let gain = graph.gain(0.5);
        let filter = graph.biquad(FilterKind::LowPass, 20000.0);
        let buffer = Arc::new(SampleBuffer::new(vec![1.0; 10], 10));
        let source = graph.buffer_source(buffer);
        graph.connect(filter, gain)?;
        graph.connect(source, filter)?;
        graph.connect_to_destination(gain)?;
        graph.start(source, 0.0)?;

        let renderer = GraphRenderer::new(graph, 10);
        assert_eq!(renderer.order, vec![2, 1, 0]);
        Ok(())
    }

    #[test]
    fn test_triangle_range() {
        for step in 0..100 {
            let value = oscillate(Waveform::Triangle, step as f64 / 100.0);
            assert!((-1.0..=1.0).contains(&value));
        }
        assert_eq!(oscillate(Waveform::Triangle, 0.0), 0.0);
        assert_eq!(oscillate(Waveform::Triangle, 0.25), 1.0);
        assert_eq!(oscillate(Waveform::Triangle, 0.5), 0.0);
        assert_eq!(oscillate(Waveform::Triangle, 0.75), -1.0);
        assert!(oscillate(Waveform::Triangle, 0.01) > 0.0);
    }

    #[test]
    fn test_delay_moves_sources_and_automation() -> Result<(), SchedulingError> {
        let mut graph = SignalGraph::new("test");
        let buffer = Arc::new(SampleBuffer::new(vec![1.0; 10], 100));
        let source = graph.buffer_source(buffer);
        let gain = graph.gain(1.0);
        graph.connect(source, gain)?;
        graph.connect_to_destination(gain)?;
        graph
            .gain_param(gain)?
            .set_value_at_time(0.5, 0.0)?
            .set_value_at_time(0.25, 0.05)?;
        graph.start(source, 0.0)?;

        let mut renderer = GraphRenderer::new(graph, 100);
        renderer.delay_to(20);
        assert_eq!(renderer.start_sample(), 20);
        assert_eq!(renderer.render(19), 0.0);
        assert_eq!(renderer.render(20), 0.5);
        assert_eq!(renderer.render(25), 0.25);
        assert!(!renderer.is_finished(29));
        assert!(renderer.is_finished(30));

        // Never moves a graph earlier.
        renderer.delay_to(10);
        assert_eq!(renderer.start_sample(), 20);
        Ok(())
    }
}
