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
// Core mixing logic behind the cpal sink, kept free of device code so it can be tested.
use tracing::debug;

use super::graph::SignalGraph;
use super::render::GraphRenderer;

/// Mixes scheduled signal graphs against a running sample clock. The clock starts at zero and
/// advances one sample per rendered frame, so graph times map directly to sample positions.
pub struct AudioMixer {
    /// Graphs that have been scheduled and not yet finished.
    active: Vec<ActiveGraph>,
    /// Number of output channels
    num_channels: u16,
    /// Sample rate
    sample_rate: u32,
    /// The absolute index of the next frame to render.
    current_sample: u64,
    next_id: u64,
}

/// A scheduled graph in the mixer.
struct ActiveGraph {
    id: u64,
    renderer: GraphRenderer,
}

impl AudioMixer {
    /// Creates a new audio mixer
    pub fn new(num_channels: u16, sample_rate: u32) -> Self {
        Self {
            active: Vec::new(),
            num_channels: num_channels.max(1),
            sample_rate,
            current_sample: 0,
            next_id: 0,
        }
    }

    /// Adds a graph to the mixer. Graphs that start before the current sample are moved to
    /// start at the current sample and play from their beginning.
    pub fn add_graph(&mut self, graph: SignalGraph) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let mut renderer = GraphRenderer::new(graph, self.sample_rate);
        if renderer.start_sample() < self.current_sample {
            debug!(
                graph = renderer.label(),
                start_sample = renderer.start_sample(),
                current_sample = self.current_sample,
                "Graph scheduled late, starting it now"
            );
            renderer.delay_to(self.current_sample);
        }
        self.active.push(ActiveGraph { id, renderer });
        id
    }

    /// Processes one frame of audio. The mono mix is copied to every output channel.
    pub fn process_frame(&mut self, frame: &mut [f32]) {
        let sample = self.current_sample;
        let mut mixed = 0.0f32;

        self.active.retain_mut(|graph| {
            if graph.renderer.is_finished(sample) {
                debug!(id = graph.id, graph = graph.renderer.label(), "Graph finished");
                return false;
            }
            mixed += graph.renderer.render(sample);
            true
        });

        frame.fill(mixed.clamp(-1.0, 1.0));
        self.current_sample += 1;
    }

    /// Processes multiple frames of interleaved audio into the given buffer.
    pub fn process_frames(&mut self, buffer: &mut [f32]) {
        let channels = self.num_channels as usize;
        for frame in buffer.chunks_mut(channels) {
            self.process_frame(frame);
        }
    }

    /// Gets the number of output channels
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The absolute index of the next frame to render.
    pub fn current_sample(&self) -> u64 {
        self.current_sample
    }

    /// The number of graphs still playing or waiting to play.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audio::buffer::SampleBuffer;

    fn buffer_graph(samples: Vec<f32>, sample_rate: u32, start: f64) -> SignalGraph {
        let mut graph = SignalGraph::new("test");
        let source = graph.buffer_source(Arc::new(SampleBuffer::new(samples, sample_rate)));
        graph
            .connect_to_destination(source)
            .expect("connect source");
        graph.start(source, start).expect("start source");
        graph
    }

    #[test]
    fn test_basic_mixing() {
        let mut mixer = AudioMixer::new(2, 10);
        mixer.add_graph(buffer_graph(vec![0.5, 0.8], 10, 0.0));

        let mut frames = vec![0.0; 6];
        mixer.process_frames(&mut frames);

        assert_eq!(frames, vec![0.5, 0.5, 0.8, 0.8, 0.0, 0.0]);
        assert_eq!(mixer.current_sample(), 3);
        assert_eq!(mixer.active_count(), 0);
    }

    #[test]
    fn test_multiple_graph_mixing() {
        let mut mixer = AudioMixer::new(1, 10);
        mixer.add_graph(buffer_graph(vec![0.5, 0.25], 10, 0.0));
        mixer.add_graph(buffer_graph(vec![0.125, 0.0625], 10, 0.1));

        let mut frames = vec![0.0; 4];
        mixer.process_frames(&mut frames);

        assert_eq!(frames, vec![0.5, 0.375, 0.0625, 0.0]);
    }

    #[test]
    fn test_graph_waits_for_start() {
        let mut mixer = AudioMixer::new(1, 100);
        mixer.add_graph(buffer_graph(vec![1.0; 5], 100, 0.5));

        let mut frames = vec![0.0; 50];
        mixer.process_frames(&mut frames);
        assert!(frames.iter().all(|sample| *sample == 0.0));
        assert_eq!(mixer.active_count(), 1);

        let mut frame = [0.0];
        mixer.process_frame(&mut frame);
        assert_eq!(frame[0], 1.0);
    }

    #[test]
    fn test_output_is_clamped() {
        let mut mixer = AudioMixer::new(1, 10);
        mixer.add_graph(buffer_graph(vec![0.9], 10, 0.0));
        mixer.add_graph(buffer_graph(vec![0.9], 10, 0.0));

        let mut frame = [0.0];
        mixer.process_frame(&mut frame);
        assert_eq!(frame[0], 1.0);
    }

    #[test]
    fn test_late_graph_plays_from_its_beginning() {
        let mut mixer = AudioMixer::new(1, 100);
        let mut frames = vec![0.0; 10];
        mixer.process_frames(&mut frames);

        let samples: Vec<f32> = (1..=20).map(|n| n as f32 / 100.0).collect();
        mixer.add_graph(buffer_graph(samples.clone(), 100, 0.0));

        let mut frames = vec![0.0; 25];
        mixer.process_frames(&mut frames);
        assert_eq!(frames[0], samples[0]);
        assert_eq!(&frames[..20], &samples[..]);
        assert!(frames[20..].iter().all(|sample| *sample == 0.0));
        assert_eq!(mixer.active_count(), 0);
    }

    #[test]
    fn test_on_time_graph_is_not_moved() {
        let mut mixer = AudioMixer::new(1, 100);
        let mut frames = vec![0.0; 10];
        mixer.process_frames(&mut frames);
        mixer.add_graph(buffer_graph(vec![0.5, 0.25], 100, 0.12));

        let mut frames = vec![0.0; 5];
        mixer.process_frames(&mut frames);
        assert_eq!(frames, vec![0.0, 0.0, 0.5, 0.25, 0.0]);
    }
}
