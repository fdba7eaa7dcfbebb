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
use crate::audio::{SampleBuffer, SchedulingError, SignalGraph, Sink};
use crate::samples::SampleSlot;

/// A sampled hi-hat. Plays the published sample once per hit, in full.
pub struct HiHat {
    sink: Arc<dyn Sink>,
    sample: SampleSlot,
}

impl HiHat {
    pub fn new(sink: Arc<dyn Sink>, sample: SampleSlot) -> HiHat {
        HiHat { sink, sample }
    }

    pub(crate) fn build(
        &self,
        buffer: Arc<SampleBuffer>,
        time: f64,
    ) -> Result<SignalGraph, SchedulingError> {
        let mut graph = SignalGraph::new(Voice::HiHat.name());
        let source = graph.buffer_source(buffer);
        graph.connect_to_destination(source)?;
        graph.start(source, time)?;
        Ok(graph)
    }
}

impl Synthesizer for HiHat {
    fn voice(&self) -> Voice {
        Voice::HiHat
    }

    /// Hits before the sample is available are skipped.
    fn trigger(&self, time: f64) -> Result<(), SynthError> {
        check_trigger(self.sink.as_ref(), time)?;
        let Some(buffer) = self.sample.get() else {
            debug!(state = %self.sample.state(), time, "Hi-hat sample unavailable, skipping hit");
            return Ok(());
        };
        self.sink.schedule(self.build(buffer, time)?)?;
        debug!(voice = %Voice::HiHat, time, "Voice triggered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::graph::NodeKind;
    use crate::audio::mock;
    use crate::samples::LoadError;

    #[test]
    fn test_pending_sample_is_noop() -> Result<(), SynthError> {
        let sink = Arc::new(mock::Sink::manual("mock", 44100));
        let hihat = HiHat::new(sink.clone(), SampleSlot::new());
        hihat.trigger(0.0)?;
        hihat.trigger(0.25)?;
        assert_eq!(sink.scheduled_count(), 0);
        Ok(())
    }

    #[test]
    fn test_failed_sample_is_noop() -> Result<(), SynthError> {
        let sink = Arc::new(mock::Sink::manual("mock", 44100));
        let slot = SampleSlot::new();
        slot.publish(Err(LoadError::Io(
            "hihat.wav".to_string(),
            std::io::ErrorKind::NotFound.into(),
        )));
        HiHat::new(sink.clone(), slot).trigger(0.0)?;
        assert_eq!(sink.scheduled_count(), 0);
        Ok(())
    }

    #[test]
    fn test_loaded_sample_plays_once() -> Result<(), SynthError> {
        let sink = Arc::new(mock::Sink::manual("mock", 100));
        let slot = SampleSlot::new();
        let hihat = HiHat::new(sink.clone(), slot.clone());

        hihat.trigger(0.5)?;
        slot.publish(Ok(SampleBuffer::new(vec![0.5; 25], 100)));
        hihat.trigger(1.0)?;

        let graphs = sink.scheduled();
        assert_eq!(graphs.len(), 1);
        let graph = &graphs[0];
        assert_eq!(graph.start_time(), Some(1.0));
        assert_eq!(graph.end_time(), Some(1.25));
        let (_, node) = graph.nodes().next().expect("buffer source");
        assert!(matches!(node.kind(), NodeKind::BufferSource { .. }));
        assert_eq!(node.stop_time(), None);
        Ok(())
    }
}
