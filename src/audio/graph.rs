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

use super::buffer::SampleBuffer;
use super::error::SchedulingError;

/// Identifies a node within a single signal graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> NodeId {
        NodeId(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// Oscillator waveforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
}

/// Biquad filter responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    HighPass,
    LowPass,
}

/// A single automation event on a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Automation {
    /// Jump to the value at the given time.
    SetValue { value: f32, time: f64 },
    /// Ramp exponentially from the previous event's value, arriving at `value` at `end_time`.
    ExponentialRamp { value: f32, end_time: f64 },
}

impl Automation {
    fn time(&self) -> f64 {
        match *self {
            Automation::SetValue { time, .. } => time,
            Automation::ExponentialRamp { end_time, .. } => end_time,
        }
    }
}

/// A time-varying node parameter driven by automation events on the audio clock.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioParam {
    default: f32,
    events: Vec<Automation>,
}

fn check_time(time: f64) -> Result<(), SchedulingError> {
    if !time.is_finite() || time < 0.0 {
        return Err(SchedulingError::InvalidTime(time));
    }
    Ok(())
}

impl AudioParam {
    fn new(default: f32) -> AudioParam {
        AudioParam {
            default,
            events: Vec::new(),
        }
    }

    /// Sets the parameter to `value` at `time`.
    pub fn set_value_at_time(
        &mut self,
        value: f32,
        time: f64,
    ) -> Result<&mut AudioParam, SchedulingError> {
        if !value.is_finite() {
            return Err(SchedulingError::InvalidValue(value));
        }
        check_time(time)?;
        self.insert(Automation::SetValue { value, time });
        Ok(self)
    }

    /// Ramps the parameter exponentially to `value`, arriving at `end_time`. The target must be
    /// finite and non-zero, so callers decaying "to silence" pass a small positive floor.
    pub fn exponential_ramp_to_value_at_time(
        &mut self,
        value: f32,
        end_time: f64,
    ) -> Result<&mut AudioParam, SchedulingError> {
        if !value.is_finite() || value == 0.0 {
            return Err(SchedulingError::InvalidRampTarget(value));
        }
        check_time(end_time)?;
        self.insert(Automation::ExponentialRamp { value, end_time });
        Ok(self)
    }

    /// Events are kept ordered by time. Events at the same time keep insertion order.
    fn insert(&mut self, event: Automation) {
        let at = self
            .events
            .iter()
            .position(|existing| existing.time() > event.time())
            .unwrap_or(self.events.len());
        self.events.insert(at, event);
    }

    pub fn events(&self) -> &[Automation] {
        &self.events
    }

    /// Computes the parameter value at the given audio clock time.
    pub fn value_at(&self, time: f64) -> f32 {
        let mut previous_time = 0.0;
        let mut previous_value = self.default;

        for event in &self.events {
            match *event {
                Automation::SetValue { value, time: at } => {
                    if time < at {
                        return previous_value;
                    }
                    previous_value = value;
                    previous_time = at;
                }
                Automation::ExponentialRamp { value, end_time } => {
                    if time < end_time {
                        if time < previous_time {
                            return previous_value;
                        }
                        return exponential(previous_value, value, previous_time, end_time, time);
                    }
                    previous_value = value;
                    previous_time = end_time;
                }
            }
        }

        previous_value
    }
}

/// Exponential interpolation between two values. Ramps that cross or touch zero hold the
/// starting value until the end of the ramp.
fn exponential(from: f32, to: f32, start: f64, end: f64, time: f64) -> f32 {
    if from == 0.0 || (from < 0.0) != (to < 0.0) {
        return from;
    }
    let span = end - start;
    if span <= 0.0 {
        return to;
    }
    let progress = (time - start) / span;
    (from as f64 * (to as f64 / from as f64).powf(progress)) as f32
}

/// The kinds of processing nodes a graph may contain.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Oscillator {
        waveform: Waveform,
        frequency: AudioParam,
    },
    BufferSource {
        buffer: Arc<SampleBuffer>,
    },
    Biquad {
        filter: FilterKind,
        frequency: AudioParam,
        q: f32,
    },
    Gain {
        gain: AudioParam,
    },
}

impl NodeKind {
    fn is_source(&self) -> bool {
        matches!(
            self,
            NodeKind::Oscillator { .. } | NodeKind::BufferSource { .. }
        )
    }
}

/// Where a node sends its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Node(NodeId),
    Destination,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    kind: NodeKind,
    start: Option<f64>,
    stop: Option<f64>,
    outputs: Vec<Output>,
}

impl Node {
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start
    }

    pub fn stop_time(&self) -> Option<f64> {
        self.stop
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn is_source(&self) -> bool {
        self.kind.is_source()
    }

    /// The time at which a started source falls silent, if it ever does.
    fn end_time(&self) -> Option<f64> {
        let start = self.start?;
        let natural_end = match &self.kind {
            NodeKind::BufferSource { buffer } => Some(start + buffer.duration()),
            _ => None,
        };
        match (self.stop, natural_end) {
            (Some(stop), Some(end)) => Some(stop.min(end)),
            (Some(stop), None) => Some(stop),
            (None, end) => end,
        }
    }
}

/// The Butterworth Q used by default for biquad filters.
pub const DEFAULT_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// A small directed graph of audio nodes built for a single trigger. Graphs are built on the
/// control side, then handed to a sink which renders them on the audio clock.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalGraph {
    label: &'static str,
    nodes: Vec<Node>,
}

impl SignalGraph {
    /// Creates an empty graph. The label names the graph in logs and errors.
    pub fn new(label: &'static str) -> SignalGraph {
        SignalGraph {
            label,
            nodes: Vec::new(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    fn add(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node {
            kind,
            start: None,
            stop: None,
            outputs: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Adds an oscillator with a default frequency of 440 Hz.
    pub fn oscillator(&mut self, waveform: Waveform) -> NodeId {
        self.add(NodeKind::Oscillator {
            waveform,
            frequency: AudioParam::new(440.0),
        })
    }

    /// Adds a one-shot buffer source.
    pub fn buffer_source(&mut self, buffer: Arc<SampleBuffer>) -> NodeId {
        self.add(NodeKind::BufferSource { buffer })
    }

    /// Adds a biquad filter with the given cutoff.
    pub fn biquad(&mut self, filter: FilterKind, frequency: f32) -> NodeId {
        self.add(NodeKind::Biquad {
            filter,
            frequency: AudioParam::new(frequency),
            q: DEFAULT_Q,
        })
    }

    /// Adds a gain node.
    pub fn gain(&mut self, gain: f32) -> NodeId {
        self.add(NodeKind::Gain {
            gain: AudioParam::new(gain),
        })
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, SchedulingError> {
        self.nodes
            .get_mut(id.0)
            .ok_or(SchedulingError::UnknownNode(id.0))
    }

    /// Iterates over all nodes with their IDs.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeId(index), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the frequency parameter of an oscillator or filter.
    pub fn frequency(&mut self, id: NodeId) -> Result<&mut AudioParam, SchedulingError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Oscillator { frequency, .. } | NodeKind::Biquad { frequency, .. } => {
                Ok(frequency)
            }
            _ => Err(SchedulingError::NoSuchParam(id.0, "frequency")),
        }
    }

    /// Returns the gain parameter of a gain node.
    pub fn gain_param(&mut self, id: NodeId) -> Result<&mut AudioParam, SchedulingError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Gain { gain } => Ok(gain),
            _ => Err(SchedulingError::NoSuchParam(id.0, "gain")),
        }
    }

    /// Connects the output of `from` into the input of `to`.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), SchedulingError> {
        self.node_mut(from)?;
        if self.node_mut(to)?.kind.is_source() {
            return Err(SchedulingError::SourceInput(to.0));
        }
        if from == to || self.reaches(to, from) {
            return Err(SchedulingError::Cycle {
                from: from.0,
                to: to.0,
            });
        }

        let outputs = &mut self.node_mut(from)?.outputs;
        if !outputs.contains(&Output::Node(to)) {
            outputs.push(Output::Node(to));
        }
        Ok(())
    }

    /// Connects the output of a node to the sink's destination.
    pub fn connect_to_destination(&mut self, from: NodeId) -> Result<(), SchedulingError> {
        let outputs = &mut self.node_mut(from)?.outputs;
        if !outputs.contains(&Output::Destination) {
            outputs.push(Output::Destination);
        }
        Ok(())
    }

    /// Returns true if `target` is reachable by following outputs from `from`.
    fn reaches(&self, from: NodeId, target: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![false; self.nodes.len()];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if std::mem::replace(&mut seen[id.0], true) {
                continue;
            }
            for output in &self.nodes[id.0].outputs {
                if let Output::Node(next) = output {
                    stack.push(*next);
                }
            }
        }
        false
    }

    /// Schedules a source node to start at `time`. A source may only be started once.
    pub fn start(&mut self, id: NodeId, time: f64) -> Result<(), SchedulingError> {
        check_time(time)?;
        let node = self.node_mut(id)?;
        if !node.kind.is_source() {
            return Err(SchedulingError::NotASource(id.0));
        }
        if node.start.is_some() {
            return Err(SchedulingError::AlreadyStarted(id.0));
        }
        node.start = Some(time);
        Ok(())
    }

    /// Schedules a started source node to stop at `time`.
    pub fn stop(&mut self, id: NodeId, time: f64) -> Result<(), SchedulingError> {
        check_time(time)?;
        let node = self.node_mut(id)?;
        if !node.kind.is_source() {
            return Err(SchedulingError::NotASource(id.0));
        }
        if node.start.is_none() {
            return Err(SchedulingError::NotStarted(id.0));
        }
        node.stop = Some(time);
        Ok(())
    }

    /// The earliest start time of any source.
    pub fn start_time(&self) -> Option<f64> {
        self.nodes
            .iter()
            .filter_map(|node| node.start)
            .min_by(f64::total_cmp)
    }

    /// The time after which the graph produces only silence. Returns None if a started source
    /// runs forever.
    pub fn end_time(&self) -> Option<f64> {
        let mut end: Option<f64> = None;
        for node in self.nodes.iter().filter(|node| node.start.is_some()) {
            let node_end = node.end_time()?;
            end = Some(end.map_or(node_end, |end| end.max(node_end)));
        }
        end
    }

    /// Returns true if the node's signal eventually reaches the destination.
    fn is_audible(&self, id: NodeId) -> bool {
        let mut stack = vec![id];
        let mut seen = vec![false; self.nodes.len()];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut seen[id.0], true) {
                continue;
            }
            for output in &self.nodes[id.0].outputs {
                match output {
                    Output::Destination => return true,
                    Output::Node(next) => stack.push(*next),
                }
            }
        }
        false
    }

    /// Checks that the graph will produce sound: at least one started source must be routed
    /// to the destination.
    pub fn validate(&self) -> Result<(), SchedulingError> {
        let audible = self
            .nodes()
            .any(|(id, node)| node.start.is_some() && self.is_audible(id));
        if !audible {
            return Err(SchedulingError::Silent(self.label));
        }
        Ok(())
    }
}
