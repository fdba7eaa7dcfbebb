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

/// Errors raised when a signal graph or one of its automation events is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchedulingError {
    #[error("exponential ramp target must be finite and non-zero, got {0}")]
    InvalidRampTarget(f32),

    #[error("parameter value must be finite, got {0}")]
    InvalidValue(f32),

    #[error("schedule time must be finite and non-negative, got {0}")]
    InvalidTime(f64),

    #[error("node {0} does not exist in this graph")]
    UnknownNode(usize),

    #[error("node {0} has no {1} parameter")]
    NoSuchParam(usize, &'static str),

    #[error("node {0} is not a source node")]
    NotASource(usize),

    #[error("source node {0} was already started")]
    AlreadyStarted(usize),

    #[error("source node {0} was stopped before it was started")]
    NotStarted(usize),

    #[error("source node {0} cannot accept inputs")]
    SourceInput(usize),

    #[error("connecting node {from} to node {to} would create a cycle")]
    Cycle { from: usize, to: usize },

    #[error("graph '{0}' has no started source connected to the destination")]
    Silent(&'static str),

    #[error("graph '{0}' rejected by sink: {1}")]
    Rejected(&'static str, String),

    #[error("audio sink is closed")]
    SinkClosed,
}

/// Errors raised while turning encoded audio bytes into PCM.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unrecognized audio data: {0}")]
    Probe(#[source] symphonia::core::errors::Error),

    #[error("no audio track found")]
    NoTrack,

    #[error("sample rate not specified")]
    UnknownSampleRate,

    #[error("audio decode failed: {0}")]
    Codec(#[from] symphonia::core::errors::Error),

    #[error("audio data contains no samples")]
    Empty,
}
