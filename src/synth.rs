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
use std::{fmt, str::FromStr, sync::Arc};

use crate::audio::{SchedulingError, Sink};
use crate::samples::SampleSlot;

mod hihat;
mod kick;
pub mod noise;
mod snare;

pub use hihat::HiHat;
pub use kick::Kick;
pub use snare::Snare;

/// The percussion voices of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Voice {
    Kick,
    Snare,
    HiHat,
}

impl Voice {
    /// All voices in display and trigger order.
    pub const ALL: [Voice; 3] = [Voice::Kick, Voice::Snare, Voice::HiHat];

    /// The position of the voice in `ALL`.
    pub fn index(&self) -> usize {
        match self {
            Voice::Kick => 0,
            Voice::Snare => 1,
            Voice::HiHat => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Voice::Kick => "kick",
            Voice::Snare => "snare",
            Voice::HiHat => "hihat",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown voice '{0}', expected kick, snare or hihat")]
pub struct UnknownVoice(pub String);

impl FromStr for Voice {
    type Err = UnknownVoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kick" | "bd" => Ok(Voice::Kick),
            "snare" | "sd" => Ok(Voice::Snare),
            "hihat" | "hi-hat" | "hh" | "hat" => Ok(Voice::HiHat),
            _ => Err(UnknownVoice(s.to_string())),
        }
    }
}

/// Errors raised by a trigger.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SynthError {
    /// The sink isn't running yet.
    #[error("audio sink is not ready")]
    NotReady,

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error("trigger time must be finite and non-negative, got {0}")]
    InvalidTime(f64),
}

/// A voice synthesizer. Each trigger builds a fresh signal graph and hands it to the sink;
/// overlapping triggers are independent of each other.
pub trait Synthesizer: Send + Sync {
    /// The voice this synthesizer plays.
    fn voice(&self) -> Voice;

    /// Schedules one hit at the given audio clock time. Never blocks.
    fn trigger(&self, time: f64) -> Result<(), SynthError>;
}

/// Checks the preconditions shared by every voice.
fn check_trigger(sink: &dyn Sink, time: f64) -> Result<(), SynthError> {
    if !sink.is_ready() {
        return Err(SynthError::NotReady);
    }
    if !time.is_finite() || time < 0.0 {
        return Err(SynthError::InvalidTime(time));
    }
    Ok(())
}

/// The three synthesizers of the machine, one per voice, alive for the machine's lifetime.
pub struct Kit {
    kick: Kick,
    snare: Snare,
    hihat: HiHat,
}

impl Kit {
    /// Creates the kit. The hi-hat plays whatever gets published into the slot.
    pub fn new(sink: Arc<dyn Sink>, hihat_sample: SampleSlot) -> Kit {
        Kit {
            kick: Kick::new(sink.clone()),
            snare: Snare::new(sink.clone()),
            hihat: HiHat::new(sink, hihat_sample),
        }
    }

    /// Returns the synthesizer for the voice.
    pub fn get(&self, voice: Voice) -> &dyn Synthesizer {
        match voice {
            Voice::Kick => &self.kick,
            Voice::Snare => &self.snare,
            Voice::HiHat => &self.hihat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock;

    #[test]
    fn test_voice_parsing() {
        assert_eq!("kick".parse::<Voice>(), Ok(Voice::Kick));
        assert_eq!("BD".parse::<Voice>(), Ok(Voice::Kick));
        assert_eq!(" sd ".parse::<Voice>(), Ok(Voice::Snare));
        assert_eq!("hat".parse::<Voice>(), Ok(Voice::HiHat));
        assert_eq!(
            "cowbell".parse::<Voice>(),
            Err(UnknownVoice("cowbell".to_string()))
        );
        for voice in Voice::ALL {
            assert_eq!(voice.to_string().parse::<Voice>(), Ok(voice));
            assert_eq!(Voice::ALL[voice.index()], voice);
        }
    }

    #[test]
    fn test_kit_routes_voices() {
        let sink = Arc::new(mock::Sink::manual("mock", 44100));
        let kit = Kit::new(sink, SampleSlot::new());
        for voice in Voice::ALL {
            assert_eq!(kit.get(voice).voice(), voice);
        }
    }

    #[test]
    fn test_trigger_requires_ready_sink() {
        let sink = Arc::new(mock::Sink::manual("mock", 44100));
        sink.set_ready(false);
        let kit = Kit::new(sink.clone(), SampleSlot::new());

        assert_eq!(kit.get(Voice::Kick).trigger(0.0), Err(SynthError::NotReady));
        assert_eq!(kit.get(Voice::Snare).trigger(0.0), Err(SynthError::NotReady));
        assert_eq!(sink.scheduled_count(), 0);

        sink.set_ready(true);
        assert_eq!(
            kit.get(Voice::Kick).trigger(-1.0),
            Err(SynthError::InvalidTime(-1.0))
        );
    }
}
