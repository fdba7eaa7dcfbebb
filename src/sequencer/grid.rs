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
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::synth::{UnknownVoice, Voice};

/// A set of voices, iterated in the fixed order kick, snare, hi-hat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VoiceSet(u8);

impl VoiceSet {
    pub fn new() -> VoiceSet {
        VoiceSet(0)
    }

    fn bit(voice: Voice) -> u8 {
        1 << voice.index()
    }

    pub fn insert(&mut self, voice: Voice) {
        self.0 |= Self::bit(voice);
    }

    pub fn remove(&mut self, voice: Voice) {
        self.0 &= !Self::bit(voice);
    }

    pub fn contains(&self, voice: Voice) -> bool {
        self.0 & Self::bit(voice) != 0
    }

    /// Flips membership of the voice and returns whether it is now present.
    pub fn toggle(&mut self, voice: Voice) -> bool {
        self.0 ^= Self::bit(voice);
        self.contains(voice)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Voice> + '_ {
        Voice::ALL.into_iter().filter(|voice| self.contains(*voice))
    }
}

impl FromIterator<Voice> for VoiceSet {
    fn from_iter<I: IntoIterator<Item = Voice>>(iter: I) -> Self {
        let mut set = VoiceSet::new();
        for voice in iter {
            set.insert(voice);
        }
        set
    }
}

impl fmt::Display for VoiceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|voice| voice.name()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// The number of steps in one bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "usize")]
pub enum Subdivision {
    #[default]
    Eighth,
    Sixteenth,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported subdivision '{0}', expected 8 or 16")]
pub struct UnknownSubdivision(pub String);

impl Subdivision {
    pub fn steps(&self) -> usize {
        match self {
            Subdivision::Eighth => 8,
            Subdivision::Sixteenth => 16,
        }
    }
}

impl TryFrom<usize> for Subdivision {
    type Error = UnknownSubdivision;

    fn try_from(steps: usize) -> Result<Self, Self::Error> {
        match steps {
            8 => Ok(Subdivision::Eighth),
            16 => Ok(Subdivision::Sixteenth),
            _ => Err(UnknownSubdivision(steps.to_string())),
        }
    }
}

impl FromStr for Subdivision {
    type Err = UnknownSubdivision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<usize>()
            .map_err(|_| UnknownSubdivision(s.to_string()))
            .and_then(Subdivision::try_from)
    }
}

impl fmt::Display for Subdivision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.steps())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("step {step} is out of range for a grid of {len} steps")]
    StepOutOfRange { step: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern entry '{0}' should look like voice=step,step")]
    Malformed(String),

    #[error(transparent)]
    Voice(#[from] UnknownVoice),

    #[error("invalid step '{0}'")]
    Step(String),
}

/// Parses a pattern such as `kick=0,4;snare=2,6` into the cells it turns on.
pub fn parse_pattern(pattern: &str) -> Result<Vec<(usize, Voice)>, PatternError> {
    let mut cells = Vec::new();
    for entry in pattern.split(';').map(str::trim).filter(|entry| !entry.is_empty()) {
        let (voice, steps) = entry
            .split_once('=')
            .ok_or_else(|| PatternError::Malformed(entry.to_string()))?;
        let voice: Voice = voice.parse()?;
        for step in steps.split(',').map(str::trim).filter(|step| !step.is_empty()) {
            let step = step
                .parse::<usize>()
                .map_err(|_| PatternError::Step(step.to_string()))?;
            cells.push((step, voice));
        }
    }
    Ok(cells)
}

/// The voice by step matrix the transport plays. Its length always equals the subdivision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    subdivision: Subdivision,
    steps: Vec<VoiceSet>,
}

impl Default for Grid {
    fn default() -> Self {
        Grid::new(Subdivision::default())
    }
}

impl Grid {
    /// Creates an empty grid.
    pub fn new(subdivision: Subdivision) -> Grid {
        Grid {
            subdivision,
            steps: vec![VoiceSet::new(); subdivision.steps()],
        }
    }

    fn check(&self, step: usize) -> Result<(), GridError> {
        if step >= self.steps.len() {
            return Err(GridError::StepOutOfRange {
                step,
                len: self.steps.len(),
            });
        }
        Ok(())
    }

    /// Flips the voice at the step and returns the new state.
    pub fn toggle(&mut self, step: usize, voice: Voice) -> Result<bool, GridError> {
        self.check(step)?;
        Ok(self.steps[step].toggle(voice))
    }

    pub fn set(&mut self, step: usize, voice: Voice, on: bool) -> Result<(), GridError> {
        self.check(step)?;
        if on {
            self.steps[step].insert(voice);
        } else {
            self.steps[step].remove(voice);
        }
        Ok(())
    }

    /// The voices active at the step. Steps beyond the grid have no voices.
    pub fn active_voices(&self, step: usize) -> VoiceSet {
        self.steps.get(step).copied().unwrap_or_default()
    }

    /// Resets the grid to empty steps at the new subdivision. All toggles are discarded, even
    /// if the subdivision is unchanged.
    pub fn rebuild(&mut self, subdivision: Subdivision) {
        self.subdivision = subdivision;
        self.steps = vec![VoiceSet::new(); subdivision.steps()];
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.iter().all(VoiceSet::is_empty)
    }

    pub fn subdivision(&self) -> Subdivision {
        self.subdivision
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, voice) in Voice::ALL.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{:<6}", voice.name())?;
            for step in &self.steps {
                f.write_str(if step.contains(*voice) { "x" } else { "." })?;
            }
        }
        Ok(())
    }
}
