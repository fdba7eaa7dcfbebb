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
use super::grid::Subdivision;

/// The duration of one step in seconds. One cycle of the grid is one 4/4 bar.
pub fn step_interval(bpm: f64, subdivision: Subdivision) -> f64 {
    60.0 / bpm * 4.0 / subdivision.steps() as f64
}

/// Tracks the step cursor and the time of the next step on the audio clock. Step times are
/// computed from the anchor as `origin + ticks * interval` so they never accumulate drift.
#[derive(Debug, Clone, PartialEq)]
pub struct StepClock {
    origin: f64,
    interval: f64,
    ticks: u64,
    cursor: usize,
    steps: usize,
}

impl StepClock {
    /// Creates a clock whose first step (step 0) falls at `origin`.
    pub fn new(origin: f64, interval: f64, steps: usize) -> StepClock {
        StepClock {
            origin,
            interval,
            ticks: 0,
            cursor: 0,
            steps: steps.max(1),
        }
    }

    /// The time of the next step that hasn't been handed out yet.
    pub fn next_time(&self) -> f64 {
        self.origin + self.ticks as f64 * self.interval
    }

    /// The grid position of the next step.
    pub fn step(&self) -> usize {
        self.cursor % self.steps
    }

    /// The number of steps handed out since the last anchor.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Returns every `(step, time)` due strictly before the horizon, advancing the clock past
    /// them.
    pub fn due(&mut self, horizon: f64) -> Vec<(usize, f64)> {
        let mut due = Vec::new();
        while self.next_time() < horizon {
            due.push((self.step(), self.next_time()));
            self.ticks += 1;
            self.cursor += 1;
        }
        due
    }

    /// Moves the clock past every step that falls before `time` without handing those steps
    /// out. The cursor moves with it so the grid stays in phase. Returns how many were skipped.
    pub fn skip_before(&mut self, time: f64) -> u64 {
        if self.next_time() >= time || self.interval <= 0.0 {
            return 0;
        }
        let mut ticks = ((time - self.origin) / self.interval).ceil().max(0.0) as u64;
        while self.origin + (ticks as f64) * self.interval < time {
            ticks += 1;
        }
        let skipped = ticks.saturating_sub(self.ticks);
        self.ticks += skipped;
        self.cursor += skipped as usize;
        skipped
    }

    /// Re-anchors the clock at the next not-yet-scheduled time with a new interval and step
    /// count. The cursor restarts at step 0.
    pub fn reanchor(&mut self, interval: f64, steps: usize) {
        self.origin = self.next_time();
        self.interval = interval;
        self.steps = steps.max(1);
        self.ticks = 0;
        self.cursor = 0;
    }
}
