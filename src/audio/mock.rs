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
use std::{
    collections::{HashSet, VecDeque},
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use parking_lot::Mutex;
use tracing::debug;

use super::{error::SchedulingError, graph::SignalGraph};

/// How many scheduled graphs the mock keeps. Older graphs are dropped first.
const RECORD_LIMIT: usize = 64;

/// Where the mock sink's clock comes from.
#[derive(Clone, Copy)]
enum Clock {
    /// Seconds set explicitly by tests.
    Manual(f64),
    /// Seconds elapsed since the sink was created.
    Wall(Instant),
}

/// A mock sink. Doesn't actually play anything, it records the most recent graphs it was given.
#[derive(Clone)]
pub struct Sink {
    name: String,
    sample_rate: u32,
    clock: Arc<Mutex<Clock>>,
    scheduled: Arc<Mutex<VecDeque<SignalGraph>>>,
    latency: Arc<Mutex<f64>>,
    ready: Arc<AtomicBool>,
    rejected: Arc<Mutex<HashSet<&'static str>>>,
}

impl Sink {
    /// Gets the given mock sink. Its clock follows wall time.
    pub fn get(name: &str, sample_rate: u32) -> Sink {
        Sink::with_clock(name, sample_rate, Clock::Wall(Instant::now()))
    }

    /// Gets a mock sink whose clock only moves when told to. It starts at zero.
    pub fn manual(name: &str, sample_rate: u32) -> Sink {
        Sink::with_clock(name, sample_rate, Clock::Manual(0.0))
    }

    fn with_clock(name: &str, sample_rate: u32, clock: Clock) -> Sink {
        Sink {
            name: name.to_string(),
            sample_rate,
            clock: Arc::new(Mutex::new(clock)),
            scheduled: Arc::new(Mutex::new(VecDeque::new())),
            latency: Arc::new(Mutex::new(0.0)),
            ready: Arc::new(AtomicBool::new(true)),
            rejected: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Sets the clock of a manual sink. Has no effect on a wall clock sink.
    pub fn set_now(&self, now: f64) {
        if let Clock::Manual(current) = &mut *self.clock.lock() {
            *current = now;
        }
    }

    /// Moves the clock of a manual sink forward.
    pub fn advance(&self, seconds: f64) {
        if let Clock::Manual(current) = &mut *self.clock.lock() {
            *current += seconds;
        }
    }

    /// Sets the latency the sink reports.
    pub fn set_latency(&self, latency: f64) {
        *self.latency.lock() = latency;
    }

    /// Marks the sink as ready or not ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Rejects every graph with the given label from now on.
    pub fn reject(&self, label: &'static str) {
        self.rejected.lock().insert(label);
    }

    /// Returns a copy of the recorded graphs, oldest first.
    pub fn scheduled(&self) -> Vec<SignalGraph> {
        self.scheduled.lock().iter().cloned().collect()
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.lock().len()
    }

    /// Returns the labels of scheduled graphs with their start times.
    pub fn scheduled_starts(&self) -> Vec<(&'static str, f64)> {
        self.scheduled
            .lock()
            .iter()
            .filter_map(|graph| graph.start_time().map(|start| (graph.label(), start)))
            .collect()
    }
}

impl super::Sink for Sink {
    fn now(&self) -> f64 {
        match *self.clock.lock() {
            Clock::Manual(now) => now,
            Clock::Wall(created) => created.elapsed().as_secs_f64(),
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    fn latency(&self) -> f64 {
        *self.latency.lock()
    }

    fn schedule(&self, graph: SignalGraph) -> Result<(), SchedulingError> {
        graph.validate()?;
        if self.rejected.lock().contains(graph.label()) {
            return Err(SchedulingError::Rejected(
                graph.label(),
                "rejected by mock sink".to_string(),
            ));
        }
        debug!(
            sink = self.name,
            graph = graph.label(),
            start = graph.start_time(),
            "Scheduled graph (mock)"
        );
        let mut scheduled = self.scheduled.lock();
        if scheduled.len() == RECORD_LIMIT {
            scheduled.pop_front();
        }
        scheduled.push_back(graph);
        Ok(())
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Sink>, Box<dyn std::error::Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
