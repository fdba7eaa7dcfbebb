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
use std::error::Error;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, span, warn, Level};

use super::clock::{step_interval, StepClock};
use super::grid::Grid;
use crate::audio::Sink;
use crate::playsync::CancelHandle;
use crate::synth::{Kit, SynthError, Voice};

/// One voice firing at one step, at a time on the audio clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerEvent {
    pub step: usize,
    pub voice: Voice,
    pub time: f64,
}

/// Receives trigger events after their audio has been scheduled. Observer failures are logged
/// and never affect scheduling.
pub trait TriggerObserver: Send + Sync {
    fn on_trigger(&self, event: &TriggerEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Timing parameters of the transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    /// Tempo in beats per minute.
    pub bpm: f64,
    /// How far ahead of the audio clock steps are committed.
    pub lookahead: Duration,
    /// How often the scheduler thread wakes up.
    pub schedule_interval: Duration,
    /// Delay between start() and the first step.
    pub start_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            bpm: 120.0,
            lookahead: Duration::from_millis(100),
            schedule_interval: Duration::from_millis(25),
            start_delay: Duration::from_millis(50),
        }
    }
}

/// The deterministic core of the transport: turns due steps into voice triggers.
pub struct Scheduler {
    kit: Arc<Kit>,
    grid: Arc<RwLock<Grid>>,
    observers: Vec<Arc<dyn TriggerObserver>>,
    clock: StepClock,
    bpm: f64,
}

impl Scheduler {
    /// Creates a scheduler whose first step falls at `origin` on the audio clock.
    pub fn new(
        kit: Arc<Kit>,
        grid: Arc<RwLock<Grid>>,
        observers: Vec<Arc<dyn TriggerObserver>>,
        bpm: f64,
        origin: f64,
    ) -> Scheduler {
        let subdivision = grid.read().subdivision();
        Scheduler {
            kit,
            grid,
            observers,
            clock: StepClock::new(origin, step_interval(bpm, subdivision), subdivision.steps()),
            bpm,
        }
    }

    pub fn clock(&self) -> &StepClock {
        &self.clock
    }

    /// Triggers every step due before the horizon and returns the trigger events produced.
    /// A failing voice doesn't stop its siblings or the cursor.
    pub fn run_until(&mut self, horizon: f64) -> Vec<TriggerEvent> {
        let subdivision = self.grid.read().subdivision();
        if subdivision.steps() != self.clock.steps() {
            self.clock
                .reanchor(step_interval(self.bpm, subdivision), subdivision.steps());
            info!(
                %subdivision,
                origin = self.clock.next_time(),
                "Subdivision changed, re-anchored step clock"
            );
        }

        let mut events = Vec::new();
        for (step, time) in self.clock.due(horizon) {
            let voices = self.grid.read().active_voices(step);
            for voice in voices.iter() {
                match self.kit.get(voice).trigger(time) {
                    Ok(()) => {
                        let event = TriggerEvent { step, voice, time };
                        self.notify(&event);
                        events.push(event);
                    }
                    Err(SynthError::NotReady) => {
                        debug!(%voice, step, time, "Sink not ready, skipping trigger")
                    }
                    Err(e) => error!(%voice, step, time, err = %e, "Trigger failed"),
                }
            }
        }
        events
    }

    /// Drops every step that should already have sounded by `now`, so a scheduler that fell
    /// behind resumes on the beat instead of firing a burst of late triggers.
    pub fn skip_missed(&mut self, now: f64) -> u64 {
        let skipped = self.clock.skip_before(now);
        if skipped > 0 {
            warn!(
                skipped,
                now,
                next = self.clock.next_time(),
                "Scheduler fell behind, skipped missed steps"
            );
        }
        skipped
    }

    fn notify(&self, event: &TriggerEvent) {
        for observer in &self.observers {
            if let Err(e) = observer.on_trigger(event) {
                error!(
                    voice = %event.voice,
                    step = event.step,
                    err = %e,
                    "Trigger observer failed"
                );
            }
        }
    }
}

enum TransportState {
    Idle,
    Running {
        cancel: CancelHandle,
        join: JoinHandle<()>,
    },
}

/// Runs the scheduler on its own thread against the sink's clock.
pub struct Transport {
    sink: Arc<dyn Sink>,
    kit: Arc<Kit>,
    grid: Arc<RwLock<Grid>>,
    observers: Vec<Arc<dyn TriggerObserver>>,
    timing: Timing,
    state: Mutex<TransportState>,
}

impl Transport {
    pub fn new(
        sink: Arc<dyn Sink>,
        kit: Arc<Kit>,
        grid: Arc<RwLock<Grid>>,
        observers: Vec<Arc<dyn TriggerObserver>>,
        timing: Timing,
    ) -> Transport {
        Transport {
            sink,
            kit,
            grid,
            observers,
            timing,
            state: Mutex::new(TransportState::Idle),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), TransportState::Running { .. })
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Starts the transport. The first step falls `start_delay` after the current audio clock
    /// time. Returns false if the transport was already running.
    pub fn start(&self) -> bool {
        let mut state = self.state.lock();
        if matches!(*state, TransportState::Running { .. }) {
            debug!("Transport already running");
            return false;
        }

        let origin = self.sink.now() + self.timing.start_delay.as_secs_f64();
        let mut scheduler = Scheduler::new(
            self.kit.clone(),
            self.grid.clone(),
            self.observers.clone(),
            self.timing.bpm,
            origin,
        );
        let cancel = CancelHandle::new();
        let sink = self.sink.clone();
        let timing = self.timing;

        info!(bpm = timing.bpm, origin, "Starting transport");
        let join = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                let span = span!(Level::INFO, "transport");
                let _enter = span.enter();

                loop {
                    let now = sink.now();
                    scheduler.skip_missed(now);
                    let horizon = now + timing.lookahead.as_secs_f64();
                    let events = scheduler.run_until(horizon);
                    if !events.is_empty() {
                        debug!(count = events.len(), horizon, "Scheduled triggers");
                    }
                    if cancel.wait_timeout(timing.schedule_interval) {
                        break;
                    }
                }

                info!(cursor = scheduler.clock().cursor(), "Transport stopped");
            })
        };

        *state = TransportState::Running { cancel, join };
        true
    }

    /// Stops the transport and waits for the scheduler thread to exit, so nothing is triggered
    /// after this returns. Graphs already handed to the sink play out. Returns false if the
    /// transport wasn't running.
    pub fn stop(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state.lock(), TransportState::Idle);
        match previous {
            TransportState::Idle => {
                debug!("Transport is not running, nothing to stop");
                false
            }
            TransportState::Running { cancel, join } => {
                cancel.cancel();
                if join.join().is_err() {
                    error!("Transport thread panicked");
                }
                true
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.stop();
    }
}
