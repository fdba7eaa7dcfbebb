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

use parking_lot::{Mutex, RwLock};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

use crate::audio::Sink;
use crate::config;
use crate::config::ConfigError;
use crate::samples::{SampleLoader, SampleSlot, SampleState};
use crate::sequencer::{
    Grid, GridError, Subdivision, Timing, Transport, TriggerEvent, TriggerObserver,
};
use crate::synth::{Kit, SynthError, Voice};

/// The drum machine: a kit of voices played by a transport from a grid. This is the surface
/// the controller drives.
pub struct DrumMachine {
    sink: Arc<dyn Sink>,
    kit: Arc<Kit>,
    grid: Arc<RwLock<Grid>>,
    observers: Vec<Arc<dyn TriggerObserver>>,
    transport: Transport,
    hihat_sample: SampleSlot,
    loader: Mutex<Option<JoinHandle<()>>>,
}

impl DrumMachine {
    /// Creates the machine. If a hi-hat sample is configured its load starts right away on the
    /// current tokio runtime; until it finishes the hi-hat is silent.
    pub fn new(
        sink: Arc<dyn Sink>,
        config: &config::Machine,
        observers: Vec<Arc<dyn TriggerObserver>>,
    ) -> Result<DrumMachine, ConfigError> {
        let timing = config.timing()?;
        check_latency(sink.as_ref(), timing)?;
        let hihat_sample = SampleSlot::new();
        let kit = Arc::new(Kit::new(sink.clone(), hihat_sample.clone()));
        let grid = Arc::new(RwLock::new(Grid::new(config.subdivision())));
        let transport = Transport::new(
            sink.clone(),
            kit.clone(),
            grid.clone(),
            observers.clone(),
            timing,
        );

        let loader = config.hihat_sample().map(|source| {
            SampleLoader::new(sink.sample_rate()).spawn(source.to_string(), hihat_sample.clone())
        });

        info!(
            sink = %sink,
            bpm = timing.bpm,
            subdivision = %config.subdivision(),
            hihat_sample = config.hihat_sample(),
            "Drum machine created"
        );

        Ok(DrumMachine {
            sink,
            kit,
            grid,
            observers,
            transport,
            hihat_sample,
            loader: Mutex::new(loader),
        })
    }

    /// Flips a cell of the grid and returns its new state.
    pub fn toggle(&self, step: usize, voice: Voice) -> Result<bool, GridError> {
        let on = self.grid.write().toggle(step, voice)?;
        info!(step, %voice, on, "Toggled step");
        Ok(on)
    }

    pub fn set(&self, step: usize, voice: Voice, on: bool) -> Result<(), GridError> {
        self.grid.write().set(step, voice, on)
    }

    /// Switches the grid to a new subdivision. The grid is rebuilt empty; a running transport
    /// picks up the new step length at its next not-yet-scheduled step.
    pub fn set_subdivision(&self, subdivision: Subdivision) {
        self.grid.write().rebuild(subdivision);
        info!(%subdivision, "Subdivision changed, grid cleared");
    }

    pub fn subdivision(&self) -> Subdivision {
        self.grid.read().subdivision()
    }

    /// A snapshot of the grid.
    pub fn grid(&self) -> Grid {
        self.grid.read().clone()
    }

    /// Starts the transport. Returns false if it was already playing.
    pub fn play(&self) -> bool {
        self.transport.start()
    }

    /// Stops the transport. Returns false if it wasn't playing.
    pub fn stop(&self) -> bool {
        self.transport.stop()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_running()
    }

    pub fn sample_state(&self) -> SampleState {
        self.hihat_sample.state()
    }

    pub fn sink(&self) -> Arc<dyn Sink> {
        self.sink.clone()
    }

    /// Plays one hit of the voice as soon as the sink can play it from its beginning, outside
    /// of the sequence.
    pub fn audition(&self, voice: Voice) -> Result<(), SynthError> {
        let time = self.sink.now() + self.sink.latency();
        self.kit.get(voice).trigger(time)?;

        let event = TriggerEvent {
            step: 0,
            voice,
            time,
        };
        for observer in &self.observers {
            if let Err(e) = observer.on_trigger(&event) {
                error!(%voice, err = %e, "Trigger observer failed");
            }
        }
        Ok(())
    }

    /// Waits for the hi-hat sample load to finish, if one was started.
    pub async fn ready(&self) -> Result<SampleState, JoinError> {
        let loader = self.loader.lock().take();
        if let Some(loader) = loader {
            loader.await?;
        }
        Ok(self.sample_state())
    }
}

/// Rejects sinks that render so far ahead that steps would be committed behind the mixer.
fn check_latency(sink: &dyn Sink, timing: Timing) -> Result<(), ConfigError> {
    let latency = sink.latency();
    let lead = timing
        .lookahead
        .saturating_sub(timing.schedule_interval)
        .as_secs_f64();
    if latency > 0.0 && latency >= lead {
        return Err(ConfigError::Latency {
            latency_ms: latency * 1000.0,
            lead_ms: lead * 1000.0,
        });
    }
    Ok(())
}
