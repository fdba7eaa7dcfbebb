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
//! Configuration for the drum machine, read from YAML.
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::controller::{keyboard, Controller};
use crate::feedback::{FeedbackRenderer, TracingCanvas};
use crate::machine::DrumMachine;
use crate::sequencer::TriggerObserver;

mod audio;
mod error;
mod machine;

pub use audio::Audio;
pub use error::ConfigError;
pub use machine::Machine;

/// Initializes the drum machine and a keyboard controller from the given config file and returns
/// the controller. The controller owns the machine and exits when the user quits.
pub fn init_machine_and_controller(path: &Path) -> Result<Controller, Box<dyn Error>> {
    let config = Machine::deserialize(path)?;
    let sink = crate::audio::get_sink(config.audio())?;
    let feedback: Arc<dyn TriggerObserver> = Arc::new(
        FeedbackRenderer::new(Arc::new(TracingCanvas::new()), Handle::try_current()?)
            .with_clock(sink.clone()),
    );
    let machine = Arc::new(DrumMachine::new(sink, &config, vec![feedback])?);
    Ok(Controller::new(machine, Arc::new(keyboard::Driver::new())))
}
