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
use std::sync::{Arc, OnceLock};

use tracing::warn;

use super::LoadError;
use crate::audio::SampleBuffer;

/// The load state of a sample slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleState {
    Pending,
    Loaded,
    Failed(String),
}

impl fmt::Display for SampleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleState::Pending => f.write_str("pending"),
            SampleState::Loaded => f.write_str("loaded"),
            SampleState::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

type Published = Result<Arc<SampleBuffer>, Arc<LoadError>>;

/// Holds the outcome of a one-shot sample load. The outcome is published exactly once, so
/// readers see either nothing or the complete result.
#[derive(Clone, Default)]
pub struct SampleSlot {
    cell: Arc<OnceLock<Published>>,
}

impl SampleSlot {
    /// Creates an empty slot.
    pub fn new() -> SampleSlot {
        SampleSlot::default()
    }

    /// Publishes the load outcome. Returns false if the slot was already published, in which
    /// case the new outcome is discarded.
    pub fn publish(&self, result: Result<SampleBuffer, LoadError>) -> bool {
        let published = self
            .cell
            .set(result.map(Arc::new).map_err(Arc::new))
            .is_ok();
        if !published {
            warn!("Sample slot already published, ignoring new result");
        }
        published
    }

    /// Returns the sample buffer if it loaded successfully.
    pub fn get(&self) -> Option<Arc<SampleBuffer>> {
        match self.cell.get() {
            Some(Ok(buffer)) => Some(buffer.clone()),
            _ => None,
        }
    }

    /// Returns the load error if loading failed.
    pub fn error(&self) -> Option<Arc<LoadError>> {
        match self.cell.get() {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }

    pub fn state(&self) -> SampleState {
        match self.cell.get() {
            None => SampleState::Pending,
            Some(Ok(_)) => SampleState::Loaded,
            Some(Err(e)) => SampleState::Failed(e.to_string()),
        }
    }
}

impl fmt::Debug for SampleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleSlot")
            .field("state", &self.state())
            .finish()
    }
}
