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
use std::path::Path;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use super::SampleSlot;
use crate::audio::{decode, DecodeError, SampleBuffer};

/// How long an HTTP fetch may take before giving up.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while loading a sample.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("HTTP request for {0} failed: {1}")]
    Fetch(String, #[source] reqwest::Error),

    #[error("HTTP request for {0} returned status {1}")]
    Status(String, reqwest::StatusCode),

    #[error("unable to read {0}: {1}")]
    Io(String, #[source] std::io::Error),

    #[error("unable to decode sample: {0}")]
    Decode(#[from] DecodeError),

    #[error("sample load task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Where a sample source points.
#[derive(Debug, PartialEq)]
enum Location<'a> {
    Http(&'a str),
    File(&'a str),
}

fn locate(source: &str) -> Location<'_> {
    if source.starts_with("http://") || source.starts_with("https://") {
        Location::Http(source)
    } else if let Some(path) = source.strip_prefix("file://") {
        Location::File(path)
    } else {
        Location::File(source)
    }
}

/// Returns the file extension of the source, ignoring any URL query or fragment.
fn extension(source: &str) -> Option<&str> {
    let path = source.split(['?', '#']).next().unwrap_or(source);
    Path::new(path).extension().and_then(|ext| ext.to_str())
}

/// Loads samples from URLs or files and decodes them for the sink.
#[derive(Debug, Clone)]
pub struct SampleLoader {
    /// Target sample rate for transcoding (matches audio output).
    target_sample_rate: u32,
}

impl SampleLoader {
    /// Creates a new sample loader.
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    /// Fetches the raw bytes of a sample. Sources may be http(s) URLs, file:// URLs or paths.
    pub async fn fetch(&self, source: &str) -> Result<Vec<u8>, LoadError> {
        match locate(source) {
            Location::Http(url) => {
                let client = reqwest::Client::builder()
                    .timeout(FETCH_TIMEOUT)
                    .build()
                    .map_err(|e| LoadError::Fetch(url.to_string(), e))?;
                let response = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| LoadError::Fetch(url.to_string(), e))?;
                if !response.status().is_success() {
                    return Err(LoadError::Status(url.to_string(), response.status()));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| LoadError::Fetch(url.to_string(), e))?;
                Ok(bytes.to_vec())
            }
            Location::File(path) => tokio::fs::read(path)
                .await
                .map_err(|e| LoadError::Io(path.to_string(), e)),
        }
    }

    /// Fetches and decodes a sample into a mono buffer at the target sample rate.
    pub async fn load(&self, source: &str) -> Result<SampleBuffer, LoadError> {
        info!(source, "Loading sample");

        let bytes = self.fetch(source).await?;
        let extension = extension(source).map(str::to_string);
        let target_sample_rate = self.target_sample_rate;
        let buffer = tokio::task::spawn_blocking(move || {
            decode::decode(bytes, extension.as_deref(), target_sample_rate)
        })
        .await??;

        info!(
            source,
            sample_rate = buffer.sample_rate(),
            duration_ms = (buffer.duration() * 1000.0) as u64,
            memory_kb = buffer.memory_size() / 1024,
            "Sample loaded"
        );
        Ok(buffer)
    }

    /// Loads the sample in the background and publishes the outcome into the slot. Failures
    /// are logged, the slot then reports the failure.
    pub fn spawn(self, source: String, slot: SampleSlot) -> JoinHandle<()> {
        tokio::spawn(async move {
            let result = self.load(&source).await;
            if let Err(e) = &result {
                error!(source, err = %e, "Failed to load sample");
            }
            slot.publish(result);
        })
    }
}
