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
    cell::UnsafeCell,
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, span, Level};

use super::{
    error::SchedulingError, graph::SignalGraph, mixer::AudioMixer, thread_priority,
};
use crate::{config, playsync::CancelHandle};

/// Number of mixing blocks the ring buffer holds. The mixer renders at most this far ahead of
/// the device clock.
const RING_BLOCKS: usize = 4;

/// Lock-free single producer, single consumer circular buffer between the mixing thread and
/// the device callback.
struct CircularBuffer {
    /// Backing buffer
    buffer: Box<[UnsafeCell<f32>]>,
    /// Capacity in samples. One slot stays empty to tell a full ring from an empty one.
    capacity: usize,
    /// Read position (consumer)
    read_pos: AtomicUsize,
    /// Write position (producer)
    write_pos: AtomicUsize,
}

// SAFETY: the producer only writes slots outside [read_pos, write_pos) and publishes them with a
// release store, the consumer only reads published slots. There is one producer and one consumer.
unsafe impl Sync for CircularBuffer {}

impl CircularBuffer {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            buffer: (0..capacity).map(|_| UnsafeCell::new(0.0)).collect(),
            capacity,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
        }
    }

    /// Get number of samples available to read
    #[inline]
    fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        (write + self.capacity - read) % self.capacity
    }

    /// Get space available to write
    #[inline]
    fn space(&self) -> usize {
        self.capacity - self.available() - 1
    }

    /// Writes samples into the buffer. Returns number of samples actually written.
    fn write(&self, samples: &[f32]) -> usize {
        let to_write = self.space().min(samples.len());
        let write = self.write_pos.load(Ordering::Acquire);

        for (offset, sample) in samples[..to_write].iter().enumerate() {
            // SAFETY: slot is free, see the Sync impl.
            unsafe { *self.buffer[(write + offset) % self.capacity].get() = *sample };
        }

        self.write_pos
            .store((write + to_write) % self.capacity, Ordering::Release);
        to_write
    }

    /// Reads samples from the buffer. Returns number of samples actually read.
    fn read(&self, output: &mut [f32]) -> usize {
        let to_read = self.available().min(output.len());
        let read = self.read_pos.load(Ordering::Acquire);

        for (offset, sample) in output[..to_read].iter_mut().enumerate() {
            // SAFETY: slot is published, see the Sync impl.
            *sample = unsafe { *self.buffer[(read + offset) % self.capacity].get() };
        }

        self.read_pos
            .store((read + to_read) % self.capacity, Ordering::Release);
        to_read
    }
}

/// Describes an output device for listing.
pub struct DeviceInfo {
    name: String,
    max_channels: u16,
    host_id: cpal::HostId,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// A sink that renders scheduled graphs to a cpal output stream. The audio clock counts frames
/// the device has actually consumed, so it pauses during underruns instead of running ahead of
/// the mixer.
pub struct Sink {
    /// The name of the device.
    name: String,
    host_id: cpal::HostId,
    sample_rate: u32,
    channels: u16,
    /// Frames per mixing block.
    block_frames: usize,
    /// The output stream manager for continuous playback.
    output_manager: OutputManager,
}

/// Manages the mixing and output threads.
struct OutputManager {
    /// Channel for handing new graphs to the mixing thread.
    graph_tx: crossbeam_channel::Sender<SignalGraph>,
    /// Frames consumed by the device.
    frames_played: Arc<AtomicU64>,
    /// Set once the stream is playing.
    ready: Arc<AtomicBool>,
    cancel_handle: CancelHandle,
    /// Handle to the output thread (keeps the stream alive).
    output_thread: Option<thread::JoinHandle<()>>,
    /// Handle to the producer thread (fills ring buffer).
    producer_thread: Option<thread::JoinHandle<()>>,
}

impl Drop for OutputManager {
    fn drop(&mut self) {
        self.cancel_handle.cancel();

        // Wait for threads to finish
        if let Some(thread) = self.producer_thread.take() {
            let _ = thread.join();
        }
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

/// Ring capacity in samples for the given block size: exactly `RING_BLOCKS` blocks plus the
/// empty slot.
fn ring_capacity(block_samples: usize) -> usize {
    block_samples * RING_BLOCKS + 1
}

/// How far ahead of the device clock the mixer can render, in seconds.
fn ring_latency(block_frames: usize, sample_rate: u32) -> f64 {
    (block_frames * RING_BLOCKS) as f64 / sample_rate.max(1) as f64
}

/// Advances the device clock by the number of whole frames read.
fn advance_clock(frames_played: &AtomicU64, samples_read: usize, channels: usize) {
    frames_played.fetch_add((samples_read / channels) as u64, Ordering::Release);
}

/// f32 callback: read directly into the cpal buffer
fn create_f32_callback(
    ring: Arc<CircularBuffer>,
    frames_played: Arc<AtomicU64>,
    channels: usize,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        let read = ring.read(data);
        // Zero-fill any shortfall
        data[read..].fill(0.0);
        advance_clock(&frames_played, read, channels);
    }
}

/// Integer callback: read from ring and convert
fn create_int_callback<T: cpal::Sample + cpal::FromSample<f32>>(
    ring: Arc<CircularBuffer>,
    frames_played: Arc<AtomicU64>,
    channels: usize,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut temp: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        if temp.len() < data.len() {
            temp.resize(data.len(), 0.0);
        }
        let temp = &mut temp[..data.len()];
        let read = ring.read(temp);

        // Zero-fill any shortfall
        temp[read..].fill(0.0);

        for (dst, &src) in data.iter_mut().zip(temp.iter()) {
            *dst = T::from_sample(src);
        }
        advance_clock(&frames_played, read, channels);
    }
}

impl OutputManager {
    /// Starts the mixing thread and the output thread that owns the cpal stream.
    fn start(
        device: cpal::Device,
        stream_config: cpal::StreamConfig,
        sample_format: cpal::SampleFormat,
        block_frames: usize,
    ) -> OutputManager {
        let (graph_tx, graph_rx) = crossbeam_channel::unbounded::<SignalGraph>();
        let frames_played = Arc::new(AtomicU64::new(0));
        let ready = Arc::new(AtomicBool::new(false));
        let cancel_handle = CancelHandle::new();

        let num_channels = stream_config.channels;
        let sample_rate = stream_config.sample_rate;
        let block_samples = block_frames * num_channels as usize;
        let ring = Arc::new(CircularBuffer::new(ring_capacity(block_samples)));

        // Producer thread: mix audio and write to ring buffer
        let producer_thread = {
            let ring = ring.clone();
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || {
                thread_priority::configure_audio_thread_priority();
                let mut mixer = AudioMixer::new(num_channels, sample_rate);
                let mut scratch = vec![0.0f32; block_samples];

                while !cancel_handle.is_cancelled() {
                    while let Ok(graph) = graph_rx.try_recv() {
                        mixer.add_graph(graph);
                    }

                    if ring.space() >= block_samples {
                        mixer.process_frames(&mut scratch);
                        ring.write(&scratch);
                    } else {
                        // Ring full, yield briefly
                        cancel_handle.wait_timeout(Duration::from_micros(500));
                    }
                }
            })
        };

        // The stream is not Send, so it's created and kept alive inside the output thread.
        let output_thread = {
            let ready = ready.clone();
            let frames_played = frames_played.clone();
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || {
                let channels = num_channels as usize;
                let on_error = |err: cpal::StreamError| error!("CPAL output stream error: {}", err);
                let stream_result = match sample_format {
                    cpal::SampleFormat::F32 => device.build_output_stream(
                        &stream_config,
                        create_f32_callback(ring, frames_played, channels),
                        on_error,
                        None,
                    ),
                    cpal::SampleFormat::I16 => device.build_output_stream(
                        &stream_config,
                        create_int_callback::<i16>(ring, frames_played, channels),
                        on_error,
                        None,
                    ),
                    cpal::SampleFormat::I32 => device.build_output_stream(
                        &stream_config,
                        create_int_callback::<i32>(ring, frames_played, channels),
                        on_error,
                        None,
                    ),
                    other => {
                        error!(format = %other, "Unsupported sample format");
                        return;
                    }
                };

                let stream = match stream_result {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!("Failed to create CPAL stream: {}", e);
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    error!("Failed to start CPAL stream: {}", e);
                    return;
                }
                info!("CPAL output stream started successfully");
                ready.store(true, Ordering::Release);

                // Keep the stream alive until cancelled.
                while !cancel_handle.wait_timeout(Duration::from_millis(100)) {}
                ready.store(false, Ordering::Release);
            })
        };

        OutputManager {
            graph_tx,
            frames_played,
            ready,
            cancel_handle,
            output_thread: Some(output_thread),
            producer_thread: Some(producer_thread),
        }
    }
}

#[allow(deprecated)]
fn device_name(device: &cpal::Device) -> Option<String> {
    device.name().ok()
}

/// Lists cpal output devices.
pub fn list() -> Result<Vec<DeviceInfo>, Box<dyn Error>> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut devices: Vec<DeviceInfo> = Vec::new();
    for host_id in cpal::available_hosts() {
        let host_devices = match cpal::host_from_id(host_id)?.devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let Ok(output_configs) = device.supported_output_configs() else {
                continue;
            };
            let max_channels = output_configs
                .map(|config| config.channels())
                .max()
                .unwrap_or(0);

            if max_channels > 0 {
                if let Some(name) = device_name(&device) {
                    devices.push(DeviceInfo {
                        name,
                        max_channels,
                        host_id,
                    });
                }
            }
        }
    }

    devices.sort_by_key(|device| device.name.to_string());
    Ok(devices)
}

/// Finds the named output device. "default" resolves to the default host's default output.
fn find_device(name: &str) -> Result<(cpal::Device, cpal::HostId), Box<dyn Error>> {
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    if name == "default" {
        let host = cpal::default_host();
        return match host.default_output_device() {
            Some(device) => Ok((device, host.id())),
            None => Err("no default output device available".into()),
        };
    }

    for host_id in cpal::available_hosts() {
        let Ok(mut devices) = cpal::host_from_id(host_id)?.output_devices() else {
            continue;
        };
        if let Some(device) = devices.find(|device| {
            device_name(device).is_some_and(|device_name| device_name.trim() == name)
        }) {
            return Ok((device, host_id));
        }
    }

    Err(format!("no device found with name {}", name).into())
}

impl Sink {
    /// Opens the configured device and starts the output stream.
    pub fn get(config: &config::Audio) -> Result<Sink, Box<dyn Error>> {
        let (device, host_id) = find_device(config.device())?;
        let default_config = device.default_output_config()?;

        let sample_rate = config
            .sample_rate()
            .unwrap_or_else(|| default_config.sample_rate());
        let channels = default_config.channels();
        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        info!(
            device = config.device(),
            sample_rate,
            channels,
            format = %default_config.sample_format(),
            "Opening output device"
        );

        let output_manager = OutputManager::start(
            device,
            stream_config,
            default_config.sample_format(),
            config.buffer_size(),
        );

        Ok(Sink {
            name: config.device().to_string(),
            host_id,
            sample_rate,
            channels,
            block_frames: config.buffer_size(),
            output_manager,
        })
    }
}

impl super::Sink for Sink {
    fn now(&self) -> f64 {
        self.output_manager.frames_played.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_ready(&self) -> bool {
        self.output_manager.ready.load(Ordering::Acquire)
    }

    fn latency(&self) -> f64 {
        ring_latency(self.block_frames, self.sample_rate)
    }

    fn schedule(&self, graph: SignalGraph) -> Result<(), SchedulingError> {
        let span = span!(Level::DEBUG, "schedule graph (cpal)");
        let _enter = span.enter();

        graph.validate()?;
        self.output_manager
            .graph_tx
            .send(graph)
            .map_err(|_| SchedulingError::SinkClosed)
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Sink>, Box<dyn Error>> {
        Err("not a mock".into())
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.channels,
            self.host_id.name()
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ring_buffer_wraps() {
        let ring = CircularBuffer::new(8);
        assert_eq!(ring.space(), 7);
        assert_eq!(ring.write(&[1.0, 2.0, 3.0, 4.0, 5.0]), 5);

        let mut out = [0.0; 3];
        assert_eq!(ring.read(&mut out), 3);
        assert_eq!(out, [1.0, 2.0, 3.0]);

        assert_eq!(ring.write(&[6.0, 7.0, 8.0, 9.0, 10.0, 11.0]), 5);
        assert_eq!(ring.available(), 7);

        let mut out = [0.0; 8];
        assert_eq!(ring.read(&mut out), 7);
        assert_eq!(&out[..7], &[4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn test_ring_holds_exactly_its_blocks() {
        let block_samples = 3 * 2;
        let ring = CircularBuffer::new(ring_capacity(block_samples));
        assert_eq!(ring.space(), block_samples * RING_BLOCKS);

        for _ in 0..RING_BLOCKS {
            assert_eq!(ring.write(&[0.5; 6]), block_samples);
        }
        assert_eq!(ring.space(), 0);
        assert_eq!(ring.write(&[0.5; 6]), 0);

        let mut out = [0.0; 4];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(ring.write(&[1.0; 6]), 4);
        assert_eq!(ring.available(), block_samples * RING_BLOCKS);
    }

    #[test]
    fn test_ring_latency() {
        assert_eq!(ring_latency(256, 44100), 1024.0 / 44100.0);
        assert_eq!(ring_latency(1000, 48000), 4000.0 / 48000.0);
    }

    #[test]
    fn test_clock_counts_whole_frames() {
        let frames_played = AtomicU64::new(0);
        advance_clock(&frames_played, 512, 2);
        advance_clock(&frames_played, 0, 2);
        assert_eq!(frames_played.load(Ordering::Acquire), 256);
    }
}
