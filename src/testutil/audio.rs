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
    error::Error,
    fs::File,
    io::{Cursor, Seek, Write},
    path::Path,
};

use hound::{SampleFormat, WavSpec, WavWriter};

fn write_frames<W: Write + Seek>(
    writer: W,
    channels: &[Vec<f32>],
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let num_channels = channels.len();
    assert!(num_channels <= u16::MAX.into(), "Too many channels!");
    let mut writer = WavWriter::new(
        writer,
        WavSpec {
            channels: num_channels as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;

    let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
    for frame in 0..frames {
        for channel in channels {
            writer.write_sample(channel.get(frame).copied().unwrap_or(0.0))?;
        }
    }
    writer.finalize()?;

    Ok(())
}

/// Writes one vector of float samples per channel to a WAV file, interleaving frames.
pub fn write_wav(
    path: &Path,
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    write_frames(File::create(path)?, &channels, sample_rate)
}

/// Encodes float channels as an in-memory WAV file.
pub fn wav_bytes(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut cursor = Cursor::new(Vec::new());
    write_frames(&mut cursor, &channels, sample_rate)?;
    Ok(cursor.into_inner())
}

/// Calculate RMS (Root Mean Square) of a signal
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|&x| x * x).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
