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
use std::io::Cursor;

use symphonia::core::audio::SampleBuffer as PcmBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info, warn};

use super::buffer::SampleBuffer;
use super::error::DecodeError;

/// Decodes encoded audio (WAV, FLAC, MP3, OGG...) into a mono buffer at the target sample rate.
/// Multichannel audio is averaged down to mono. The extension, if known, helps the format probe.
pub fn decode(
    bytes: Vec<u8>,
    extension: Option<&str>,
    target_sample_rate: u32,
) -> Result<SampleBuffer, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(DecodeError::Probe)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_sample_rate = codec_params
        .sample_rate
        .ok_or(DecodeError::UnknownSampleRate)?;

    let mut decoder = get_codecs().make(&codec_params, &DecoderOptions::default())?;
    let mut mono: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut pcm = PcmBuffer::<f32>::new(decoded.capacity() as u64, spec);
        pcm.copy_interleaved_ref(decoded);
        mono.extend(
            pcm.samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    if mono.is_empty() {
        return Err(DecodeError::Empty);
    }
    debug!(frames = mono.len(), source_sample_rate, "Decoded audio");

    let samples = if source_sample_rate != target_sample_rate {
        info!(
            source_rate = source_sample_rate,
            target_rate = target_sample_rate,
            "Transcoding sample"
        );
        resample(&mono, source_sample_rate, target_sample_rate)
    } else {
        mono
    };

    Ok(SampleBuffer::new(samples, target_sample_rate))
}

/// Resamples mono audio using linear interpolation, which is sufficient for one-shot drum hits.
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == 0 || target_rate == 0 {
        return Vec::new();
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let target_frames = (samples.len() as f64 * ratio).ceil() as usize;

    (0..target_frames)
        .map(|target_frame| {
            let source_pos = target_frame as f64 / ratio;
            let source_frame = source_pos.floor() as usize;
            let frac = source_pos.fract() as f32;

            let s0 = samples.get(source_frame).copied().unwrap_or(0.0);
            let s1 = samples.get(source_frame + 1).copied().unwrap_or(s0);
            s0 + (s1 - s0) * frac
        })
        .collect()
}
