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
use std::f64::consts::PI;

use super::graph::FilterKind;

/// Second order IIR filter state using the RBJ cookbook coefficients. Coefficients are only
/// recomputed when the cutoff changes.
#[derive(Debug, Clone)]
pub struct Biquad {
    kind: FilterKind,
    sample_rate: f64,
    q: f64,
    cutoff: f32,

    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    pub fn new(kind: FilterKind, sample_rate: u32, cutoff: f32, q: f32) -> Biquad {
        let mut biquad = Biquad {
            kind,
            sample_rate: sample_rate as f64,
            q: (q as f64).max(0.001),
            cutoff: f32::NAN,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
            b0: 0.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        };
        biquad.set_cutoff(cutoff);
        biquad
    }

    /// Updates the cutoff frequency, recomputing coefficients if it changed.
    pub fn set_cutoff(&mut self, cutoff: f32) {
        if cutoff == self.cutoff {
            return;
        }
        self.cutoff = cutoff;

        let freq = (cutoff as f64).clamp(1.0, self.sample_rate * 0.49);
        let omega = 2.0 * PI * freq / self.sample_rate;
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * self.q);

        let (b0, b1, b2) = match self.kind {
            FilterKind::HighPass => (
                (1.0 + cos_omega) / 2.0,
                -(1.0 + cos_omega),
                (1.0 + cos_omega) / 2.0,
            ),
            FilterKind::LowPass => (
                (1.0 - cos_omega) / 2.0,
                1.0 - cos_omega,
                (1.0 - cos_omega) / 2.0,
            ),
        };
        let a0 = 1.0 + alpha;

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = -2.0 * cos_omega / a0;
        self.a2 = (1.0 - alpha) / a0;
    }

    /// Filters a single sample.
    pub fn process(&mut self, input: f32) -> f32 {
        let x0 = input as f64;
        let y0 = self.b0 * x0 + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x0;
        self.y2 = self.y1;
        self.y1 = y0;

        y0 as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::calculate_rms as rms;

    fn sine(freq: f64, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * PI * freq * n as f64 / sample_rate as f64).sin() as f32)
            .collect()
    }

    #[test]
    fn test_highpass_attenuates_lows() {
        let mut filter = Biquad::new(FilterKind::HighPass, 44100, 7000.0, 0.707);
        let output: Vec<f32> = sine(100.0, 44100, 4410)
            .into_iter()
            .map(|s| filter.process(s))
            .collect();
        assert!(rms(&output[2205..]) < 0.01);

        let mut filter = Biquad::new(FilterKind::HighPass, 44100, 7000.0, 0.707);
        let output: Vec<f32> = sine(15000.0, 44100, 4410)
            .into_iter()
            .map(|s| filter.process(s))
            .collect();
        assert!(rms(&output[2205..]) > 0.6);
    }

    #[test]
    fn test_highpass_blocks_dc() {
        let mut filter = Biquad::new(FilterKind::HighPass, 44100, 1000.0, 0.707);
        let mut last = 1.0;
        for _ in 0..4410 {
            last = filter.process(1.0);
        }
        assert!(last.abs() < 1e-3);
    }

    #[test]
    fn test_lowpass_passes_dc() {
        let mut filter = Biquad::new(FilterKind::LowPass, 48000, 1000.0, 0.707);
        let mut last = 0.0;
        for _ in 0..4800 {
            last = filter.process(1.0);
        }
        assert!((last - 1.0).abs() < 1e-3);
    }
}
