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
use rand::Rng;

/// Generates `length` samples of white noise, each uniform in [-1, 1).
pub fn generate(length: usize) -> Vec<f32> {
    generate_with(&mut rand::thread_rng(), length)
}

/// Generates white noise from the given random source.
pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, length: usize) -> Vec<f32> {
    (0..length).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}
