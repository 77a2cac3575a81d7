//! Order-2 (9 coefficient) RGB spherical harmonics

use std::ops::{Add, AddAssign, Mul};

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Number of coefficients in an order-2 expansion
pub const SH_COEFFICIENTS: usize = 9;

const Y0: f32 = 0.282_095;
const Y1: f32 = 0.488_603;
const Y2: f32 = 1.092_548;
const Y20: f32 = 0.315_392;
const Y22: f32 = 0.546_274;

/// Clamped cosine lobe convolution weights per band, normalized by pi
const COSINE_BANDS: [f32; 3] = [1.0, 2.0 / 3.0, 0.25];

/// Real SH basis evaluated in a unit direction
pub fn basis(dir: Vec3) -> [f32; SH_COEFFICIENTS] {
    let Vec3 { x, y, z } = dir;
    [
        Y0,
        Y1 * y,
        Y1 * z,
        Y1 * x,
        Y2 * x * y,
        Y2 * y * z,
        Y20 * (3.0 * z * z - 1.0),
        Y2 * x * z,
        Y22 * (x * x - y * y),
    ]
}

fn band(index: usize) -> usize {
    match index {
        0 => 0,
        1..=3 => 1,
        _ => 2,
    }
}

/// RGB spherical harmonic coefficients
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sh9 {
    pub coefficients: [Vec3; SH_COEFFICIENTS],
}

impl Sh9 {
    pub const ZERO: Self = Self {
        coefficients: [Vec3::ZERO; SH_COEFFICIENTS],
    };

    /// Projection of a clamped cosine lobe around `normal` carrying `value`
    pub fn cosine_lobe(normal: Vec3, value: Vec3) -> Self {
        let dir = normal.normalize_or_zero();
        let y = basis(dir);
        let mut sh = Self::ZERO;
        for (i, c) in sh.coefficients.iter_mut().enumerate() {
            *c = value * (y[i] * COSINE_BANDS[band(i)]);
        }
        sh
    }

    /// Radiance in direction `dir`
    pub fn evaluate(&self, dir: Vec3) -> Vec3 {
        let y = basis(dir.normalize_or_zero());
        self.coefficients
            .iter()
            .zip(y.iter())
            .fold(Vec3::ZERO, |acc, (c, y)| acc + *c * *y)
    }

    /// Irradiance for a surface facing `normal`
    pub fn irradiance(&self, normal: Vec3) -> Vec3 {
        let y = basis(normal.normalize_or_zero());
        let mut result = Vec3::ZERO;
        for (i, c) in self.coefficients.iter().enumerate() {
            result += *c * (y[i] * COSINE_BANDS[band(i)]);
        }
        result.max(Vec3::ZERO)
    }

    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        let mut out = *self;
        for (a, b) in out.coefficients.iter_mut().zip(other.coefficients.iter()) {
            *a = a.lerp(*b, t);
        }
        out
    }

    /// Clamp every coefficient to `[-limit, limit]`; NaN becomes zero
    pub fn clamp(&mut self, limit: f32) {
        let limit = limit.abs();
        for c in self.coefficients.iter_mut() {
            let v = Vec3::select(c.is_nan_mask(), Vec3::ZERO, *c);
            *c = v.clamp(Vec3::splat(-limit), Vec3::splat(limit));
        }
    }

    pub fn is_zero(&self) -> bool {
        self.coefficients.iter().all(|c| *c == Vec3::ZERO)
    }

    pub fn max_abs(&self) -> f32 {
        self.coefficients
            .iter()
            .map(|c| c.abs().max_element())
            .fold(0.0, f32::max)
    }
}

impl Add for Sh9 {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for Sh9 {
    fn add_assign(&mut self, rhs: Self) {
        for (a, b) in self.coefficients.iter_mut().zip(rhs.coefficients.iter()) {
            *a += *b;
        }
    }
}

impl Mul<f32> for Sh9 {
    type Output = Self;

    fn mul(mut self, rhs: f32) -> Self {
        for c in self.coefficients.iter_mut() {
            *c *= rhs;
        }
        self
    }
}
