// src/kalman.rs - Single-pole recursive estimator used for landmark smoothing
use nalgebra::Vector3;
use std::ops::{Add, Mul, Sub};

/// Initial error covariance of a freshly constructed filter.
pub const INITIAL_COVARIANCE: f64 = 0.1;

/// Values a `KalmanFilter` can track. Vectors are filtered jointly: every axis
/// shares one covariance and one gain.
pub trait Measurement:
    Copy + Add<Output = Self> + Sub<Output = Self> + Mul<f64, Output = Self>
{
    fn zero() -> Self;
}

impl Measurement for f64 {
    fn zero() -> Self {
        0.0
    }
}

impl Measurement for Vector3<f64> {
    fn zero() -> Self {
        Vector3::zeros()
    }
}

/// One-variable Kalman filter with a trivial (constant) state transition.
///
/// Predict and update are folded into a single `update` call:
///
/// ```text
/// gain = (p + q) / (p + q + r)
/// p    = r * (p + q) / (r + p + q)
/// x    = x + gain * (measurement - x)
/// ```
///
/// The estimate starts at zero, so the first output is `gain0 * measurement`
/// with `gain0 = (0.1 + q) / (0.1 + q + r)`. Callers feeding pixel-scale
/// positions see that bias decay over the first few frames.
#[derive(Debug, Clone)]
pub struct KalmanFilter<T: Measurement> {
    q: f64,
    r: f64,
    p: f64,
    x: T,
    gain: f64,
}

pub type ScalarKalmanFilter = KalmanFilter<f64>;
pub type VectorKalmanFilter = KalmanFilter<Vector3<f64>>;

impl<T: Measurement> KalmanFilter<T> {
    pub fn new(q: f64, r: f64) -> Self {
        Self {
            q,
            r,
            p: INITIAL_COVARIANCE,
            x: T::zero(),
            gain: 0.0,
        }
    }

    pub fn update(&mut self, measurement: T) -> T {
        let p_pred = self.p + self.q;
        self.gain = p_pred / (p_pred + self.r);
        self.p = self.r * p_pred / (self.r + p_pred);
        self.x = self.x + (measurement - self.x) * self.gain;
        self.x
    }

    /// Same as `update` but replaces the measurement noise first.
    pub fn update_with_noise(&mut self, measurement: T, r: f64) -> T {
        self.r = r;
        self.update(measurement)
    }

    /// Restarts tracking after the target was lost. Restores the
    /// construction-time covariance so the next output matches a fresh filter.
    pub fn reset(&mut self) {
        self.p = INITIAL_COVARIANCE;
        self.x = T::zero();
        self.gain = 0.0;
    }

    pub fn estimate(&self) -> T {
        self.x
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn error_covariance(&self) -> f64 {
        self.p
    }

    pub fn process_noise(&self) -> f64 {
        self.q
    }

    pub fn measurement_noise(&self) -> f64 {
        self.r
    }
}

/// Fixed bank of vector filters indexed by a stable landmark channel id.
#[derive(Debug, Clone)]
pub struct FilterBank<const N: usize> {
    channels: [VectorKalmanFilter; N],
}

impl<const N: usize> FilterBank<N> {
    pub fn new(q: f64, r: f64) -> Self {
        Self {
            channels: std::array::from_fn(|_| VectorKalmanFilter::new(q, r)),
        }
    }

    /// Pushes one measurement through every channel.
    pub fn update_all(&mut self, measurements: &[Vector3<f64>; N]) -> [Vector3<f64>; N] {
        std::array::from_fn(|i| self.channels[i].update(measurements[i]))
    }

    pub fn channel(&self, index: usize) -> Option<&VectorKalmanFilter> {
        self.channels.get(index)
    }

    pub fn reset(&mut self) {
        for channel in self.channels.iter_mut() {
            channel.reset();
        }
    }
}
