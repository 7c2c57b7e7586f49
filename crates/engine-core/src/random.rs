//! Injected randomness for the reading generator.
//!
//! Every noise term in the models is a fresh draw from a [`UniformSource`].
//! Production runs wrap a `rand` RNG; tests substitute [`ScriptedSource`] or
//! [`MidpointSource`] to make the engine a pure function of its inputs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait UniformSource {
    /// Draw from the closed interval `[low, high]`.
    fn uniform(&mut self, low: f64, high: f64) -> f64;
}

impl<S: UniformSource + ?Sized> UniformSource for &mut S {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        (**self).uniform(low, high)
    }
}

/// Adapter from any `rand` generator.
#[derive(Debug, Clone)]
pub struct RngSource<R> {
    rng: R,
}

impl<R: Rng> RngSource<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngSource<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> UniformSource for RngSource<R> {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if low >= high {
            return low;
        }
        self.rng.gen_range(low..=high)
    }
}

/// Replays a fixed cycle of unit draws, mapped onto each requested interval.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    units: Vec<f64>,
    cursor: usize,
    draws: u64,
}

impl ScriptedSource {
    /// `units` are positions within an interval: 0.0 is `low`, 1.0 is `high`.
    /// Values outside `[0, 1]` are clamped. An empty script behaves as `[0.5]`.
    pub fn new(units: impl Into<Vec<f64>>) -> Self {
        let mut units: Vec<f64> = units.into().into_iter().map(|u| u.clamp(0.0, 1.0)).collect();
        if units.is_empty() {
            units.push(0.5);
        }
        Self {
            units,
            cursor: 0,
            draws: 0,
        }
    }

    /// Number of draws taken so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }
}

impl UniformSource for ScriptedSource {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        let unit = self.units[self.cursor];
        self.cursor = (self.cursor + 1) % self.units.len();
        self.draws += 1;
        low + unit * (high - low)
    }
}

/// Always the centre of the interval; zeroes every symmetric noise term.
#[derive(Debug, Clone, Copy, Default)]
pub struct MidpointSource;

impl UniformSource for MidpointSource {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        (low + high) / 2.0
    }
}
