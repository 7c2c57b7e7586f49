//! Fixed design parameters of the simulated machine.

use std::time::Duration;

pub const BASE_TEMPERATURE: f64 = 30.0;
pub const MAX_TEMPERATURE: f64 = 110.0;

pub const BASE_REVOLUTION: f64 = 500.0;
pub const MAX_REVOLUTION: f64 = 3000.0;
/// Below this speed the shaft stalls to a full stop when idling.
pub const MIN_STOP_REVOLUTION: f64 = 60.0;

pub const BASE_PRESSURE: f64 = 2.0;
pub const MAX_PRESSURE: f64 = 6.0;
/// Speed at which oil pressure would reach `MAX_PRESSURE` on the linear curve.
pub const MAX_PRESSURE_REVOLUTION: f64 = 2000.0;

pub const PERIOD_MILLIS: u64 = 500;
/// Tick length in seconds; scales every per-tick increment.
pub const PERIOD_COEF: f64 = PERIOD_MILLIS as f64 / 1000.0;

pub const WARMUP_SECS: f64 = 10.0;
pub const RUNNING_SECS: f64 = 60.0;
pub const COOLDOWN_SECS: f64 = 30.0;

pub const fn period() -> Duration {
    Duration::from_millis(PERIOD_MILLIS)
}

/// Convert a phase duration in simulated seconds into whole ticks.
pub fn secs_to_ticks(secs: f64) -> u32 {
    (secs / PERIOD_COEF).round() as u32
}
