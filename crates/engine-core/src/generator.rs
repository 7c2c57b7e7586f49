use crate::constants::{
    BASE_REVOLUTION, BASE_TEMPERATURE, MAX_PRESSURE, MAX_PRESSURE_REVOLUTION, MAX_REVOLUTION,
    MAX_TEMPERATURE, MIN_STOP_REVOLUTION, PERIOD_COEF,
};
use crate::random::UniformSource;
use serde::Serialize;

const GROWTH_MIN: f64 = 0.1;
const GROWTH_MAX: f64 = 0.2;
/// Governor band around redline: `[MAX - 9, MAX + 4]`.
const REDLINE_LOW: f64 = MAX_REVOLUTION - 9.0;
const REDLINE_HIGH: f64 = MAX_REVOLUTION + 4.0;
const DECAY_OFFSET: f64 = 10.0;
const DECAY_COEF: f64 = 0.4;
const DECAY_NOISE: f64 = 10.1;

const PRESSURE_COEF: f64 = MAX_PRESSURE / MAX_PRESSURE_REVOLUTION;
const PRESSURE_NOISE: f64 = 0.06;
/// Pressure noise is suppressed at or below this speed.
const PRESSURE_NOISE_MIN_REVOLUTION: f64 = 1.0;

const TEMPERATURE_COEF: f64 = 7.0 / 3000.0;
const TEMPERATURE_NOISE: f64 = 1.5;
/// Speed at which the temperature accumulator is in equilibrium.
const TEMPERATURE_NEUTRAL_REVOLUTION: f64 = 1.5 * BASE_REVOLUTION;
const TEMPERATURE_FLOOR_JITTER: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EngineState {
    pub revolution: f64,
    pub pressure: f64,
    pub temperature: f64,
}

impl EngineState {
    pub const fn new() -> Self {
        Self {
            revolution: 0.0,
            pressure: 0.0,
            temperature: BASE_TEMPERATURE,
        }
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives each tick's state from the previous one.
///
/// Within a tick the order is fixed: revolution first, then pressure and
/// temperature, both of which read the revolution already updated this tick.
/// Random draws are taken in that same order, so a scripted source replays
/// identically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadingGenerator;

impl ReadingGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn step<S: UniformSource + ?Sized>(
        &self,
        state: &mut EngineState,
        running: bool,
        src: &mut S,
    ) {
        state.revolution = next_revolution(state.revolution, running, src);
        state.pressure = next_pressure(state.revolution, src);
        state.temperature = next_temperature(state.temperature, state.revolution, src);
    }
}

/// Revolution model: proportional spin-up while running, decay toward a
/// stall when idle, noisy governor at redline.
pub fn next_revolution<S: UniformSource + ?Sized>(
    revolution: f64,
    running: bool,
    src: &mut S,
) -> f64 {
    let mut rev = revolution;

    if running {
        if rev < MAX_REVOLUTION {
            if rev < BASE_REVOLUTION {
                rev = BASE_REVOLUTION;
            }
            rev += PERIOD_COEF * rev * src.uniform(GROWTH_MIN, GROWTH_MAX);
        } else {
            rev = src.uniform(REDLINE_LOW, REDLINE_HIGH);
        }
    } else {
        let decay = (MAX_REVOLUTION - rev + DECAY_OFFSET) * DECAY_COEF
            + src.uniform(-1.0, 1.0) * DECAY_NOISE;
        rev -= PERIOD_COEF * decay;
        if rev < MIN_STOP_REVOLUTION {
            rev = 0.0;
        }
    }

    if rev > MAX_REVOLUTION {
        rev = src.uniform(REDLINE_LOW, REDLINE_HIGH);
    }

    rev.max(0.0)
}

/// Oil pressure follows speed linearly, with noise only while turning.
///
/// The resample above `MAX_PRESSURE` is not clamped again and may land
/// up to `PRESSURE_NOISE` above the cap.
pub fn next_pressure<S: UniformSource + ?Sized>(revolution: f64, src: &mut S) -> f64 {
    let noise = if revolution > PRESSURE_NOISE_MIN_REVOLUTION {
        src.uniform(-1.0, 1.0) * PRESSURE_NOISE
    } else {
        0.0
    };
    let pressure = revolution * PRESSURE_COEF + PERIOD_COEF * noise;

    if pressure > MAX_PRESSURE {
        MAX_PRESSURE + src.uniform(-1.0, 1.0) * PRESSURE_NOISE
    } else if pressure < 0.0 {
        0.0
    } else {
        pressure
    }
}

/// Temperature integrates toward the equilibrium set by current speed.
pub fn next_temperature<S: UniformSource + ?Sized>(
    temperature: f64,
    revolution: f64,
    src: &mut S,
) -> f64 {
    let add = (revolution - TEMPERATURE_NEUTRAL_REVOLUTION) * TEMPERATURE_COEF
        + src.uniform(-0.2, 0.2) * TEMPERATURE_NOISE;
    let temp = temperature + PERIOD_COEF * add;

    if temp > MAX_TEMPERATURE {
        MAX_TEMPERATURE + src.uniform(-0.5, 0.5) * TEMPERATURE_NOISE
    } else if temp < BASE_TEMPERATURE {
        src.uniform(
            BASE_TEMPERATURE - TEMPERATURE_FLOOR_JITTER,
            BASE_TEMPERATURE + TEMPERATURE_FLOOR_JITTER,
        )
    } else {
        temp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{MidpointSource, RngSource, ScriptedSource};

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn initial_state() {
        let state = EngineState::new();
        assert_eq!(state.revolution, 0.0);
        assert_eq!(state.pressure, 0.0);
        assert_close(state.temperature, BASE_TEMPERATURE);
    }

    #[test]
    fn spin_up_snaps_to_base_before_growth() {
        let mut src = MidpointSource;
        let rev = next_revolution(0.0, true, &mut src);
        // 500 + 0.5 * 500 * 0.15
        assert_close(rev, 537.5);
    }

    #[test]
    fn growth_uses_drawn_factor() {
        let mut low = ScriptedSource::new(vec![0.0]);
        let mut high = ScriptedSource::new(vec![1.0]);
        assert_close(next_revolution(1000.0, true, &mut low), 1050.0);
        assert_close(next_revolution(1000.0, true, &mut high), 1100.0);
    }

    #[test]
    fn overshoot_is_resampled_into_redline_band() {
        let mut src = MidpointSource;
        // 2900 * 1.075 overshoots and is pulled back to the band centre.
        let rev = next_revolution(2900.0, true, &mut src);
        assert_eq!(rev, 2997.5);
    }

    #[test]
    fn at_redline_resamples_band() {
        let mut src = ScriptedSource::new(vec![0.0]);
        assert_eq!(next_revolution(MAX_REVOLUTION, true, &mut src), REDLINE_LOW);
        assert_eq!(src.draws(), 1);
    }

    #[test]
    fn redline_resample_above_cap_is_drawn_again() {
        let mut src = ScriptedSource::new(vec![1.0, 0.0]);
        assert_eq!(next_revolution(3002.0, true, &mut src), REDLINE_LOW);
        assert_eq!(src.draws(), 2);
    }

    #[test]
    fn idle_decay_without_noise() {
        let mut src = MidpointSource;
        // decay = (3000 - 2000 + 10) * 0.4 = 404, scaled by 0.5.
        assert_close(next_revolution(2000.0, false, &mut src), 1798.0);
    }

    #[test]
    fn stall_snaps_to_zero() {
        let mut src = MidpointSource;
        assert_eq!(next_revolution(100.0, false, &mut src), 0.0);
        assert_eq!(next_revolution(0.0, false, &mut src), 0.0);
    }

    #[test]
    fn idle_near_redline_can_overshoot_and_is_resampled() {
        // Noise at -1 gives decay = 2.4 - 10.1 < 0, so speed rises past the cap.
        let mut src = ScriptedSource::new(vec![0.0, 0.5]);
        let rev = next_revolution(MAX_REVOLUTION + 4.0, false, &mut src);
        assert_eq!(rev, (REDLINE_LOW + REDLINE_HIGH) / 2.0);
    }

    #[test]
    fn pressure_tracks_speed_without_noise() {
        let mut src = MidpointSource;
        assert_close(next_pressure(1000.0, &mut src), 1000.0 * (6.0 / 2000.0));
    }

    #[test]
    fn pressure_at_standstill_draws_nothing() {
        let mut src = ScriptedSource::new(vec![1.0]);
        assert_eq!(next_pressure(0.0, &mut src), 0.0);
        assert_eq!(next_pressure(1.0, &mut src), 1.0 * PRESSURE_COEF);
        assert_eq!(src.draws(), 0);
    }

    #[test]
    fn pressure_noise_is_bounded() {
        let mut src = RngSource::seeded(3);
        for _ in 0..1000 {
            let p = next_pressure(1500.0, &mut src);
            let base = 1500.0 * PRESSURE_COEF;
            assert!((p - base).abs() <= PRESSURE_NOISE * PERIOD_COEF + 1e-12);
        }
    }

    #[test]
    fn pressure_over_cap_is_resampled_without_reclamp() {
        let mut src = ScriptedSource::new(vec![0.5, 1.0]);
        let p = next_pressure(2997.5, &mut src);
        assert_eq!(p, MAX_PRESSURE + PRESSURE_NOISE);
        assert!(p > MAX_PRESSURE);
    }

    #[test]
    fn temperature_rises_above_neutral_speed() {
        let mut src = MidpointSource;
        let t = next_temperature(50.0, 3000.0, &mut src);
        assert_close(t, 50.0 + 0.5 * 5.25);
    }

    #[test]
    fn temperature_floor_is_rerandomised() {
        let mut src = ScriptedSource::new(vec![0.5, 0.0]);
        let t = next_temperature(BASE_TEMPERATURE, 0.0, &mut src);
        assert_eq!(t, BASE_TEMPERATURE - TEMPERATURE_FLOOR_JITTER);
    }

    #[test]
    fn temperature_cap_is_rerandomised() {
        let mut src = ScriptedSource::new(vec![0.5, 1.0]);
        let t = next_temperature(MAX_TEMPERATURE, 3000.0, &mut src);
        assert_eq!(t, MAX_TEMPERATURE + 0.5 * TEMPERATURE_NOISE);
    }

    #[test]
    fn step_uses_updated_revolution() {
        let generator = ReadingGenerator::new();
        let mut state = EngineState::new();
        generator.step(&mut state, true, &mut MidpointSource);

        assert_close(state.revolution, 537.5);
        assert_eq!(state.pressure, state.revolution * PRESSURE_COEF);
        // 537.5 is below the neutral speed, so temperature falls under the
        // base and is re-randomised to the floor centre.
        assert_close(state.temperature, BASE_TEMPERATURE);
    }

    #[test]
    fn monotonic_warm_up_until_redline_band() {
        let generator = ReadingGenerator::new();
        let mut state = EngineState::new();
        let mut previous = state.revolution;

        for _ in 0..100 {
            generator.step(&mut state, true, &mut MidpointSource);
            if (REDLINE_LOW..=REDLINE_HIGH).contains(&state.revolution) {
                return;
            }
            assert!(state.revolution > previous);
            previous = state.revolution;
        }
        panic!("never reached the redline band");
    }
}
