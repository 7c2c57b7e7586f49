use crate::duty::{DutyCycleController, DutyPhase, PhaseTransition};
use crate::generator::{EngineState, ReadingGenerator};
use crate::random::UniformSource;
use serde::Serialize;

/// One tick's snapshot, handed to publishers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub tick: u64,
    pub timestamp_us: u64,
    pub phase: DutyPhase,
    pub revolution: f64,
    pub pressure: f64,
    pub temperature: f64,
}

impl Reading {
    pub fn running(&self) -> bool {
        self.phase.is_running()
    }
}

/// Engine state and duty phase, owned by whoever drives the ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    state: EngineState,
    duty: DutyCycleController,
    generator: ReadingGenerator,
    tick: u64,
    last_transition: Option<PhaseTransition>,
}

impl Simulation {
    pub fn new() -> Self {
        Self::from_parts(EngineState::new(), DutyCycleController::new())
    }

    pub fn from_parts(state: EngineState, duty: DutyCycleController) -> Self {
        Self {
            state,
            duty,
            generator: ReadingGenerator::new(),
            tick: 0,
            last_transition: None,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn duty(&self) -> &DutyCycleController {
        &self.duty
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Phase change caused by the most recent tick, if any.
    pub fn last_transition(&self) -> Option<PhaseTransition> {
        self.last_transition
    }

    /// Generate one reading under the current duty phase, then advance the
    /// duty cycle by one tick.
    pub fn tick<S: UniformSource + ?Sized>(&mut self, timestamp_us: u64, src: &mut S) -> Reading {
        let phase = self.duty.phase();
        self.generator.step(&mut self.state, phase.is_running(), src);

        let reading = Reading {
            tick: self.tick,
            timestamp_us,
            phase,
            revolution: self.state.revolution,
            pressure: self.state.pressure,
            temperature: self.state.temperature,
        };

        self.tick += 1;
        self.last_transition = self.duty.advance_tick();
        reading
    }

    pub fn into_parts(self) -> (EngineState, DutyCycleController) {
        (self.state, self.duty)
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

/// Functional form of [`Simulation::tick`]: consumes the previous state and
/// phase, returns the next ones plus the reading. The reading's `tick` is
/// always 0 here; [`Simulation`] keeps the running count.
pub fn advance<S: UniformSource + ?Sized>(
    state: EngineState,
    duty: DutyCycleController,
    timestamp_us: u64,
    src: &mut S,
) -> (EngineState, DutyCycleController, Reading) {
    let mut sim = Simulation::from_parts(state, duty);
    let reading = sim.tick(timestamp_us, src);
    let (state, duty) = sim.into_parts();
    (state, duty, reading)
}
