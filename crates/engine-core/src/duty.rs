use crate::constants::{secs_to_ticks, COOLDOWN_SECS, RUNNING_SECS, WARMUP_SECS};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DutyPhase {
    #[default]
    WarmupIdle,
    Running,
    CooldownIdle,
}

impl DutyPhase {
    pub fn is_running(self) -> bool {
        matches!(self, DutyPhase::Running)
    }

    pub fn next(self) -> Self {
        match self {
            DutyPhase::WarmupIdle => DutyPhase::Running,
            DutyPhase::Running => DutyPhase::CooldownIdle,
            DutyPhase::CooldownIdle => DutyPhase::WarmupIdle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DutyPhase::WarmupIdle => "warmup_idle",
            DutyPhase::Running => "running",
            DutyPhase::CooldownIdle => "cooldown_idle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: DutyPhase,
    pub to: DutyPhase,
}

/// Tick counts for each phase of the duty cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutySchedule {
    pub warmup_ticks: u32,
    pub running_ticks: u32,
    pub cooldown_ticks: u32,
}

impl DutySchedule {
    pub fn ticks_for(&self, phase: DutyPhase) -> u32 {
        match phase {
            DutyPhase::WarmupIdle => self.warmup_ticks,
            DutyPhase::Running => self.running_ticks,
            DutyPhase::CooldownIdle => self.cooldown_ticks,
        }
    }

    pub fn cycle_ticks(&self) -> u32 {
        self.warmup_ticks + self.running_ticks + self.cooldown_ticks
    }
}

impl Default for DutySchedule {
    fn default() -> Self {
        Self {
            warmup_ticks: secs_to_ticks(WARMUP_SECS),
            running_ticks: secs_to_ticks(RUNNING_SECS),
            cooldown_ticks: secs_to_ticks(COOLDOWN_SECS),
        }
    }
}

/// Counts ticks through warm-up, running and cool-down windows, forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DutyCycleController {
    schedule: DutySchedule,
    phase: DutyPhase,
    ticks_in_phase: u32,
}

impl DutyCycleController {
    pub fn new() -> Self {
        Self::with_schedule(DutySchedule::default())
    }

    pub(crate) fn with_schedule(schedule: DutySchedule) -> Self {
        let mut controller = Self {
            schedule,
            phase: DutyPhase::WarmupIdle,
            ticks_in_phase: 0,
        };
        controller.skip_empty_phases();
        controller
    }

    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }

    pub fn phase(&self) -> DutyPhase {
        self.phase
    }

    pub fn ticks_in_phase(&self) -> u32 {
        self.ticks_in_phase
    }

    pub fn ticks_remaining(&self) -> u32 {
        self.schedule
            .ticks_for(self.phase)
            .saturating_sub(self.ticks_in_phase)
    }

    /// Count one elapsed tick. Returns the transition when the current
    /// phase's tick budget is used up.
    pub fn advance_tick(&mut self) -> Option<PhaseTransition> {
        self.ticks_in_phase += 1;
        if self.ticks_in_phase < self.schedule.ticks_for(self.phase) {
            return None;
        }

        let from = self.phase;
        self.phase = self.phase.next();
        self.ticks_in_phase = 0;
        self.skip_empty_phases();
        log::debug!("duty phase {} -> {}", from.as_str(), self.phase.as_str());
        Some(PhaseTransition {
            from,
            to: self.phase,
        })
    }

    fn skip_empty_phases(&mut self) {
        if self.schedule.cycle_ticks() == 0 {
            return;
        }
        while self.schedule.ticks_for(self.phase) == 0 {
            self.phase = self.phase.next();
        }
    }
}

impl Default for DutyCycleController {
    fn default() -> Self {
        Self::new()
    }
}
