use crate::constants::period;
use crate::duty::PhaseTransition;
use crate::envelope::{Envelope, EnvelopeViolation};
use crate::random::UniformSource;
use crate::simulation::{Reading, Simulation};
use crate::sink::{PublishError, ReadingSink};
use crate::timebase::TimeBase;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Longest single sleep between stop-flag checks.
const STOP_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct DriverConfig {
    pub period: Duration,
    /// Pause between ticks in real time; when false, ticks run back to back
    /// and timestamps advance in simulated time.
    pub realtime: bool,
    pub max_ticks: Option<u64>,
    /// Extra attempts per sink after a retryable failure.
    pub publish_retries: u32,
    pub envelope: Envelope,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            period: period(),
            realtime: true,
            max_ticks: None,
            publish_retries: 2,
            envelope: Envelope::default(),
        }
    }
}

#[derive(Clone, Default, Debug)]
pub struct DriverStats {
    pub ticks_executed: u64,
    pub ticks_late: u64,
    pub max_lateness_us: u64,
    pub phase_transitions: u64,
    pub publish_retries: u64,
    pub readings_dropped: u64,
    pub envelope_violations: u64,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("sink '{sink}' failed: {source}")]
    Sink {
        sink: String,
        #[source]
        source: PublishError,
    },
}

/// What happened during one tick, for observers.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub reading: Reading,
    pub transition: Option<PhaseTransition>,
    pub violation: Option<EnvelopeViolation>,
    pub retries: u32,
    pub dropped: Vec<String>,
}

pub trait TickObserver: Send {
    fn on_tick(&mut self, report: &TickReport);
}

impl<F: FnMut(&TickReport) + Send> TickObserver for F {
    fn on_tick(&mut self, report: &TickReport) {
        self(report)
    }
}

/// Runs the simulation at a fixed period and fans each reading out to the
/// registered sinks.
pub struct TickDriver<S: UniformSource> {
    sim: Simulation,
    src: S,
    config: DriverConfig,
    timebase: TimeBase,
    sinks: Vec<Box<dyn ReadingSink>>,
    observers: Vec<Box<dyn TickObserver>>,
    stats: DriverStats,
}

impl<S: UniformSource> TickDriver<S> {
    pub fn new(src: S, config: DriverConfig, timebase: TimeBase) -> Self {
        Self {
            sim: Simulation::new(),
            src,
            config,
            timebase,
            sinks: Vec::new(),
            observers: Vec::new(),
            stats: DriverStats::default(),
        }
    }

    pub fn add_sink(&mut self, sink: impl ReadingSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn add_observer(&mut self, observer: impl TickObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    /// Tick until `stop` is raised, `max_ticks` is reached, or a sink fails
    /// fatally.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<DriverStats, DriverError> {
        let mut next_tick = Instant::now();

        while !stop.load(Ordering::Relaxed) {
            if let Some(max) = self.config.max_ticks {
                if self.stats.ticks_executed >= max {
                    break;
                }
            }

            if self.config.realtime {
                let now = Instant::now();
                if now < next_tick {
                    if !sleep_until(next_tick, stop) {
                        break;
                    }
                } else if self.stats.ticks_executed > 0 {
                    let lateness = now.duration_since(next_tick).as_micros() as u64;
                    if lateness > 0 {
                        self.stats.ticks_late += 1;
                        self.stats.max_lateness_us = self.stats.max_lateness_us.max(lateness);
                    }
                }
                next_tick += self.config.period;
            }

            self.tick_once()?;
        }

        Ok(self.stats.clone())
    }

    /// Generate, check and publish a single reading.
    pub fn tick_once(&mut self) -> Result<TickReport, DriverError> {
        let timestamp_us = if self.config.realtime {
            self.timebase.unix_us()
        } else {
            self.timebase.tick_unix_us(self.sim.ticks(), self.config.period)
        };

        let reading = self.sim.tick(timestamp_us, &mut self.src);
        let transition = self.sim.last_transition();
        self.stats.ticks_executed += 1;
        if transition.is_some() {
            self.stats.phase_transitions += 1;
        }

        let violation = self.config.envelope.check(self.sim.state()).err();
        if let Some(v) = &violation {
            self.stats.envelope_violations += 1;
            log::warn!("tick {} outside envelope: {}", reading.tick, v);
        }

        let mut report = TickReport {
            reading,
            transition,
            violation,
            retries: 0,
            dropped: Vec::new(),
        };
        self.publish(&mut report)?;

        for observer in &mut self.observers {
            observer.on_tick(&report);
        }
        Ok(report)
    }

    fn publish(&mut self, report: &mut TickReport) -> Result<(), DriverError> {
        let attempts = self.config.publish_retries + 1;

        for sink in &mut self.sinks {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match sink.publish(&report.reading) {
                    Ok(()) => break,
                    Err(err) if err.is_retryable() && attempt < attempts => {
                        report.retries += 1;
                        self.stats.publish_retries += 1;
                        log::debug!(
                            "sink '{}' attempt {} failed: {}",
                            sink.name(),
                            attempt,
                            err
                        );
                    }
                    Err(err) if err.is_retryable() => {
                        self.stats.readings_dropped += 1;
                        report.dropped.push(sink.name().to_string());
                        log::warn!(
                            "sink '{}' dropped tick {} after {} attempts: {}",
                            sink.name(),
                            report.reading.tick,
                            attempt,
                            err
                        );
                        break;
                    }
                    Err(err) => {
                        log::error!("sink '{}' failed: {}", sink.name(), err);
                        return Err(DriverError::Sink {
                            sink: sink.name().to_string(),
                            source: err,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Sleep until `deadline`, waking early to honour `stop`. Returns false if
/// stopped.
fn sleep_until(deadline: Instant, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(STOP_POLL));
    }
}
