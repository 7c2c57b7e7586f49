use crate::console::ConsoleSink;
use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry::{self, MetricsObserver};
use clap::Parser;
use engine_core::{
    DriverError, DriverStats, LatestReading, LatestReadingSink, RngSource, TickDriver, TickReport,
    TimeBase,
};
use engine_io::{Bridge, BridgeError, JsonlSink, PayloadError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

const WAIT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to initialise logging: {0}")]
    Logging(#[source] std::io::Error),
    #[error("invalid payload template: {0}")]
    Template(#[from] PayloadError),
    #[error("failed to open {path}: {source}")]
    Jsonl {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("driver thread panicked")]
    DriverPanic,
}

pub fn run_from_args() -> Result<(), AppError> {
    run(RuntimeConfig::parse())
}

pub fn run(config: RuntimeConfig) -> Result<(), AppError> {
    let _log_guard =
        init_tracing(config.json_logs, config.log_dir.as_deref()).map_err(AppError::Logging)?;

    let result = serve(&config);
    if let Err(e) = &result {
        error!(error = %e, "Engine telemetry stopped with an error");
    }
    result
}

fn serve(config: &RuntimeConfig) -> Result<(), AppError> {
    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let template = config.load_template()?;
    let latest = Arc::new(LatestReading::new());
    let timebase = TimeBase::new();
    let stop = Arc::new(AtomicBool::new(false));

    let bridge_handle = if config.no_bridge {
        info!("Bridge disabled");
        None
    } else {
        let bridge = Bridge::bind(config.bridge_config(template.clone()))?;
        if let Ok(addr) = bridge.local_addr() {
            info!(addr = %addr, "Starting bridge");
        }
        let latest_bridge = Arc::clone(&latest);
        let stop_bridge = Arc::clone(&stop);
        Some(thread::spawn(move || {
            bridge.run(latest_bridge, timebase, stop_bridge);
        }))
    };

    let src = match config.seed {
        Some(seed) => RngSource::seeded(seed),
        None => RngSource::from_entropy(),
    };
    let driver_config = config.driver_config();

    info!(
        period_ms = driver_config.period.as_millis() as u64,
        realtime = driver_config.realtime,
        max_ticks = ?driver_config.max_ticks,
        seed = ?config.seed,
        "Starting engine simulation"
    );

    let mut driver = TickDriver::new(src, driver_config, timebase);
    driver.add_sink(LatestReadingSink::new(Arc::clone(&latest)));
    if !config.quiet {
        driver.add_sink(ConsoleSink);
    }
    if let Some(path) = &config.jsonl {
        let sink = JsonlSink::new(path, template).map_err(|source| AppError::Jsonl {
            path: path.clone(),
            source,
        })?;
        info!(path = %sink.path().display(), "Writing readings to JSONL");
        driver.add_sink(sink);
    }
    driver.add_observer(MetricsObserver);
    driver.add_observer(log_transitions);

    let stop_driver = Arc::clone(&stop);
    let driver_handle = thread::spawn(move || driver.run(&stop_driver));

    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        let deadline = Instant::now() + Duration::from_secs(seconds);
        while !driver_handle.is_finished() && Instant::now() < deadline {
            thread::sleep(WAIT_POLL);
        }
        stop.store(true, Ordering::Relaxed);
    }

    let outcome = driver_handle.join();
    stop.store(true, Ordering::Relaxed);
    if let Some(handle) = bridge_handle {
        let _ = handle.join();
    }

    let stats = outcome.map_err(|_| AppError::DriverPanic)??;
    log_stats(&stats);
    Ok(())
}

fn log_transitions(report: &TickReport) {
    if let Some(transition) = report.transition {
        if transition.to.is_running() {
            info!(tick = report.reading.tick, "Engine on");
        } else if transition.from.is_running() {
            info!(tick = report.reading.tick, "Engine off");
        }
        debug!(
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            "Duty phase changed"
        );
    }
}

fn log_stats(stats: &DriverStats) {
    info!(
        ticks_executed = stats.ticks_executed,
        ticks_late = stats.ticks_late,
        max_lateness_us = stats.max_lateness_us,
        phase_transitions = stats.phase_transitions,
        publish_retries = stats.publish_retries,
        readings_dropped = stats.readings_dropped,
        envelope_violations = stats.envelope_violations,
        "Run complete"
    );
}
