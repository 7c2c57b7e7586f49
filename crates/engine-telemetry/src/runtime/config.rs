use clap::Parser;
use engine_core::DriverConfig;
use engine_io::protocol::DEFAULT_TOPIC;
use engine_io::{BridgeConfig, PayloadError, PayloadTemplate, QoS};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BIND: &str = "127.0.0.1:7000";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "engine-telemetry",
    version,
    about = "Synthetic engine telemetry generator",
    after_help = "Set RUST_LOG to override the log filter (e.g. RUST_LOG=debug,engine_io=trace)."
)]
pub struct RuntimeConfig {
    /// Run for a fixed duration then exit
    #[arg(long, env = "ENGINE_RUN_SECONDS", value_name = "SECS")]
    pub run_seconds: Option<u64>,

    /// Stop after generating this many readings
    #[arg(long, env = "ENGINE_TICKS")]
    pub ticks: Option<u64>,

    /// Seed the noise generator for a reproducible series
    #[arg(long, env = "ENGINE_SEED")]
    pub seed: Option<u64>,

    /// Generate ticks back to back, stamping them in simulated time
    #[arg(long)]
    pub fast: bool,

    /// Bridge TCP bind address
    #[arg(long, env = "ENGINE_BIND", value_name = "ADDR", default_value = DEFAULT_BIND)]
    pub bind: String,

    /// Disable the TCP bridge
    #[arg(long)]
    pub no_bridge: bool,

    /// Delivery guarantee: 0 at most once, 1 at least once
    #[arg(
        long,
        env = "ENGINE_QOS",
        default_value_t = 0,
        value_parser = clap::value_parser!(u8).range(0..=1)
    )]
    pub qos: u8,

    /// Topic stamped on every telemetry message
    #[arg(long, env = "ENGINE_TOPIC", default_value = DEFAULT_TOPIC)]
    pub topic: String,

    /// Withhold telemetry until the subscriber sends a hello
    #[arg(long)]
    pub require_handshake: bool,

    /// Time a QoS 1 message waits for its ack before redelivery
    #[arg(long, value_name = "MS", default_value_t = 2_000)]
    pub ack_timeout_ms: u64,

    /// Redeliveries before an unacknowledged message is dropped
    #[arg(long, default_value_t = 3)]
    pub max_redeliveries: u32,

    /// JSON payload template with {timestamp}, {temperature}, {oil_pressure} and {revolution}
    #[arg(long, env = "ENGINE_PAYLOAD_TEMPLATE", value_name = "PATH")]
    pub payload_template: Option<PathBuf>,

    /// Append each rendered payload to a JSONL file
    #[arg(long, value_name = "PATH")]
    pub jsonl: Option<PathBuf>,

    /// Do not log every reading
    #[arg(long)]
    pub quiet: bool,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, env = "ENGINE_LOG_DIR", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Serve Prometheus metrics on this address (e.g. 0.0.0.0:9090)
    #[arg(long, env = "ENGINE_METRICS_ADDR", value_name = "ADDR")]
    pub metrics_addr: Option<String>,

    /// Extra attempts per sink after a retryable publish failure
    #[arg(long, default_value_t = 2)]
    pub publish_retries: u32,
}

impl RuntimeConfig {
    pub fn qos(&self) -> QoS {
        QoS::from_level(self.qos).unwrap_or_default()
    }

    pub fn load_template(&self) -> Result<PayloadTemplate, PayloadError> {
        match &self.payload_template {
            Some(path) => PayloadTemplate::from_file(path),
            None => Ok(PayloadTemplate::default()),
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            realtime: !self.fast,
            max_ticks: self.ticks,
            publish_retries: self.publish_retries,
            ..DriverConfig::default()
        }
    }

    pub fn bridge_config(&self, template: PayloadTemplate) -> BridgeConfig {
        BridgeConfig {
            bind_addr: self.bind.clone(),
            topic: self.topic.clone(),
            qos: self.qos(),
            require_handshake: self.require_handshake,
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            max_redeliveries: self.max_redeliveries,
            template,
            ..BridgeConfig::default()
        }
    }
}
