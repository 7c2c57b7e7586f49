pub mod bridge;
pub mod jsonl;
pub mod metrics;
pub mod payload;
pub mod protocol;

pub use bridge::{run_bridge, Bridge, BridgeConfig, BridgeError};
pub use jsonl::JsonlSink;
pub use metrics::{init_metrics, serve_metrics};
pub use payload::{PayloadError, PayloadTemplate};
pub use protocol::{IncomingMessage, ProtocolVersion, QoS, TelemetryMsg};
