use engine_core::sink::{PublishError, ReadingSink};
use engine_core::Reading;
use tracing::info;

/// Logs every reading at info level.
pub struct ConsoleSink;

impl ReadingSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn publish(&mut self, reading: &Reading) -> Result<(), PublishError> {
        info!(
            tick = reading.tick,
            phase = reading.phase.as_str(),
            revolution = reading.revolution,
            oil_pressure = reading.pressure,
            temperature = reading.temperature,
            "Engine reading"
        );
        Ok(())
    }
}
