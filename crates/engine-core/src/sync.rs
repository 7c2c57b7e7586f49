use crate::simulation::Reading;
use crate::sink::{PublishError, ReadingSink};
use std::sync::{Arc, Mutex, PoisonError};

/// Latest reading shared between the driver thread and its observers
/// (bridge, metrics). Observers poll; nothing here blocks the driver for
/// longer than a copy.
#[derive(Debug, Default)]
pub struct LatestReading {
    slot: Mutex<Option<Reading>>,
}

impl LatestReading {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the driver every tick.
    pub fn store(&self, reading: Reading) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(reading);
    }

    /// Most recent reading, if any tick has run.
    pub fn load(&self) -> Option<Reading> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The latest reading when it is newer than `seen_tick`.
    pub fn newer_than(&self, seen_tick: Option<u64>) -> Option<Reading> {
        let reading = self.load()?;
        match seen_tick {
            Some(seen) if reading.tick <= seen => None,
            _ => Some(reading),
        }
    }
}

/// Sink end of a shared [`LatestReading`].
#[derive(Debug, Clone)]
pub struct LatestReadingSink {
    latest: Arc<LatestReading>,
}

impl LatestReadingSink {
    pub fn new(latest: Arc<LatestReading>) -> Self {
        Self { latest }
    }
}

impl ReadingSink for LatestReadingSink {
    fn name(&self) -> &str {
        "latest"
    }

    fn publish(&mut self, reading: &Reading) -> Result<(), PublishError> {
        self.latest.store(*reading);
        Ok(())
    }
}
