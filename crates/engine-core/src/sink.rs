use crate::simulation::Reading;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    /// Transient failure; the same reading may be offered again.
    #[error("retryable publish failure: {0}")]
    Retryable(String),
    /// The sink cannot continue.
    #[error("fatal publish failure: {0}")]
    Fatal(String),
}

impl PublishError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PublishError::Retryable(_))
    }
}

impl From<std::io::Error> for PublishError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                PublishError::Retryable(err.to_string())
            }
            _ => PublishError::Fatal(err.to_string()),
        }
    }
}

/// Consumer of generated readings, called once per tick by the driver.
pub trait ReadingSink: Send {
    fn name(&self) -> &str;
    fn publish(&mut self, reading: &Reading) -> Result<(), PublishError>;
}

impl<T: ReadingSink + ?Sized> ReadingSink for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn publish(&mut self, reading: &Reading) -> Result<(), PublishError> {
        (**self).publish(reading)
    }
}

/// Collects readings in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    pub readings: Vec<Reading>,
}

impl ReadingSink for VecSink {
    fn name(&self) -> &str {
        "vec"
    }

    fn publish(&mut self, reading: &Reading) -> Result<(), PublishError> {
        self.readings.push(*reading);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn io_errors_are_classified() {
        let timed_out: PublishError = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert!(timed_out.is_retryable());

        let denied: PublishError = io::Error::new(io::ErrorKind::PermissionDenied, "no").into();
        assert!(!denied.is_retryable());
    }
}
