use crate::constants::{BASE_TEMPERATURE, MAX_PRESSURE, MAX_REVOLUTION, MAX_TEMPERATURE};
use crate::generator::EngineState;
use thiserror::Error;

/// Operating envelope of the generated state, including the jitter margins
/// the clamps are allowed to overshoot by.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub max_revolution: f64,
    pub max_pressure: f64,
    pub min_temperature: f64,
    pub max_temperature: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EnvelopeViolation {
    #[error("non-finite state (revolution={revolution}, pressure={pressure}, temperature={temperature})")]
    NonFinite {
        revolution: f64,
        pressure: f64,
        temperature: f64,
    },
    #[error("revolution {value} outside [0, {limit}]")]
    Revolution { value: f64, limit: f64 },
    #[error("pressure {value} outside [0, {limit}]")]
    Pressure { value: f64, limit: f64 },
    #[error("temperature {value} outside [{min}, {max}]")]
    Temperature { value: f64, min: f64, max: f64 },
}

impl Envelope {
    pub fn check(&self, state: &EngineState) -> Result<(), EnvelopeViolation> {
        let EngineState {
            revolution,
            pressure,
            temperature,
        } = *state;

        if !revolution.is_finite() || !pressure.is_finite() || !temperature.is_finite() {
            return Err(EnvelopeViolation::NonFinite {
                revolution,
                pressure,
                temperature,
            });
        }
        if !(0.0..=self.max_revolution).contains(&revolution) {
            return Err(EnvelopeViolation::Revolution {
                value: revolution,
                limit: self.max_revolution,
            });
        }
        if !(0.0..=self.max_pressure).contains(&pressure) {
            return Err(EnvelopeViolation::Pressure {
                value: pressure,
                limit: self.max_pressure,
            });
        }
        if !(self.min_temperature..=self.max_temperature).contains(&temperature) {
            return Err(EnvelopeViolation::Temperature {
                value: temperature,
                min: self.min_temperature,
                max: self.max_temperature,
            });
        }
        Ok(())
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            max_revolution: MAX_REVOLUTION + 4.0,
            max_pressure: MAX_PRESSURE + 0.06,
            min_temperature: BASE_TEMPERATURE - 0.1,
            // U(-0.5, 0.5) scaled by the 1.5 noise coefficient
            max_temperature: MAX_TEMPERATURE + 0.75,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_inside() {
        assert!(Envelope::default().check(&EngineState::new()).is_ok());
    }

    #[test]
    fn rejects_nan() {
        let state = EngineState {
            revolution: f64::NAN,
            ..EngineState::new()
        };
        assert!(matches!(
            Envelope::default().check(&state),
            Err(EnvelopeViolation::NonFinite { .. })
        ));
    }

    #[test]
    fn rejects_negative_pressure() {
        let state = EngineState {
            pressure: -0.01,
            ..EngineState::new()
        };
        assert!(matches!(
            Envelope::default().check(&state),
            Err(EnvelopeViolation::Pressure { .. })
        ));
    }

    #[test]
    fn rejects_overspeed() {
        let state = EngineState {
            revolution: 3004.5,
            ..EngineState::new()
        };
        let err = Envelope::default().check(&state).unwrap_err();
        assert_eq!(err.to_string(), "revolution 3004.5 outside [0, 3004]");
    }

    #[test]
    fn rejects_cold_engine() {
        let state = EngineState {
            temperature: 29.0,
            ..EngineState::new()
        };
        assert!(matches!(
            Envelope::default().check(&state),
            Err(EnvelopeViolation::Temperature { .. })
        ));
    }
}
