/// Names a reading field across outputs: its payload template placeholder
/// and its Prometheus metric.
#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub metric: &'static str,
    pub placeholder: &'static str,
}

pub const REVOLUTION_RPM: Tag = Tag {
    metric: "engine_revolution_rpm",
    placeholder: "{revolution}",
};

pub const OIL_PRESSURE_BAR: Tag = Tag {
    metric: "engine_oil_pressure_bar",
    placeholder: "{oil_pressure}",
};

pub const TEMPERATURE_C: Tag = Tag {
    metric: "engine_temperature_celsius",
    placeholder: "{temperature}",
};

pub const TIMESTAMP: Tag = Tag {
    metric: "engine_timestamp_us",
    placeholder: "{timestamp}",
};

pub const TICK: Tag = Tag {
    metric: "engine_ticks_total",
    placeholder: "{tick}",
};

pub const DUTY_PHASE: Tag = Tag {
    metric: "engine_duty_running",
    placeholder: "{phase}",
};

/// Placeholders every payload template must contain.
pub const REQUIRED_PLACEHOLDERS: &[Tag] =
    &[TIMESTAMP, TEMPERATURE_C, OIL_PRESSURE_BAR, REVOLUTION_RPM];
