// src/types.rs
use std::fmt;

/// One 10-bit ADC reading, always in `0..=MAX_SAMPLE`.
pub type Sample = u16;

pub const MAX_SAMPLE: Sample = 1023;

// Acquisition lifecycle
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum AcquisitionState {
    Discovering,
    Connected,
    Running,
    Error,
    Stopping,
    Stopped,
}

impl AcquisitionState {
    /// No transition leaves this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, AcquisitionState::Error | AcquisitionState::Stopped)
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcquisitionState::Discovering => "discovering",
            AcquisitionState::Connected => "connected",
            AcquisitionState::Running => "running",
            AcquisitionState::Error => "error",
            AcquisitionState::Stopping => "stopping",
            AcquisitionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

// Why the last attempt did not reach Running
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Fault {
    DeviceNotFound,
    Link(String),
}

/// What the viewer needs each frame to pick between status text and the trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeStatus {
    pub state: AcquisitionState,
    pub fault: Option<Fault>,
    pub filter_enabled: bool,
}

/// Converts a raw reading to volts against the ADC full-scale reference.
pub fn sample_to_volts(sample: Sample, full_scale_volts: f32) -> f32 {
    sample as f32 / MAX_SAMPLE as f32 * full_scale_volts
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn full_scale_maps_to_reference() {
        assert_eq!(sample_to_volts(0, 5.0), 0.0);
        assert!((sample_to_volts(MAX_SAMPLE, 5.0) - 5.0).abs() < 1e-6);
        assert!((sample_to_volts(512, 5.0) - 2.502).abs() < 1e-3);
    }
}
