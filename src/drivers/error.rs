use thiserror::Error;

use crate::types::AcquisitionState;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("no serial port matching \"{pattern}\"")]
    DeviceNotFound { pattern: String },
    #[error("link i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("sample window must hold at least one sample")]
    InvalidCapacity,
    #[error("acquisition cannot start from state {state}")]
    NotStartable { state: AcquisitionState },
}

impl AcquisitionError {
    /// Discovery misses are retried; everything else ends the current loop.
    pub fn is_discovery_failure(&self) -> bool {
        matches!(self, AcquisitionError::DeviceNotFound { .. })
    }
}
