//! Live capture of 10-bit ADC samples streamed from a microcontroller over
//! a USB-serial link.
//!
//! [`engine::AcquisitionLoop`] owns the link on its own thread and feeds a
//! fixed-length window that the viewer copies once per frame;
//! [`supervisor::Supervisor`] rebuilds the loop whenever the device goes
//! missing.
pub mod config;
pub mod drivers;
pub mod engine;
pub mod supervisor;
pub mod types;

pub use config::ScopeConfig;
pub use engine::{AcquisitionLoop, SharedScope};
pub use supervisor::{RetryPolicy, Supervisor};
pub use types::{AcquisitionState, Fault, Sample, ScopeStatus};
