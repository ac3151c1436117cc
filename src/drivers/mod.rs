// src/drivers/mod.rs
pub mod buffer;
pub mod decoder;
pub mod discovery;
pub mod error;
pub mod gate;
pub mod link;

pub use buffer::SampleRing;
pub use decoder::{decode_pair, encode_sample, DecodedSamples, FrameDecoder};
pub use discovery::{
    find_port, port_matches, select_port, Connector, ManualConnector, SerialConnector,
    SimulatedConnector,
};
pub use error::AcquisitionError;
pub use gate::{NoiseGate, DEFAULT_NOISE_THRESHOLD};
pub use link::{DeviceLink, ManualLink, SerialLink, SimulatedLink};
