use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use serialport::{SerialPortInfo, SerialPortType};

use crate::drivers::link::{DeviceLink, ManualLink, SerialLink, SimulatedLink};
use crate::drivers::AcquisitionError;

/// Resolves and opens the board's link. One connector lives for the whole
/// session; each acquisition attempt calls `discover` then `open`.
pub trait Connector: Send {
    fn discover(&mut self) -> Result<String, AcquisitionError>;
    fn open(&mut self, port: &str) -> Result<Box<dyn DeviceLink>, AcquisitionError>;
}

/// Case-insensitive match of `pattern` against the port name and, for USB
/// adapters, the product, manufacturer and serial number strings.
pub fn port_matches(info: &SerialPortInfo, pattern: &str) -> bool {
    let needle = pattern.to_lowercase();
    let hit = |field: &str| field.to_lowercase().contains(&needle);
    if hit(info.port_name.as_str()) {
        return true;
    }
    match &info.port_type {
        SerialPortType::UsbPort(usb) => [&usb.product, &usb.manufacturer, &usb.serial_number]
            .into_iter()
            .flatten()
            .any(|field| hit(field.as_str())),
        _ => false,
    }
}

/// Picks the last matching port, as enumeration order puts the most
/// recently attached adapter at the end.
pub fn select_port(ports: &[SerialPortInfo], pattern: &str) -> Option<String> {
    ports
        .iter()
        .filter(|info| port_matches(info, pattern))
        .last()
        .map(|info| info.port_name.clone())
}

pub fn find_port(pattern: &str) -> Result<Option<String>, AcquisitionError> {
    let ports = serialport::available_ports()?;
    debug!("{} serial ports present", ports.len());
    Ok(select_port(&ports, pattern))
}

pub struct SerialConnector {
    pattern: String,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialConnector {
    pub fn new(pattern: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            pattern: pattern.into(),
            baud_rate,
            read_timeout,
        }
    }
}

impl Connector for SerialConnector {
    fn discover(&mut self) -> Result<String, AcquisitionError> {
        match find_port(&self.pattern)? {
            Some(port) => {
                info!("found {port} for \"{}\"", self.pattern);
                Ok(port)
            }
            None => Err(AcquisitionError::DeviceNotFound {
                pattern: self.pattern.clone(),
            }),
        }
    }

    fn open(&mut self, port: &str) -> Result<Box<dyn DeviceLink>, AcquisitionError> {
        Ok(Box::new(SerialLink::open(port, self.baud_rate, self.read_timeout)?))
    }
}

#[derive(Default)]
pub struct SimulatedConnector;

impl Connector for SimulatedConnector {
    fn discover(&mut self) -> Result<String, AcquisitionError> {
        Ok("simulated".to_owned())
    }

    fn open(&mut self, _port: &str) -> Result<Box<dyn DeviceLink>, AcquisitionError> {
        Ok(Box::new(SimulatedLink::new()))
    }
}

/// Hands out queued [`ManualLink`]s; discovery fails once the queue is empty.
pub struct ManualConnector {
    links: VecDeque<ManualLink>,
    attempts: Arc<AtomicUsize>,
}

impl ManualConnector {
    pub fn new(links: impl IntoIterator<Item = ManualLink>) -> Self {
        Self {
            links: links.into_iter().collect(),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn push(&mut self, link: ManualLink) {
        self.links.push_back(link);
    }

    /// Number of `discover` calls made so far.
    pub fn attempt_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.attempts)
    }
}

impl Connector for ManualConnector {
    fn discover(&mut self) -> Result<String, AcquisitionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.links.is_empty() {
            Err(AcquisitionError::DeviceNotFound {
                pattern: "manual".to_owned(),
            })
        } else {
            Ok("manual".to_owned())
        }
    }

    fn open(&mut self, port: &str) -> Result<Box<dyn DeviceLink>, AcquisitionError> {
        let link = self.links.pop_front().ok_or_else(|| AcquisitionError::DeviceNotFound {
            pattern: port.to_owned(),
        })?;
        Ok(Box::new(link))
    }
}
