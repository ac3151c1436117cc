use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;
use serialport::SerialPort;

use crate::drivers::decoder::encode_sample;
use crate::drivers::AcquisitionError;
use crate::types::{Sample, MAX_SAMPLE};

/// Byte-oriented connection to the acquisition board.
pub trait DeviceLink: Send {
    /// Reads up to `buf.len()` bytes, waiting at most `timeout`.
    /// A timeout with nothing received is `Ok(0)`, not an error.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, AcquisitionError>;
    fn close(&mut self);
}

/// USB-serial adapter opened at a fixed bit rate.
pub struct SerialLink {
    port_name: String,
    port: Option<Box<dyn SerialPort>>,
    timeout: Duration,
}

impl SerialLink {
    pub fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<Self, AcquisitionError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(timeout)
            .open()?;
        info!("opened {port_name} at {baud_rate} baud");
        Ok(Self {
            port_name: port_name.to_string(),
            port: Some(port),
            timeout,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl DeviceLink for SerialLink {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, AcquisitionError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))?;
        if timeout != self.timeout {
            port.set_timeout(timeout)?;
            self.timeout = timeout;
        }
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("closed {}", self.port_name);
        }
    }
}

enum Scripted {
    Bytes(Vec<u8>),
    Fail(io::ErrorKind),
}

/// Plays back a fixed script of chunks and failures.
/// Useful for tests and deterministic playback; once the script runs out
/// every read times out.
pub struct ManualLink {
    script: VecDeque<Scripted>,
    closes: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
    closed: bool,
}

impl ManualLink {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            closes: Arc::new(AtomicUsize::new(0)),
            reads: Arc::new(AtomicUsize::new(0)),
            closed: false,
        }
    }

    pub fn with_chunk(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.script.push_back(Scripted::Bytes(bytes.into()));
        self
    }

    pub fn with_failure(mut self, kind: io::ErrorKind) -> Self {
        self.script.push_back(Scripted::Fail(kind));
        self
    }

    /// Shared count of `close` calls, readable after the link moved to another thread.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }

    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }
}

impl Default for ManualLink {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLink for ManualLink {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, AcquisitionError> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "manual link closed").into());
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(Scripted::Bytes(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.script.push_front(Scripted::Bytes(bytes.split_off(n)));
                }
                Ok(n)
            }
            Some(Scripted::Fail(kind)) => Err(io::Error::new(kind, "scripted link failure").into()),
            None => {
                thread::sleep(timeout);
                Ok(0)
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Stand-in board that streams a noisy sine wave, with the odd garbage
/// byte thrown in, so the viewer can run without hardware.
pub struct SimulatedLink {
    phase: f32,
    step: f32,
    samples_per_read: usize,
    outgoing: VecDeque<u8>,
    open: bool,
}

impl SimulatedLink {
    pub fn new() -> Self {
        Self {
            phase: 0.0,
            step: TAU / 125.0,
            samples_per_read: 10,
            outgoing: VecDeque::new(),
            open: true,
        }
    }

    fn next_value(&mut self, rng: &mut impl Rng) -> Sample {
        self.phase = (self.phase + self.step) % TAU;
        let noise: f32 = rng.gen_range(-3.0..=3.0);
        let value = 512.0 + 380.0 * self.phase.sin() + noise;
        value.round().clamp(0.0, MAX_SAMPLE as f32) as Sample
    }
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLink for SimulatedLink {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, AcquisitionError> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "simulated link closed").into());
        }
        thread::sleep(timeout.min(Duration::from_millis(5)));
        let mut rng = rand::thread_rng();
        for _ in 0..self.samples_per_read {
            if rng.gen_ratio(1, 50) {
                self.outgoing.push_back(rng.gen_range(0..96));
            }
            let value = self.next_value(&mut rng);
            self.outgoing.extend(encode_sample(value));
        }
        let n = self.outgoing.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(self.outgoing.drain(..n)) {
            *slot = byte;
        }
        if self.outgoing.len() > 4096 {
            debug!("simulated link dropping {} queued bytes", self.outgoing.len());
            self.outgoing.clear();
        }
        Ok(n)
    }

    fn close(&mut self) {
        if !self.open {
            warn!("simulated link closed twice");
        }
        self.open = false;
    }
}
