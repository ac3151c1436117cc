// src/engine.rs
//! Acquisition thread and the state it shares with the viewer.
//!
//! The sample window, the filter flag and the lifecycle state sit behind a
//! single mutex in [`SharedScope`]. The read thread decodes outside the lock
//! and takes it once per chunk to apply the noise gate and push; the viewer
//! takes it once per frame to copy the window. The lock is never held across
//! link I/O.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, trace, warn};

use crate::config::ScopeConfig;
use crate::drivers::{AcquisitionError, Connector, DeviceLink, FrameDecoder, NoiseGate, SampleRing};
use crate::types::{AcquisitionState, Fault, Sample, ScopeStatus};

struct ScopeShared {
    window: SampleRing,
    filter_enabled: bool,
    state: AcquisitionState,
    fault: Option<Fault>,
}

fn can_transition(from: AcquisitionState, to: AcquisitionState) -> bool {
    use AcquisitionState::*;
    matches!(
        (from, to),
        (Discovering, Connected)
            | (Discovering, Stopped)
            | (Connected, Running)
            | (Connected, Error)
            | (Connected, Stopped)
            | (Running, Error)
            | (Running, Stopping)
            | (Stopping, Stopped)
    )
}

/// Handle on one acquisition's window and flags. Cheap to clone; every
/// clone sees the same state.
#[derive(Clone)]
pub struct SharedScope {
    inner: Arc<Mutex<ScopeShared>>,
}

impl SharedScope {
    pub fn new(window_len: usize, filter_enabled: bool) -> Result<Self, AcquisitionError> {
        let window = SampleRing::new(window_len)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(ScopeShared {
                window,
                filter_enabled,
                state: AcquisitionState::Discovering,
                fault: None,
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ScopeShared> {
        // the guarded data stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the window, oldest first.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.lock().window.snapshot()
    }

    pub fn latest(&self) -> Sample {
        self.lock().window.latest()
    }

    pub fn window_len(&self) -> usize {
        self.lock().window.capacity()
    }

    pub fn state(&self) -> AcquisitionState {
        self.lock().state
    }

    pub fn fault(&self) -> Option<Fault> {
        self.lock().fault.clone()
    }

    pub fn status(&self) -> ScopeStatus {
        let shared = self.lock();
        ScopeStatus {
            state: shared.state,
            fault: shared.fault.clone(),
            filter_enabled: shared.filter_enabled,
        }
    }

    pub fn is_filter_enabled(&self) -> bool {
        self.lock().filter_enabled
    }

    pub fn set_filter(&self, enabled: bool) {
        self.lock().filter_enabled = enabled;
    }

    /// Flips the noise gate and returns the new setting.
    pub fn toggle_filter(&self) -> bool {
        let mut shared = self.lock();
        shared.filter_enabled = !shared.filter_enabled;
        debug!("noise filter {}", if shared.filter_enabled { "on" } else { "off" });
        shared.filter_enabled
    }

    /// Runs each sample, in order, through the gate against the current
    /// newest value and pushes the ones it lets through. Returns how many
    /// were pushed.
    pub fn offer(&self, samples: &[Sample], gate: &NoiseGate) -> usize {
        let mut shared = self.lock();
        if shared.state.is_terminal() {
            return 0;
        }
        let filter_enabled = shared.filter_enabled;
        let mut accepted = 0;
        for &sample in samples {
            if gate.accept(sample, shared.window.latest(), filter_enabled) {
                shared.window.push(sample);
                accepted += 1;
            }
        }
        accepted
    }

    fn transition(&self, to: AcquisitionState, fault: Option<Fault>) -> bool {
        let mut shared = self.lock();
        let from = shared.state;
        if !can_transition(from, to) {
            trace!("ignoring acquisition transition {from} -> {to}");
            return false;
        }
        shared.state = to;
        if fault.is_some() {
            shared.fault = fault;
        }
        debug!("acquisition {from} -> {to}");
        true
    }

    fn record_fault(&self, fault: Fault) {
        self.lock().fault = Some(fault);
    }

    fn reset_window(&self) {
        self.lock().window.reset();
    }

    fn settle_stopped(&self) {
        let mut shared = self.lock();
        if matches!(shared.state, AcquisitionState::Running | AcquisitionState::Stopping) {
            debug!("acquisition {} -> {}", shared.state, AcquisitionState::Stopped);
            shared.state = AcquisitionState::Stopped;
        }
    }
}

struct ReadLoop {
    link: Box<dyn DeviceLink>,
    decoder: FrameDecoder,
    gate: NoiseGate,
    scope: SharedScope,
    stop: Arc<AtomicBool>,
    read_chunk: usize,
    read_timeout: Duration,
}

impl ReadLoop {
    fn run(mut self) {
        let mut buf = vec![0u8; self.read_chunk];
        let mut decoded = Vec::with_capacity(self.read_chunk / 2 + 1);
        while !self.stop.load(Ordering::Acquire) {
            let n = match self.link.read(&mut buf, self.read_timeout) {
                Ok(n) => n,
                Err(e) => {
                    self.link.close();
                    if self.stop.load(Ordering::Acquire) {
                        debug!("read failed while stopping: {e}");
                        self.scope.settle_stopped();
                    } else {
                        warn!("acquisition link failed: {e}");
                        self.scope
                            .transition(AcquisitionState::Error, Some(Fault::Link(e.to_string())));
                    }
                    return;
                }
            };
            if n == 0 {
                continue;
            }
            decoded.clear();
            decoded.extend(self.decoder.feed(&buf[..n]));
            if !decoded.is_empty() {
                let pushed = self.scope.offer(&decoded, &self.gate);
                trace!("read {n} bytes, decoded {}, pushed {pushed}", decoded.len());
            }
        }
        self.link.close();
        debug!(
            "acquisition thread exiting, {} bytes discarded by decoder",
            self.decoder.discarded()
        );
        self.scope.settle_stopped();
    }
}

/// One acquisition attempt: discover, open, then read on a dedicated thread
/// until stopped or the link fails. A failed loop is not restarted; the
/// owner builds a fresh one (see [`crate::supervisor::Supervisor`]).
pub struct AcquisitionLoop {
    scope: SharedScope,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    gate: NoiseGate,
    read_chunk: usize,
    read_timeout: Duration,
    chunk_reset: bool,
}

impl AcquisitionLoop {
    pub fn new(config: &ScopeConfig) -> Result<Self, AcquisitionError> {
        Ok(Self {
            scope: SharedScope::new(config.window_len, config.filter_on_start)?,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            gate: NoiseGate::new(config.noise_threshold),
            read_chunk: config.read_chunk.max(1),
            read_timeout: config.read_timeout(),
            chunk_reset: config.legacy_chunk_reset,
        })
    }

    /// Discovers and opens the link, then spawns the read thread.
    ///
    /// A discovery miss leaves the loop in `Discovering` with
    /// `Fault::DeviceNotFound`; an open failure moves it to `Error`.
    pub fn start(&mut self, connector: &mut dyn Connector) -> Result<(), AcquisitionError> {
        let state = self.scope.state();
        if state != AcquisitionState::Discovering || self.worker.is_some() {
            return Err(AcquisitionError::NotStartable { state });
        }

        let port = match connector.discover() {
            Ok(port) => port,
            Err(e) => {
                let fault = if e.is_discovery_failure() {
                    Fault::DeviceNotFound
                } else {
                    Fault::Link(e.to_string())
                };
                debug!("discovery failed: {e}");
                self.scope.record_fault(fault);
                return Err(e);
            }
        };
        self.scope.transition(AcquisitionState::Connected, None);

        let link = match connector.open(&port) {
            Ok(link) => link,
            Err(e) => {
                warn!("failed to open {port}: {e}");
                self.scope
                    .transition(AcquisitionState::Error, Some(Fault::Link(e.to_string())));
                return Err(e);
            }
        };

        self.scope.reset_window();
        self.scope.transition(AcquisitionState::Running, None);

        let read_loop = ReadLoop {
            link,
            decoder: FrameDecoder::with_chunk_reset(self.chunk_reset),
            gate: self.gate,
            scope: self.scope.clone(),
            stop: Arc::clone(&self.stop),
            read_chunk: self.read_chunk,
            read_timeout: self.read_timeout,
        };
        let handle = thread::Builder::new()
            .name("acquisition".to_owned())
            .spawn(move || read_loop.run());
        match handle {
            Ok(handle) => {
                info!("acquiring from {port}");
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.scope
                    .transition(AcquisitionState::Error, Some(Fault::Link(e.to_string())));
                Err(e.into())
            }
        }
    }

    /// One-shot and idempotent. The read thread notices within one read timeout.
    pub fn request_stop(&self) {
        if self.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        if !self.scope.transition(AcquisitionState::Stopping, None) {
            // never got as far as Running
            self.scope.transition(AcquisitionState::Stopped, None);
        }
    }

    /// Waits for the read thread, if any, to exit.
    pub fn join(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("acquisition thread panicked");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |h| h.is_finished())
    }

    pub fn scope(&self) -> &SharedScope {
        &self.scope
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        self.scope.snapshot()
    }

    pub fn latest(&self) -> Sample {
        self.scope.latest()
    }

    pub fn state(&self) -> AcquisitionState {
        self.scope.state()
    }

    pub fn status(&self) -> ScopeStatus {
        self.scope.status()
    }

    pub fn is_filter_enabled(&self) -> bool {
        self.scope.is_filter_enabled()
    }

    pub fn toggle_filter(&self) -> bool {
        self.scope.toggle_filter()
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        self.request_stop();
        self.join();
    }
}
