// src/supervisor.rs
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::{RetryConfig, ScopeConfig};
use crate::drivers::{AcquisitionError, Connector, SampleRing};
use crate::engine::AcquisitionLoop;
use crate::types::{AcquisitionState, Sample, ScopeStatus};

/// How soon a replacement acquisition may be tried after a failed one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry on every poll, i.e. once per viewer frame.
    EveryPoll,
    /// Double the wait after each consecutive failure, capped at `max`.
    Backoff { initial: Duration, max: Duration },
}

impl RetryPolicy {
    pub fn delay_after(&self, failures: u32) -> Duration {
        match *self {
            RetryPolicy::EveryPoll => Duration::ZERO,
            RetryPolicy::Backoff { initial, max } => {
                let doublings = failures.saturating_sub(1).min(16);
                initial.saturating_mul(1 << doublings).min(max)
            }
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        match config {
            RetryConfig::EveryPoll => RetryPolicy::EveryPoll,
            RetryConfig::Backoff { initial_ms, max_ms } => RetryPolicy::Backoff {
                initial: Duration::from_millis(initial_ms),
                max: Duration::from_millis(max_ms),
            },
        }
    }
}

/// Restart-on-failure owner of the current [`AcquisitionLoop`]. The viewer
/// calls [`Supervisor::poll`] once per frame; a loop that failed discovery
/// or hit a link error is replaced by a fresh one when the policy allows.
pub struct Supervisor {
    connector: Box<dyn Connector>,
    config: ScopeConfig,
    policy: RetryPolicy,
    current: Option<AcquisitionLoop>,
    failures: u32,
    next_attempt: Option<Instant>,
    stopped: bool,
}

impl Supervisor {
    pub fn new(connector: Box<dyn Connector>, config: ScopeConfig) -> Result<Self, AcquisitionError> {
        SampleRing::new(config.window_len)?;
        Ok(Self {
            connector,
            policy: config.retry.into(),
            config,
            current: None,
            failures: 0,
            next_attempt: None,
            stopped: false,
        })
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    fn needs_replacement(&self) -> bool {
        match &self.current {
            None => true,
            Some(acquisition) => matches!(
                acquisition.state(),
                AcquisitionState::Discovering | AcquisitionState::Error
            ),
        }
    }

    pub fn poll(&mut self, now: Instant) -> ScopeStatus {
        if !self.stopped
            && self.needs_replacement()
            && self.next_attempt.map_or(true, |at| now >= at)
        {
            self.attempt(now);
        }
        self.status()
    }

    fn attempt(&mut self, now: Instant) {
        let filter_enabled = self
            .current
            .as_ref()
            .map_or(self.config.filter_on_start, |a| a.is_filter_enabled());
        if let Some(previous) = self.current.take() {
            if previous.state() == AcquisitionState::Error {
                info!("replacing failed acquisition");
            }
        }

        let mut acquisition = match AcquisitionLoop::new(&self.config) {
            Ok(acquisition) => acquisition,
            Err(e) => {
                warn!("cannot build acquisition: {e}");
                return;
            }
        };
        acquisition.scope().set_filter(filter_enabled);

        match acquisition.start(self.connector.as_mut()) {
            Ok(()) => {
                self.failures = 0;
                self.next_attempt = None;
            }
            Err(e) => {
                self.failures = self.failures.saturating_add(1);
                let delay = self.policy.delay_after(self.failures);
                self.next_attempt = Some(now + delay);
                if self.failures == 1 || !e.is_discovery_failure() {
                    warn!("acquisition did not start: {e}");
                }
                debug!("attempt {} failed, next in {delay:?}", self.failures);
            }
        }
        self.current = Some(acquisition);
    }

    pub fn status(&self) -> ScopeStatus {
        match &self.current {
            Some(acquisition) => acquisition.status(),
            None => ScopeStatus {
                state: if self.stopped {
                    AcquisitionState::Stopped
                } else {
                    AcquisitionState::Discovering
                },
                fault: None,
                filter_enabled: self.config.filter_on_start,
            },
        }
    }

    /// `None` until an acquisition has reached Running at least once.
    pub fn snapshot(&self) -> Option<Vec<Sample>> {
        self.running().map(AcquisitionLoop::snapshot)
    }

    pub fn latest(&self) -> Option<Sample> {
        self.running().map(AcquisitionLoop::latest)
    }

    fn running(&self) -> Option<&AcquisitionLoop> {
        self.current
            .as_ref()
            .filter(|a| a.state() != AcquisitionState::Discovering)
    }

    pub fn toggle_filter(&mut self) -> bool {
        match &self.current {
            Some(acquisition) => acquisition.toggle_filter(),
            None => {
                self.config.filter_on_start = !self.config.filter_on_start;
                self.config.filter_on_start
            }
        }
    }

    /// Stops the current acquisition and disables further restarts.
    pub fn stop(&mut self) {
        self.stopped = true;
        if let Some(acquisition) = self.current.as_mut() {
            acquisition.request_stop();
            acquisition.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{encode_sample, ManualConnector, ManualLink};
    use crate::types::Fault;
    use std::io;
    use std::sync::atomic::Ordering;
    use std::thread;

    fn config(retry: RetryConfig) -> ScopeConfig {
        ScopeConfig {
            window_len: 4,
            read_chunk: 8,
            read_timeout_ms: 2,
            retry,
            ..ScopeConfig::default()
        }
    }

    fn wait_for_state(supervisor: &Supervisor, want: AcquisitionState) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while supervisor.status().state != want {
            assert!(Instant::now() < deadline, "never reached {want}");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::Backoff {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(350));
        assert_eq!(policy.delay_after(40), Duration::from_millis(350));
        assert_eq!(RetryPolicy::EveryPoll.delay_after(7), Duration::ZERO);
    }

    #[test]
    fn every_poll_retries_on_each_poll() {
        let connector = ManualConnector::new(Vec::<ManualLink>::new());
        let attempts = connector.attempt_counter();
        let mut supervisor =
            Supervisor::new(Box::new(connector), config(RetryConfig::EveryPoll)).unwrap();
        let now = Instant::now();
        for _ in 0..3 {
            let status = supervisor.poll(now);
            assert_eq!(status.state, AcquisitionState::Discovering);
            assert_eq!(status.fault, Some(Fault::DeviceNotFound));
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(supervisor.consecutive_failures(), 3);
        assert!(supervisor.snapshot().is_none());
    }

    #[test]
    fn backoff_waits_between_discovery_attempts() {
        let connector = ManualConnector::new(Vec::<ManualLink>::new());
        let attempts = connector.attempt_counter();
        let retry = RetryConfig::Backoff {
            initial_ms: 100,
            max_ms: 1000,
        };
        let mut supervisor = Supervisor::new(Box::new(connector), config(retry)).unwrap();
        let t0 = Instant::now();
        let ms = Duration::from_millis;

        supervisor.poll(t0);
        supervisor.poll(t0 + ms(50));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        supervisor.poll(t0 + ms(100));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        supervisor.poll(t0 + ms(250));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        supervisor.poll(t0 + ms(300));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn link_error_is_replaced_by_fresh_acquisition() {
        let first = ManualLink::new()
            .with_chunk(encode_sample(321).to_vec())
            .with_failure(io::ErrorKind::BrokenPipe);
        let first_closes = first.close_counter();
        let second = ManualLink::new().with_chunk(encode_sample(654).to_vec());
        let connector = ManualConnector::new([first, second]);
        let attempts = connector.attempt_counter();
        let mut supervisor =
            Supervisor::new(Box::new(connector), config(RetryConfig::EveryPoll)).unwrap();

        let now = Instant::now();
        let filter = supervisor.toggle_filter();
        assert!(filter);
        supervisor.poll(now);
        wait_for_state(&supervisor, AcquisitionState::Error);
        assert_eq!(supervisor.snapshot(), Some(vec![0, 0, 0, 321]));
        assert_eq!(first_closes.load(Ordering::SeqCst), 1);

        let status = supervisor.poll(now);
        assert_eq!(status.state, AcquisitionState::Running);
        assert!(status.filter_enabled);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        let deadline = Instant::now() + Duration::from_secs(5);
        while supervisor.latest() != Some(654) {
            assert!(Instant::now() < deadline, "second link never delivered");
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(supervisor.snapshot(), Some(vec![0, 0, 0, 654]));

        supervisor.stop();
        assert_eq!(supervisor.status().state, AcquisitionState::Stopped);
        assert_eq!(supervisor.poll(now).state, AcquisitionState::Stopped);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn rejects_empty_window() {
        let connector = ManualConnector::new(Vec::<ManualLink>::new());
        let mut bad = config(RetryConfig::EveryPoll);
        bad.window_len = 0;
        assert!(Supervisor::new(Box::new(connector), bad).is_err());
    }
}
