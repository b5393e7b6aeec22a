//! Single-shot timers and the liveness watchdog built on them.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep, sleep};

/// A rearmable single-shot timer.
///
/// Arming replaces any previous deadline, so at most one expiry is ever
/// pending. [`Deadline::expired`] never resolves while disarmed and disarms
/// itself once it fires.
#[derive(Debug)]
pub struct Deadline {
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl Default for Deadline {
    fn default() -> Self {
        Self::new()
    }
}

impl Deadline {
    pub fn new() -> Self {
        Self {
            sleep: Box::pin(sleep(Duration::ZERO)),
            armed: false,
        }
    }

    pub fn arm(&mut self, after: Duration) {
        self.sleep.as_mut().reset(Instant::now() + after);
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Resolves when the armed deadline passes. Cancel-safe: dropping the
    /// future leaves the deadline armed.
    pub async fn expired(&mut self) {
        if !self.armed {
            return pending().await;
        }
        self.sleep.as_mut().await;
        self.armed = false;
    }
}

/// Declares the peer unresponsive when no frame arrives within `timeout`.
#[derive(Debug)]
pub struct LivenessMonitor {
    timeout: Duration,
    deadline: Deadline,
}

impl LivenessMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Deadline::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// A frame arrived: push the deadline out by a full timeout.
    pub fn reset(&mut self) {
        self.deadline.arm(self.timeout);
    }

    /// Stop watching, e.g. because the connection is down.
    pub fn disarm(&mut self) {
        self.deadline.disarm();
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_armed()
    }

    /// Resolves once the peer has been silent for the whole timeout.
    pub async fn unresponsive(&mut self) {
        self.deadline.expired().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn assert_close(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_deadline_never_fires() {
        let mut deadline = Deadline::new();
        assert!(
            timeout(Duration::from_secs(60), deadline.expired())
                .await
                .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_once_after_delay() {
        let mut deadline = Deadline::new();
        let start = Instant::now();
        deadline.arm(Duration::from_secs(1));
        deadline.expired().await;
        assert_close(start.elapsed(), Duration::from_secs(1));
        assert!(!deadline.is_armed());

        // fired deadlines stay quiet until rearmed
        assert!(
            timeout(Duration::from_secs(5), deadline.expired())
                .await
                .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_replaces_previous_deadline() {
        let mut deadline = Deadline::new();
        let start = Instant::now();
        deadline.arm(Duration::from_secs(1));
        tokio::time::advance(Duration::from_millis(600)).await;
        deadline.arm(Duration::from_secs(1));
        deadline.expired().await;
        assert_close(start.elapsed(), Duration::from_millis(1600));
    }

    #[tokio::test(start_paused = true)]
    async fn frames_keep_monitor_quiet() {
        let mut monitor = LivenessMonitor::new(Duration::from_secs(2));
        monitor.reset();
        for _ in 0..5 {
            tokio::time::advance(Duration::from_millis(1500)).await;
            monitor.reset();
        }
        let start = Instant::now();
        monitor.unresponsive().await;
        assert_close(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_monitor_stays_silent() {
        let mut monitor = LivenessMonitor::new(Duration::from_secs(2));
        monitor.reset();
        monitor.disarm();
        assert!(!monitor.is_armed());
        assert!(
            timeout(Duration::from_secs(10), monitor.unresponsive())
                .await
                .is_err()
        );
    }
}
