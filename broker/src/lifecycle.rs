use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Duration;

/// Connectivity notifications raised by a venue session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Lost,
    Restored,
    /// Historical data farm dropped; open streams are dead.
    HistoricalFarmDown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub lost_total: u64,
    pub restored_total: u64,
    pub farm_down_total: u64,
}

/// Connection flags shared between the venue callbacks and the control loop.
#[derive(Debug)]
pub struct ConnectionMonitor {
    connected: AtomicBool,
    needs_resubscription: AtomicBool,
    lost_total: AtomicU64,
    restored_total: AtomicU64,
    farm_down_total: AtomicU64,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            needs_resubscription: AtomicBool::new(false),
            lost_total: AtomicU64::new(0),
            restored_total: AtomicU64::new(0),
            farm_down_total: AtomicU64::new(0),
        }
    }

    pub fn on_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Lost => {
                self.connected.store(false, Ordering::SeqCst);
                self.needs_resubscription.store(true, Ordering::SeqCst);
                self.lost_total.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("venue connectivity lost");
            }
            ConnectionEvent::HistoricalFarmDown => {
                self.connected.store(false, Ordering::SeqCst);
                self.needs_resubscription.store(true, Ordering::SeqCst);
                self.farm_down_total.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("historical data farm down");
            }
            ConnectionEvent::Restored => {
                self.connected.store(true, Ordering::SeqCst);
                self.restored_total.fetch_add(1, Ordering::Relaxed);
                tracing::info!("venue connectivity restored");
            }
        }
    }

    /// Set by an explicit connect or disconnect from our side; does not touch
    /// the resubscription flag.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn needs_resubscription(&self) -> bool {
        self.needs_resubscription.load(Ordering::SeqCst)
    }

    pub fn clear_resubscription(&self) {
        self.needs_resubscription.store(false, Ordering::SeqCst);
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            lost_total: self.lost_total.load(Ordering::Relaxed),
            restored_total: self.restored_total.load(Ordering::Relaxed),
            farm_down_total: self.farm_down_total.load(Ordering::Relaxed),
        }
    }
}

/// Exponential wait used while the venue is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::seconds(1),
            max: Duration::seconds(30),
        }
    }
}

impl WaitPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Wait before the `attempt`-th recheck, starting at 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(10);
        let ceiling = self.max.max(self.initial);
        let scaled = self.initial.checked_mul(1 << shift).unwrap_or(ceiling);
        scaled.min(ceiling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_sets_resubscription_until_cleared() {
        let monitor = ConnectionMonitor::new();
        monitor.set_connected(true);
        monitor.on_event(ConnectionEvent::Lost);
        assert!(!monitor.is_connected());
        assert!(monitor.needs_resubscription());

        monitor.on_event(ConnectionEvent::Restored);
        assert!(monitor.is_connected());
        assert!(monitor.needs_resubscription());

        monitor.clear_resubscription();
        assert!(!monitor.needs_resubscription());
        assert_eq!(
            monitor.stats(),
            ConnectionStats {
                lost_total: 1,
                restored_total: 1,
                farm_down_total: 0,
            }
        );
    }

    #[test]
    fn wait_policy_doubles_up_to_ceiling() {
        let policy = WaitPolicy::new(Duration::seconds(1), Duration::seconds(5));
        assert_eq!(policy.delay(1), Duration::seconds(1));
        assert_eq!(policy.delay(2), Duration::seconds(2));
        assert_eq!(policy.delay(3), Duration::seconds(4));
        assert_eq!(policy.delay(4), Duration::seconds(5));
        assert_eq!(policy.delay(40), Duration::seconds(5));
    }
}
