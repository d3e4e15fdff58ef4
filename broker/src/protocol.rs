use chrono::{DateTime, Duration, Utc};
use market::BarSource;
use order::OrderRouter;
use portfolio::{AccountView, PortfolioView};
use ratchet::AgentError;

use crate::lifecycle::ConnectionMonitor;

/// Everything the control loop needs from a venue: market data, order
/// routing, the account snapshot and a clock it can block on.
pub trait Broker: BarSource + OrderRouter + PortfolioView + AccountView {
    fn connect(&mut self) -> Result<(), AgentError>;

    fn disconnect(&mut self);

    fn current_time(&self) -> Result<DateTime<Utc>, AgentError>;

    /// Blocks until something arrives from the venue or `timeout` passes.
    /// Returns whether an update arrived.
    fn wait_on_update(&mut self, timeout: Duration) -> bool;

    fn sleep(&mut self, duration: Duration);

    fn connection(&self) -> &ConnectionMonitor;

    fn is_connected(&self) -> bool {
        self.connection().is_connected()
    }
}
