pub mod adapters;
pub mod error;
pub mod lifecycle;
pub mod protocol;
pub mod replay;

pub use adapters::{Fill, PaperBroker, PaperStats};
pub use error::BrokerError;
pub use lifecycle::{ConnectionEvent, ConnectionMonitor, ConnectionStats, WaitPolicy};
pub use protocol::Broker;
pub use replay::{load_csv_bars, parse_datetime};
