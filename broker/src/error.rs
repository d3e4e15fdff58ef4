use ratchet::AgentError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker not connected")]
    NotConnected,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("unknown subscription {0}")]
    UnknownSubscription(u64),

    #[error("no market data for {0}")]
    NoMarketData(String),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("invalid datetime: {0}")]
    InvalidDatetime(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BrokerError> for AgentError {
    fn from(value: BrokerError) -> Self {
        match value {
            BrokerError::NotConnected | BrokerError::ConnectionFailed(_) => {
                AgentError::Connectivity(value.to_string())
            }
            BrokerError::InvalidDatetime(_) | BrokerError::Csv(_) => AgentError::Parse(value.to_string()),
            BrokerError::Io(err) => AgentError::Io(err),
            other => AgentError::Broker(other.to_string()),
        }
    }
}
