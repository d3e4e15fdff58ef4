mod agent;
mod stop;

pub use agent::{Agent, AgentSummary, CycleOutcome, ShutdownReason};
pub use stop::StopFlag;
