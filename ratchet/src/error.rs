use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Invalid or inconsistent configuration. Raised before any subscription.
    #[error("config error: {0}")]
    Config(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Data that cannot support the requested computation.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// Allocation constraint violated; the current cycle is skipped.
    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("connectivity error: {0}")]
    Connectivity(String),

    #[error("guardrail breach: {0}")]
    GuardrailBreach(String),

    #[error("broker error: {0}")]
    Broker(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Only constraint failures leave the agent in a state where the next
    /// cycle may proceed.
    pub fn is_cycle_recoverable(&self) -> bool {
        matches!(self, Self::Constraint(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::NotFound { .. } => "not_found",
            Self::Consistency(_) => "consistency",
            Self::Constraint(_) => "constraint",
            Self::Connectivity(_) => "connectivity",
            Self::GuardrailBreach(_) => "guardrail",
            Self::Broker(_) => "broker",
            Self::Parse(_) => "parse",
            Self::Io(_) => "io",
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

impl From<serde_yaml::Error> for AgentError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Parse(value.to_string())
    }
}
