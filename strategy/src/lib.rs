mod breakout;
mod channel;

pub use breakout::{BreakoutConfig, BreakoutStrategy, StrategyUpdate};
pub use channel::{Breakout, ChannelEngine, ChannelRecord};
