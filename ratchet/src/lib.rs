pub mod bar;
pub mod constant;
pub mod error;
pub mod indicator;
pub mod instrument;
pub mod logging;
pub mod signal;
pub mod utils;

pub use bar::Bar;
pub use constant::{Action, Direction, Period, RangeType};
pub use error::AgentError;
pub use indicator::{Indicator, RollingMean, TrailingAtr, true_range};
pub use instrument::{Instrument, InstrumentLoader, InstrumentRegistry, InstrumentResolver};
pub use logging::{init_logging, parse_level};
pub use signal::{Signal, SignalBook, SignalSink, SignalValidity};
