mod atr;
mod core;
mod rolling;

pub use self::core::Indicator;
pub use atr::{TrailingAtr, true_range};
pub use rolling::RollingMean;
