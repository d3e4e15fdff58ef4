pub mod paper;

pub use paper::{Fill, PaperBroker, PaperStats};
