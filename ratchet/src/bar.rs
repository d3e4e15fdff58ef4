use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub datetime: DateTime<Utc>,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Bar {
    pub fn new(
        datetime: DateTime<Utc>,
        open_price: f64,
        high_price: f64,
        low_price: f64,
        close_price: f64,
        volume: f64,
    ) -> Self {
        Self {
            datetime,
            open_price,
            high_price,
            low_price,
            close_price,
            volume,
        }
    }

    pub fn total_range(&self) -> f64 {
        self.high_price - self.low_price
    }
}
