use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use ratchet::Bar;
use serde::Deserialize;

use crate::error::BrokerError;

#[derive(Debug, Deserialize)]
struct CsvBarRow {
    #[serde(alias = "date", alias = "time")]
    datetime: String,
    #[serde(alias = "open")]
    open_price: f64,
    #[serde(alias = "high")]
    high_price: f64,
    #[serde(alias = "low")]
    low_price: f64,
    #[serde(alias = "close")]
    close_price: f64,
    #[serde(default)]
    volume: f64,
}

/// Reads bars from a csv file with a header row, sorted by start time with
/// duplicate timestamps collapsed to the last row.
pub fn load_csv_bars(path: impl AsRef<Path>) -> Result<Vec<Bar>, BrokerError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut bars = Vec::new();
    for row in reader.deserialize::<CsvBarRow>() {
        let row = row?;
        bars.push(Bar::new(
            parse_datetime(&row.datetime)?,
            row.open_price,
            row.high_price,
            row.low_price,
            row.close_price,
            row.volume,
        ));
    }
    Ok(normalize(bars))
}

pub(crate) fn normalize(mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.reverse();
    bars.sort_by_key(|bar| bar.datetime);
    bars.dedup_by_key(|bar| bar.datetime);
    bars
}

pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>, BrokerError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    let patterns = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S%.f",
        "%Y%m%d %H:%M:%S",
        "%Y%m%d%H%M%S%.f",
    ];
    for pattern in patterns {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, pattern) {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc));
        }
    }

    Err(BrokerError::InvalidDatetime(value.to_string()))
}
