use std::fs;
use std::path::PathBuf;

use broker::{Broker, BrokerError, PaperBroker, load_csv_bars};
use chrono::{Duration, TimeZone, Utc};
use market::{BarSource, HistoricalRequest};
use ratchet::{Instrument, Period};

fn temp_csv(name: &str, body: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("paper-broker-{}-{name}.csv", std::process::id()));
    fs::write(&path, body).expect("write csv");
    path
}

#[test]
fn loads_sorted_bars_with_short_headers() {
    let path = temp_csv(
        "short",
        "datetime,open,high,low,close,volume\n\
         2024-02-01 10:01:00,1.1,1.2,1.0,1.15,5\n\
         2024-02-01 10:00:00,1.0,1.1,0.9,1.05,3\n",
    );
    let bars = load_csv_bars(&path).expect("load");
    fs::remove_file(&path).ok();

    assert_eq!(bars.len(), 2);
    assert!(bars[0].datetime < bars[1].datetime);
    assert_eq!(bars[0].close_price, 1.05);
    assert_eq!(bars[1].volume, 5.0);
}

#[test]
fn bad_datetime_is_reported() {
    let path = temp_csv("bad", "datetime,open,high,low,close\nnot-a-date,1,1,1,1\n");
    let err = load_csv_bars(&path).expect_err("bad row");
    fs::remove_file(&path).ok();
    assert!(matches!(err, BrokerError::InvalidDatetime(_)));
}

#[test]
fn csv_bars_replay_through_the_paper_broker() {
    let path = temp_csv(
        "replay",
        "datetime,open_price,high_price,low_price,close_price,volume\n\
         2024-02-01T10:00:00Z,1.0,1.1,0.9,1.05,3\n\
         2024-02-01T10:01:00Z,1.05,1.2,1.0,1.15,5\n\
         2024-02-01T10:02:00Z,1.15,1.3,1.1,1.25,4\n",
    );
    let start = Utc.with_ymd_and_hms(2024, 2, 1, 10, 1, 0).single().expect("valid dt");
    let mut broker = PaperBroker::new(start, 10_000.0);
    let loaded = broker.load_csv("EUR.USD", &path).expect("load csv");
    fs::remove_file(&path).ok();
    assert_eq!(loaded, 3);

    let instrument = Instrument {
        id: "EUR.USD".to_string(),
        symbol: "EURUSD".to_string(),
        exchange: "IDEALPRO".to_string(),
        sec_type: "CASH".to_string(),
        currency: "USD".to_string(),
        multiplier: None,
        tick_size: None,
    };
    broker.connect().expect("connect");
    let request = HistoricalRequest {
        end: None,
        lookback: Period::hours(1),
        bar_size: Period::minutes(1),
        keep_up_to_date: true,
    };
    let sub = broker.subscribe_bars(&instrument, &request).expect("subscribe");
    assert_eq!(sub.initial.len(), 2);

    assert!(broker.wait_on_update(Duration::minutes(1)));
    let live = sub.stream.drain();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].close_price, 1.25);
}
