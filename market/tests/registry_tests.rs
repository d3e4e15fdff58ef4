use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use market::{
	BarSeriesRegistry, BarSource, BarStream, HistoricalRequest, SeriesConfig, SeriesOption,
	ShadowConfig, StatusKind, Subscription, SubscriptionId,
};
use ratchet::{AgentError, Bar, Instrument, InstrumentRegistry, Period};

fn t0() -> DateTime<Utc> {
	Utc.with_ymd_and_hms(2024, 5, 6, 14, 0, 0).single().expect("valid dt")
}

fn minute_bars(n: i64, close: f64) -> Vec<Bar> {
	(0..n)
		.map(|i| Bar::new(t0() + Duration::minutes(i), close, close + 0.5, close - 0.5, close, 1.0))
		.collect()
}

fn instrument(id: &str) -> Instrument {
	Instrument {
		id: id.to_string(),
		symbol: id.replace('.', ""),
		exchange: "IDEALPRO".to_string(),
		sec_type: "CASH".to_string(),
		currency: "USD".to_string(),
		multiplier: None,
		tick_size: None,
	}
}

fn instruments() -> InstrumentRegistry {
	InstrumentRegistry::from_instruments(vec![
		instrument("EUR.USD"),
		instrument("EUR.USD_CFD"),
		instrument("GBP.USD"),
	])
	.expect("instruments")
}

fn series_config(id: &str, option: SeriesOption) -> SeriesConfig {
	SeriesConfig {
		id: id.to_string(),
		instrument_id: id.to_string(),
		bar_size: Period::minutes(1),
		lookback: Period::minutes(10),
		option,
		keep_up_to_date: option.is_live(),
		max_len: 1_000,
		start_date: None,
		stream_capacity: 64,
	}
}

#[derive(Default)]
struct ScriptedSource {
	history: HashMap<String, Vec<Bar>>,
	failing: HashSet<String>,
	page_size: usize,
	next_id: u64,
	streams: Vec<(SubscriptionId, Arc<BarStream>)>,
	cancelled: Vec<SubscriptionId>,
	historical_calls: usize,
}

impl ScriptedSource {
	fn with_history(id: &str, bars: Vec<Bar>) -> Self {
		let mut source = Self {
			page_size: usize::MAX,
			..Self::default()
		};
		source.history.insert(id.to_string(), bars);
		source
	}

	fn page(&self, id: &str, end: Option<DateTime<Utc>>) -> Vec<Bar> {
		let bars = self
			.history
			.get(id)
			.map(|bars| {
				bars.iter()
					.filter(|bar| end.is_none_or(|end| bar.datetime < end))
					.copied()
					.collect::<Vec<_>>()
			})
			.unwrap_or_default();
		let skip = bars.len().saturating_sub(self.page_size);
		bars[skip..].to_vec()
	}
}

impl BarSource for ScriptedSource {
	fn request_historical(
		&mut self,
		instrument: &Instrument,
		request: &HistoricalRequest,
	) -> Result<Vec<Bar>, AgentError> {
		self.historical_calls += 1;
		if self.failing.contains(&instrument.id) {
			return Err(AgentError::Broker(format!("no data for {}", instrument.id)));
		}
		Ok(self.page(&instrument.id, request.end))
	}

	fn subscribe_bars(
		&mut self,
		instrument: &Instrument,
		_request: &HistoricalRequest,
	) -> Result<Subscription, AgentError> {
		if self.failing.contains(&instrument.id) {
			return Err(AgentError::Broker(format!("no data for {}", instrument.id)));
		}
		self.next_id += 1;
		let id = SubscriptionId(self.next_id);
		let stream = Arc::new(BarStream::new(64));
		self.streams.push((id, Arc::clone(&stream)));
		Ok(Subscription {
			id,
			initial: self.page(&instrument.id, None),
			stream,
		})
	}

	fn cancel_subscription(&mut self, id: SubscriptionId) -> Result<(), AgentError> {
		self.cancelled.push(id);
		self.streams.retain(|(x, _)| *x != id);
		Ok(())
	}
}

#[test]
fn shadow_mirrors_parent_after_refresh() {
	let mut source = ScriptedSource::with_history("EUR.USD", minute_bars(20, 1.1));
	let mut registry = BarSeriesRegistry::new(
		vec![series_config("EUR.USD", SeriesOption::LiveUpdating)],
		vec![ShadowConfig {
			id: "EUR.USD_CFD".to_string(),
			instrument_id: "EUR.USD_CFD".to_string(),
			parent: "EUR.USD".to_string(),
		}],
	)
	.expect("registry config");
	registry
		.initialize(&mut source, &instruments(), t0() + Duration::minutes(25))
		.expect("registry initializes");

	let stream = Arc::clone(&source.streams[0].1);
	stream.push(Bar::new(t0() + Duration::minutes(25), 1.2, 1.3, 1.1, 1.25, 1.0));
	registry.refresh(t0() + Duration::seconds(25 * 60 + 5));

	let parent = registry.series("EUR.USD").expect("parent");
	let shadow = registry.series("EUR.USD_CFD").expect("shadow");
	assert!(Arc::ptr_eq(parent.table_arc(), shadow.table_arc()));
	assert_eq!(parent.freshness(), shadow.freshness());
	assert_eq!(shadow.instrument().id, "EUR.USD_CFD");

	let (active, _) = registry
		.query_status(StatusKind::Active, "EUR.USD_CFD")
		.expect("shadow status");
	assert!(active);
	assert_eq!(registry.status_for_instrument(StatusKind::Active, "EUR.USD_CFD"), Some(true));
	assert_eq!(registry.last_price("EUR.USD_CFD").map(|p| p.close), Some(1.25));
}

#[test]
fn unknown_status_id_is_not_found() {
	let mut source = ScriptedSource::with_history("EUR.USD", minute_bars(5, 1.1));
	let mut registry =
		BarSeriesRegistry::new(vec![series_config("EUR.USD", SeriesOption::SnapshotHistorical)], Vec::new())
			.expect("registry config");
	registry
		.initialize(&mut source, &instruments(), t0() + Duration::hours(1))
		.expect("registry initializes");

	let err = registry
		.query_status(StatusKind::Ready, "USD.JPY")
		.expect_err("unknown series");
	assert!(matches!(err, AgentError::NotFound { .. }));
}

#[test]
fn unknown_instrument_is_a_config_error() {
	let mut source = ScriptedSource::with_history("AUD.USD", minute_bars(5, 0.7));
	let mut registry =
		BarSeriesRegistry::new(vec![series_config("AUD.USD", SeriesOption::SnapshotHistorical)], Vec::new())
			.expect("registry config");
	let err = registry
		.initialize(&mut source, &instruments(), t0())
		.expect_err("AUD.USD is not a known instrument");
	assert!(matches!(err, AgentError::Config(_)));
}

#[test]
fn shadow_parent_must_be_configured() {
	let err = BarSeriesRegistry::new(
		vec![series_config("EUR.USD", SeriesOption::SnapshotHistorical)],
		vec![ShadowConfig {
			id: "EUR.USD_CFD".to_string(),
			instrument_id: "EUR.USD_CFD".to_string(),
			parent: "GBP.USD".to_string(),
		}],
	)
	.expect_err("parent missing");
	assert!(matches!(err, AgentError::Config(_)));
}

#[test]
fn failed_series_are_reported_per_instrument() {
	let mut source = ScriptedSource::with_history("EUR.USD", minute_bars(5, 1.1));
	source.failing.insert("GBP.USD".to_string());
	let mut registry = BarSeriesRegistry::new(
		vec![
			series_config("EUR.USD", SeriesOption::SnapshotHistorical),
			series_config("GBP.USD", SeriesOption::SnapshotHistorical),
		],
		Vec::new(),
	)
	.expect("registry config");
	registry
		.initialize(&mut source, &instruments(), t0() + Duration::hours(1))
		.expect("one failure is tolerated");

	assert_eq!(registry.len(), 1);
	assert_eq!(registry.failures().len(), 1);
	assert_eq!(registry.failures()[0].series_id, "GBP.USD");
}

#[test]
fn shadow_of_failed_parent_is_inconsistent() {
	let mut source = ScriptedSource::default();
	source.failing.insert("EUR.USD".to_string());
	let mut registry = BarSeriesRegistry::new(
		vec![series_config("EUR.USD", SeriesOption::SnapshotHistorical)],
		vec![ShadowConfig {
			id: "EUR.USD_CFD".to_string(),
			instrument_id: "EUR.USD_CFD".to_string(),
			parent: "EUR.USD".to_string(),
		}],
	)
	.expect("registry config");
	let err = registry
		.initialize(&mut source, &instruments(), t0())
		.expect_err("parent failed");
	assert!(matches!(err, AgentError::Consistency(_)));
}

#[test]
fn consecutive_request_pages_back_to_start_date() {
	let mut source = ScriptedSource::with_history("EUR.USD", minute_bars(35, 1.1));
	source.page_size = 10;
	let mut config = series_config("EUR.USD", SeriesOption::ConsecutiveHistorical);
	config.start_date = Some(t0() + Duration::minutes(3));

	let mut registry = BarSeriesRegistry::new(vec![config], Vec::new()).expect("registry config");
	registry
		.initialize(&mut source, &instruments(), t0() + Duration::hours(1))
		.expect("registry initializes");

	let series = registry.series("EUR.USD").expect("series");
	assert_eq!(series.table().len(), 32);
	assert_eq!(series.table().front().map(|b| b.datetime), Some(t0() + Duration::minutes(3)));
	assert_eq!(source.historical_calls, 4);
}

#[test]
fn reset_cancels_subscriptions_and_keeps_history() {
	let mut source = ScriptedSource::with_history("EUR.USD", minute_bars(10, 1.1));
	let mut registry =
		BarSeriesRegistry::new(vec![series_config("EUR.USD", SeriesOption::LiveUpdating)], Vec::new())
			.expect("registry config");
	let now = t0() + Duration::seconds(10 * 60 + 30);
	registry
		.initialize(&mut source, &instruments(), now)
		.expect("registry initializes");
	let rows_before = registry.series("EUR.USD").expect("series").table().len();

	// the source forgets older history after a reconnect
	source
		.history
		.insert("EUR.USD".to_string(), minute_bars(10, 1.1).split_off(7));
	registry
		.reset(&mut source, &instruments(), now + Duration::minutes(1), true)
		.expect("reset succeeds");

	assert_eq!(source.cancelled, vec![SubscriptionId(1)]);
	assert_eq!(source.streams.len(), 1);
	let series = registry.series("EUR.USD").expect("series after reset");
	assert_eq!(series.subscription(), Some(SubscriptionId(2)));
	assert!(series.table().len() >= rows_before);
	assert!(series.is_updated());
}
