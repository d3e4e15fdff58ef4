//! 单品种 bar 序列。
//!
//! 历史 bar 与实时 bar 合并成一张按时间严格递增、长度有界的表，
//! 并在每个周期重新计算三个新鲜度标志（active / updated / ready）。
//!
//! 合并规则：新到 bar 中最早的时间戳之后（含）的表尾全部丢弃，再追加新 bar。
//! 实时源会反复推送正在形成的 bar，这样每个区间只保留一行，
//! 且对实时选项而言，未收盘的 bar 不会以已收盘的形式出现在表里。

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use ratchet::{AgentError, Bar, Instrument, Period};
use serde::{Deserialize, Serialize};

use crate::ingress::BarStream;
use crate::metrics::StreamMetrics;
use crate::request::request_consecutive;
use crate::source::{BarSource, HistoricalRequest, SubscriptionId};

pub type BarTable = VecDeque<Bar>;

/// 数据刷新方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesOption {
	/// 单次历史请求。
	SnapshotHistorical,
	/// 分页历史请求，回溯到 `start_date`。
	ConsecutiveHistorical,
	/// 实时订阅（keep-up-to-date）。
	LiveUpdating,
	/// 分页历史 + 实时订阅。
	ConsecutiveLive,
}

impl SeriesOption {
	pub fn is_live(self) -> bool {
		matches!(self, Self::LiveUpdating | Self::ConsecutiveLive)
	}

	pub fn is_consecutive(self) -> bool {
		matches!(self, Self::ConsecutiveHistorical | Self::ConsecutiveLive)
	}
}

fn default_max_len() -> usize {
	100_000
}

fn default_stream_capacity() -> usize {
	1_024
}

/// 单个 market_data 配置项。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesConfig {
	pub id: String,
	pub instrument_id: String,
	pub bar_size: Period,
	pub lookback: Period,
	pub option: SeriesOption,
	#[serde(default)]
	pub keep_up_to_date: bool,
	#[serde(default = "default_max_len")]
	pub max_len: usize,
	#[serde(default)]
	pub start_date: Option<DateTime<Utc>>,
	#[serde(default = "default_stream_capacity")]
	pub stream_capacity: usize,
}

impl SeriesConfig {
	pub fn validate(&self) -> Result<(), AgentError> {
		if self.bar_size.as_seconds() <= 0 {
			return Err(AgentError::Config(format!("{}: bar_size must be positive", self.id)));
		}
		if self.max_len == 0 {
			return Err(AgentError::Config(format!("{}: max_len must be positive", self.id)));
		}
		if self.option.is_live() && !self.keep_up_to_date {
			return Err(AgentError::Config(format!(
				"{}: option {:?} requires keep_up_to_date",
				self.id, self.option
			)));
		}
		if self.option.is_consecutive() && self.start_date.is_none() {
			return Err(AgentError::Config(format!(
				"{}: option {:?} requires start_date",
				self.id, self.option
			)));
		}
		Ok(())
	}

	fn historical_request(&self) -> HistoricalRequest {
		HistoricalRequest {
			end: None,
			lookback: self.lookback,
			bar_size: self.bar_size,
			keep_up_to_date: self.option.is_live(),
		}
	}
}

/// 主序列或影子序列。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesKind {
	Primary,
	/// 镜像 `parent` 的表与标志，只保留自己的品种身份。
	Shadow { parent: String },
}

/// 带时间戳的布尔标志。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flag {
	pub value: bool,
	pub updated_at: DateTime<Utc>,
}

impl Flag {
	fn new(value: bool, at: DateTime<Utc>) -> Self {
		Self {
			value,
			updated_at: at,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
	pub active: Flag,
	pub updated: Flag,
	pub ready: Flag,
}

impl Freshness {
	fn unset(at: DateTime<Utc>) -> Self {
		Self {
			active: Flag::new(false, at),
			updated: Flag::new(false, at),
			ready: Flag::new(false, at),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastPrice {
	pub close: f64,
	pub bar_datetime: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// 影子序列镜像所需的父序列状态。
#[derive(Debug, Clone)]
pub struct MirrorState {
	table: Arc<BarTable>,
	freshness: Freshness,
	last_bar_datetime: Option<DateTime<Utc>>,
	last_table_datetime: Option<DateTime<Utc>>,
	last_price: Option<LastPrice>,
}

#[derive(Debug)]
pub struct BarSeries {
	id: String,
	instrument: Instrument,
	kind: SeriesKind,
	bar_size: Duration,
	max_len: usize,
	option: SeriesOption,
	table: Arc<BarTable>,
	/// 已收到但尚未并入表的 bar（按时间升序，同一时间戳只保留最新一份）。
	received: Vec<Bar>,
	stream: Option<Arc<BarStream>>,
	subscription: Option<SubscriptionId>,
	last_bar_datetime: Option<DateTime<Utc>>,
	last_table_datetime: Option<DateTime<Utc>>,
	freshness: Freshness,
	last_price: Option<LastPrice>,
	initializing: bool,
}

impl BarSeries {
	/// 创建主序列，按 `option` 拉取初始数据并（需要时）建立实时订阅。
	///
	/// `seed` 为重置前保留的表，初始数据按同一合并规则并入。
	pub fn open<S: BarSource + ?Sized>(
		config: &SeriesConfig,
		instrument: Instrument,
		source: &mut S,
		seed: Option<Arc<BarTable>>,
		now: DateTime<Utc>,
	) -> Result<Self, AgentError> {
		config.validate()?;
		let request = config.historical_request();

		let mut series = Self::primary(config, instrument, seed, now);
		let historical = match config.option {
			SeriesOption::SnapshotHistorical => {
				source.request_historical(&series.instrument, &request)?
			}
			SeriesOption::ConsecutiveHistorical | SeriesOption::ConsecutiveLive => {
				let start = config.start_date.ok_or_else(|| {
					AgentError::Config(format!("{}: start_date missing", config.id))
				})?;
				request_consecutive(source, &series.instrument, &request, start)?
			}
			SeriesOption::LiveUpdating => Vec::new(),
		};
		series.receive(historical);

		if config.option.is_live() {
			let subscription = source.subscribe_bars(&series.instrument, &request)?;
			// 边界重叠时实时数据覆盖历史数据
			series.receive(subscription.initial);
			series.stream = Some(subscription.stream);
			series.subscription = Some(subscription.id);
		}

		tracing::info!(
			series = %series.id,
			instrument = %series.instrument.id,
			option = ?series.option,
			bars = series.received.len(),
			"series opened"
		);
		Ok(series)
	}

	/// 不访问数据源，直接以给定 bar 构造主序列。
	pub fn from_bars(
		config: &SeriesConfig,
		instrument: Instrument,
		bars: Vec<Bar>,
		stream: Option<Arc<BarStream>>,
		now: DateTime<Utc>,
	) -> Result<Self, AgentError> {
		config.validate()?;
		let mut series = Self::primary(config, instrument, None, now);
		series.receive(bars);
		series.stream = stream;
		Ok(series)
	}

	fn primary(
		config: &SeriesConfig,
		instrument: Instrument,
		seed: Option<Arc<BarTable>>,
		now: DateTime<Utc>,
	) -> Self {
		let table = seed.unwrap_or_default();
		let last_table_datetime = table.back().map(|bar| bar.datetime);
		Self {
			id: config.id.clone(),
			instrument,
			kind: SeriesKind::Primary,
			bar_size: config.bar_size.as_duration(),
			max_len: config.max_len.max(1),
			option: config.option,
			table,
			received: Vec::new(),
			stream: None,
			subscription: None,
			last_bar_datetime: last_table_datetime,
			last_table_datetime,
			freshness: Freshness::unset(now),
			last_price: None,
			initializing: true,
		}
	}

	/// 创建影子序列。首次 `mirror` 之前表为空。
	pub fn shadow(
		id: impl Into<String>,
		instrument: Instrument,
		parent: &BarSeries,
		now: DateTime<Utc>,
	) -> Self {
		let mut series = Self {
			id: id.into(),
			instrument,
			kind: SeriesKind::Shadow {
				parent: parent.id.clone(),
			},
			bar_size: parent.bar_size,
			max_len: parent.max_len,
			option: parent.option,
			table: Arc::default(),
			received: Vec::new(),
			stream: None,
			subscription: None,
			last_bar_datetime: None,
			last_table_datetime: None,
			freshness: Freshness::unset(now),
			last_price: None,
			initializing: false,
		};
		series.mirror(parent.mirror_state());
		series
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn instrument(&self) -> &Instrument {
		&self.instrument
	}

	pub fn kind(&self) -> &SeriesKind {
		&self.kind
	}

	pub fn is_shadow(&self) -> bool {
		matches!(self.kind, SeriesKind::Shadow { .. })
	}

	pub fn option(&self) -> SeriesOption {
		self.option
	}

	pub fn bar_size(&self) -> Duration {
		self.bar_size
	}

	pub fn max_len(&self) -> usize {
		self.max_len
	}

	pub fn table(&self) -> &BarTable {
		&self.table
	}

	pub fn table_arc(&self) -> &Arc<BarTable> {
		&self.table
	}

	pub fn freshness(&self) -> Freshness {
		self.freshness
	}

	pub fn is_active(&self) -> bool {
		self.freshness.active.value
	}

	pub fn is_updated(&self) -> bool {
		self.freshness.updated.value
	}

	pub fn is_ready(&self) -> bool {
		self.freshness.ready.value
	}

	pub fn last_price(&self) -> Option<LastPrice> {
		self.last_price
	}

	pub fn last_bar_datetime(&self) -> Option<DateTime<Utc>> {
		self.last_bar_datetime
	}

	pub fn last_table_datetime(&self) -> Option<DateTime<Utc>> {
		self.last_table_datetime
	}

	pub fn subscription(&self) -> Option<SubscriptionId> {
		self.subscription
	}

	pub fn stream_metrics(&self) -> Option<StreamMetrics> {
		self.stream.as_ref().map(|stream| stream.metrics())
	}

	/// 取消订阅后调用，序列不再接收实时 bar。
	pub fn detach(&mut self) -> Option<SubscriptionId> {
		self.stream = None;
		self.subscription.take()
	}

	pub fn mirror_state(&self) -> MirrorState {
		MirrorState {
			table: Arc::clone(&self.table),
			freshness: self.freshness,
			last_bar_datetime: self.last_bar_datetime,
			last_table_datetime: self.last_table_datetime,
			last_price: self.last_price,
		}
	}

	/// 影子序列：引用父序列的表并复制标志。
	pub fn mirror(&mut self, state: MirrorState) {
		self.table = state.table;
		self.freshness = state.freshness;
		self.last_bar_datetime = state.last_bar_datetime;
		self.last_table_datetime = state.last_table_datetime;
		self.last_price = state.last_price;
	}

	/// 主序列刷新。影子序列请使用 `mirror`。
	pub fn refresh(&mut self, now: DateTime<Utc>) {
		if self.is_shadow() {
			return;
		}
		self.drain_stream();

		let initializing = self.initializing;
		let previous_last_bar = self.last_bar_datetime;
		let previous_last_table = self.last_table_datetime;

		let ready = initializing
			|| previous_last_bar.is_none_or(|ts| now - ts >= self.bar_size);
		self.freshness.ready = Flag::new(ready, now);

		if ready {
			let newest = self.received.last().map(|bar| bar.datetime);
			self.last_bar_datetime = match (newest, previous_last_bar) {
				(Some(a), Some(b)) => Some(a.max(b)),
				(a, b) => a.or(b),
			};

			let start = self.received.partition_point(|bar| {
				previous_last_table.is_some_and(|last| bar.datetime < last)
			});
			let incoming = &self.received[start..];
			if needs_merge(&self.table, incoming) {
				merge_tail(Arc::make_mut(&mut self.table), incoming);
			}
			if self.table.len() > self.max_len {
				let table = Arc::make_mut(&mut self.table);
				let excess = table.len() - self.max_len;
				table.drain(..excess);
			}

			let tail = self.table.back().map(|bar| bar.datetime);
			let advanced = match (tail, previous_last_table) {
				(Some(t), Some(p)) => t > p,
				(Some(_), None) => true,
				_ => false,
			};
			self.freshness.updated = Flag::new(initializing || advanced, now);
			self.freshness.active = Flag::new(self.is_open(now), now);
			self.last_table_datetime = tail;

			if self.option.is_live()
				&& self.freshness.active.value
				&& self.last_bar_datetime.is_some()
				&& self.last_bar_datetime == self.last_table_datetime
			{
				Arc::make_mut(&mut self.table).pop_back();
				self.last_table_datetime = self.table.back().map(|bar| bar.datetime);
			}
		} else {
			self.freshness.updated = Flag::new(false, now);
			self.freshness.active = Flag::new(self.is_open(now), now);
		}

		self.last_price = self
			.received
			.last()
			.or_else(|| self.table.back())
			.map(|bar| LastPrice {
				close: bar.close_price,
				bar_datetime: bar.datetime,
				updated_at: now,
			})
			.or(self.last_price);
		self.initializing = false;

		tracing::debug!(
			series = %self.id,
			rows = self.table.len(),
			active = self.freshness.active.value,
			updated = self.freshness.updated.value,
			ready = self.freshness.ready.value,
			"series refreshed"
		);
	}

	fn is_open(&self, now: DateTime<Utc>) -> bool {
		self.last_bar_datetime
			.is_some_and(|ts| now - ts < self.bar_size)
	}

	fn drain_stream(&mut self) {
		let Some(stream) = self.stream.as_ref() else {
			return;
		};
		let bars = stream.drain();
		self.receive(bars);
	}

	/// 按时间戳 upsert 到接收缓冲，并限制长度。
	fn receive(&mut self, bars: impl IntoIterator<Item = Bar>) {
		for bar in bars {
			match self.received.last() {
				Some(last) if last.datetime == bar.datetime => {
					let idx = self.received.len() - 1;
					self.received[idx] = bar;
				}
				Some(last) if last.datetime > bar.datetime => {
					match self
						.received
						.binary_search_by_key(&bar.datetime, |x| x.datetime)
					{
						Ok(idx) => self.received[idx] = bar,
						Err(idx) => self.received.insert(idx, bar),
					}
				}
				_ => self.received.push(bar),
			}
		}
		if self.received.len() > self.max_len {
			let excess = self.received.len() - self.max_len;
			self.received.drain(..excess);
		}
	}
}

fn needs_merge(table: &BarTable, incoming: &[Bar]) -> bool {
	if incoming.is_empty() {
		return false;
	}
	if table.len() < incoming.len() {
		return true;
	}
	!table
		.iter()
		.skip(table.len() - incoming.len())
		.eq(incoming.iter())
}

/// 丢弃时间戳不早于首个新 bar 的表尾，然后追加新 bar。
///
/// `incoming` 先整理为严格递增（同一时间戳保留最后一份）。
pub fn merge_tail(table: &mut BarTable, incoming: &[Bar]) {
	let mut sorted = incoming.to_vec();
	sorted.sort_by_key(|bar| bar.datetime);
	let mut cleaned: Vec<Bar> = Vec::with_capacity(sorted.len());
	for bar in sorted {
		match cleaned.last_mut() {
			Some(last) if last.datetime == bar.datetime => *last = bar,
			_ => cleaned.push(bar),
		}
	}

	let Some(first) = cleaned.first() else {
		return;
	};
	while table.back().is_some_and(|bar| bar.datetime >= first.datetime) {
		table.pop_back();
	}
	table.extend(cleaned);
}
