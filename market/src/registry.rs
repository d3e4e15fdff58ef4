//! 序列注册表。
//!
//! 持有全部主序列与影子序列，以及每个周期重建的状态表。
//! 刷新顺序固定：先主序列，再影子序列，最后重建状态表。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ratchet::{AgentError, InstrumentResolver};
use serde::{Deserialize, Serialize};

use crate::metrics::StreamMetrics;
use crate::series::{BarSeries, BarTable, LastPrice, SeriesConfig};
use crate::source::BarSource;
use crate::status::{StatusBoard, StatusKind};

/// 影子序列配置：以 `instrument_id` 的身份镜像 `parent`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowConfig {
	pub id: String,
	pub instrument_id: String,
	pub parent: String,
}

/// 单个序列初始化失败的记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesFailure {
	pub series_id: String,
	pub reason: String,
}

#[derive(Debug)]
pub struct BarSeriesRegistry {
	primary_configs: Vec<SeriesConfig>,
	shadow_configs: Vec<ShadowConfig>,
	series: HashMap<String, BarSeries>,
	board: StatusBoard,
	failures: Vec<SeriesFailure>,
}

impl BarSeriesRegistry {
	/// 只校验配置，不访问数据源。
	pub fn new(primaries: Vec<SeriesConfig>, shadows: Vec<ShadowConfig>) -> Result<Self, AgentError> {
		let mut ids = HashSet::new();
		for config in &primaries {
			config.validate()?;
			if !ids.insert(config.id.as_str()) {
				return Err(AgentError::Config(format!("duplicate series id {}", config.id)));
			}
		}
		let primary_ids = ids.clone();
		for shadow in &shadows {
			if !ids.insert(shadow.id.as_str()) {
				return Err(AgentError::Config(format!("duplicate series id {}", shadow.id)));
			}
			if !primary_ids.contains(shadow.parent.as_str()) {
				return Err(AgentError::Config(format!(
					"shadow {} refers to unknown parent {}",
					shadow.id, shadow.parent
				)));
			}
		}

		Ok(Self {
			primary_configs: primaries,
			shadow_configs: shadows,
			series: HashMap::new(),
			board: StatusBoard::default(),
			failures: Vec::new(),
		})
	}

	pub fn initialize<S, R>(
		&mut self,
		source: &mut S,
		resolver: &R,
		now: DateTime<Utc>,
	) -> Result<(), AgentError>
	where
		S: BarSource + ?Sized,
		R: InstrumentResolver + ?Sized,
	{
		self.build(source, resolver, HashMap::new(), now)
	}

	fn build<S, R>(
		&mut self,
		source: &mut S,
		resolver: &R,
		mut seeds: HashMap<String, Arc<BarTable>>,
		now: DateTime<Utc>,
	) -> Result<(), AgentError>
	where
		S: BarSource + ?Sized,
		R: InstrumentResolver + ?Sized,
	{
		self.series.clear();
		self.failures.clear();

		for config in &self.primary_configs {
			let instrument = resolver.resolve(&config.instrument_id).map_err(|e| {
				AgentError::Config(format!("series {}: {e}", config.id))
			})?;
			let seed = seeds.remove(&config.id);
			match BarSeries::open(config, instrument, source, seed, now) {
				Ok(series) => {
					self.series.insert(config.id.clone(), series);
				}
				Err(AgentError::Config(reason)) => return Err(AgentError::Config(reason)),
				Err(error) => {
					tracing::warn!(series = %config.id, error = %error, "series initialization failed");
					self.failures.push(SeriesFailure {
						series_id: config.id.clone(),
						reason: error.to_string(),
					});
				}
			}
		}

		for shadow in &self.shadow_configs {
			let instrument = resolver.resolve(&shadow.instrument_id).map_err(|e| {
				AgentError::Config(format!("shadow {}: {e}", shadow.id))
			})?;
			let Some(parent) = self.series.get(&shadow.parent) else {
				return Err(AgentError::Consistency(format!(
					"shadow {} cannot mirror failed parent {}",
					shadow.id, shadow.parent
				)));
			};
			let series = BarSeries::shadow(shadow.id.clone(), instrument, parent, now);
			self.series.insert(shadow.id.clone(), series);
		}

		self.refresh(now);
		tracing::info!(
			series = self.series.len(),
			failures = self.failures.len(),
			"series registry initialized"
		);
		Ok(())
	}

	pub fn refresh(&mut self, now: DateTime<Utc>) {
		for config in &self.primary_configs {
			if let Some(series) = self.series.get_mut(&config.id) {
				series.refresh(now);
			}
		}
		for shadow in &self.shadow_configs {
			let state = self.series.get(&shadow.parent).map(BarSeries::mirror_state);
			if let (Some(state), Some(series)) = (state, self.series.get_mut(&shadow.id)) {
				series.mirror(state);
			}
		}
		let board = StatusBoard::build(self.ordered());
		self.board = board;
	}

	/// 取消全部订阅并按原配置重建。`keep_history` 时以旧表为种子。
	pub fn reset<S, R>(
		&mut self,
		source: &mut S,
		resolver: &R,
		now: DateTime<Utc>,
		keep_history: bool,
	) -> Result<(), AgentError>
	where
		S: BarSource + ?Sized,
		R: InstrumentResolver + ?Sized,
	{
		let cancelled = self.cancel_all(source);
		let seeds = if keep_history {
			self.series
				.drain()
				.filter(|(_, series)| !series.is_shadow())
				.map(|(id, series)| (id, Arc::clone(series.table_arc())))
				.collect()
		} else {
			HashMap::new()
		};
		tracing::info!(cancelled, keep_history, "series registry reset");
		self.build(source, resolver, seeds, now)
	}

	/// 取消全部实时订阅，返回成功取消的数量。
	pub fn cancel_all<S: BarSource + ?Sized>(&mut self, source: &mut S) -> usize {
		let mut cancelled = 0;
		for config in &self.primary_configs {
			let Some(series) = self.series.get_mut(&config.id) else {
				continue;
			};
			let Some(id) = series.detach() else {
				continue;
			};
			match source.cancel_subscription(id) {
				Ok(()) => cancelled += 1,
				Err(error) => {
					tracing::warn!(series = %config.id, error = %error, "cancel subscription failed");
				}
			}
		}
		cancelled
	}

	fn ordered(&self) -> impl Iterator<Item = &BarSeries> + Clone {
		self.primary_configs
			.iter()
			.map(|c| c.id.as_str())
			.chain(self.shadow_configs.iter().map(|s| s.id.as_str()))
			.filter_map(|id| self.series.get(id))
	}

	pub fn query_status(&self, kind: StatusKind, series_id: &str) -> Result<(bool, DateTime<Utc>), AgentError> {
		self.board.query(kind, series_id)
	}

	pub fn status_for_instrument(&self, kind: StatusKind, instrument_id: &str) -> Option<bool> {
		self.board
			.table(kind)
			.latest_for_instrument(instrument_id)
			.map(|row| row.status)
	}

	pub fn last_price(&self, instrument_id: &str) -> Option<LastPrice> {
		self.board.last_price.for_instrument(instrument_id)
	}

	pub fn series(&self, id: &str) -> Option<&BarSeries> {
		self.series.get(id)
	}

	pub fn board(&self) -> &StatusBoard {
		&self.board
	}

	pub fn failures(&self) -> &[SeriesFailure] {
		&self.failures
	}

	pub fn len(&self) -> usize {
		self.series.len()
	}

	pub fn is_empty(&self) -> bool {
		self.series.is_empty()
	}

	pub fn stream_metrics(&self) -> StreamMetrics {
		self.series
			.values()
			.filter_map(BarSeries::stream_metrics)
			.fold(StreamMetrics::default(), |acc, m| acc.merge(&m))
	}
}
