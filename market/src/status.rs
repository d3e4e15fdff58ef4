//! 状态表。
//!
//! 每个周期由注册表从序列状态重新生成的值快照，不持有任何序列引用。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ratchet::AgentError;

use crate::series::{BarSeries, Flag, LastPrice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
	Active,
	Updated,
	Ready,
}

impl StatusKind {
	fn flag(self, series: &BarSeries) -> Flag {
		let freshness = series.freshness();
		match self {
			Self::Active => freshness.active,
			Self::Updated => freshness.updated,
			Self::Ready => freshness.ready,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
	pub series_id: String,
	pub instrument_id: String,
	pub status: bool,
	pub updated_at: DateTime<Utc>,
}

/// series id → 状态。
#[derive(Debug, Clone, Default)]
pub struct StatusTable {
	rows: BTreeMap<String, StatusRow>,
}

impl StatusTable {
	fn build<'a>(kind: StatusKind, series: impl Iterator<Item = &'a BarSeries>) -> Self {
		let rows = series
			.map(|s| {
				let flag = kind.flag(s);
				(
					s.id().to_string(),
					StatusRow {
						series_id: s.id().to_string(),
						instrument_id: s.instrument().id.clone(),
						status: flag.value,
						updated_at: flag.updated_at,
					},
				)
			})
			.collect();
		Self { rows }
	}

	pub fn get(&self, series_id: &str) -> Option<&StatusRow> {
		self.rows.get(series_id)
	}

	/// 同一品种可能对应多个序列，取最近更新的一行。
	pub fn latest_for_instrument(&self, instrument_id: &str) -> Option<&StatusRow> {
		self.rows
			.values()
			.filter(|row| row.instrument_id == instrument_id)
			.max_by_key(|row| row.updated_at)
	}

	pub fn rows(&self) -> impl Iterator<Item = &StatusRow> {
		self.rows.values()
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct LastPriceRow {
	pub series_id: String,
	pub instrument_id: String,
	pub price: LastPrice,
}

#[derive(Debug, Clone, Default)]
pub struct LastPriceTable {
	rows: BTreeMap<String, LastPriceRow>,
}

impl LastPriceTable {
	fn build<'a>(series: impl Iterator<Item = &'a BarSeries>) -> Self {
		let rows = series
			.filter_map(|s| {
				s.last_price().map(|price| {
					(
						s.id().to_string(),
						LastPriceRow {
							series_id: s.id().to_string(),
							instrument_id: s.instrument().id.clone(),
							price,
						},
					)
				})
			})
			.collect();
		Self { rows }
	}

	pub fn get(&self, series_id: &str) -> Option<&LastPriceRow> {
		self.rows.get(series_id)
	}

	pub fn for_instrument(&self, instrument_id: &str) -> Option<LastPrice> {
		self.rows
			.values()
			.filter(|row| row.instrument_id == instrument_id)
			.max_by_key(|row| (row.price.updated_at, row.price.bar_datetime))
			.map(|row| row.price)
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}
}

/// 三张状态表加最新价表。
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
	pub active: StatusTable,
	pub updated: StatusTable,
	pub ready: StatusTable,
	pub last_price: LastPriceTable,
}

impl StatusBoard {
	pub fn build<'a, I>(series: I) -> Self
	where
		I: Iterator<Item = &'a BarSeries> + Clone,
	{
		Self {
			active: StatusTable::build(StatusKind::Active, series.clone()),
			updated: StatusTable::build(StatusKind::Updated, series.clone()),
			ready: StatusTable::build(StatusKind::Ready, series.clone()),
			last_price: LastPriceTable::build(series),
		}
	}

	pub fn table(&self, kind: StatusKind) -> &StatusTable {
		match kind {
			StatusKind::Active => &self.active,
			StatusKind::Updated => &self.updated,
			StatusKind::Ready => &self.ready,
		}
	}

	pub fn query(&self, kind: StatusKind, series_id: &str) -> Result<(bool, DateTime<Utc>), AgentError> {
		self.table(kind)
			.get(series_id)
			.map(|row| (row.status, row.updated_at))
			.ok_or_else(|| AgentError::not_found("series status", series_id))
	}
}
