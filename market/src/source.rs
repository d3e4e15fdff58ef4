//! 数据源抽象。
//!
//! 券商侧只需实现历史请求、订阅与取消订阅三个操作。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ratchet::{AgentError, Bar, Instrument, Period};

use crate::ingress::BarStream;

/// 订阅句柄。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// 历史数据请求参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoricalRequest {
	/// 截止时间；`None` 表示截至当前。
	pub end: Option<DateTime<Utc>>,
	/// 回看跨度。
	pub lookback: Period,
	pub bar_size: Period,
	/// 是否在返回历史后继续推送实时 bar。
	pub keep_up_to_date: bool,
}

/// 一个实时订阅：初始 bar 加上后续推送所用的共享流。
#[derive(Debug, Clone)]
pub struct Subscription {
	pub id: SubscriptionId,
	pub initial: Vec<Bar>,
	pub stream: Arc<BarStream>,
}

pub trait BarSource {
	fn request_historical(
		&mut self,
		instrument: &Instrument,
		request: &HistoricalRequest,
	) -> Result<Vec<Bar>, AgentError>;

	fn subscribe_bars(
		&mut self,
		instrument: &Instrument,
		request: &HistoricalRequest,
	) -> Result<Subscription, AgentError>;

	fn cancel_subscription(&mut self, id: SubscriptionId) -> Result<(), AgentError>;
}
