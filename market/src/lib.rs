//! `market` crate 入口。
//!
//! 职责：维护每个品种"历史 + 实时"合并后的 bar 表、新鲜度标志与状态表。
//! 该文件只做模块装配与统一导出，具体实现位于各子模块。
//!
//! 模块分工：
//! - `ingress`：实时 bar 的有界无锁队列与过载策略。
//! - `series`：单品种 bar 序列（合并、淘汰、新鲜度状态机）。
//! - `registry`：序列注册表（主序列、影子序列、重置）。
//! - `status`：active / updated / ready 状态表与最新价表。
//! - `source`：数据源抽象。
//! - `request`：连续历史分页请求。
//! - `metrics`：运行指标快照。
//!
//! 快速示例：
//! ```rust
//! use std::sync::Arc;
//! use chrono::{Duration, TimeZone, Utc};
//! use market::{BarSeries, BarStream, SeriesConfig, SeriesOption};
//! use ratchet::{Bar, Instrument, Period};
//!
//! let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
//! let config = SeriesConfig {
//!     id: "ES".to_string(),
//!     instrument_id: "ES".to_string(),
//!     bar_size: Period::minutes(1),
//!     lookback: Period::days(1),
//!     option: SeriesOption::LiveUpdating,
//!     keep_up_to_date: true,
//!     max_len: 1_000,
//!     start_date: None,
//!     stream_capacity: 64,
//! };
//! let instrument = Instrument {
//!     id: "ES".to_string(),
//!     symbol: "ES".to_string(),
//!     exchange: "CME".to_string(),
//!     sec_type: "FUT".to_string(),
//!     currency: "USD".to_string(),
//!     multiplier: Some(50.0),
//!     tick_size: Some(0.25),
//! };
//! let stream = Arc::new(BarStream::new(64));
//! let mut series = BarSeries::from_bars(&config, instrument, Vec::new(), Some(stream.clone()), t0).unwrap();
//!
//! stream.push(Bar::new(t0, 10.0, 11.0, 9.5, 10.5, 100.0));
//! series.refresh(t0 + Duration::seconds(20));
//! assert!(series.is_active());
//! ```

mod ingress;
mod metrics;
mod registry;
mod request;
mod series;
mod source;
mod status;

pub use ingress::{BarStream, IngressPushResult, OverloadPolicy};
pub use metrics::StreamMetrics;
pub use registry::{BarSeriesRegistry, SeriesFailure, ShadowConfig};
pub use request::request_consecutive;
pub use series::{
	BarSeries, BarTable, Flag, Freshness, LastPrice, MirrorState, SeriesConfig, SeriesKind,
	SeriesOption, merge_tail,
};
pub use source::{BarSource, HistoricalRequest, Subscription, SubscriptionId};
pub use status::{LastPriceRow, LastPriceTable, StatusBoard, StatusKind, StatusRow, StatusTable};
