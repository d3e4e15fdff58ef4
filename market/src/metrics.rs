//! 指标快照模块。
//!
//! 提供实时 bar 流的只读运行指标。

/// 单个 `BarStream` 的指标快照。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamMetrics {
	/// 成功写入队列的 bar 数量。
	pub published: u64,
	/// 丢弃总量（`dropped_newest + dropped_oldest`）。
	pub dropped: u64,
	/// 新数据被丢弃数量。
	pub dropped_newest: u64,
	/// 旧数据被丢弃数量。
	pub dropped_oldest: u64,
	/// 当前长度。
	pub len: usize,
	/// 容量上限。
	pub capacity: usize,
}

impl StreamMetrics {
	/// 多个流的指标求和。
	pub fn merge(&self, other: &Self) -> Self {
		Self {
			published: self.published + other.published,
			dropped: self.dropped + other.dropped,
			dropped_newest: self.dropped_newest + other.dropped_newest,
			dropped_oldest: self.dropped_oldest + other.dropped_oldest,
			len: self.len + other.len,
			capacity: self.capacity + other.capacity,
		}
	}
}
