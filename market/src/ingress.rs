//! ingress（入站）模块。
//!
//! 提供有界无锁队列与过载策略。券商回调线程只调用 `push`，
//! 序列只在 `refresh` 内调用 `drain`，因此一次刷新读到的是一致快照。

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::ArrayQueue;
use ratchet::Bar;

use crate::metrics::StreamMetrics;

/// ingress 满载时的处理策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverloadPolicy {
	/// 丢弃当前新入队数据，保留既有队列内容。
	DropNewest,
	/// 丢弃队列最旧数据，再尝试写入当前新数据。
	#[default]
	DropOldest,
}

/// 单次 `push` 的结果，用于上层统计背压与丢弃行为。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressPushResult {
	/// 成功入队。
	Enqueued,
	/// 因策略或竞争导致新数据被丢弃。
	DroppedNewest,
	/// 为写入新数据而丢弃了旧数据。
	DroppedOldest,
}

/// 单个订阅的实时 bar 流（有界无锁 ring buffer）。
#[derive(Debug)]
pub struct BarStream {
	queue: ArrayQueue<Bar>,
	capacity: usize,
	overload_policy: OverloadPolicy,
	published: AtomicU64,
	dropped_newest: AtomicU64,
	dropped_oldest: AtomicU64,
}

impl BarStream {
	/// 使用默认过载策略创建。
	pub fn new(capacity: usize) -> Self {
		Self::with_policy(capacity, OverloadPolicy::default())
	}

	/// 使用指定过载策略创建。
	pub fn with_policy(capacity: usize, overload_policy: OverloadPolicy) -> Self {
		let bounded_capacity = capacity.max(1);
		Self {
			queue: ArrayQueue::new(bounded_capacity),
			capacity: bounded_capacity,
			overload_policy,
			published: AtomicU64::new(0),
			dropped_newest: AtomicU64::new(0),
			dropped_oldest: AtomicU64::new(0),
		}
	}

	/// 尝试写入一个 bar，并返回入队结果。
	pub fn push(&self, bar: Bar) -> IngressPushResult {
		let result = match self.queue.push(bar) {
			Ok(()) => IngressPushResult::Enqueued,
			Err(returned) => match self.overload_policy {
				OverloadPolicy::DropNewest => IngressPushResult::DroppedNewest,
				OverloadPolicy::DropOldest => {
					let _ = self.queue.pop();
					if self.queue.push(returned).is_ok() {
						IngressPushResult::DroppedOldest
					} else {
						IngressPushResult::DroppedNewest
					}
				}
			},
		};
		match result {
			IngressPushResult::Enqueued => {
				self.published.fetch_add(1, Ordering::Relaxed);
			}
			IngressPushResult::DroppedOldest => {
				self.published.fetch_add(1, Ordering::Relaxed);
				self.dropped_oldest.fetch_add(1, Ordering::Relaxed);
			}
			IngressPushResult::DroppedNewest => {
				self.dropped_newest.fetch_add(1, Ordering::Relaxed);
			}
		}
		result
	}

	/// 弹出一个 bar。
	pub fn pop(&self) -> Option<Bar> {
		self.queue.pop()
	}

	/// 取出当前队列中的全部 bar（按入队顺序）。
	pub fn drain(&self) -> Vec<Bar> {
		let mut out = Vec::with_capacity(self.queue.len());
		while let Some(bar) = self.queue.pop() {
			out.push(bar);
		}
		out
	}

	/// 当前队列长度。
	pub fn len(&self) -> usize {
		self.queue.len()
	}

	pub fn is_empty(&self) -> bool {
		self.queue.is_empty()
	}

	/// 队列容量上限。
	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// 指标快照。
	pub fn metrics(&self) -> StreamMetrics {
		let dropped_newest = self.dropped_newest.load(Ordering::Relaxed);
		let dropped_oldest = self.dropped_oldest.load(Ordering::Relaxed);
		StreamMetrics {
			published: self.published.load(Ordering::Relaxed),
			dropped: dropped_newest + dropped_oldest,
			dropped_newest,
			dropped_oldest,
			len: self.queue.len(),
			capacity: self.capacity,
		}
	}
}
