use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared interrupt request, raised from a signal handler thread.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn raise(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_raised(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

#[cfg(test)]
mod tests {
	use super::StopFlag;

	#[test]
	fn clones_share_state() {
		let flag = StopFlag::new();
		let handle = flag.clone();
		assert!(!flag.is_raised());
		handle.raise();
		assert!(flag.is_raised());
	}
}
