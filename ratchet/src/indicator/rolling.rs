use std::collections::VecDeque;

/// Simple moving average over a fixed number of samples.
#[derive(Debug, Clone)]
pub struct RollingMean {
    window: usize,
    values: VecDeque<f64>,
}

impl RollingMean {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            values: VecDeque::with_capacity(window),
        }
    }

    pub fn push(&mut self, value: f64) -> Option<f64> {
        self.values.push_back(value);
        if self.values.len() > self.window {
            self.values.pop_front();
        }
        self.value()
    }

    /// `None` until the window is full.
    pub fn value(&self) -> Option<f64> {
        if self.values.len() < self.window {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.window as f64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}
