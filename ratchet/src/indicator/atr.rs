use crate::bar::Bar;
use crate::constant::RangeType;

use super::core::Indicator;
use super::rolling::RollingMean;

/// True range between a bar and the one before it.
pub fn true_range(range_type: RangeType, current: &Bar, previous: &Bar) -> f64 {
    match range_type {
        RangeType::Full => current
            .total_range()
            .max(previous.total_range())
            .max((current.high_price - previous.low_price).abs())
            .max((previous.high_price - current.low_price).abs()),
        RangeType::None => current
            .total_range()
            .max((current.high_price - previous.close_price).abs())
            .max((current.low_price - previous.close_price).abs()),
    }
}

/// Channel half-width: `multiplier` times the mean true range.
///
/// The range reported for bar *i* is measured on bars *i-1* and *i-2*, so the
/// bar being classified never contributes to its own channel.
#[derive(Debug, Clone)]
pub struct TrailingAtr {
    name: String,
    range_type: RangeType,
    multiplier: f64,
    mean: RollingMean,
    last: Option<Bar>,
    before_last: Option<Bar>,
    true_range: Option<f64>,
    value: Option<f64>,
}

impl TrailingAtr {
    pub fn new(window: usize, multiplier: f64, range_type: RangeType) -> Self {
        Self {
            name: format!("atr_trailing_{window}"),
            range_type,
            multiplier,
            mean: RollingMean::new(window),
            last: None,
            before_last: None,
            true_range: None,
            value: None,
        }
    }

    /// True range attached to the most recent update.
    pub fn true_range(&self) -> Option<f64> {
        self.true_range
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

impl Indicator for TrailingAtr {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) {
        self.mean.clear();
        self.last = None;
        self.before_last = None;
        self.true_range = None;
        self.value = None;
    }

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        self.true_range = match (&self.last, &self.before_last) {
            (Some(current), Some(previous)) => Some(true_range(self.range_type, current, previous)),
            _ => None,
        };
        self.value = match self.true_range {
            Some(tr) => self.mean.push(tr).map(|mean| mean * self.multiplier),
            None => None,
        };
        self.before_last = self.last.take();
        self.last = Some(*bar);
        self.value
    }
}
