use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use ratchet::{Action, Bar, Direction, Indicator, RangeType, TrailingAtr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Breakout {
    Resist,
    Support,
    XLevelUp,
    XLevelDown,
}

impl Breakout {
    pub fn action(self) -> Action {
        match self {
            Self::Resist | Self::XLevelUp => Action::Buy,
            Self::Support | Self::XLevelDown => Action::Sell,
        }
    }
}

/// Channel state attached to one bar of the series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelRecord {
    pub datetime: DateTime<Utc>,
    pub close: f64,
    pub true_range: Option<f64>,
    pub atr: Option<f64>,
    pub support: Option<f64>,
    pub resist: Option<f64>,
    pub x_level: Option<f64>,
    /// Side in effect when the levels were trailed.
    pub side: Option<Direction>,
    pub breakout: Option<Breakout>,
}

impl ChannelRecord {
    pub fn action(&self) -> Option<Action> {
        self.breakout.map(Breakout::action)
    }
}

/// ATR trailing channel, fed one closed bar at a time.
#[derive(Debug, Clone)]
pub struct ChannelEngine {
    atr: TrailingAtr,
    records: VecDeque<ChannelRecord>,
    max_len: usize,
    side: Option<Direction>,
    x_side: Option<Direction>,
}

impl ChannelEngine {
    pub fn new(window: usize, multiplier: f64, range_type: RangeType, max_len: usize) -> Self {
        Self {
            atr: TrailingAtr::new(window, multiplier, range_type),
            records: VecDeque::new(),
            max_len: max_len.max(1),
            side: None,
            x_side: None,
        }
    }

    pub fn reset(&mut self) {
        self.atr.reset();
        self.records.clear();
        self.side = None;
        self.x_side = None;
    }

    pub fn update(&mut self, bar: &Bar) -> &ChannelRecord {
        let atr = self.atr.update(bar);
        let true_range = self.atr.true_range();
        let previous = self.records.back().copied();
        let close_0 = bar.close_price;

        let mut record = ChannelRecord {
            datetime: bar.datetime,
            close: close_0,
            true_range,
            atr,
            support: None,
            resist: None,
            x_level: None,
            side: None,
            breakout: None,
        };

        if let (Some(atr), Some(previous)) = (atr, previous) {
            let close_1 = previous.close;
            match previous.support.zip(previous.resist) {
                None => {
                    record.support = Some(close_1 - atr);
                    record.resist = Some(close_1 + atr);
                }
                Some((support, resist)) => {
                    record.x_level = match self.x_side.take() {
                        Some(Direction::Up) => Some(resist),
                        Some(Direction::Down) => Some(support),
                        None => previous.x_level,
                    };
                    record.side = self.side;
                    let (s, r) = match self.side {
                        Some(Direction::Up) => (support.max(close_1 - atr), close_1 + atr),
                        Some(Direction::Down) => (close_1 - atr, resist.min(close_1 + atr)),
                        None => (support.max(close_1 - atr), resist.min(close_1 + atr)),
                    };
                    record.support = Some(s);
                    record.resist = Some(r);
                }
            }
            record.breakout = self.classify(close_1, close_0, &record);
        }

        self.records.push_back(record);
        if self.records.len() > self.max_len {
            self.records.pop_front();
        }
        &self.records[self.records.len() - 1]
    }

    fn classify(&mut self, close_1: f64, close_0: f64, record: &ChannelRecord) -> Option<Breakout> {
        let crosses_up = |level: f64| close_1 < level && level < close_0;
        let crosses_down = |level: f64| close_1 > level && level > close_0;

        if record.resist.is_some_and(crosses_up) {
            self.side = Some(Direction::Up);
            self.x_side = Some(Direction::Up);
            Some(Breakout::Resist)
        } else if record.support.is_some_and(crosses_down) {
            self.side = Some(Direction::Down);
            self.x_side = Some(Direction::Down);
            Some(Breakout::Support)
        } else if record.x_level.is_some_and(crosses_up) {
            self.side = Some(Direction::Up);
            Some(Breakout::XLevelUp)
        } else if record.x_level.is_some_and(crosses_down) {
            self.side = Some(Direction::Down);
            Some(Breakout::XLevelDown)
        } else {
            self.x_side = None;
            None
        }
    }

    pub fn last(&self) -> Option<&ChannelRecord> {
        self.records.back()
    }

    pub fn records(&self) -> &VecDeque<ChannelRecord> {
        &self.records
    }

    pub fn record_at(&self, datetime: DateTime<Utc>) -> Option<&ChannelRecord> {
        self.records
            .binary_search_by_key(&datetime, |r| r.datetime)
            .ok()
            .map(|idx| &self.records[idx])
    }

    pub fn side(&self) -> Option<Direction> {
        self.side
    }
}
