use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use market::{BarSeries, BarSeriesRegistry};
use ratchet::utils::{push_bounded, HISTORY_LEN};
use ratchet::{AgentError, Bar, Period, RangeType, Signal, SignalSink, SignalValidity};
use serde::{Deserialize, Serialize};

use crate::channel::{ChannelEngine, ChannelRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutConfig {
    pub strategy_id: String,
    pub instrument_id: String,
    pub series_id: String,
    pub tag: String,
    pub window: usize,
    pub multiplier: f64,
    #[serde(default)]
    pub range_type: RangeType,
    pub signal_valid_latency: Period,
    pub signal_valid_survival: Period,
    #[serde(default)]
    pub send_initial_signal: bool,
}

impl BreakoutConfig {
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.window == 0 {
            return Err(AgentError::Config(format!("{}: window must be >= 1", self.strategy_id)));
        }
        if self.multiplier.is_nan() || self.multiplier <= 0.0 {
            return Err(AgentError::Config(format!(
                "{}: multiplier must be positive",
                self.strategy_id
            )));
        }
        Ok(())
    }

    /// Bars needed before the channel can classify anything.
    pub fn warm_up(&self) -> usize {
        self.window + 2
    }
}

#[derive(Debug, Clone)]
struct PendingSignal {
    signal: Signal,
    initial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StrategyUpdate {
    pub created: usize,
    pub published: usize,
}

/// Breakout strategy on a single series.
#[derive(Debug)]
pub struct BreakoutStrategy {
    config: BreakoutConfig,
    validity: SignalValidity,
    engine: ChannelEngine,
    last_processed: Option<DateTime<Utc>>,
    pending: Vec<PendingSignal>,
    archive: VecDeque<Signal>,
    signal_count: u64,
    initialized: bool,
    ready: bool,
}

impl BreakoutStrategy {
    pub fn new(config: BreakoutConfig) -> Result<Self, AgentError> {
        config.validate()?;
        let validity = SignalValidity::new(
            config.signal_valid_latency.as_duration(),
            config.signal_valid_survival.as_duration(),
        );
        let engine = ChannelEngine::new(config.window, config.multiplier, config.range_type, 1);
        Ok(Self {
            config,
            validity,
            engine,
            last_processed: None,
            pending: Vec::new(),
            archive: VecDeque::new(),
            signal_count: 0,
            initialized: false,
            ready: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.config.strategy_id
    }

    pub fn config(&self) -> &BreakoutConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn records(&self) -> impl Iterator<Item = &ChannelRecord> {
        self.engine.records().iter()
    }

    pub fn last_record(&self) -> Option<&ChannelRecord> {
        self.engine.last()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Recently stamped signals, valid or not.
    pub fn archive(&self) -> &VecDeque<Signal> {
        &self.archive
    }

    pub fn update(
        &mut self,
        registry: &BarSeriesRegistry,
        now: DateTime<Utc>,
        sink: &mut dyn SignalSink,
    ) -> Result<StrategyUpdate, AgentError> {
        let series = registry
            .series(&self.config.series_id)
            .ok_or_else(|| AgentError::not_found("series", self.config.series_id.clone()))?;

        self.ready = series.is_active() && series.is_updated() && series.is_ready();
        if !series.is_updated() {
            return Ok(StrategyUpdate::default());
        }

        let created = if self.initialized {
            self.run(series)
        } else {
            let created = self.initialize(series)?;
            self.initialized = true;
            created
        };

        let published = if self.ready {
            self.process_signals(series, now, sink)
        } else {
            0
        };

        if let Some(record) = self.engine.last() {
            tracing::debug!(
                strategy = %self.config.strategy_id,
                close = record.close,
                support = ?record.support,
                resist = ?record.resist,
                x_level = ?record.x_level,
                side = ?self.engine.side(),
                breakout = ?record.breakout,
                "channel levels"
            );
        }

        Ok(StrategyUpdate { created, published })
    }

    fn initialize(&mut self, series: &BarSeries) -> Result<usize, AgentError> {
        let table = series.table();
        if table.len() < self.config.warm_up() {
            return Err(AgentError::Consistency(format!(
                "{} needs {} bars on {}, got {}",
                self.config.strategy_id,
                self.config.warm_up(),
                series.id(),
                table.len()
            )));
        }

        self.engine = self.new_engine(series);
        let mut created = 0;
        for bar in table.iter() {
            created += self.step(bar, true);
        }
        self.last_processed = table.back().map(|bar| bar.datetime);
        tracing::info!(
            strategy = %self.config.strategy_id,
            bars = table.len(),
            signals = created,
            "strategy initialized"
        );
        Ok(created)
    }

    fn run(&mut self, series: &BarSeries) -> usize {
        let table = series.table();
        let Some(last) = self.last_processed else {
            return self.replay(series, None);
        };

        let position = table.binary_search_by_key(&last, |bar| bar.datetime).ok();
        let aligned = position.is_some_and(|idx| {
            self.engine
                .last()
                .is_some_and(|record| record.datetime == last && record.close == table[idx].close_price)
        });

        match position {
            Some(idx) if aligned => {
                let mut created = 0;
                for bar in table.iter().skip(idx + 1) {
                    created += self.step(bar, false);
                }
                self.last_processed = table.back().map(|bar| bar.datetime).or(self.last_processed);
                created
            }
            _ => {
                tracing::info!(
                    strategy = %self.config.strategy_id,
                    last = %last,
                    "processed bar no longer in table, rebuilding channel"
                );
                self.replay(series, Some(last))
            }
        }
    }

    /// Rebuilds the channel from the whole table; only bars after `after`
    /// produce signals.
    fn replay(&mut self, series: &BarSeries, after: Option<DateTime<Utc>>) -> usize {
        self.engine = self.new_engine(series);
        let mut created = 0;
        for bar in series.table().iter() {
            let emit = after.is_none_or(|after| bar.datetime > after);
            if emit {
                created += self.step(bar, false);
            } else {
                self.engine.update(bar);
            }
        }
        self.last_processed = series.table().back().map(|bar| bar.datetime).or(after);
        created
    }

    /// Channel records are kept as long as the bar table.
    fn new_engine(&self, series: &BarSeries) -> ChannelEngine {
        ChannelEngine::new(
            self.config.window,
            self.config.multiplier,
            self.config.range_type,
            series.max_len(),
        )
    }

    fn step(&mut self, bar: &Bar, initial: bool) -> usize {
        let Some(action) = self.engine.update(bar).action() else {
            return 0;
        };
        self.signal_count += 1;
        let signal = Signal {
            id: format!(
                "{}_{}_{}",
                self.config.strategy_id,
                bar.datetime.timestamp(),
                self.signal_count
            ),
            instrument_id: self.config.instrument_id.clone(),
            action,
            signal_datetime: bar.datetime,
            created_datetime: bar.datetime,
            tag: self.config.tag.clone(),
            is_valid: false,
        };
        tracing::debug!(
            strategy = %self.config.strategy_id,
            signal = %signal.id,
            action = %action,
            "signal created"
        );
        self.pending.push(PendingSignal { signal, initial });
        1
    }

    fn process_signals(&mut self, series: &BarSeries, now: DateTime<Utc>, sink: &mut dyn SignalSink) -> usize {
        let current_bar = series.last_bar_datetime().unwrap_or(now);
        let mut published = 0;
        for pending in self.pending.drain(..) {
            let mut signal = pending.signal;
            signal.created_datetime = now;
            signal.is_valid = if pending.initial && !self.config.send_initial_signal {
                false
            } else {
                self.validity
                    .is_valid(signal.signal_datetime, signal.created_datetime, current_bar)
            };
            if signal.is_valid {
                sink.publish(signal.clone());
                published += 1;
            }
            push_bounded(&mut self.archive, signal, HISTORY_LEN);
        }
        published
    }
}
