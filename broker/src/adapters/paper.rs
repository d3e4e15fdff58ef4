use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use market::{BarSource, BarStream, HistoricalRequest, Subscription, SubscriptionId};
use order::{OrderId, OrderIntent, OrderRouter};
use portfolio::{AccountView, Holding, PortfolioView};
use ratchet::{AgentError, Bar, Instrument};

use crate::error::BrokerError;
use crate::lifecycle::{ConnectionEvent, ConnectionMonitor};
use crate::protocol::Broker;
use crate::replay::{load_csv_bars, normalize};

const STREAM_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaperStats {
    pub connects: u64,
    pub disconnects: u64,
    pub historical_requests: u64,
    pub cancelled_subscriptions: u64,
    pub cancel_all_calls: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub order_id: OrderId,
    pub intent: OrderIntent,
    pub price: f64,
    pub datetime: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Position {
    quantity: f64,
    average_price: f64,
}

#[derive(Debug)]
struct LiveStream {
    instrument_id: String,
    stream: Arc<BarStream>,
    delivered_until: Option<DateTime<Utc>>,
    alive: bool,
}

/// In-process venue over scripted bars and a simulated clock.
///
/// Bars become visible once the clock reaches their start time, so the last
/// bar seen by a live stream is usually still forming. Orders fill at once at
/// the latest visible close. A connectivity loss kills every open stream.
#[derive(Debug)]
pub struct PaperBroker {
    clock: DateTime<Utc>,
    monitor: ConnectionMonitor,
    instruments: HashMap<String, Instrument>,
    bars: HashMap<String, Vec<Bar>>,
    streams: BTreeMap<SubscriptionId, LiveStream>,
    next_subscription: u64,
    schedule: Vec<(DateTime<Utc>, ConnectionEvent)>,
    positions: BTreeMap<String, Position>,
    cash: f64,
    realized_pnl: f64,
    fills: Vec<Fill>,
    next_order: u64,
    stats: PaperStats,
}

impl PaperBroker {
    pub fn new(start: DateTime<Utc>, cash: f64) -> Self {
        Self {
            clock: start,
            monitor: ConnectionMonitor::new(),
            instruments: HashMap::new(),
            bars: HashMap::new(),
            streams: BTreeMap::new(),
            next_subscription: 0,
            schedule: Vec::new(),
            positions: BTreeMap::new(),
            cash,
            realized_pnl: 0.0,
            fills: Vec::new(),
            next_order: 0,
            stats: PaperStats::default(),
        }
    }

    pub fn add_instrument(&mut self, instrument: Instrument) {
        self.instruments.insert(instrument.id.clone(), instrument);
    }

    pub fn add_bars(&mut self, instrument_id: impl Into<String>, bars: Vec<Bar>) {
        let entry = self.bars.entry(instrument_id.into()).or_default();
        entry.extend(bars);
        *entry = normalize(std::mem::take(entry));
    }

    pub fn load_csv(&mut self, instrument_id: impl Into<String>, path: impl AsRef<Path>) -> Result<usize, BrokerError> {
        let bars = load_csv_bars(path)?;
        let count = bars.len();
        self.add_bars(instrument_id, bars);
        Ok(count)
    }

    /// Raises `event` once the clock reaches `at`.
    pub fn schedule(&mut self, at: DateTime<Utc>, event: ConnectionEvent) {
        self.schedule.push((at, event));
        self.schedule.sort_by_key(|(at, _)| *at);
    }

    /// Seeds a position as if it had been bought at `price`.
    pub fn set_position(&mut self, instrument_id: impl Into<String>, quantity: f64, price: f64) {
        self.positions.insert(
            instrument_id.into(),
            Position {
                quantity,
                average_price: price,
            },
        );
    }

    pub fn clock(&self) -> DateTime<Utc> {
        self.clock
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn stats(&self) -> PaperStats {
        self.stats
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Ids of streams still being fed.
    pub fn live_subscriptions(&self) -> Vec<SubscriptionId> {
        self.streams
            .iter()
            .filter(|(_, s)| s.alive)
            .map(|(id, _)| *id)
            .collect()
    }

    fn multiplier(&self, instrument_id: &str) -> f64 {
        self.instruments
            .get(instrument_id)
            .map(Instrument::multiplier)
            .unwrap_or(1.0)
    }

    fn visible(&self, instrument_id: &str) -> &[Bar] {
        let bars = self.bars.get(instrument_id).map(Vec::as_slice).unwrap_or_default();
        let end = bars.partition_point(|bar| bar.datetime <= self.clock);
        &bars[..end]
    }

    fn last_close(&self, instrument_id: &str) -> Option<f64> {
        self.visible(instrument_id).last().map(|bar| bar.close_price)
    }

    fn history(&self, instrument_id: &str, request: &HistoricalRequest) -> Vec<Bar> {
        let end = request.end.unwrap_or(self.clock);
        let start = end - request.lookback.as_duration();
        self.visible(instrument_id)
            .iter()
            .filter(|bar| bar.datetime >= start)
            .filter(|bar| match request.end {
                Some(end) => bar.datetime < end,
                None => true,
            })
            .copied()
            .collect()
    }

    fn advance(&mut self, by: Duration) -> bool {
        self.clock += by.max(Duration::zero());

        let due = self.schedule.partition_point(|(at, _)| *at <= self.clock);
        for (_, event) in self.schedule.drain(..due).collect::<Vec<_>>() {
            self.monitor.on_event(event);
            if matches!(event, ConnectionEvent::Lost | ConnectionEvent::HistoricalFarmDown) {
                for stream in self.streams.values_mut() {
                    stream.alive = false;
                }
            }
        }

        if !self.monitor.is_connected() {
            return false;
        }

        let mut delivered = false;
        let clock = self.clock;
        for live in self.streams.values_mut().filter(|s| s.alive) {
            let Some(bars) = self.bars.get(&live.instrument_id) else {
                continue;
            };
            for bar in bars.iter() {
                if !(bar.datetime <= clock) {
                    continue;
                }
                if !live.delivered_until.is_none_or(|until| bar.datetime > until) {
                    continue;
                }
                live.stream.push(*bar);
                live.delivered_until = Some(bar.datetime);
                delivered = true;
            }
        }
        delivered
    }

    fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.monitor.is_connected() {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    fn fill(&mut self, intent: &OrderIntent, price: f64) {
        let multiplier = self.multiplier(&intent.instrument_id);
        let delta = intent.signed_quantity();
        let position = self.positions.entry(intent.instrument_id.clone()).or_default();

        if position.quantity != 0.0 && position.quantity.signum() != delta.signum() {
            let closed = delta.abs().min(position.quantity.abs());
            self.realized_pnl +=
                (price - position.average_price) * closed * position.quantity.signum() * multiplier;
        }

        let quantity = position.quantity + delta;
        position.average_price = if quantity == 0.0 {
            0.0
        } else if position.quantity == 0.0 || position.quantity.signum() != quantity.signum() {
            price
        } else if quantity.abs() > position.quantity.abs() {
            (position.average_price * position.quantity + price * delta) / quantity
        } else {
            position.average_price
        };
        position.quantity = quantity;
        self.cash -= delta * price * multiplier;
    }
}

impl BarSource for PaperBroker {
    fn request_historical(
        &mut self,
        instrument: &Instrument,
        request: &HistoricalRequest,
    ) -> Result<Vec<Bar>, AgentError> {
        self.ensure_connected()?;
        self.stats.historical_requests += 1;
        if !self.bars.contains_key(&instrument.id) {
            return Err(BrokerError::NoMarketData(instrument.id.clone()).into());
        }
        Ok(self.history(&instrument.id, request))
    }

    fn subscribe_bars(
        &mut self,
        instrument: &Instrument,
        request: &HistoricalRequest,
    ) -> Result<Subscription, AgentError> {
        self.ensure_connected()?;
        if !self.bars.contains_key(&instrument.id) {
            return Err(BrokerError::NoMarketData(instrument.id.clone()).into());
        }
        let initial = self.history(&instrument.id, &HistoricalRequest { end: None, ..*request });
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        let stream = Arc::new(BarStream::new(STREAM_CAPACITY));
        self.streams.insert(
            id,
            LiveStream {
                instrument_id: instrument.id.clone(),
                stream: Arc::clone(&stream),
                delivered_until: initial.last().map(|bar| bar.datetime),
                alive: true,
            },
        );
        tracing::debug!(subscription = id.0, instrument = %instrument.id, initial = initial.len(), "bars subscribed");
        Ok(Subscription { id, initial, stream })
    }

    fn cancel_subscription(&mut self, id: SubscriptionId) -> Result<(), AgentError> {
        if self.streams.remove(&id).is_none() {
            return Err(BrokerError::UnknownSubscription(id.0).into());
        }
        self.stats.cancelled_subscriptions += 1;
        Ok(())
    }
}

impl OrderRouter for PaperBroker {
    fn submit_order(&mut self, intent: &OrderIntent) -> Result<OrderId, AgentError> {
        self.ensure_connected()?;
        if intent.quantity <= 0.0 {
            return Err(BrokerError::OrderRejected(format!(
                "{}: quantity {} must be positive",
                intent.instrument_id, intent.quantity
            ))
            .into());
        }
        let close = self
            .last_close(&intent.instrument_id)
            .ok_or_else(|| BrokerError::OrderRejected(format!("{}: no price", intent.instrument_id)))?;
        let price = self
            .instruments
            .get(&intent.instrument_id)
            .map_or(close, |instrument| instrument.round_price(close));

        self.next_order += 1;
        let order_id = OrderId(self.next_order);
        self.fill(intent, price);
        self.fills.push(Fill {
            order_id,
            intent: intent.clone(),
            price,
            datetime: self.clock,
        });
        tracing::info!(
            order = order_id.0,
            instrument = %intent.instrument_id,
            action = %intent.action,
            quantity = intent.quantity,
            price,
            "order filled"
        );
        Ok(order_id)
    }

    fn cancel_all_open_orders(&mut self) -> Result<usize, AgentError> {
        self.stats.cancel_all_calls += 1;
        Ok(0)
    }
}

impl PortfolioView for PaperBroker {
    fn holdings(&self) -> Vec<Holding> {
        self.positions
            .iter()
            .filter(|(_, p)| p.quantity != 0.0)
            .map(|(id, p)| {
                let price = self.last_close(id).unwrap_or(p.average_price);
                Holding {
                    instrument_id: id.clone(),
                    quantity: p.quantity,
                    market_value: p.quantity * price * self.multiplier(id),
                }
            })
            .collect()
    }

    fn base_value(&self) -> f64 {
        self.net_liquidity()
    }
}

impl AccountView for PaperBroker {
    fn net_liquidity(&self) -> f64 {
        self.cash + self.holdings().iter().map(|h| h.market_value).sum::<f64>()
    }

    fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    fn unrealized_pnl(&self) -> f64 {
        self.positions
            .iter()
            .filter_map(|(id, p)| {
                let price = self.last_close(id)?;
                Some((price - p.average_price) * p.quantity * self.multiplier(id))
            })
            .sum()
    }
}

impl Broker for PaperBroker {
    fn connect(&mut self) -> Result<(), AgentError> {
        self.monitor.set_connected(true);
        self.stats.connects += 1;
        tracing::info!(clock = %self.clock, "paper broker connected");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.monitor.set_connected(false);
        for stream in self.streams.values_mut() {
            stream.alive = false;
        }
        self.stats.disconnects += 1;
        tracing::info!(clock = %self.clock, "paper broker disconnected");
    }

    fn current_time(&self) -> Result<DateTime<Utc>, AgentError> {
        Ok(self.clock)
    }

    fn wait_on_update(&mut self, timeout: Duration) -> bool {
        self.advance(timeout)
    }

    fn sleep(&mut self, duration: Duration) {
        self.advance(duration);
    }

    fn connection(&self) -> &ConnectionMonitor {
        &self.monitor
    }
}
