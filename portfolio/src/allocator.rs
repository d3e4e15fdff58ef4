use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use market::{BarSeriesRegistry, StatusKind};
use order::OrderIntent;
use ratchet::utils::{push_bounded, HISTORY_LEN};
use ratchet::{Action, AgentError, Instrument, InstrumentResolver, Signal};
use serde::{Deserialize, Serialize};

use crate::{Holding, PortfolioView};

/// Which instruments take part in a rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopePolicy {
    /// Only instruments with a pending signal.
    #[default]
    BySignals,
    /// Configured universe instruments with live data, plus signaled ones.
    ByContracts,
    /// Held instruments with live data, plus signaled ones.
    ByPositions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    pub id: String,
    #[serde(default)]
    pub scope: ScopePolicy,
    pub min_cash: f64,
    pub max_weight: f64,
    #[serde(default)]
    pub universe: Vec<String>,
    #[serde(default)]
    pub min_weight_diff: f64,
}

impl AllocatorConfig {
    pub fn validate(&self) -> Result<(), AgentError> {
        if !(0.0..1.0).contains(&self.min_cash) {
            return Err(AgentError::Config(format!("{}: min_cash must be in [0, 1)", self.id)));
        }
        if self.max_weight.is_nan() || self.max_weight <= 0.0 {
            return Err(AgentError::Config(format!("{}: max_weight must be positive", self.id)));
        }
        if self.min_weight_diff.is_nan() || self.min_weight_diff < 0.0 {
            return Err(AgentError::Config(format!(
                "{}: min_weight_diff must not be negative",
                self.id
            )));
        }
        Ok(())
    }
}

/// instrument id → signed target weight.
pub type Allocation = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRecord {
    pub datetime: DateTime<Utc>,
    pub allocation: Allocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AllocatorOutcome {
    /// No signals for this allocator.
    Idle,
    Allocated {
        allocation: Allocation,
        orders: Vec<OrderIntent>,
    },
}

impl AllocatorOutcome {
    pub fn orders(&self) -> &[OrderIntent] {
        match self {
            Self::Idle => &[],
            Self::Allocated { orders, .. } => orders,
        }
    }
}

#[derive(Debug)]
pub struct EqualWeightAllocator {
    config: AllocatorConfig,
    universe: Vec<Instrument>,
    archive: VecDeque<AllocationRecord>,
}

impl EqualWeightAllocator {
    pub fn new<R: InstrumentResolver + ?Sized>(config: AllocatorConfig, resolver: &R) -> Result<Self, AgentError> {
        config.validate()?;
        let universe = resolver.resolve_all(&config.universe)?;
        Ok(Self {
            config,
            universe,
            archive: VecDeque::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub fn archive(&self) -> &VecDeque<AllocationRecord> {
        &self.archive
    }

    /// Turns this cycle's signals into target weights and order intents.
    ///
    /// Fails with a constraint error when the capital left for the scope is
    /// not usable; nothing is archived in that case.
    pub fn allocate<P, R>(
        &mut self,
        signals: &[Signal],
        portfolio: &P,
        registry: &BarSeriesRegistry,
        resolver: &R,
        now: DateTime<Utc>,
    ) -> Result<AllocatorOutcome, AgentError>
    where
        P: PortfolioView + ?Sized,
        R: InstrumentResolver + ?Sized,
    {
        let signals = signals
            .iter()
            .filter(|s| s.tag == self.config.id)
            .collect::<Vec<_>>();
        if signals.is_empty() {
            return Ok(AllocatorOutcome::Idle);
        }

        let base = portfolio.base_value();
        if base.is_nan() || base <= 0.0 {
            return Err(AgentError::Constraint(format!(
                "{}: base value {base} is not positive",
                self.config.id
            )));
        }
        let holdings = portfolio
            .holdings()
            .into_iter()
            .filter(|h| h.quantity != 0.0)
            .collect::<Vec<_>>();

        let signaled = signals
            .iter()
            .map(|s| s.instrument_id.clone())
            .collect::<BTreeSet<_>>();
        let scope = self.scope(&signaled, &holdings, registry);

        let (pos_available, neg_available) = self.available(base, &holdings, &scope)?;

        let mut signs: Vec<(String, i8)> = signals
            .iter()
            .map(|s| (s.instrument_id.clone(), s.action.sign()))
            .collect();
        signs.extend(
            holdings
                .iter()
                .filter(|h| scope.contains(&h.instrument_id) && !signaled.contains(&h.instrument_id))
                .map(|h| (h.instrument_id.clone(), h.sign())),
        );

        let n_pos = signs.iter().filter(|(_, s)| *s == 1).count().max(1);
        let n_neg = signs.iter().filter(|(_, s)| *s == -1).count().max(1);
        let weight = (pos_available / n_pos as f64 / base)
            .min(neg_available / n_neg as f64 / base)
            .min(self.config.max_weight);

        let mut allocation = Allocation::new();
        for (instrument_id, sign) in &signs {
            *allocation.entry(instrument_id.clone()).or_default() += f64::from(*sign) * weight;
        }

        allocation.retain(|instrument_id, target| {
            let diff = *target - portfolio.current_weight(instrument_id);
            let keep = diff.abs() >= self.config.min_weight_diff;
            if !keep {
                tracing::debug!(
                    allocator = %self.config.id,
                    instrument = %instrument_id,
                    diff,
                    "allocation below min weight diff removed"
                );
            }
            keep
        });

        let orders = self.orders(&allocation, portfolio, registry, resolver, base)?;
        tracing::info!(
            allocator = %self.config.id,
            signals = signals.len(),
            scope = scope.len(),
            weight,
            allocations = allocation.len(),
            orders = orders.len(),
            "allocation computed"
        );

        push_bounded(
            &mut self.archive,
            AllocationRecord {
                datetime: now,
                allocation: allocation.clone(),
            },
            HISTORY_LEN,
        );
        Ok(AllocatorOutcome::Allocated { allocation, orders })
    }

    fn scope(
        &self,
        signaled: &BTreeSet<String>,
        holdings: &[Holding],
        registry: &BarSeriesRegistry,
    ) -> BTreeSet<String> {
        let live = |id: &str| {
            registry.status_for_instrument(StatusKind::Active, id) == Some(true)
                && registry.status_for_instrument(StatusKind::Updated, id) == Some(true)
        };
        let mut scope = match self.config.scope {
            ScopePolicy::BySignals => BTreeSet::new(),
            ScopePolicy::ByContracts => self
                .universe
                .iter()
                .filter(|i| live(&i.id))
                .map(|i| i.id.clone())
                .collect(),
            ScopePolicy::ByPositions => holdings
                .iter()
                .filter(|h| live(&h.instrument_id))
                .map(|h| h.instrument_id.clone())
                .collect(),
        };
        scope.extend(signaled.iter().cloned());
        scope
    }

    /// Capital available to the long and short books after the cash buffer
    /// and the holdings left outside the scope.
    fn available(
        &self,
        base: f64,
        holdings: &[Holding],
        scope: &BTreeSet<String>,
    ) -> Result<(f64, f64), AgentError> {
        let outside = holdings
            .iter()
            .filter(|h| !scope.contains(&h.instrument_id));
        let (long_outside, short_outside) = outside.fold((0.0, 0.0), |(long, short), h| {
            if h.market_value > 0.0 {
                (long + h.market_value, short)
            } else {
                (long, short + h.market_value.abs())
            }
        });

        let available = base * (1.0 - self.config.min_cash);
        let pos_available = available - long_outside;
        let neg_available = available - short_outside;
        if pos_available <= 0.0 || neg_available <= 0.0 || pos_available > base || neg_available > base {
            return Err(AgentError::Constraint(format!(
                "{}: invalid capital available for trading (long {pos_available:.2}, short {neg_available:.2}, base {base:.2})",
                self.config.id
            )));
        }
        Ok((pos_available, neg_available))
    }

    fn orders<P, R>(
        &self,
        allocation: &Allocation,
        portfolio: &P,
        registry: &BarSeriesRegistry,
        resolver: &R,
        base: f64,
    ) -> Result<Vec<OrderIntent>, AgentError>
    where
        P: PortfolioView + ?Sized,
        R: InstrumentResolver + ?Sized,
    {
        let mut orders = Vec::new();
        for (instrument_id, target) in allocation {
            let instrument = resolver.resolve(instrument_id)?;
            let Some(price) = registry.last_price(instrument_id) else {
                tracing::warn!(
                    allocator = %self.config.id,
                    instrument = %instrument_id,
                    "no last price, order skipped"
                );
                continue;
            };
            let notional = price.close * instrument.multiplier();
            if notional <= 0.0 {
                tracing::warn!(instrument = %instrument_id, price = price.close, "non-positive price, order skipped");
                continue;
            }

            let diff = target - portfolio.current_weight(instrument_id);
            let quantity = (diff.abs() * base / notional).floor();
            if quantity < 1.0 {
                continue;
            }
            let action = if diff > 0.0 { Action::Buy } else { Action::Sell };
            orders.push(OrderIntent::market(instrument_id.clone(), action, quantity, self.config.id.clone()));
        }
        Ok(orders)
    }
}
