mod allocator;

use serde::{Deserialize, Serialize};

pub use allocator::{
    Allocation, AllocationRecord, AllocatorConfig, AllocatorOutcome, EqualWeightAllocator,
    ScopePolicy,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub instrument_id: String,
    pub quantity: f64,
    /// Market value in the base currency; negative for shorts.
    pub market_value: f64,
}

impl Holding {
    pub fn sign(&self) -> i8 {
        if self.quantity > 0.0 {
            1
        } else if self.quantity < 0.0 {
            -1
        } else {
            0
        }
    }
}

pub trait PortfolioView {
    fn holdings(&self) -> Vec<Holding>;

    /// Total portfolio value in the base currency.
    fn base_value(&self) -> f64;

    fn current_weight(&self, instrument_id: &str) -> f64 {
        let base = self.base_value();
        if base <= 0.0 {
            return 0.0;
        }
        self.holdings()
            .iter()
            .filter(|h| h.instrument_id == instrument_id)
            .map(|h| h.market_value)
            .sum::<f64>()
            / base
    }
}

pub trait AccountView {
    fn net_liquidity(&self) -> f64;
    fn realized_pnl(&self) -> f64;
    fn unrealized_pnl(&self) -> f64;

    fn total_pnl(&self) -> f64 {
        self.realized_pnl() + self.unrealized_pnl()
    }
}
