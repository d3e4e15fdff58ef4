use portfolio::AccountView;
use ratchet::AgentError;
use serde::{Deserialize, Serialize};

/// Account-level floors checked once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Guardrails {
    pub min_balance: f64,
    pub min_portfolio_pnl: f64,
}

impl Guardrails {
    pub fn new(min_balance: f64, min_portfolio_pnl: f64) -> Self {
        Self {
            min_balance,
            min_portfolio_pnl,
        }
    }

    pub fn check<A: AccountView + ?Sized>(&self, account: &A) -> Result<(), AgentError> {
        let balance = account.net_liquidity();
        if balance < self.min_balance {
            tracing::error!(balance, min_balance = self.min_balance, "balance below floor");
            return Err(AgentError::GuardrailBreach(format!(
                "net liquidation {balance:.2} below minimum {:.2}",
                self.min_balance
            )));
        }

        let pnl = account.total_pnl();
        if pnl < self.min_portfolio_pnl {
            tracing::error!(pnl, min_pnl = self.min_portfolio_pnl, "portfolio pnl below floor");
            return Err(AgentError::GuardrailBreach(format!(
                "portfolio pnl {pnl:.2} below minimum {:.2}",
                self.min_portfolio_pnl
            )));
        }
        Ok(())
    }
}
