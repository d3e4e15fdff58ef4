use ratchet::{Action, AgentError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    #[default]
    Market,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub instrument_id: String,
    pub action: Action,
    pub quantity: f64,
    pub order_type: OrderType,
    pub tag: String,
}

impl OrderIntent {
    pub fn market(
        instrument_id: impl Into<String>,
        action: Action,
        quantity: f64,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            action,
            quantity,
            order_type: OrderType::Market,
            tag: tag.into(),
        }
    }

    /// Quantity with the sign of the action.
    pub fn signed_quantity(&self) -> f64 {
        self.quantity * f64::from(self.action.sign())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub u64);

pub trait OrderRouter {
    fn submit_order(&mut self, intent: &OrderIntent) -> Result<OrderId, AgentError>;

    /// Returns the number of orders cancelled.
    fn cancel_all_open_orders(&mut self) -> Result<usize, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::{OrderIntent, OrderType};
    use ratchet::Action;

    #[test]
    fn signed_quantity_follows_action() {
        let buy = OrderIntent::market("ES", Action::Buy, 3.0, "EW1");
        let sell = OrderIntent::market("ES", Action::Sell, 2.0, "EW1");
        assert_eq!(buy.order_type, OrderType::Market);
        assert_eq!(buy.signed_quantity(), 3.0);
        assert_eq!(sell.signed_quantity(), -2.0);
    }
}
