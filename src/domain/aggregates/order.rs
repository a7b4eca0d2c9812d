//! Historical sales orders, read for reconciliation only.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{DealerId, OrderNumber};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Processing, Shipped, Completed, Cancelled, Refunded }

impl OrderStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "processing" => Self::Processing,
            "shipped" => Self::Shipped,
            "completed" => Self::Completed,
            "cancelled" | "canceled" => Self::Cancelled,
            "refunded" => Self::Refunded,
            _ => Self::Pending,
        }
    }

    /// Fulfilled orders count toward a dealer's history.
    pub fn is_completed(self) -> bool { matches!(self, Self::Shipped | Self::Completed) }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: i64,
    pub order_number: OrderNumber,
    pub customer_id: DealerId,
    pub status: OrderStatus,
    #[serde(default)]
    pub item_count: u32,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}
