//! Domain events
use crate::domain::aggregates::PoStatus;
use crate::domain::value_objects::{DealerId, PoId, PoNumber};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoEvent {
    #[serde(rename_all = "camelCase")]
    Sent {
        po_id: PoId,
        dealer_id: DealerId,
        po_number: Option<PoNumber>,
        line_count: usize,
        subtotal: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        po_id: PoId,
        dealer_id: DealerId,
        from: PoStatus,
        to: PoStatus,
    },
}

impl PoEvent {
    /// Subject suffix the event is published under.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::StatusChanged { .. } => "status_changed",
        }
    }
}
