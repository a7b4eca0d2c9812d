//! Admin reconciliation: read-only views joining POs with dealer history.

use rust_decimal::Decimal;
use serde::Serialize;
use validator::Validate;
use crate::domain::aggregates::{Dealer, OrderSummary, PoLineItem, PurchaseOrder};
use crate::domain::value_objects::{Money, PoId};
use crate::service::PoService;
use crate::store::{Page, PoListQuery, PoSummary};
use crate::Result;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledLine {
    #[serde(flatten)]
    pub line: PoLineItem,
    pub line_total: Money,
}

/// A PO next to its dealer and that dealer's completed orders. The dealer is
/// `None` when the customer record is gone or no longer a dealer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoReconciliation {
    pub purchase_order: PurchaseOrder,
    pub dealer: Option<Dealer>,
    pub lines: Vec<ReconciledLine>,
    pub item_count: u32,
    pub subtotal: Money,
    pub order_history: Vec<OrderSummary>,
    pub order_count: usize,
    pub lifetime_total: Decimal,
}

impl PoService {
    #[tracing::instrument(skip(self, query))]
    pub async fn list_purchase_orders(&self, query: PoListQuery) -> Result<Page<PoSummary>> {
        query.validate()?;
        self.store.list_purchase_orders(&query).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, po_id: PoId) -> Result<PoReconciliation> {
        let view = self.purchase_order(po_id).await?;
        let dealer_id = view.purchase_order.dealer_id;
        let dealer = self.store.find_dealer(dealer_id).await?;
        if dealer.is_none() {
            tracing::warn!(%dealer_id, "purchase order belongs to an unknown dealer");
        }
        let order_history = self.store.completed_orders(dealer_id).await?;
        let lifetime_total = order_history.iter().map(|o| o.total).sum();

        Ok(PoReconciliation {
            item_count: view.item_count,
            subtotal: view.subtotal,
            lines: view
                .lines
                .into_iter()
                .map(|line| ReconciledLine { line_total: line.line_total(), line })
                .collect(),
            purchase_order: view.purchase_order,
            dealer,
            order_count: order_history.len(),
            order_history,
            lifetime_total,
        })
    }
}
