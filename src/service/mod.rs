//! Application services
//!
//! `PoService` is what the HTTP handlers call. It resolves dealers and
//! products, prices lines, and drives the purchase-order lifecycle through a
//! `PoStore`. Domain events go out on the `EventBus` after the store commits.

mod aggregator;
mod catalog;
mod lifecycle;
mod reconciliation;

pub use aggregator::AddLine;
pub use catalog::DealerProduct;
pub use reconciliation::{PoReconciliation, ReconciledLine};

use std::sync::Arc;
use crate::domain::aggregates::{Dealer, PoView, PurchaseOrder};
use crate::domain::value_objects::{DealerId, PoId};
use crate::events::EventBus;
use crate::store::PoStore;
use crate::{PoError, Result};

#[derive(Clone)]
pub struct PoService {
    store: Arc<dyn PoStore>,
    events: EventBus,
    line_quantity_cap: u32,
}

impl PoService {
    pub fn new(store: Arc<dyn PoStore>, events: EventBus, line_quantity_cap: u32) -> Self {
        Self { store, events, line_quantity_cap }
    }

    async fn require_dealer(&self, dealer_id: DealerId) -> Result<Dealer> {
        self.store
            .find_dealer(dealer_id)
            .await?
            .ok_or_else(|| PoError::not_found(format!("dealer {dealer_id}")))
    }

    async fn require_po(&self, po_id: PoId) -> Result<PurchaseOrder> {
        self.store
            .find_purchase_order(po_id)
            .await?
            .ok_or_else(|| PoError::not_found(format!("purchase order {po_id}")))
    }

    async fn view(&self, purchase_order: PurchaseOrder) -> Result<PoView> {
        let lines = self.store.line_items(purchase_order.id).await?;
        Ok(PoView::new(purchase_order, lines))
    }

    /// A purchase order with its lines in display order.
    pub async fn purchase_order(&self, po_id: PoId) -> Result<PoView> {
        let po = self.require_po(po_id).await?;
        self.view(po).await
    }
}
