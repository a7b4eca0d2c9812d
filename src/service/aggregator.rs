//! Line aggregation: merges add-to-PO requests into the dealer's draft.

use std::collections::HashSet;
use crate::domain::aggregates::purchase_order::check_quantity;
use crate::domain::aggregates::{LineSelection, NewLineItem, PoLineItem, PoView};
use crate::domain::value_objects::{DealerId, LineItemId, PoId, ProductId, RequestedQuantity};
use crate::pricing::TierTable;
use crate::service::PoService;
use crate::{PoError, Result};

/// One add-to-PO request after boundary parsing.
#[derive(Debug, Clone)]
pub struct AddLine {
    /// PO the client believes it is adding to. When given it must be the
    /// dealer's open draft.
    pub po_id: Option<PoId>,
    pub product_id: ProductId,
    pub quantity: RequestedQuantity,
    pub selection: LineSelection,
}

impl AddLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self { po_id: None, product_id, quantity: RequestedQuantity::new(quantity), selection: LineSelection::default() }
    }
}

impl PoService {
    /// Adds a line to the dealer's draft, or grows the line with the same
    /// (product, color, grease, angle finder, hardware) tuple.
    ///
    /// Everything is validated before the draft is touched, so a rejected add
    /// leaves no trace.
    #[tracing::instrument(skip(self, request), fields(product_id = %request.product_id, quantity = request.quantity.value()))]
    pub async fn add_line(&self, dealer_id: DealerId, request: AddLine) -> Result<PoLineItem> {
        let quantity = check_quantity(request.quantity.value(), self.line_quantity_cap)?;
        let dealer = self.require_dealer(dealer_id).await?;
        let product = self
            .store
            .find_product(request.product_id)
            .await?
            .filter(|p| p.is_orderable())
            .ok_or_else(|| PoError::not_found(format!("product {}", request.product_id)))?;
        product.check_selection(&request.selection)?;

        if let Some(po_id) = request.po_id {
            let po = self.require_po(po_id).await?;
            if po.dealer_id != dealer_id {
                return Err(PoError::not_found(format!("purchase order {po_id} for dealer {dealer_id}")));
            }
            po.ensure_editable()?;
        }

        let reference = self.store.reference_data().await?;
        let pricing = TierTable::from_tiers(&reference.tiers).quote_for(&dealer);
        let unit_price = pricing.unit_price(product.base_price);

        let line = NewLineItem::snapshot(&product, request.selection, &reference, unit_price, quantity);
        // A named PO stays pinned; otherwise the draft lookup and merge happen together.
        let line = match request.po_id {
            Some(po_id) => self.store.upsert_line(po_id, line, self.line_quantity_cap).await?,
            None => self.store.upsert_draft_line(dealer_id, line, self.line_quantity_cap).await?,
        };

        tracing::info!(
            po_id = %line.po_id,
            line_id = %line.id,
            line_quantity = line.quantity,
            %unit_price,
            "added line to draft purchase order"
        );
        Ok(line)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_line_quantity(&self, po_id: PoId, line_id: LineItemId, quantity: u32) -> Result<PoLineItem> {
        let quantity = check_quantity(quantity, self.line_quantity_cap)?;
        self.store.set_line_quantity(po_id, line_id, quantity).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_line(&self, po_id: PoId, line_id: LineItemId) -> Result<()> {
        self.store.delete_line(po_id, line_id).await?;
        tracing::info!("removed line from draft purchase order");
        Ok(())
    }

    /// Persists display order. Lines left out keep their relative order
    /// after the listed ones.
    #[tracing::instrument(skip(self, ordered), fields(count = ordered.len()))]
    pub async fn reorder_lines(&self, po_id: PoId, ordered: Vec<LineItemId>) -> Result<PoView> {
        let mut seen = HashSet::with_capacity(ordered.len());
        if let Some(dup) = ordered.iter().find(|id| !seen.insert(**id)) {
            return Err(PoError::InvalidSelection(format!("line item {dup} is listed more than once")));
        }
        self.store.set_line_positions(po_id, &ordered).await?;
        self.purchase_order(po_id).await
    }
}
