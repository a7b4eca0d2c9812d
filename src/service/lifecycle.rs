//! Draft lifecycle: one open draft per dealer, send, admin status changes.

use crate::domain::aggregates::{PoStatus, PoView, PurchaseOrder};
use crate::domain::events::PoEvent;
use crate::domain::value_objects::{DealerId, PoId};
use crate::service::PoService;
use crate::Result;

fn non_blank(notes: Option<String>) -> Option<String> {
    notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

impl PoService {
    /// The dealer's open draft, created empty if there is none.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create_draft(&self, dealer_id: DealerId) -> Result<PurchaseOrder> {
        self.require_dealer(dealer_id).await?;
        self.store.get_or_create_draft(dealer_id).await
    }

    /// The dealer's open draft with its lines.
    pub async fn draft_view(&self, dealer_id: DealerId) -> Result<PoView> {
        let draft = self.get_or_create_draft(dealer_id).await?;
        self.view(draft).await
    }

    /// Submits a draft. Assigns the next PO number and freezes the lines.
    #[tracing::instrument(skip(self, dealer_notes))]
    pub async fn send(&self, po_id: PoId, dealer_notes: Option<String>) -> Result<PoView> {
        let po = self.store.mark_sent(po_id, non_blank(dealer_notes)).await?;
        let view = self.view(po).await?;

        tracing::info!(
            po_number = ?view.purchase_order.po_number.map(|n| n.to_string()),
            lines = view.lines.len(),
            subtotal = %view.subtotal.amount(),
            "purchase order sent"
        );
        self.events
            .publish(PoEvent::Sent {
                po_id,
                dealer_id: view.purchase_order.dealer_id,
                po_number: view.purchase_order.po_number,
                line_count: view.lines.len(),
                subtotal: view.subtotal.amount(),
            })
            .await;
        Ok(view)
    }

    /// Admin status change along the allowed edges. Notes, when given,
    /// replace the admin notes in the same write.
    #[tracing::instrument(skip(self, admin_notes))]
    pub async fn admin_transition(&self, po_id: PoId, to: PoStatus, admin_notes: Option<String>) -> Result<PurchaseOrder> {
        let current = self.require_po(po_id).await?;
        if let Err(e) = current.check_admin_transition(to) {
            tracing::warn!(from = %current.status, "rejected status change");
            return Err(e);
        }
        let updated = self.store.transition_status(po_id, current.status, to, non_blank(admin_notes)).await?;

        tracing::info!(from = %current.status, "purchase order status changed");
        self.events
            .publish(PoEvent::StatusChanged { po_id, dealer_id: updated.dealer_id, from: current.status, to })
            .await;
        Ok(updated)
    }

    #[tracing::instrument(skip(self, notes))]
    pub async fn set_admin_notes(&self, po_id: PoId, notes: Option<String>) -> Result<PurchaseOrder> {
        self.store.set_admin_notes(po_id, non_blank(notes)).await
    }
}
