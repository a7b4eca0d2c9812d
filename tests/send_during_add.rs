//! A send from another session can land while an add is in flight. The add
//! must end up on an open draft instead of failing against the sent one.

mod common;

use async_trait::async_trait;
use common::*;
use dealer_po_service::domain::aggregates::{Dealer, NewLineItem, OrderSummary, PoLineItem, PoStatus, Product, PurchaseOrder, ReferenceData};
use dealer_po_service::domain::value_objects::{DealerId, LineItemId, PoId, ProductId};
use dealer_po_service::events::EventBus;
use dealer_po_service::service::PoService;
use dealer_po_service::store::{MemoryStore, Page, PoListQuery, PoStore, PoSummary, ProductListQuery};
use dealer_po_service::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Sends the dealer's draft, once armed, at every point where the service
/// reads from or touches the store before writing the line.
struct SendsMidAdd {
    inner: MemoryStore,
    dealer_id: DealerId,
    armed: AtomicBool,
}

impl SendsMidAdd {
    async fn send_open_draft(&self) {
        if !self.armed.swap(false, Ordering::SeqCst) {
            return;
        }
        let draft = self.inner.get_or_create_draft(self.dealer_id).await.unwrap();
        if !self.inner.line_items(draft.id).await.unwrap().is_empty() {
            self.inner.mark_sent(draft.id, Some("sent from another tab".into())).await.unwrap();
        }
    }
}

#[async_trait]
impl PoStore for SendsMidAdd {
    async fn reference_data(&self) -> Result<ReferenceData> {
        self.send_open_draft().await;
        self.inner.reference_data().await
    }
    async fn find_dealer(&self, id: DealerId) -> Result<Option<Dealer>> { self.inner.find_dealer(id).await }
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>> { self.inner.find_product(id).await }
    async fn list_products(&self, query: &ProductListQuery) -> Result<Page<Product>> { self.inner.list_products(query).await }
    async fn get_or_create_draft(&self, dealer_id: DealerId) -> Result<PurchaseOrder> {
        let draft = self.inner.get_or_create_draft(dealer_id).await?;
        self.send_open_draft().await;
        Ok(draft)
    }
    async fn find_purchase_order(&self, id: PoId) -> Result<Option<PurchaseOrder>> { self.inner.find_purchase_order(id).await }
    async fn line_items(&self, po_id: PoId) -> Result<Vec<PoLineItem>> { self.inner.line_items(po_id).await }
    async fn upsert_line(&self, po_id: PoId, line: NewLineItem, cap: u32) -> Result<PoLineItem> {
        self.inner.upsert_line(po_id, line, cap).await
    }
    async fn upsert_draft_line(&self, dealer_id: DealerId, line: NewLineItem, cap: u32) -> Result<PoLineItem> {
        self.inner.upsert_draft_line(dealer_id, line, cap).await
    }
    async fn set_line_quantity(&self, po_id: PoId, line_id: LineItemId, quantity: u32) -> Result<PoLineItem> {
        self.inner.set_line_quantity(po_id, line_id, quantity).await
    }
    async fn delete_line(&self, po_id: PoId, line_id: LineItemId) -> Result<()> { self.inner.delete_line(po_id, line_id).await }
    async fn set_line_positions(&self, po_id: PoId, ordered: &[LineItemId]) -> Result<()> {
        self.inner.set_line_positions(po_id, ordered).await
    }
    async fn mark_sent(&self, po_id: PoId, dealer_notes: Option<String>) -> Result<PurchaseOrder> {
        self.inner.mark_sent(po_id, dealer_notes).await
    }
    async fn transition_status(&self, po_id: PoId, from: PoStatus, to: PoStatus, admin_notes: Option<String>) -> Result<PurchaseOrder> {
        self.inner.transition_status(po_id, from, to, admin_notes).await
    }
    async fn set_admin_notes(&self, po_id: PoId, notes: Option<String>) -> Result<PurchaseOrder> {
        self.inner.set_admin_notes(po_id, notes).await
    }
    async fn list_purchase_orders(&self, query: &PoListQuery) -> Result<Page<PoSummary>> { self.inner.list_purchase_orders(query).await }
    async fn completed_orders(&self, dealer_id: DealerId) -> Result<Vec<OrderSummary>> { self.inner.completed_orders(dealer_id).await }
}

fn racing_harness() -> (PoService, Arc<SendsMidAdd>) {
    let store = Arc::new(SendsMidAdd { inner: MemoryStore::new(seed()), dealer_id: dealer(SMITH), armed: AtomicBool::new(false) });
    let dyn_store: Arc<dyn PoStore> = store.clone();
    (PoService::new(dyn_store, EventBus::disabled(), CAP), store)
}

#[tokio::test]
async fn test_add_after_concurrent_send_opens_fresh_draft() {
    let (svc, store) = racing_harness();
    let first = svc.add_line(dealer(SMITH), add(P101, 2, Some(RED))).await.unwrap();

    store.armed.store(true, Ordering::SeqCst);
    let second = svc.add_line(dealer(SMITH), add(P101, 1, Some(RED))).await.unwrap();
    assert!(!store.armed.load(Ordering::SeqCst), "send never fired");

    assert_ne!(second.po_id, first.po_id);
    assert_eq!(second.quantity, 1);

    let sent = svc.purchase_order(first.po_id).await.unwrap();
    assert_eq!(sent.purchase_order.status, PoStatus::Sent);
    assert_eq!(sent.lines.len(), 1);
    assert_eq!(sent.lines[0].quantity, 2);

    let draft = svc.draft_view(dealer(SMITH)).await.unwrap();
    assert_eq!(draft.purchase_order.id, second.po_id);
    assert_eq!(draft.item_count, 1);
}

#[tokio::test]
async fn test_add_naming_a_sent_po_still_fails() {
    let (svc, store) = racing_harness();
    let first = svc.add_line(dealer(SMITH), add(P101, 2, Some(RED))).await.unwrap();

    store.armed.store(true, Ordering::SeqCst);
    let mut request = add(P101, 1, Some(RED));
    request.po_id = Some(first.po_id);
    let err = svc.add_line(dealer(SMITH), request).await.unwrap_err();
    assert!(matches!(err, dealer_po_service::PoError::PoAlreadySent(PoStatus::Sent)), "{err:?}");
}
