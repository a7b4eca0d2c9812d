//! In-process store.
//!
//! Holds one lock for the whole of every operation, which gives the same
//! atomicity the Postgres store gets from transactions and unique indexes.
//! Used by the test suite and when the service runs without `DATABASE_URL`.

use async_trait::async_trait;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use crate::domain::aggregates::purchase_order::{check_quantity, merge_quantity};
use crate::domain::aggregates::{Dealer, NewLineItem, OrderSummary, PoLineItem, PoStatus, Product, PurchaseOrder, ReferenceData};
use crate::domain::value_objects::{DealerId, LineItemId, NumericId, PoId, PoNumber, ProductId};
use crate::store::{Page, PoListQuery, PoSortKey, PoStore, PoSummary, ProductListQuery, SortDir};
use crate::{PoError, Result};

/// Catalog, customers and order history to start the store with.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Seed {
    pub reference: ReferenceData,
    pub products: Vec<Product>,
    pub customers: Vec<Dealer>,
    pub orders: Vec<OrderSummary>,
}

impl Seed {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| PoError::Validation(format!("invalid seed: {e}")))
    }

    pub async fn load(path: &str) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PoError::Upstream(format!("reading seed file {path}: {e}")))?;
        Self::from_json(&raw)
    }
}

struct Inner {
    reference: ReferenceData,
    products: BTreeMap<ProductId, Product>,
    customers: BTreeMap<DealerId, Dealer>,
    orders: Vec<OrderSummary>,
    purchase_orders: BTreeMap<PoId, PurchaseOrder>,
    lines: BTreeMap<LineItemId, PoLineItem>,
    next_po_id: i64,
    next_line_id: i64,
    next_po_number: i64,
}

impl Inner {
    fn purchase_order(&self, id: PoId) -> Result<&PurchaseOrder> {
        self.purchase_orders.get(&id).ok_or_else(|| PoError::not_found(format!("purchase order {id}")))
    }

    fn purchase_order_mut(&mut self, id: PoId) -> Result<&mut PurchaseOrder> {
        self.purchase_orders.get_mut(&id).ok_or_else(|| PoError::not_found(format!("purchase order {id}")))
    }

    fn editable(&self, id: PoId) -> Result<()> {
        self.purchase_order(id)?.ensure_editable()
    }

    fn lines_of(&self, po_id: PoId) -> Vec<&PoLineItem> {
        let mut lines: Vec<_> = self.lines.values().filter(|l| l.po_id == po_id).collect();
        lines.sort_by_key(|l| (l.position, l.id));
        lines
    }

    fn line_mut(&mut self, po_id: PoId, line_id: LineItemId) -> Result<&mut PoLineItem> {
        self.lines
            .get_mut(&line_id)
            .filter(|l| l.po_id == po_id)
            .ok_or_else(|| PoError::not_found(format!("line item {line_id} on purchase order {po_id}")))
    }

    fn open_draft(&mut self, dealer_id: DealerId) -> Result<PoId> {
        if let Some(po) = self.purchase_orders.values().find(|po| po.dealer_id == dealer_id && po.status == PoStatus::Draft) {
            return Ok(po.id);
        }
        let id = PoId::new(next_id(&mut self.next_po_id))?;
        self.purchase_orders.insert(id, PurchaseOrder::draft(id, dealer_id));
        tracing::info!(po_id = %id, dealer_id = %dealer_id, "opened draft purchase order");
        Ok(id)
    }

    fn merge_line(&mut self, po_id: PoId, line: NewLineItem, cap: u32) -> Result<PoLineItem> {
        self.editable(po_id)?;
        let identity = line.identity();
        if let Some(existing) = self.lines.values_mut().find(|l| l.po_id == po_id && l.identity() == identity) {
            existing.quantity = merge_quantity(existing.quantity, line.quantity, cap)?;
            return Ok(existing.clone());
        }
        let position = self.lines_of(po_id).last().map(|l| l.position + 1).unwrap_or(0);
        let id = LineItemId::new(next_id(&mut self.next_line_id))?;
        let item = PoLineItem::from_new(id, po_id, position, line);
        self.lines.insert(id, item.clone());
        Ok(item)
    }

    fn summary(&self, po: &PurchaseOrder) -> PoSummary {
        let dealer = self.customers.get(&po.dealer_id);
        let lines = self.lines_of(po.id);
        PoSummary {
            id: po.id,
            po_number: po.po_number,
            dealer_id: po.dealer_id,
            dealer_name: dealer.map(|d| d.name.clone()),
            business_name: dealer.and_then(|d| d.business_name.clone()),
            tier: dealer.map(|d| d.tier).unwrap_or(0),
            status: po.status,
            line_count: lines.len() as i64,
            item_count: lines.iter().map(|l| i64::from(l.quantity)).sum(),
            subtotal: lines.iter().map(|l| l.line_total().amount()).sum(),
            created_at: po.created_at,
            sent_at: po.sent_at,
        }
    }
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(seed: Seed) -> Self {
        let inner = Inner {
            reference: seed.reference,
            products: seed.products.into_iter().map(|p| (p.id, p)).collect(),
            customers: seed.customers.into_iter().map(|c| (c.id, c)).collect(),
            orders: seed.orders,
            purchase_orders: BTreeMap::new(),
            lines: BTreeMap::new(),
            next_po_id: 1,
            next_line_id: 1,
            next_po_number: PoNumber::FIRST,
        };
        Self { inner: Mutex::new(inner) }
    }

    /// Catalog edits happen in the admin catalog; this stands in for them.
    pub async fn put_product(&self, product: Product) {
        self.inner.lock().await.products.insert(product.id, product);
    }

    pub async fn put_customer(&self, customer: Dealer) {
        self.inner.lock().await.customers.insert(customer.id, customer);
    }
}

fn next_id(counter: &mut i64) -> i64 {
    let id = *counter;
    *counter += 1;
    id
}

fn compare(a: &PoSummary, b: &PoSummary, key: PoSortKey) -> Ordering {
    match key {
        PoSortKey::Id => a.id.cmp(&b.id),
        PoSortKey::Dealer => a.dealer_name.as_deref().map(str::to_lowercase).cmp(&b.dealer_name.as_deref().map(str::to_lowercase)),
        PoSortKey::Tier => a.tier.cmp(&b.tier),
        PoSortKey::Status => a.status.as_str().cmp(b.status.as_str()),
        PoSortKey::Items => a.item_count.cmp(&b.item_count),
        PoSortKey::Subtotal => a.subtotal.cmp(&b.subtotal),
        PoSortKey::Sent => a.sent_at.cmp(&b.sent_at),
        PoSortKey::Created => a.created_at.cmp(&b.created_at),
    }
}

#[async_trait]
impl PoStore for MemoryStore {
    async fn reference_data(&self) -> Result<ReferenceData> {
        Ok(self.inner.lock().await.reference.clone())
    }

    async fn find_dealer(&self, id: DealerId) -> Result<Option<Dealer>> {
        Ok(self.inner.lock().await.customers.get(&id).filter(|c| c.is_dealer()).cloned())
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.inner.lock().await.products.get(&id).cloned())
    }

    async fn list_products(&self, query: &ProductListQuery) -> Result<Page<Product>> {
        let inner = self.inner.lock().await;
        let matching: Vec<&Product> = inner.products.values().filter(|p| query.matches(p)).collect();
        Ok(Page {
            total: matching.len() as i64,
            data: matching.into_iter().skip(query.offset() as usize).take(query.limit() as usize).cloned().collect(),
            limit: query.limit(),
            offset: query.offset(),
        })
    }

    async fn get_or_create_draft(&self, dealer_id: DealerId) -> Result<PurchaseOrder> {
        let mut inner = self.inner.lock().await;
        let id = inner.open_draft(dealer_id)?;
        Ok(inner.purchase_order(id)?.clone())
    }

    async fn find_purchase_order(&self, id: PoId) -> Result<Option<PurchaseOrder>> {
        Ok(self.inner.lock().await.purchase_orders.get(&id).cloned())
    }

    async fn line_items(&self, po_id: PoId) -> Result<Vec<PoLineItem>> {
        Ok(self.inner.lock().await.lines_of(po_id).into_iter().cloned().collect())
    }

    async fn upsert_line(&self, po_id: PoId, line: NewLineItem, cap: u32) -> Result<PoLineItem> {
        check_quantity(line.quantity, cap)?;
        self.inner.lock().await.merge_line(po_id, line, cap)
    }

    async fn upsert_draft_line(&self, dealer_id: DealerId, line: NewLineItem, cap: u32) -> Result<PoLineItem> {
        check_quantity(line.quantity, cap)?;
        let mut inner = self.inner.lock().await;
        let po_id = inner.open_draft(dealer_id)?;
        inner.merge_line(po_id, line, cap)
    }

    async fn set_line_quantity(&self, po_id: PoId, line_id: LineItemId, quantity: u32) -> Result<PoLineItem> {
        let mut inner = self.inner.lock().await;
        inner.editable(po_id)?;
        let line = inner.line_mut(po_id, line_id)?;
        line.quantity = quantity;
        Ok(line.clone())
    }

    async fn delete_line(&self, po_id: PoId, line_id: LineItemId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.editable(po_id)?;
        inner.line_mut(po_id, line_id)?;
        inner.lines.remove(&line_id);
        Ok(())
    }

    async fn set_line_positions(&self, po_id: PoId, ordered: &[LineItemId]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.editable(po_id)?;
        let current: Vec<LineItemId> = inner.lines_of(po_id).iter().map(|l| l.id).collect();
        if let Some(stray) = ordered.iter().find(|id| !current.contains(id)) {
            return Err(PoError::InvalidSelection(format!("line item {stray} does not belong to purchase order {po_id}")));
        }
        let rest = current.iter().filter(|id| !ordered.contains(id));
        for (position, id) in ordered.iter().chain(rest).enumerate() {
            if let Some(line) = inner.lines.get_mut(id) {
                line.position = position as i32;
            }
        }
        Ok(())
    }

    async fn mark_sent(&self, po_id: PoId, dealer_notes: Option<String>) -> Result<PurchaseOrder> {
        let mut inner = self.inner.lock().await;
        let line_count = inner.lines_of(po_id).len();
        inner.purchase_order(po_id)?.ensure_sendable(line_count)?;
        let number = PoNumber::new(next_id(&mut inner.next_po_number));
        let po = inner.purchase_order_mut(po_id)?;
        po.mark_sent(number, dealer_notes);
        Ok(po.clone())
    }

    async fn transition_status(&self, po_id: PoId, from: PoStatus, to: PoStatus, admin_notes: Option<String>) -> Result<PurchaseOrder> {
        let mut inner = self.inner.lock().await;
        let po = inner.purchase_order_mut(po_id)?;
        if po.status != from {
            return Err(PoError::InvalidState(format!("purchase order {po_id} is now {}, expected {from}", po.status)));
        }
        po.set_status(to);
        if admin_notes.is_some() { po.set_admin_notes(admin_notes); }
        Ok(po.clone())
    }

    async fn set_admin_notes(&self, po_id: PoId, notes: Option<String>) -> Result<PurchaseOrder> {
        let mut inner = self.inner.lock().await;
        let po = inner.purchase_order_mut(po_id)?;
        po.set_admin_notes(notes);
        Ok(po.clone())
    }

    async fn list_purchase_orders(&self, query: &PoListQuery) -> Result<Page<PoSummary>> {
        let po_term = query.po_term().transpose()?;
        let customer = query.customer_term();
        let inner = self.inner.lock().await;

        let mut rows: Vec<PoSummary> = inner
            .purchase_orders
            .values()
            .filter(|po| query.status.map_or(true, |s| po.status == s))
            .filter(|po| po_term.map_or(true, |n| po.id.get() == n || po.po_number.map(PoNumber::value) == Some(n)))
            .filter(|po| query.from.map_or(true, |d| po.created_at.date_naive() >= d))
            .filter(|po| query.to.map_or(true, |d| po.created_at.date_naive() <= d))
            .map(|po| inner.summary(po))
            .filter(|row| {
                customer.as_deref().map_or(true, |term| {
                    [row.dealer_name.as_deref(), row.business_name.as_deref()]
                        .into_iter()
                        .flatten()
                        .any(|name| name.to_lowercase().contains(term))
                })
            })
            .collect();

        rows.sort_by(|a, b| {
            let ord = compare(a, b, query.sort);
            let ord = if query.dir == SortDir::Desc { ord.reverse() } else { ord };
            ord.then_with(|| a.id.cmp(&b.id))
        });

        Ok(Page {
            total: rows.len() as i64,
            data: rows.into_iter().skip(query.offset() as usize).take(query.limit() as usize).collect(),
            limit: query.limit(),
            offset: query.offset(),
        })
    }

    async fn completed_orders(&self, dealer_id: DealerId) -> Result<Vec<OrderSummary>> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<OrderSummary> = inner
            .orders
            .iter()
            .filter(|o| o.customer_id == dealer_id && o.status.is_completed())
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }
}
