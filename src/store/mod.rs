//! Persistence
//!
//! `PoStore` is the only path to shared mutable state. Implementations must
//! make every mutating call atomic: the draft check and the change it guards
//! either both happen or neither does.

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, Seed};
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;
use crate::domain::aggregates::{Dealer, NewLineItem, OrderSummary, PoLineItem, PoStatus, Product, PurchaseOrder, ReferenceData};
use crate::domain::value_objects::{optional_id, CategoryId, DealerId, LineItemId, PlatformId, PoId, PoNumber, ProductId, VendorId};
use crate::Result;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page { data: self.data.into_iter().map(f).collect(), total: self.total, limit: self.limit, offset: self.offset }
    }
}

/// Dealer product listing filters (`limit`, `offset`, `search`, `bodyId`,
/// `mainCatId`, `catId`, `vendorId`).
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductListQuery {
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    #[validate(length(max = 200))]
    pub search: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    pub body_id: Option<PlatformId>,
    #[serde(default, deserialize_with = "optional_id")]
    pub main_cat_id: Option<CategoryId>,
    #[serde(default, deserialize_with = "optional_id")]
    pub cat_id: Option<CategoryId>,
    #[serde(default, deserialize_with = "optional_id")]
    pub vendor_id: Option<VendorId>,
}

impl ProductListQuery {
    pub fn limit(&self) -> u32 { self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) }
    pub fn offset(&self) -> u32 { self.offset.unwrap_or(0) }

    pub fn search_term(&self) -> Option<String> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase)
    }

    pub fn matches(&self, product: &Product) -> bool {
        if !product.is_orderable() { return false; }
        if let Some(term) = self.search_term() {
            if !product.name.to_lowercase().contains(&term) && !product.part_number.to_lowercase().contains(&term) {
                return false;
            }
        }
        (self.body_id.is_none() || product.platform_id == self.body_id)
            && (self.main_cat_id.is_none() || product.main_category_id == self.main_cat_id)
            && (self.cat_id.is_none() || product.category_id == self.cat_id)
            && (self.vendor_id.is_none() || product.vendor_id == self.vendor_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoSortKey { Id, Dealer, Tier, Status, Items, Subtotal, Sent, #[default] Created }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir { Asc, #[default] Desc }

/// Admin PO list filters. `po` matches a PO number (`PO-1001` or `1001`) or a PO id.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PoListQuery {
    #[validate(length(max = 200))]
    pub customer: Option<String>,
    #[validate(length(max = 50))]
    pub po: Option<String>,
    pub status: Option<PoStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub sort: PoSortKey,
    #[serde(default)]
    pub dir: SortDir,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PoListQuery {
    pub fn limit(&self) -> u32 { self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) }
    pub fn offset(&self) -> u32 { self.offset.unwrap_or(0) }

    pub fn customer_term(&self) -> Option<String> {
        self.customer.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase)
    }

    /// `None` when no PO filter was given; `Some(Err)` when it is not a number.
    pub fn po_term(&self) -> Option<Result<i64>> {
        let raw = self.po.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some(PoNumber::parse(raw).map(PoNumber::value).ok_or_else(|| {
            crate::PoError::Validation(format!("po filter {raw:?} is not a PO number or id"))
        }))
    }
}

/// One row of the admin PO list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoSummary {
    pub id: PoId,
    pub po_number: Option<PoNumber>,
    pub dealer_id: DealerId,
    pub dealer_name: Option<String>,
    pub business_name: Option<String>,
    pub tier: u8,
    pub status: PoStatus,
    pub line_count: i64,
    pub item_count: i64,
    pub subtotal: Decimal,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PoStore: Send + Sync {
    // --- catalog ---
    async fn reference_data(&self) -> Result<ReferenceData>;
    /// Only customers with the dealer role resolve.
    async fn find_dealer(&self, id: DealerId) -> Result<Option<Dealer>>;
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>>;
    /// Displayed products matching the filters, ordered by id.
    async fn list_products(&self, query: &ProductListQuery) -> Result<Page<Product>>;

    // --- purchase orders ---
    /// Returns the dealer's open draft, creating it if none exists. Never
    /// leaves two drafts for one dealer.
    async fn get_or_create_draft(&self, dealer_id: DealerId) -> Result<PurchaseOrder>;
    async fn find_purchase_order(&self, id: PoId) -> Result<Option<PurchaseOrder>>;
    async fn line_items(&self, po_id: PoId) -> Result<Vec<PoLineItem>>;
    /// Inserts the line or grows the line with the same identity, rejecting
    /// totals above `cap`. Fails with `PoAlreadySent` unless the PO is a draft.
    async fn upsert_line(&self, po_id: PoId, line: NewLineItem, cap: u32) -> Result<PoLineItem>;
    /// Opens or reuses the dealer's draft and merges the line into it as one
    /// step, so a send landing mid-add can never strand the line.
    async fn upsert_draft_line(&self, dealer_id: DealerId, line: NewLineItem, cap: u32) -> Result<PoLineItem>;
    async fn set_line_quantity(&self, po_id: PoId, line_id: LineItemId, quantity: u32) -> Result<PoLineItem>;
    async fn delete_line(&self, po_id: PoId, line_id: LineItemId) -> Result<()>;
    /// Persists display positions. Ids must all belong to the PO.
    async fn set_line_positions(&self, po_id: PoId, ordered: &[LineItemId]) -> Result<()>;
    /// Draft with at least one line -> sent, allocating the next PO number.
    async fn mark_sent(&self, po_id: PoId, dealer_notes: Option<String>) -> Result<PurchaseOrder>;
    /// Compare-and-set status change; fails if the PO is no longer in `from`.
    async fn transition_status(&self, po_id: PoId, from: PoStatus, to: PoStatus, admin_notes: Option<String>) -> Result<PurchaseOrder>;
    async fn set_admin_notes(&self, po_id: PoId, notes: Option<String>) -> Result<PurchaseOrder>;

    // --- reconciliation ---
    async fn list_purchase_orders(&self, query: &PoListQuery) -> Result<Page<PoSummary>>;
    /// Shipped or completed orders for the customer, newest first.
    async fn completed_orders(&self, dealer_id: DealerId) -> Result<Vec<OrderSummary>>;
}
