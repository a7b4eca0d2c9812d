//! Purchase Order Aggregate
//!
//! A dealer's purchase order and its line items. Line identity is the tuple
//! (product, color, grease, angle finder, hardware); adding the same tuple
//! again grows the existing line instead of creating a second one.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::domain::aggregates::product::Product;
use crate::domain::aggregates::reference::{AddOnKind, ReferenceData};
use crate::domain::value_objects::{AddOnId, ColorId, DealerId, LineItemId, Money, PoId, PoNumber, ProductId};
use crate::{PoError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoStatus { Draft, Sent, Processing, Completed, Cancelled }

impl PoStatus {
    pub const ALL: [PoStatus; 5] = [Self::Draft, Self::Sent, Self::Processing, Self::Completed, Self::Cancelled];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool { matches!(self, Self::Completed | Self::Cancelled) }

    /// Edges an admin may take. `draft -> sent` belongs to the dealer's send.
    pub fn admin_can_move_to(self, next: PoStatus) -> bool {
        !self.is_terminal()
            && matches!(
                (self, next),
                (Self::Sent, Self::Processing)
                    | (Self::Processing, Self::Completed)
                    | (Self::Draft | Self::Sent | Self::Processing, Self::Cancelled)
            )
    }
}

impl fmt::Display for PoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for PoStatus {
    type Err = PoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(PoError::Validation(format!("unknown purchase order status {other:?}"))),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
    pub id: PoId,
    pub dealer_id: DealerId,
    pub status: PoStatus,
    pub po_number: Option<PoNumber>,
    pub dealer_notes: Option<String>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseOrder {
    pub fn draft(id: PoId, dealer_id: DealerId) -> Self {
        let now = Utc::now();
        Self {
            id, dealer_id, status: PoStatus::Draft, po_number: None,
            dealer_notes: None, admin_notes: None, created_at: now, sent_at: None, updated_at: now,
        }
    }

    /// Lines can only be added, edited or removed while the PO is a draft.
    pub fn ensure_editable(&self) -> Result<()> {
        if self.status != PoStatus::Draft { return Err(PoError::PoAlreadySent(self.status)); }
        Ok(())
    }

    pub fn ensure_sendable(&self, line_count: usize) -> Result<()> {
        if self.status != PoStatus::Draft {
            return Err(PoError::InvalidState(format!(
                "purchase order {} is {}; only drafts can be sent", self.id, self.status
            )));
        }
        if line_count == 0 { return Err(PoError::EmptyPo); }
        Ok(())
    }

    pub fn check_admin_transition(&self, to: PoStatus) -> Result<()> {
        if !self.status.admin_can_move_to(to) {
            return Err(PoError::InvalidTransition { from: self.status, to });
        }
        Ok(())
    }

    pub fn mark_sent(&mut self, po_number: PoNumber, dealer_notes: Option<String>) {
        let now = Utc::now();
        self.status = PoStatus::Sent;
        self.po_number = Some(po_number);
        if dealer_notes.is_some() { self.dealer_notes = dealer_notes; }
        self.sent_at = Some(now);
        self.updated_at = now;
    }

    pub fn set_status(&mut self, status: PoStatus) { self.status = status; self.touch(); }
    pub fn set_admin_notes(&mut self, notes: Option<String>) { self.admin_notes = notes; self.touch(); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// Color and add-on choices a dealer made for one product.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineSelection {
    pub color_id: Option<ColorId>,
    pub grease_id: Option<AddOnId>,
    pub anglefinder_id: Option<AddOnId>,
    pub hardware_id: Option<AddOnId>,
    pub hardware_pack_ids: Vec<AddOnId>,
}

impl LineSelection {
    /// The single-choice add-ons that take part in line identity.
    pub fn add_ons(&self) -> impl Iterator<Item = (AddOnKind, AddOnId)> {
        [
            (AddOnKind::Grease, self.grease_id),
            (AddOnKind::AngleFinder, self.anglefinder_id),
            (AddOnKind::Hardware, self.hardware_id),
        ]
        .into_iter()
        .filter_map(|(kind, id)| id.map(|id| (kind, id)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LineIdentity {
    pub product_id: ProductId,
    pub color_id: Option<ColorId>,
    pub grease_id: Option<AddOnId>,
    pub anglefinder_id: Option<AddOnId>,
    pub hardware_id: Option<AddOnId>,
}

/// Snapshot of a line about to be merged into a draft. Names, part number and
/// unit price are copied so the PO keeps rendering after catalog edits.
#[derive(Clone, Debug, PartialEq)]
pub struct NewLineItem {
    pub product_id: ProductId,
    pub part_number: String,
    pub product_name: String,
    pub quantity: u32,
    pub color_id: Option<ColorId>,
    pub color_name: Option<String>,
    pub unit_price: Decimal,
    pub grease_id: Option<AddOnId>,
    pub grease_name: Option<String>,
    pub anglefinder_id: Option<AddOnId>,
    pub anglefinder_name: Option<String>,
    pub hardware_id: Option<AddOnId>,
    pub hardware_name: Option<String>,
    pub hardware_pack_ids: Vec<AddOnId>,
}

impl NewLineItem {
    pub fn snapshot(product: &Product, selection: LineSelection, reference: &ReferenceData, unit_price: Decimal, quantity: u32) -> Self {
        let add_on_name = |kind, id: Option<AddOnId>| id.and_then(|id| reference.add_on(kind, id)).map(|a| a.name.clone());
        Self {
            product_id: product.id,
            part_number: product.part_number.clone(),
            product_name: product.name.clone(),
            quantity,
            color_id: selection.color_id,
            color_name: selection.color_id.and_then(|id| reference.color(id)).map(|c| c.name.clone()),
            unit_price,
            grease_name: add_on_name(AddOnKind::Grease, selection.grease_id),
            grease_id: selection.grease_id,
            anglefinder_name: add_on_name(AddOnKind::AngleFinder, selection.anglefinder_id),
            anglefinder_id: selection.anglefinder_id,
            hardware_name: add_on_name(AddOnKind::Hardware, selection.hardware_id),
            hardware_id: selection.hardware_id,
            hardware_pack_ids: selection.hardware_pack_ids,
        }
    }

    pub fn identity(&self) -> LineIdentity {
        LineIdentity {
            product_id: self.product_id,
            color_id: self.color_id,
            grease_id: self.grease_id,
            anglefinder_id: self.anglefinder_id,
            hardware_id: self.hardware_id,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoLineItem {
    pub id: LineItemId,
    pub po_id: PoId,
    pub product_id: ProductId,
    pub part_number: String,
    pub product_name: String,
    pub quantity: u32,
    pub color_id: Option<ColorId>,
    pub color_name: Option<String>,
    pub unit_price: Decimal,
    pub grease_id: Option<AddOnId>,
    pub grease_name: Option<String>,
    pub anglefinder_id: Option<AddOnId>,
    pub anglefinder_name: Option<String>,
    pub hardware_id: Option<AddOnId>,
    pub hardware_name: Option<String>,
    pub hardware_pack_ids: Vec<AddOnId>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl PoLineItem {
    pub fn from_new(id: LineItemId, po_id: PoId, position: i32, line: NewLineItem) -> Self {
        Self {
            id, po_id, position, created_at: Utc::now(),
            product_id: line.product_id,
            part_number: line.part_number,
            product_name: line.product_name,
            quantity: line.quantity,
            color_id: line.color_id,
            color_name: line.color_name,
            unit_price: line.unit_price,
            grease_id: line.grease_id,
            grease_name: line.grease_name,
            anglefinder_id: line.anglefinder_id,
            anglefinder_name: line.anglefinder_name,
            hardware_id: line.hardware_id,
            hardware_name: line.hardware_name,
            hardware_pack_ids: line.hardware_pack_ids,
        }
    }

    pub fn identity(&self) -> LineIdentity {
        LineIdentity {
            product_id: self.product_id,
            color_id: self.color_id,
            grease_id: self.grease_id,
            anglefinder_id: self.anglefinder_id,
            hardware_id: self.hardware_id,
        }
    }

    pub fn line_total(&self) -> Money { Money::usd(self.unit_price).multiply(self.quantity) }
}

/// Quantity a dealer may set directly on a line.
pub fn check_quantity(quantity: u32, cap: u32) -> Result<u32> {
    if quantity == 0 || quantity > cap {
        return Err(PoError::QuantityOutOfRange { requested: quantity, cap });
    }
    Ok(quantity)
}

/// Quantity after merging a repeat add. Exceeding the cap rejects the add
/// rather than truncating it.
pub fn merge_quantity(existing: u32, added: u32, cap: u32) -> Result<u32> {
    check_quantity(existing.saturating_add(added), cap)
}

/// A purchase order with its lines, in display order.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoView {
    pub purchase_order: PurchaseOrder,
    pub lines: Vec<PoLineItem>,
    pub item_count: u32,
    pub subtotal: Money,
}

impl PoView {
    pub fn new(purchase_order: PurchaseOrder, mut lines: Vec<PoLineItem>) -> Self {
        lines.sort_by_key(|l| (l.position, l.id));
        let item_count = lines.iter().map(|l| l.quantity).sum();
        let subtotal = lines.iter().fold(Money::default(), |acc, l| acc.add(&l.line_total()).unwrap_or(acc));
        Self { purchase_order, lines, item_count, subtotal }
    }
}
