#![allow(dead_code)]

use dealer_po_service::domain::value_objects::{AddOnId, ColorId, DealerId, ProductId};
use dealer_po_service::events::EventBus;
use dealer_po_service::service::{AddLine, PoService};
use dealer_po_service::store::{MemoryStore, PoStore, Seed};
use std::sync::Arc;

pub const CAP: u32 = 25;

pub const SMITH: i64 = 1; // tier 3, explicit 10% discount
pub const RIVERA: i64 = 2; // tier 5, tier default
pub const RETAIL: i64 = 3; // not a dealer
pub const LEE: i64 = 4; // tier 0

pub const P101: i64 = 101;
pub const PANHARD: i64 = 102;
pub const HIDDEN: i64 = 103;

pub const RED: i64 = 1;
pub const BLACK_HAMMERTONE: i64 = 2;
pub const BARE: i64 = 3;

pub fn seed() -> Seed {
    Seed::from_json(include_str!("../../fixtures/seed.json")).expect("fixture seed parses")
}

pub fn harness() -> (PoService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new(seed()));
    let dyn_store: Arc<dyn PoStore> = store.clone();
    (PoService::new(dyn_store, EventBus::disabled(), CAP), store)
}

pub fn dealer(id: i64) -> DealerId { DealerId::new(id).unwrap() }
pub fn product(id: i64) -> ProductId { ProductId::new(id).unwrap() }
pub fn color(id: i64) -> ColorId { ColorId::new(id).unwrap() }
pub fn add_on(id: i64) -> AddOnId { AddOnId::new(id).unwrap() }

pub fn add(product_id: i64, quantity: u32, color_id: Option<i64>) -> AddLine {
    let mut req = AddLine::new(product(product_id), quantity);
    req.selection.color_id = color_id.map(color);
    req
}
