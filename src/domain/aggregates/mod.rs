//! Aggregates module
pub mod dealer;
pub mod order;
pub mod product;
pub mod purchase_order;
pub mod reference;

pub use dealer::{Address, CustomerRole, Dealer};
pub use order::{OrderStatus, OrderSummary};
pub use product::Product;
pub use purchase_order::{LineIdentity, LineSelection, NewLineItem, PoLineItem, PoStatus, PoView, PurchaseOrder};
pub use reference::{AddOn, AddOnKind, Category, Color, DealerTier, MainCategory, Platform, ReferenceData, Vendor};
