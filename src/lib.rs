//! Dealer Purchase-Order Service
//!
//! Back-office engine for the dealer purchase-order portal.
//!
//! ## Features
//! - Catalog reference data and filtered dealer product listing
//! - Tiered dealer pricing with per-customer discount overrides
//! - Draft PO line aggregation keyed on (product, color, add-ons)
//! - Draft → sent → processing → completed lifecycle
//! - Admin reconciliation against a dealer's order history

pub mod api;
pub mod config;
pub mod domain;
pub mod events;
pub mod pricing;
pub mod service;
pub mod store;

use domain::aggregates::PoStatus;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum PoError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Quantity {requested} is out of range (allowed 1 to {cap} per line)")]
    QuantityOutOfRange { requested: u32, cap: u32 },

    #[error("Purchase order is {0} and can no longer be edited")]
    PoAlreadySent(PoStatus),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Cannot move purchase order from {from} to {to}")]
    InvalidTransition { from: PoStatus, to: PoStatus },

    #[error("Purchase order has no line items")]
    EmptyPo,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),
}

impl PoError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidSelection(_) => "invalid_selection",
            Self::QuantityOutOfRange { .. } => "quantity_out_of_range",
            Self::PoAlreadySent(_) => "po_already_sent",
            Self::InvalidState(_) => "invalid_state",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::EmptyPo => "empty_po",
            Self::Validation(_) => "validation_error",
            Self::Upstream(_) => "upstream_failure",
        }
    }
}

impl From<sqlx::Error> for PoError {
    fn from(err: sqlx::Error) -> Self {
        PoError::Upstream(err.to_string())
    }
}

impl From<validator::ValidationErrors> for PoError {
    fn from(err: validator::ValidationErrors) -> Self {
        PoError::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PoError>;
