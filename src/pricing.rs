//! Dealer Pricing
//!
//! `unit = base * (1 - discount / 100)`, rounded half-up to cents. The
//! discount is the dealer's own override when present, otherwise the default
//! for their tier.

use rust_decimal::prelude::*;
use serde::Serialize;
use crate::domain::aggregates::{Dealer, DealerTier};

/// Currency precision (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

pub const MAX_TIER: u8 = 8;

/// Tier defaults used when the reference table has no row for a tier.
const DEFAULT_TIER_DISCOUNTS: [u32; MAX_TIER as usize] = [5, 10, 15, 20, 25, 30, 35, 40];

/// Default discount percentage per dealer tier, keyed 1-8.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierTable {
    discounts: [Decimal; MAX_TIER as usize],
}

impl Default for TierTable {
    fn default() -> Self {
        Self { discounts: DEFAULT_TIER_DISCOUNTS.map(Decimal::from) }
    }
}

impl TierTable {
    /// Builds the table from reference rows; tiers without a row keep their default.
    pub fn from_tiers(tiers: &[DealerTier]) -> Self {
        let mut table = Self::default();
        for row in tiers {
            match row.tier {
                1..=MAX_TIER => table.discounts[usize::from(row.tier - 1)] = clamp_percent(row.discount_percent),
                other => tracing::warn!(tier = other, "ignoring dealer tier outside 1-8"),
            }
        }
        table
    }

    /// Tier 0 (or anything out of range) gets no discount.
    pub fn default_discount(&self, tier: u8) -> Decimal {
        match tier {
            1..=MAX_TIER => self.discounts[usize::from(tier - 1)],
            _ => Decimal::ZERO,
        }
    }

    pub fn quote_for(&self, dealer: &Dealer) -> DealerPricing {
        let discount = dealer.discount_percent.unwrap_or_else(|| self.default_discount(dealer.tier));
        DealerPricing { tier: dealer.tier, discount_percent: clamp_percent(discount) }
    }
}

/// Effective pricing terms for one dealer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DealerPricing {
    pub tier: u8,
    pub discount_percent: Decimal,
}

impl DealerPricing {
    pub fn unit_price(&self, base_price: Decimal) -> Decimal {
        unit_price(base_price, self.discount_percent)
    }
}

fn clamp_percent(value: Decimal) -> Decimal {
    value.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
}

/// Discounts outside 0-100 are clamped rather than rejected, since admin
/// input upstream is loosely validated.
pub fn unit_price(base_price: Decimal, discount_percent: Decimal) -> Decimal {
    let base = base_price.max(Decimal::ZERO);
    let multiplier = Decimal::ONE - clamp_percent(discount_percent) / Decimal::ONE_HUNDRED;
    (base * multiplier).round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}
