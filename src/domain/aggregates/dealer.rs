//! Dealer (a customer with the dealer role)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::DealerId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerRole {
    #[default]
    Customer,
    Dealer,
    Admin,
}

impl CustomerRole {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "dealer" => Self::Dealer,
            "admin" => Self::Admin,
            _ => Self::Customer,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub name: String,
    pub street1: String,
    #[serde(default)]
    pub street2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    pub zip: String,
    pub country: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dealer {
    pub id: DealerId,
    pub name: String,
    #[serde(default)]
    pub business_name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub role: CustomerRole,
    /// 1-8 for dealers, 0 otherwise.
    #[serde(default)]
    pub tier: u8,
    /// Explicit per-customer discount; overrides the tier default when set.
    #[serde(default)]
    pub discount_percent: Option<Decimal>,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub shipping_address: Option<Address>,
}

impl Dealer {
    pub fn is_dealer(&self) -> bool { self.role == CustomerRole::Dealer }

    pub fn display_name(&self) -> &str {
        self.business_name.as_deref().filter(|b| !b.is_empty()).unwrap_or(&self.name)
    }
}
