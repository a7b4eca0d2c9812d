//! Catalog reference data
//!
//! Read-only lookup tables shared by the catalog, pricing and PO paths.

use crate::domain::value_objects::{AddOnId, CategoryId, ColorId, PlatformId, VendorId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    pub id: PlatformId,
    pub name: String,
    #[serde(default)]
    pub start_year: Option<i32>,
    #[serde(default)]
    pub end_year: Option<i32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainCategory {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub platform_id: Option<PlatformId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub main_category_id: Option<CategoryId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vendor {
    pub id: VendorId,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Color {
    pub id: ColorId,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOnKind {
    Grease,
    #[serde(rename = "anglefinder")]
    AngleFinder,
    Hardware,
    HardwarePack,
}

impl AddOnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grease => "grease",
            Self::AngleFinder => "anglefinder",
            Self::Hardware => "hardware",
            Self::HardwarePack => "hardware_pack",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "grease" => Some(Self::Grease),
            "anglefinder" => Some(Self::AngleFinder),
            "hardware" => Some(Self::Hardware),
            "hardware_pack" => Some(Self::HardwarePack),
            _ => None,
        }
    }
}

impl std::fmt::Display for AddOnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOn {
    pub id: AddOnId,
    pub kind: AddOnKind,
    pub name: String,
    #[serde(default)]
    pub part_number: Option<String>,
    #[serde(default)]
    pub price: Decimal,
}

/// Default discount for a dealer tier (1-8).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealerTier {
    pub tier: u8,
    pub discount_percent: Decimal,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReferenceData {
    pub platforms: Vec<Platform>,
    pub main_categories: Vec<MainCategory>,
    pub categories: Vec<Category>,
    pub vendors: Vec<Vendor>,
    pub colors: Vec<Color>,
    pub add_ons: Vec<AddOn>,
    pub tiers: Vec<DealerTier>,
}

impl ReferenceData {
    pub fn color(&self, id: ColorId) -> Option<&Color> {
        self.colors.iter().find(|c| c.id == id)
    }

    pub fn add_on(&self, kind: AddOnKind, id: AddOnId) -> Option<&AddOn> {
        self.add_ons.iter().find(|a| a.kind == kind && a.id == id)
    }
}
