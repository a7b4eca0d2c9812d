//! Product Aggregate

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::purchase_order::LineSelection;
use crate::domain::aggregates::reference::AddOnKind;
use crate::domain::value_objects::{AddOnId, CategoryId, ColorId, IdList, PlatformId, ProductId, VendorId};
use crate::{PoError, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub part_number: String,
    pub name: String,
    pub base_price: Decimal,
    #[serde(default)]
    pub retail_price: Decimal,
    #[serde(default)]
    pub platform_id: Option<PlatformId>,
    #[serde(default)]
    pub main_category_id: Option<CategoryId>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub vendor_id: Option<VendorId>,
    #[serde(default)]
    pub colors: IdList<ColorId>,
    #[serde(default)]
    pub grease: IdList<AddOnId>,
    #[serde(default)]
    pub anglefinders: IdList<AddOnId>,
    #[serde(default)]
    pub hardware: IdList<AddOnId>,
    #[serde(default)]
    pub hardware_packs: IdList<AddOnId>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default = "displayed")]
    pub display: bool,
}

fn displayed() -> bool { true }

impl Product {
    /// Only displayed products can be put on a purchase order.
    pub fn is_orderable(&self) -> bool { self.display }

    pub fn add_on_domain(&self, kind: AddOnKind) -> &IdList<AddOnId> {
        match kind {
            AddOnKind::Grease => &self.grease,
            AddOnKind::AngleFinder => &self.anglefinders,
            AddOnKind::Hardware => &self.hardware,
            AddOnKind::HardwarePack => &self.hardware_packs,
        }
    }

    /// A color is optional, but when given it must come from the product's
    /// color list. The same holds for each add-on kind.
    pub fn check_selection(&self, selection: &LineSelection) -> Result<()> {
        if let Some(color) = selection.color_id {
            if !self.colors.contains(color) {
                return Err(PoError::InvalidSelection(format!(
                    "color {color} is not available for {}", self.part_number
                )));
            }
        }
        for (kind, id) in selection.add_ons() {
            if !self.add_on_domain(kind).contains(id) {
                return Err(PoError::InvalidSelection(format!(
                    "{kind} {id} is not offered with {}", self.part_number
                )));
            }
        }
        for pack in &selection.hardware_pack_ids {
            if !self.hardware_packs.contains(*pack) {
                return Err(PoError::InvalidSelection(format!(
                    "hardware pack {pack} is not offered with {}", self.part_number
                )));
            }
        }
        Ok(())
    }

    pub fn update_price(&mut self, base_price: Decimal) {
        self.base_price = base_price;
    }
}
