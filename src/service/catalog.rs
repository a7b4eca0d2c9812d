//! Catalog reads for the dealer portal.

use rust_decimal::Decimal;
use serde::Serialize;
use validator::Validate;
use crate::domain::aggregates::{Product, ReferenceData};
use crate::domain::value_objects::DealerId;
use crate::pricing::TierTable;
use crate::service::PoService;
use crate::store::{Page, ProductListQuery};
use crate::Result;

/// A listed product with the requesting dealer's price.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DealerProduct {
    #[serde(flatten)]
    pub product: Product,
    pub dealer_price: Decimal,
    pub discount_percent: Decimal,
}

impl PoService {
    pub async fn reference(&self) -> Result<ReferenceData> {
        self.store.reference_data().await
    }

    #[tracing::instrument(skip(self, query))]
    pub async fn dealer_products(&self, dealer_id: DealerId, query: ProductListQuery) -> Result<Page<DealerProduct>> {
        query.validate()?;
        let dealer = self.require_dealer(dealer_id).await?;
        let reference = self.store.reference_data().await?;
        let pricing = TierTable::from_tiers(&reference.tiers).quote_for(&dealer);
        let page = self.store.list_products(&query).await?;
        tracing::debug!(total = page.total, returned = page.data.len(), "listed dealer products");
        Ok(page.map(|product| DealerProduct {
            dealer_price: pricing.unit_price(product.base_price),
            discount_percent: pricing.discount_percent,
            product,
        }))
    }
}
