use axum::{
    body::Bytes,
    extract::{rejection::{JsonRejection, QueryRejection}, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::str::FromStr;
use validator::Validate;
use crate::api::AppState;
use crate::domain::aggregates::{LineSelection, PoLineItem, PoStatus, PoView, PurchaseOrder, ReferenceData};
use crate::domain::value_objects::{optional_id, AddOnId, ColorId, DealerId, IdError, IdList, LineItemId, PoId, ProductId, RequestedQuantity, whole_number};
use crate::service::{AddLine, DealerProduct, PoReconciliation};
use crate::store::{Page, PoListQuery, PoSummary, ProductListQuery};
use crate::{PoError, Result};

// Path ids arrive as strings and are validated here, never deeper.
fn id<T: FromStr<Err = IdError>>(raw: &str) -> Result<T> {
    raw.parse::<T>().map_err(PoError::from)
}

fn json<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(v)| v).map_err(|e| PoError::Validation(e.body_text()))
}

fn query<T>(params: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    params.map(|Query(v)| v).map_err(|e| PoError::Validation(e.body_text()))
}

/// Bodies that may be omitted entirely.
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| PoError::Validation(format!("invalid request body: {e}")))
}

/// Add-to-PO payload. The storefront also posts part number, names and unit
/// price; those are ignored and re-read from the catalog.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLineRequest {
    #[serde(default, deserialize_with = "optional_id")]
    pub po_id: Option<PoId>,
    pub product_id: ProductId,
    #[serde(default)]
    pub quantity: RequestedQuantity,
    #[serde(default, deserialize_with = "optional_id")]
    pub color_id: Option<ColorId>,
    #[serde(default, deserialize_with = "optional_id")]
    pub grease_id: Option<AddOnId>,
    #[serde(default, deserialize_with = "optional_id")]
    pub anglefinder_id: Option<AddOnId>,
    #[serde(default, deserialize_with = "optional_id")]
    pub hardware_id: Option<AddOnId>,
    #[serde(default)]
    pub hardware_pack_ids: IdList<AddOnId>,
}

impl From<AddLineRequest> for AddLine {
    fn from(r: AddLineRequest) -> Self {
        AddLine {
            po_id: r.po_id,
            product_id: r.product_id,
            quantity: r.quantity,
            selection: LineSelection {
                color_id: r.color_id,
                grease_id: r.grease_id,
                anglefinder_id: r.anglefinder_id,
                hardware_id: r.hardware_id,
                hardware_pack_ids: r.hardware_pack_ids.ids().to_vec(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateLineRequest {
    #[serde(deserialize_with = "whole_number")]
    pub quantity: i64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    #[validate(length(max = 500))]
    pub line_ids: Vec<LineItemId>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[validate(length(max = 2000))]
    pub dealer_notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub status: String,
    #[validate(length(max = 2000))]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NotesRequest {
    #[validate(length(max = 2000))]
    pub admin_notes: Option<String>,
}

pub async fn reference(State(s): State<AppState>) -> Result<Json<ReferenceData>> {
    Ok(Json(s.service.reference().await?))
}

pub async fn dealer_products(State(s): State<AppState>, Path(dealer_id): Path<String>, params: std::result::Result<Query<ProductListQuery>, QueryRejection>) -> Result<Json<Page<DealerProduct>>> {
    Ok(Json(s.service.dealer_products(id::<DealerId>(&dealer_id)?, query(params)?).await?))
}

pub async fn draft(State(s): State<AppState>, Path(dealer_id): Path<String>) -> Result<Json<PoView>> {
    Ok(Json(s.service.draft_view(id::<DealerId>(&dealer_id)?).await?))
}

pub async fn add_line(State(s): State<AppState>, Path(dealer_id): Path<String>, body: std::result::Result<Json<AddLineRequest>, JsonRejection>) -> Result<(StatusCode, Json<PoLineItem>)> {
    let dealer_id = id::<DealerId>(&dealer_id)?;
    let line = s.service.add_line(dealer_id, json(body)?.into()).await?;
    Ok((StatusCode::CREATED, Json(line)))
}

pub async fn update_line(State(s): State<AppState>, Path((po_id, line_id)): Path<(String, String)>, body: std::result::Result<Json<UpdateLineRequest>, JsonRejection>) -> Result<Json<PoLineItem>> {
    let requested = json(body)?.quantity;
    let quantity = if requested <= 0 { 0 } else { u32::try_from(requested).unwrap_or(u32::MAX) };
    Ok(Json(s.service.update_line_quantity(id::<PoId>(&po_id)?, id::<LineItemId>(&line_id)?, quantity).await?))
}

pub async fn remove_line(State(s): State<AppState>, Path((po_id, line_id)): Path<(String, String)>) -> Result<StatusCode> {
    s.service.remove_line(id::<PoId>(&po_id)?, id::<LineItemId>(&line_id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reorder_lines(State(s): State<AppState>, Path(po_id): Path<String>, body: std::result::Result<Json<ReorderRequest>, JsonRejection>) -> Result<Json<PoView>> {
    let r = json(body)?;
    r.validate()?;
    Ok(Json(s.service.reorder_lines(id::<PoId>(&po_id)?, r.line_ids).await?))
}

pub async fn send(State(s): State<AppState>, Path(po_id): Path<String>, body: Bytes) -> Result<Json<PoView>> {
    let r: SendRequest = optional_json(&body)?;
    r.validate()?;
    Ok(Json(s.service.send(id::<PoId>(&po_id)?, r.dealer_notes).await?))
}

pub async fn list_purchase_orders(State(s): State<AppState>, params: std::result::Result<Query<PoListQuery>, QueryRejection>) -> Result<Json<Page<PoSummary>>> {
    Ok(Json(s.service.list_purchase_orders(query(params)?).await?))
}

pub async fn reconcile(State(s): State<AppState>, Path(po_id): Path<String>) -> Result<Json<PoReconciliation>> {
    Ok(Json(s.service.reconcile(id::<PoId>(&po_id)?).await?))
}

pub async fn admin_transition(State(s): State<AppState>, Path(po_id): Path<String>, body: std::result::Result<Json<StatusRequest>, JsonRejection>) -> Result<Json<PurchaseOrder>> {
    let r = json(body)?;
    r.validate()?;
    let to: PoStatus = r.status.parse()?;
    Ok(Json(s.service.admin_transition(id::<PoId>(&po_id)?, to, r.admin_notes).await?))
}

pub async fn set_admin_notes(State(s): State<AppState>, Path(po_id): Path<String>, body: std::result::Result<Json<NotesRequest>, JsonRejection>) -> Result<Json<PurchaseOrder>> {
    let r = json(body)?;
    r.validate()?;
    Ok(Json(s.service.set_admin_notes(id::<PoId>(&po_id)?, r.admin_notes).await?))
}
