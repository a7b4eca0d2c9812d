//! HTTP surface (axum)

pub mod error;
mod handlers;

use axum::{routing::{get, patch, post, put}, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::service::PoService;

#[derive(Clone)]
pub struct AppState {
    pub service: PoService,
}

pub fn router(service: PoService) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "dealer-po-service"})) }))
        .route("/api/v1/reference", get(handlers::reference))
        .route("/api/v1/dealers/:dealer_id/products", get(handlers::dealer_products))
        .route("/api/v1/dealers/:dealer_id/purchase-order", get(handlers::draft))
        .route("/api/v1/dealers/:dealer_id/purchase-order/lines", post(handlers::add_line))
        .route("/api/v1/purchase-orders/:po_id/lines/positions", put(handlers::reorder_lines))
        .route("/api/v1/purchase-orders/:po_id/lines/:line_id", patch(handlers::update_line).delete(handlers::remove_line))
        .route("/api/v1/purchase-orders/:po_id/send", post(handlers::send))
        .route("/api/v1/admin/purchase-orders", get(handlers::list_purchase_orders))
        .route("/api/v1/admin/purchase-orders/:po_id", get(handlers::reconcile))
        .route("/api/v1/admin/purchase-orders/:po_id/status", post(handlers::admin_transition))
        .route("/api/v1/admin/purchase-orders/:po_id/notes", put(handlers::set_admin_notes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { service })
}
