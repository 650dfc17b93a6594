use axum::{
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use crate::handlers::payments;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(payments_health))
        .route("/open", post(payments::open_payment))
        .route("/callback", post(payments::payment_callback))
        .route("/:id", get(payments::get_transaction))
        .route("/:id/refund", post(payments::refund_payment))
}

async fn payments_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "payments",
        "timestamp": Utc::now().to_rfc3339(),
        "features": ["card", "bank-transfer", "callbacks", "refunds"]
    }))
}
