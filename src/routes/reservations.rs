use axum::{
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use crate::handlers::{payments, reservations};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(reservations_health))
        .route(
            "/",
            post(reservations::create_reservation).get(reservations::list_reservations),
        )
        .route("/stats", get(reservations::reservation_stats))
        .route("/:id", get(reservations::get_reservation))
        .route("/:id/assign", post(reservations::assign_driver))
        .route("/:id/activate", post(reservations::activate_reservation))
        .route("/:id/complete", post(reservations::complete_reservation))
        .route("/:id/cancel", post(reservations::cancel_reservation))
        .route("/:id/transactions", get(payments::reservation_transactions))
}

async fn reservations_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "reservations",
        "timestamp": Utc::now().to_rfc3339(),
        "features": ["booking", "assignment", "qr-activation", "completion", "cancellation"]
    }))
}
