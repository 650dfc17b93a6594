// handlers/payments.rs
use axum::{
    extract::{Path, State},
    response::Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    errors::Result,
    models::transaction::Transaction,
    services::payment_service::{OpenedPayment, ProviderCallback},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct OpenPaymentRequest {
    pub reservation_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub amount: Option<Decimal>,
    pub reason: String,
}

pub async fn open_payment(
    State(state): State<AppState>,
    Json(payload): Json<OpenPaymentRequest>,
) -> Result<Json<OpenedPayment>> {
    info!("Opening payment for reservation {}", payload.reservation_id);
    let opened = state.payments.open(&payload.reservation_id).await?;
    Ok(Json(opened))
}

/// The provider posts its signed result here. A bad signature is rejected
/// with 401 and changes nothing; replays of settled transactions are
/// acknowledged without reprocessing.
pub async fn payment_callback(
    State(state): State<AppState>,
    Json(payload): Json<ProviderCallback>,
) -> Result<Json<serde_json::Value>> {
    info!(
        "Provider callback for order {} ({})",
        payload.order_reference, payload.status
    );
    let transaction = state.payments.reconcile(payload).await?;
    Ok(Json(json!({
        "received": true,
        "transaction_id": transaction.id,
        "status": transaction.status,
    })))
}

pub async fn refund_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<RefundRequest>,
) -> Result<Json<Transaction>> {
    let transaction = state
        .payments
        .refund(&id, payload.amount, &payload.reason)
        .await?;
    Ok(Json(transaction))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Transaction>> {
    Ok(Json(state.payments.get(&id).await?))
}

pub async fn reservation_transactions(
    State(state): State<AppState>,
    Path(reservation_id): Path<String>,
) -> Result<Json<Vec<Transaction>>> {
    Ok(Json(
        state.payments.list_for_reservation(&reservation_id).await?,
    ))
}
