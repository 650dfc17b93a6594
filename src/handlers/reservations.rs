// handlers/reservations.rs
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{
    errors::Result,
    models::reservation::{BookingRequest, Reservation, ReservationQuery, ReservationStatus},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct AssignDriverRequest {
    pub driver_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    /// The scanned QR payload, passed through untouched.
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

pub async fn create_reservation(
    State(state): State<AppState>,
    Json(payload): Json<BookingRequest>,
) -> Result<Json<Reservation>> {
    info!("Creating reservation for {}", payload.customer_name);
    let reservation = state.reservations.create(payload).await?;
    Ok(Json(reservation))
}

pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Reservation>> {
    Ok(Json(state.reservations.get(&id).await?))
}

pub async fn list_reservations(
    State(state): State<AppState>,
    Query(query): Query<ReservationQuery>,
) -> Result<Json<Vec<Reservation>>> {
    Ok(Json(state.reservations.list(&query).await?))
}

pub async fn assign_driver(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<AssignDriverRequest>,
) -> Result<Json<Reservation>> {
    let reservation = state
        .reservations
        .assign_driver(&id, &payload.driver_id)
        .await?;
    Ok(Json(reservation))
}

pub async fn activate_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ActivateRequest>,
) -> Result<Json<Reservation>> {
    let reservation = state.reservations.activate(&id, &payload.token).await?;
    Ok(Json(reservation))
}

pub async fn complete_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let (reservation, settlement) = state.reservations.complete(&id).await?;
    Ok(Json(json!({
        "reservation": reservation,
        "settlement": settlement,
    })))
}

pub async fn cancel_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<Reservation>> {
    let reservation = state.reservations.cancel(&id, &payload.reason).await?;
    Ok(Json(reservation))
}

pub async fn reservation_stats(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>> {
    let reservations = state
        .reservations
        .list(&ReservationQuery::default())
        .await?;

    let count_by = |status: ReservationStatus| {
        reservations.iter().filter(|r| r.status == status).count()
    };

    Ok(Json(json!({
        "total": reservations.len(),
        "pending": count_by(ReservationStatus::Pending),
        "confirmed": count_by(ReservationStatus::Confirmed),
        "assigned": count_by(ReservationStatus::Assigned),
        "started": count_by(ReservationStatus::Started),
        "completed": count_by(ReservationStatus::Completed),
        "cancelled": count_by(ReservationStatus::Cancelled),
    })))
}
