// models/reservation.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Reservation lifecycle. Every mutation goes through the reservation
/// service; the legal edges live in [`ReservationStatus::can_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Assigned,
    Started,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Assigned => "assigned",
            ReservationStatus::Started => "started",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Completed | ReservationStatus::Cancelled)
    }

    /// The closed transition table. `cancelled` is reachable from every
    /// non-terminal state; everything else moves strictly forward.
    pub fn can_transition(&self, to: ReservationStatus) -> bool {
        use ReservationStatus::*;
        match (self, to) {
            (Pending, Confirmed) => true,
            (Confirmed, Assigned) => true,
            // re-assignment to a different driver stays in `assigned`
            (Assigned, Assigned) => true,
            (Assigned, Started) => true,
            (Started, Completed) => true,
            (Pending | Confirmed | Assigned | Started, Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Card => f.write_str("card"),
            PaymentMethod::BankTransfer => f.write_str("bank_transfer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    Standard,
    Executive,
    Van,
    Minibus,
}

impl std::fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VehicleClass::Standard => f.write_str("standard"),
            VehicleClass::Executive => f.write_str("executive"),
            VehicleClass::Van => f.write_str("van"),
            VehicleClass::Minibus => f.write_str("minibus"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    #[serde(rename = "_id")]
    pub id: String,

    /// Optimistic-lock token; bumped on every conditional replace.
    pub version: i64,

    // Customer
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,

    // Trip
    pub pickup: Location,
    pub dropoff: Location,
    pub pickup_at: DateTime<Utc>,
    pub passengers: u32,
    pub baggage: u32,
    pub vehicle_class: VehicleClass,
    pub distance_km: Decimal,

    // Pricing
    pub base_price: Decimal,
    pub services: Vec<String>,
    pub total_price: Decimal,
    pub currency: String,

    // Lifecycle
    pub status: ReservationStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub driver_id: Option<String>,
    pub qr_token: Option<String>,
    pub cancel_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Incoming booking payload
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BookingRequest {
    #[validate(length(min = 1, message = "customer name required"))]
    pub customer_name: String,

    #[validate(length(min = 5, message = "customer phone required"))]
    pub customer_phone: String,

    #[validate(email)]
    pub customer_email: Option<String>,

    pub pickup: Location,
    pub dropoff: Location,
    pub pickup_at: DateTime<Utc>,

    #[validate(range(min = 1, max = 16))]
    pub passengers: u32,

    #[serde(default)]
    pub baggage: u32,

    pub vehicle_class: VehicleClass,
    pub distance_km: Decimal,

    #[serde(default)]
    pub services: Vec<String>,

    pub payment_method: PaymentMethod,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ReservationQuery {
    pub status: Option<ReservationStatus>,
    pub driver_id: Option<String>,
    pub customer_phone: Option<String>,
}
