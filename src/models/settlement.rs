// models/settlement.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Paid,
}

/// Revenue split for one completed trip. Written once when the reservation
/// reaches `completed`; the only later mutation is the `paid` flip done by
/// the payout run. `operator_share + driver_share == total_amount` holds
/// exactly because the driver share is computed by subtraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    #[serde(rename = "_id")]
    pub id: String,

    pub reservation_id: String,
    pub driver_id: String,

    pub total_amount: Decimal,
    pub operator_share: Decimal,
    pub driver_share: Decimal,

    /// Commission rate captured at settlement time. Later config changes
    /// never touch an existing settlement.
    pub rate: Decimal,

    pub currency: String,
    pub status: SettlementStatus,
    pub created_at: DateTime<Utc>,
}
