// services/commission_service.rs
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::error;
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::reservation::{Reservation, ReservationStatus};
use crate::models::settlement::{Settlement, SettlementStatus};

/// Splits a completed trip's revenue between operator and driver. The rate
/// is captured into the settlement record at split time; the driver share is
/// computed by subtraction so the two shares always sum to the total to the
/// currency minimum unit.
#[derive(Debug, Clone)]
pub struct CommissionService {
    rate: Decimal,
}

impl CommissionService {
    pub fn new(rate: Decimal) -> Result<Self> {
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            return Err(AppError::Configuration(format!(
                "commission rate must be within [0, 1], got {}",
                rate
            )));
        }
        Ok(CommissionService { rate })
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    /// Build the settlement record for a completed reservation. Callers are
    /// expected to hand this straight to the store's unique insert.
    pub fn settle(&self, reservation: &Reservation) -> Result<Settlement> {
        if reservation.status != ReservationStatus::Completed {
            error!(
                reservation_id = %reservation.id,
                status = %reservation.status,
                "settlement requested for a reservation that is not completed"
            );
            return Err(AppError::precondition(
                "cannot settle a reservation that is not completed",
            ));
        }

        let driver_id = reservation.driver_id.clone().ok_or_else(|| {
            error!(
                reservation_id = %reservation.id,
                "settlement requested for a reservation without a driver"
            );
            AppError::precondition("cannot settle a reservation without an assigned driver")
        })?;

        let total = reservation.total_price;
        let operator_share =
            (total * self.rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let driver_share = total - operator_share;

        Ok(Settlement {
            id: Uuid::new_v4().to_string(),
            reservation_id: reservation.id.clone(),
            driver_id,
            total_amount: total,
            operator_share,
            driver_share,
            rate: self.rate,
            currency: reservation.currency.clone(),
            status: SettlementStatus::Pending,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reservation::{
        Location, PaymentMethod, PaymentStatus, VehicleClass,
    };
    use rust_decimal_macros::dec;

    fn completed_reservation(total: Decimal) -> Reservation {
        let now = Utc::now();
        Reservation {
            id: "res-1".to_string(),
            version: 5,
            customer_name: "Ada".to_string(),
            customer_phone: "+36201234567".to_string(),
            customer_email: None,
            pickup: Location { name: "Airport T2".to_string(), lat: 47.43, lng: 19.26 },
            dropoff: Location { name: "Downtown".to_string(), lat: 47.50, lng: 19.04 },
            pickup_at: now,
            passengers: 2,
            baggage: 2,
            vehicle_class: VehicleClass::Standard,
            distance_km: dec!(40),
            base_price: total,
            services: vec![],
            total_price: total,
            currency: "EUR".to_string(),
            status: ReservationStatus::Completed,
            payment_status: PaymentStatus::Completed,
            payment_method: PaymentMethod::Card,
            driver_id: Some("drv-9".to_string()),
            qr_token: Some("aa".repeat(16)),
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn splits_180_at_quarter_rate() {
        let svc = CommissionService::new(dec!(0.25)).unwrap();
        let s = svc.settle(&completed_reservation(dec!(180.00))).unwrap();
        assert_eq!(s.operator_share, dec!(45.00));
        assert_eq!(s.driver_share, dec!(135.00));
        assert_eq!(s.rate, dec!(0.25));
        assert_eq!(s.operator_share + s.driver_share, s.total_amount);
    }

    #[test]
    fn shares_sum_exactly_even_when_rounding() {
        let svc = CommissionService::new(dec!(0.333)).unwrap();
        let s = svc.settle(&completed_reservation(dec!(100.01))).unwrap();
        // 100.01 * 0.333 = 33.30333 -> 33.30; driver gets the remainder
        assert_eq!(s.operator_share, dec!(33.30));
        assert_eq!(s.driver_share, dec!(66.71));
        assert_eq!(s.operator_share + s.driver_share, dec!(100.01));
    }

    #[test]
    fn rejects_non_completed_reservation() {
        let svc = CommissionService::new(dec!(0.25)).unwrap();
        let mut r = completed_reservation(dec!(180.00));
        r.status = ReservationStatus::Started;
        assert!(matches!(svc.settle(&r), Err(AppError::Precondition(_))));
    }

    #[test]
    fn rejects_reservation_without_driver() {
        let svc = CommissionService::new(dec!(0.25)).unwrap();
        let mut r = completed_reservation(dec!(180.00));
        r.driver_id = None;
        assert!(matches!(svc.settle(&r), Err(AppError::Precondition(_))));
    }

    #[test]
    fn rate_outside_unit_interval_is_rejected() {
        assert!(CommissionService::new(dec!(1.01)).is_err());
        assert!(CommissionService::new(dec!(-0.1)).is_err());
        assert!(CommissionService::new(dec!(0)).is_ok());
        assert!(CommissionService::new(dec!(1)).is_ok());
    }
}
