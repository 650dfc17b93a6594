// services/reservation_service.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::database::store::BookingStore;
use crate::errors::{AppError, Result};
use crate::models::reservation::{
    BookingRequest, PaymentMethod, PaymentStatus, Reservation, ReservationQuery,
    ReservationStatus,
};
use crate::models::settlement::Settlement;
use crate::models::transaction::TransactionStatus;
use crate::services::commission_service::CommissionService;
use crate::services::notification_service::{NotificationKind, NotificationService};
use crate::services::pricing_service::{PricingService, Quote};
use crate::services::qr_service::QrTokenService;

/// Owns the reservation status field. Every transition reads the current
/// document, checks the transition table, and writes back conditionally on
/// the version it read; a lost race surfaces as a `Conflict` for the
/// caller to re-read and retry.
#[derive(Clone)]
pub struct ReservationService {
    store: Arc<dyn BookingStore>,
    pricing: PricingService,
    commission: CommissionService,
    notifications: NotificationService,
    default_currency: String,
}

impl ReservationService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        pricing: PricingService,
        commission: CommissionService,
        notifications: NotificationService,
        default_currency: String,
    ) -> Self {
        ReservationService {
            store,
            pricing,
            commission,
            notifications,
            default_currency,
        }
    }

    /// Validates the booking, prices it, and stores the reservation in its
    /// entry state: bank transfers are confirmed immediately (funds are
    /// asserted out-of-band), card bookings wait for the provider callback.
    pub async fn create(&self, request: BookingRequest) -> Result<Reservation> {
        request.validate()?;

        if request.pickup.name.trim().is_empty() || request.dropoff.name.trim().is_empty() {
            return Err(AppError::validation("pickup and dropoff are required"));
        }

        let now = Utc::now();
        let breakdown = self.pricing.price(&Quote {
            distance_km: request.distance_km,
            vehicle_class: request.vehicle_class,
            services: request.services.clone(),
            pickup_at: request.pickup_at,
            booked_at: now,
        })?;

        let status = match request.payment_method {
            PaymentMethod::BankTransfer => ReservationStatus::Confirmed,
            PaymentMethod::Card => ReservationStatus::Pending,
        };

        let reservation = Reservation {
            id: Uuid::new_v4().to_string(),
            version: 0,
            customer_name: request.customer_name,
            customer_phone: request.customer_phone,
            customer_email: request.customer_email,
            pickup: request.pickup,
            dropoff: request.dropoff,
            pickup_at: request.pickup_at,
            passengers: request.passengers,
            baggage: request.baggage,
            vehicle_class: request.vehicle_class,
            distance_km: request.distance_km,
            base_price: breakdown.base,
            services: request.services,
            total_price: breakdown.total,
            currency: self.default_currency.clone(),
            status,
            payment_status: PaymentStatus::Pending,
            payment_method: request.payment_method,
            driver_id: None,
            qr_token: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_reservation(&reservation).await?;
        info!(
            reservation_id = %reservation.id,
            total = %reservation.total_price,
            status = %reservation.status,
            "reservation created"
        );

        self.notifications
            .notify(
                NotificationKind::BookingReceived,
                &reservation.customer_phone,
                &format!(
                    "Booking received: {} -> {} on {}. Total {} {}.",
                    reservation.pickup.name,
                    reservation.dropoff.name,
                    reservation.pickup_at.format("%Y-%m-%d %H:%M"),
                    reservation.total_price,
                    reservation.currency
                ),
            )
            .await;

        Ok(reservation)
    }

    /// Assign (or re-assign) a driver. A fresh QR token is minted in the
    /// same conditional write, so the old token dies atomically with the
    /// re-assignment. Assigning the driver already on the trip is a no-op.
    pub async fn assign_driver(&self, id: &str, driver_id: &str) -> Result<Reservation> {
        if driver_id.trim().is_empty() {
            return Err(AppError::validation("driver id is required"));
        }

        let mut reservation = self.store.get_reservation(id).await?;

        if reservation.status == ReservationStatus::Assigned
            && reservation.driver_id.as_deref() == Some(driver_id)
        {
            return Ok(reservation);
        }

        if !reservation.status.can_transition(ReservationStatus::Assigned) {
            return Err(AppError::IllegalTransition {
                from: reservation.status,
                to: ReservationStatus::Assigned,
            });
        }

        let expected = reservation.version;
        reservation.version += 1;
        reservation.status = ReservationStatus::Assigned;
        reservation.driver_id = Some(driver_id.to_string());
        reservation.qr_token = Some(QrTokenService::mint());
        reservation.updated_at = Utc::now();

        self.store.replace_reservation(expected, &reservation).await?;
        info!(
            reservation_id = %reservation.id,
            driver_id,
            "driver assigned, pickup token minted"
        );

        self.notifications
            .notify(
                NotificationKind::DriverAssigned,
                driver_id,
                &format!(
                    "New transfer: {} -> {} at {}, {} pax.",
                    reservation.pickup.name,
                    reservation.dropoff.name,
                    reservation.pickup_at.format("%Y-%m-%d %H:%M"),
                    reservation.passengers
                ),
            )
            .await;

        Ok(reservation)
    }

    /// The QR gate. A wrong token never mutates anything and the driver may
    /// retry; the right token consumes the `assigned` state.
    pub async fn activate(&self, id: &str, presented_token: &str) -> Result<Reservation> {
        let mut reservation = self.store.get_reservation(id).await?;

        if reservation.status != ReservationStatus::Assigned {
            return Err(AppError::IllegalTransition {
                from: reservation.status,
                to: ReservationStatus::Started,
            });
        }

        let stored = reservation.qr_token.clone().ok_or_else(|| {
            error!(
                reservation_id = %reservation.id,
                "assigned reservation has no QR token"
            );
            AppError::precondition("assigned reservation is missing its QR token")
        })?;

        if !QrTokenService::verify(&stored, presented_token) {
            warn!(reservation_id = %reservation.id, "QR token mismatch");
            return Err(AppError::InvalidToken);
        }

        let expected = reservation.version;
        reservation.version += 1;
        reservation.status = ReservationStatus::Started;
        reservation.updated_at = Utc::now();

        self.store.replace_reservation(expected, &reservation).await?;
        info!(reservation_id = %reservation.id, "transfer started");

        self.notifications
            .notify(
                NotificationKind::TransferStarted,
                &reservation.customer_phone,
                "Your transfer has started. Safe trip!",
            )
            .await;

        Ok(reservation)
    }

    /// Completion and settlement are logically one operation. The status
    /// write lands first; if settlement creation then fails the whole call
    /// errors and a retried `complete` repairs the missing settlement;
    /// the unique index keeps it at exactly one either way.
    pub async fn complete(&self, id: &str) -> Result<(Reservation, Settlement)> {
        let mut reservation = self.store.get_reservation(id).await?;

        if reservation.status == ReservationStatus::Completed {
            let settlement = self.ensure_settled(&reservation).await?;
            return Ok((reservation, settlement));
        }

        if !reservation.status.can_transition(ReservationStatus::Completed) {
            return Err(AppError::IllegalTransition {
                from: reservation.status,
                to: ReservationStatus::Completed,
            });
        }

        // A completed reservation implies a completed payment. Bank
        // transfers are confirmed by the operator completing the trip;
        // an unpaid card trip reaching here is an invariant violation.
        if reservation.payment_status != PaymentStatus::Completed {
            match reservation.payment_method {
                PaymentMethod::BankTransfer => {
                    reservation.payment_status = PaymentStatus::Completed;
                }
                PaymentMethod::Card => {
                    error!(
                        reservation_id = %reservation.id,
                        payment_status = %reservation.payment_status,
                        "completing a card reservation that was never paid"
                    );
                    return Err(AppError::precondition(
                        "cannot complete a card reservation without a completed payment",
                    ));
                }
            }
        }

        let expected = reservation.version;
        reservation.version += 1;
        reservation.status = ReservationStatus::Completed;
        reservation.updated_at = Utc::now();

        self.store.replace_reservation(expected, &reservation).await?;

        let settlement = self.ensure_settled(&reservation).await?;
        info!(
            reservation_id = %reservation.id,
            settlement_id = %settlement.id,
            operator_share = %settlement.operator_share,
            driver_share = %settlement.driver_share,
            "transfer completed and settled"
        );

        self.notifications
            .notify(
                NotificationKind::TransferCompleted,
                &reservation.customer_phone,
                "Thanks for riding with us! Your receipt is on its way.",
            )
            .await;

        Ok((reservation, settlement))
    }

    async fn ensure_settled(&self, reservation: &Reservation) -> Result<Settlement> {
        if let Some(existing) = self
            .store
            .get_settlement_for_reservation(&reservation.id)
            .await?
        {
            return Ok(existing);
        }
        let settlement = self.commission.settle(reservation)?;
        Ok(self
            .store
            .insert_settlement(&settlement)
            .await?
            .into_inner())
    }

    /// Legal from everywhere but `completed`; cancelling a cancelled
    /// reservation returns it unchanged. Any still-open transaction is
    /// closed alongside.
    pub async fn cancel(&self, id: &str, reason: &str) -> Result<Reservation> {
        let mut reservation = self.store.get_reservation(id).await?;

        if reservation.status == ReservationStatus::Cancelled {
            return Ok(reservation);
        }

        if !reservation.status.can_transition(ReservationStatus::Cancelled) {
            return Err(AppError::IllegalTransition {
                from: reservation.status,
                to: ReservationStatus::Cancelled,
            });
        }

        let expected = reservation.version;
        reservation.version += 1;
        reservation.status = ReservationStatus::Cancelled;
        reservation.cancel_reason = Some(reason.to_string());
        reservation.updated_at = Utc::now();

        self.store.replace_reservation(expected, &reservation).await?;
        info!(reservation_id = %reservation.id, reason, "reservation cancelled");

        // Best-effort close of the open payment intent.
        if let Some(transaction) = self.store.find_open_transaction(id).await? {
            let mut updated = transaction;
            let expected = updated.version;
            updated.version += 1;
            updated.status = TransactionStatus::Cancelled;
            updated.updated_at = Utc::now();
            if let Err(e) = self.store.replace_transaction(expected, &updated).await {
                warn!(
                    transaction_id = %updated.id,
                    error = %e,
                    "could not cancel open transaction"
                );
            }
        }

        self.notifications
            .notify(
                NotificationKind::BookingCancelled,
                &reservation.customer_phone,
                &format!("Your booking was cancelled: {}", reason),
            )
            .await;

        Ok(reservation)
    }

    pub async fn get(&self, id: &str) -> Result<Reservation> {
        self.store.get_reservation(id).await
    }

    pub async fn list(&self, query: &ReservationQuery) -> Result<Vec<Reservation>> {
        self.store.list_reservations(query).await
    }

    pub async fn settlement_for(&self, reservation_id: &str) -> Result<Option<Settlement>> {
        self.store.get_settlement_for_reservation(reservation_id).await
    }
}
