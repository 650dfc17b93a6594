//! Reservation lifecycle integration tests: the engine end to end over the
//! in-memory store and the sandbox provider.

mod common;

use common::{booking, signed_callback, test_app};
use rust_decimal_macros::dec;

use transfer_api::database::store::{BookingStore, StoreEvent};
use transfer_api::errors::AppError;
use transfer_api::models::reservation::{PaymentMethod, PaymentStatus, ReservationStatus};

#[tokio::test]
async fn card_booking_runs_the_full_lifecycle() {
    let app = test_app();

    // Booking: card reservations wait for the provider
    let reservation = app.reservations.create(booking(PaymentMethod::Card)).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Pending);
    assert_eq!(reservation.payment_status, PaymentStatus::Pending);
    assert_eq!(reservation.total_price, dec!(180.00));
    assert!(reservation.qr_token.is_none());

    // Payment intent
    let opened = app.payments.open(&reservation.id).await.unwrap();
    assert_eq!(opened.transaction.amount, dec!(180.00));
    assert!(opened.payment_url.is_some());
    assert!(opened.bank_instructions.is_none());

    // Verified success callback confirms the reservation
    let callback = signed_callback(&app.provider, &opened.transaction.id, "success", "180.00");
    app.payments.reconcile(callback).await.unwrap();

    let reservation = app.reservations.get(&reservation.id).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Confirmed);
    assert_eq!(reservation.payment_status, PaymentStatus::Completed);

    // Driver assignment mints the pickup token
    let reservation = app.reservations.assign_driver(&reservation.id, "drv-9").await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Assigned);
    assert_eq!(reservation.driver_id.as_deref(), Some("drv-9"));
    let token = reservation.qr_token.clone().expect("token minted");
    assert!(!token.is_empty());

    // Wrong token: rejected, status untouched, retries allowed
    for _ in 0..3 {
        let err = app
            .reservations
            .activate(&reservation.id, "not-the-token")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
        let current = app.reservations.get(&reservation.id).await.unwrap();
        assert_eq!(current.status, ReservationStatus::Assigned);
        assert_eq!(current.qr_token.as_deref(), Some(token.as_str()));
    }

    // Right token starts the transfer
    let reservation = app.reservations.activate(&reservation.id, &token).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Started);

    // Completion settles 25% to the operator, remainder to the driver
    let (reservation, settlement) = app.reservations.complete(&reservation.id).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Completed);
    assert_eq!(settlement.operator_share, dec!(45.00));
    assert_eq!(settlement.driver_share, dec!(135.00));
    assert_eq!(settlement.rate, dec!(0.25));
    assert_eq!(settlement.driver_id, "drv-9");

    // Completing again repairs nothing and creates nothing
    let (_, settlement_again) = app.reservations.complete(&reservation.id).await.unwrap();
    assert_eq!(settlement_again.id, settlement.id);
    assert_eq!(app.store.list_settlements().await.unwrap().len(), 1);
}

#[tokio::test]
async fn bookings_with_missing_fields_are_rejected() {
    let app = test_app();

    let mut request = booking(PaymentMethod::Card);
    request.customer_name = String::new();
    let err = app.reservations.create(request).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut request = booking(PaymentMethod::Card);
    request.pickup.name = "  ".to_string();
    let err = app.reservations.create(request).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut request = booking(PaymentMethod::Card);
    request.distance_km = dec!(0);
    let err = app.reservations.create(request).await.unwrap_err();
    assert!(matches!(err, AppError::Pricing(_)));
}

#[tokio::test]
async fn bank_transfer_booking_starts_confirmed() {
    let app = test_app();

    let reservation = app
        .reservations
        .create(booking(PaymentMethod::BankTransfer))
        .await
        .unwrap();
    assert_eq!(reservation.status, ReservationStatus::Confirmed);
    assert_eq!(reservation.payment_status, PaymentStatus::Pending);

    let opened = app.payments.open(&reservation.id).await.unwrap();
    assert!(opened.payment_url.is_none());
    let instructions = opened.bank_instructions.expect("bank instructions");
    assert_eq!(instructions.reference, opened.transaction.id);
    assert!(!instructions.iban.is_empty());
}

#[tokio::test]
async fn invalid_transitions_leave_status_unchanged() {
    let app = test_app();

    let reservation = app.reservations.create(booking(PaymentMethod::Card)).await.unwrap();

    // pending -> assigned is rejected
    let err = app.reservations.assign_driver(&reservation.id, "drv-1").await.unwrap_err();
    assert!(matches!(err, AppError::IllegalTransition { .. }));
    let current = app.reservations.get(&reservation.id).await.unwrap();
    assert_eq!(current.status, ReservationStatus::Pending);

    // pending -> started is rejected
    let err = app.reservations.activate(&reservation.id, "whatever").await.unwrap_err();
    assert!(matches!(err, AppError::IllegalTransition { .. }));

    // pending -> completed is rejected
    let err = app.reservations.complete(&reservation.id).await.unwrap_err();
    assert!(matches!(err, AppError::IllegalTransition { .. }));

    let current = app.reservations.get(&reservation.id).await.unwrap();
    assert_eq!(current.status, ReservationStatus::Pending);
}

#[tokio::test]
async fn cancel_is_idempotent_and_blocks_further_work() {
    let app = test_app();

    let reservation = app
        .reservations
        .create(booking(PaymentMethod::BankTransfer))
        .await
        .unwrap();

    let cancelled = app.reservations.cancel(&reservation.id, "customer no-show").await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("customer no-show"));

    // Cancelling again: same reservation back, no error, reason untouched
    let again = app.reservations.cancel(&reservation.id, "different reason").await.unwrap();
    assert_eq!(again.status, ReservationStatus::Cancelled);
    assert_eq!(again.cancel_reason.as_deref(), Some("customer no-show"));
    assert_eq!(again.version, cancelled.version);

    let err = app.reservations.assign_driver(&reservation.id, "drv-1").await.unwrap_err();
    assert!(matches!(err, AppError::IllegalTransition { .. }));
}

#[tokio::test]
async fn completed_reservations_cannot_be_cancelled() {
    let app = test_app();

    let reservation = app
        .reservations
        .create(booking(PaymentMethod::BankTransfer))
        .await
        .unwrap();
    let reservation = app.reservations.assign_driver(&reservation.id, "drv-2").await.unwrap();
    let token = reservation.qr_token.clone().unwrap();
    app.reservations.activate(&reservation.id, &token).await.unwrap();
    app.reservations.complete(&reservation.id).await.unwrap();

    let err = app.reservations.cancel(&reservation.id, "too late").await.unwrap_err();
    assert!(matches!(err, AppError::IllegalTransition { .. }));
}

#[tokio::test]
async fn cancelling_closes_the_open_payment_intent() {
    let app = test_app();

    let reservation = app.reservations.create(booking(PaymentMethod::Card)).await.unwrap();
    let opened = app.payments.open(&reservation.id).await.unwrap();

    app.reservations.cancel(&reservation.id, "plans changed").await.unwrap();

    let transaction = app.payments.get(&opened.transaction.id).await.unwrap();
    assert_eq!(
        transaction.status,
        transfer_api::models::transaction::TransactionStatus::Cancelled
    );
}

#[tokio::test]
async fn reassignment_mints_a_fresh_token_atomically() {
    let app = test_app();

    let reservation = app
        .reservations
        .create(booking(PaymentMethod::BankTransfer))
        .await
        .unwrap();

    let first = app.reservations.assign_driver(&reservation.id, "drv-1").await.unwrap();
    let first_token = first.qr_token.clone().unwrap();

    // Different driver: new token, old one is dead
    let second = app.reservations.assign_driver(&reservation.id, "drv-2").await.unwrap();
    let second_token = second.qr_token.clone().unwrap();
    assert_ne!(first_token, second_token);
    assert_eq!(second.driver_id.as_deref(), Some("drv-2"));

    let err = app.reservations.activate(&reservation.id, &first_token).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidToken));

    // Same driver again: no-op, token survives
    let third = app.reservations.assign_driver(&reservation.id, "drv-2").await.unwrap();
    assert_eq!(third.qr_token.as_deref(), Some(second_token.as_str()));
    assert_eq!(third.version, second.version);

    app.reservations.activate(&reservation.id, &second_token).await.unwrap();
}

#[tokio::test]
async fn stale_writers_lose_with_a_conflict() {
    let app = test_app();

    let reservation = app
        .reservations
        .create(booking(PaymentMethod::BankTransfer))
        .await
        .unwrap();

    // Two callers read the same version; the first write wins
    let mut first = app.store.get_reservation(&reservation.id).await.unwrap();
    let mut second = first.clone();

    let expected = first.version;
    first.version += 1;
    first.driver_id = Some("drv-1".to_string());
    first.status = ReservationStatus::Assigned;
    app.store.replace_reservation(expected, &first).await.unwrap();

    second.version += 1;
    second.driver_id = Some("drv-2".to_string());
    second.status = ReservationStatus::Assigned;
    let err = app.store.replace_reservation(expected, &second).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // The winner's driver is on the document
    let current = app.store.get_reservation(&reservation.id).await.unwrap();
    assert_eq!(current.driver_id.as_deref(), Some("drv-1"));
}

#[tokio::test]
async fn store_subscription_pushes_status_changes() {
    let app = test_app();
    let mut events = app.store.subscribe();

    let reservation = app.reservations.create(booking(PaymentMethod::Card)).await.unwrap();

    match events.recv().await.unwrap() {
        StoreEvent::ReservationChanged { id, status, .. } => {
            assert_eq!(id, reservation.id);
            assert_eq!(status, ReservationStatus::Pending);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}
