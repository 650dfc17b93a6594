//! Transaction orchestrator integration tests: callback verification,
//! replay safety, failure handling, refunds.

mod common;

use common::{booking, signed_callback, test_app};
use rust_decimal_macros::dec;

use transfer_api::errors::AppError;
use transfer_api::models::reservation::{PaymentMethod, PaymentStatus, ReservationStatus};
use transfer_api::models::transaction::TransactionStatus;
use transfer_api::services::payment_service::ProviderCallback;

#[tokio::test]
async fn tampered_signature_is_rejected_and_nothing_moves() {
    let app = test_app();

    let reservation = app.reservations.create(booking(PaymentMethod::Card)).await.unwrap();
    let opened = app.payments.open(&reservation.id).await.unwrap();

    let callback = ProviderCallback {
        order_reference: opened.transaction.id.clone(),
        status: "success".to_string(),
        amount: "180.00".to_string(),
        signature: "deadbeef".repeat(8),
        provider_ref: None,
        error_code: None,
        error_message: None,
    };

    let err = app.payments.reconcile(callback).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidSignature));

    let transaction = app.payments.get(&opened.transaction.id).await.unwrap();
    assert_eq!(transaction.status, TransactionStatus::Pending);
    let reservation = app.reservations.get(&reservation.id).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Pending);
}

#[tokio::test]
async fn replayed_success_callback_is_idempotent() {
    let app = test_app();

    let reservation = app.reservations.create(booking(PaymentMethod::Card)).await.unwrap();
    let opened = app.payments.open(&reservation.id).await.unwrap();

    let callback = signed_callback(&app.provider, &opened.transaction.id, "success", "180.00");

    let first = app.payments.reconcile(callback.clone()).await.unwrap();
    assert_eq!(first.status, TransactionStatus::Completed);
    let attempts_after_first = first.attempts;

    // Same payload again: acknowledged, not reprocessed
    let second = app.payments.reconcile(callback).await.unwrap();
    assert_eq!(second.status, TransactionStatus::Completed);
    assert_eq!(second.attempts, attempts_after_first);
    assert_eq!(second.version, first.version);

    let reservation = app.reservations.get(&reservation.id).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Confirmed);
    assert_eq!(reservation.payment_status, PaymentStatus::Completed);
}

#[tokio::test]
async fn failed_callback_fails_the_transaction_but_not_the_reservation() {
    let app = test_app();

    let reservation = app.reservations.create(booking(PaymentMethod::Card)).await.unwrap();
    let opened = app.payments.open(&reservation.id).await.unwrap();

    let mut callback = signed_callback(&app.provider, &opened.transaction.id, "failed", "180.00");
    callback.error_code = Some("51".to_string());
    callback.error_message = Some("insufficient funds".to_string());

    let transaction = app.payments.reconcile(callback.clone()).await.unwrap();
    assert_eq!(transaction.status, TransactionStatus::Failed);
    assert_eq!(transaction.error_code.as_deref(), Some("51"));

    // Reservation stays where it was, ready for a retry
    let reservation_now = app.reservations.get(&reservation.id).await.unwrap();
    assert_eq!(reservation_now.status, ReservationStatus::Pending);
    assert_eq!(reservation_now.payment_status, PaymentStatus::Pending);

    // Replaying the failure changes nothing further
    let replay = app.payments.reconcile(callback).await.unwrap();
    assert_eq!(replay.version, transaction.version);

    // A retry opens a fresh transaction rather than mutating the failed one
    let reopened = app.payments.open(&reservation.id).await.unwrap();
    assert_ne!(reopened.transaction.id, transaction.id);
    assert_eq!(reopened.transaction.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn open_returns_the_existing_pending_transaction() {
    let app = test_app();

    let reservation = app.reservations.create(booking(PaymentMethod::Card)).await.unwrap();
    let first = app.payments.open(&reservation.id).await.unwrap();
    let second = app.payments.open(&reservation.id).await.unwrap();

    assert_eq!(first.transaction.id, second.transaction.id);

    let all = app.payments.list_for_reservation(&reservation.id).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn correctly_signed_but_mismatched_amount_is_rejected() {
    let app = test_app();

    let reservation = app.reservations.create(booking(PaymentMethod::Card)).await.unwrap();
    let opened = app.payments.open(&reservation.id).await.unwrap();

    // Valid signature over the wrong amount: provider-side corruption
    let callback = signed_callback(&app.provider, &opened.transaction.id, "success", "1.00");
    let err = app.payments.reconcile(callback).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let transaction = app.payments.get(&opened.transaction.id).await.unwrap();
    assert_eq!(transaction.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn unknown_callback_status_is_rejected() {
    let app = test_app();

    let reservation = app.reservations.create(booking(PaymentMethod::Card)).await.unwrap();
    let opened = app.payments.open(&reservation.id).await.unwrap();

    let callback = signed_callback(&app.provider, &opened.transaction.id, "maybe", "180.00");
    let err = app.payments.reconcile(callback).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn refund_flips_transaction_and_reservation() {
    let app = test_app();

    let reservation = app.reservations.create(booking(PaymentMethod::Card)).await.unwrap();
    let opened = app.payments.open(&reservation.id).await.unwrap();
    let callback = signed_callback(&app.provider, &opened.transaction.id, "success", "180.00");
    app.payments.reconcile(callback).await.unwrap();

    let refunded = app
        .payments
        .refund(&opened.transaction.id, None, "trip cancelled by operator")
        .await
        .unwrap();
    assert_eq!(refunded.status, TransactionStatus::Refunded);
    assert_eq!(refunded.refunded_amount, Some(dec!(180.00)));

    let reservation = app.reservations.get(&reservation.id).await.unwrap();
    assert_eq!(reservation.payment_status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn refunding_a_pending_transaction_is_rejected() {
    let app = test_app();

    let reservation = app.reservations.create(booking(PaymentMethod::Card)).await.unwrap();
    let opened = app.payments.open(&reservation.id).await.unwrap();

    let err = app
        .payments
        .refund(&opened.transaction.id, None, "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let transaction = app.payments.get(&opened.transaction.id).await.unwrap();
    assert_eq!(transaction.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn refund_amount_above_the_charge_is_rejected() {
    let app = test_app();

    let reservation = app.reservations.create(booking(PaymentMethod::Card)).await.unwrap();
    let opened = app.payments.open(&reservation.id).await.unwrap();
    let callback = signed_callback(&app.provider, &opened.transaction.id, "success", "180.00");
    app.payments.reconcile(callback).await.unwrap();

    let err = app
        .payments
        .refund(&opened.transaction.id, Some(dec!(500.00)), "overzealous")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn callbacks_for_unknown_orders_are_not_found() {
    let app = test_app();

    let callback = signed_callback(&app.provider, "no-such-transaction", "success", "180.00");
    let err = app.payments.reconcile(callback).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
