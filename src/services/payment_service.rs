// services/payment_service.rs
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{header, Client};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::database::store::BookingStore;
use crate::errors::{AppError, Result};
use crate::models::reservation::{
    PaymentMethod, PaymentStatus, Reservation, ReservationStatus,
};
use crate::models::transaction::{Transaction, TransactionStatus};
use crate::services::notification_service::{NotificationKind, NotificationService};

type HmacSha256 = Hmac<Sha256>;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);

/// Signed payload the provider posts back after the customer finishes (or
/// abandons) checkout. `amount` stays a string on the wire; it is part of
/// the signed canonical concatenation exactly as transmitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCallback {
    pub order_reference: String,
    pub status: String,
    pub amount: String,
    pub signature: String,

    #[serde(default)]
    pub provider_ref: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// HMAC-SHA256 over the canonical concatenation
/// `order_reference + salt + status + amount`, hex-encoded.
pub fn callback_signature(
    secret: &str,
    salt: &str,
    order_reference: &str,
    status: &str,
    amount: &str,
) -> String {
    let msg = format!("{order_reference}{salt}{status}{amount}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(msg.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn signature_matches(expected: &str, presented: &str) -> bool {
    expected.as_bytes().ct_eq(presented.as_bytes()).unwrap_u8() == 1
}

/// Two decimal places, always: the wire format the signature covers.
pub fn canonical_amount(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub provider_ref: String,
    pub payment_url: String,
}

/// A payment channel. The sandbox implementation sits behind the same trait
/// as the real gateway, so the orchestrator never branches on environment.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_checkout(
        &self,
        transaction: &Transaction,
        reservation: &Reservation,
    ) -> Result<CheckoutSession>;

    async fn refund(&self, transaction: &Transaction, amount: Decimal, reason: &str)
        -> Result<()>;

    fn verify_callback(&self, callback: &ProviderCallback) -> bool;
}

// Card gateway wire structs
#[derive(Debug, Serialize)]
struct GatewayCheckoutRequest {
    #[serde(rename = "MerchantId")]
    merchant_id: String,
    #[serde(rename = "OrderReference")]
    order_reference: String,
    #[serde(rename = "Amount")]
    amount: String,
    #[serde(rename = "Currency")]
    currency: String,
    #[serde(rename = "CallbackUrl")]
    callback_url: String,
    #[serde(rename = "CustomerEmail")]
    customer_email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayCheckoutResponse {
    #[serde(rename = "PaymentId")]
    payment_id: String,
    #[serde(rename = "PaymentUrl")]
    payment_url: String,
}

#[derive(Debug, Serialize)]
struct GatewayRefundRequest {
    #[serde(rename = "MerchantId")]
    merchant_id: String,
    #[serde(rename = "PaymentId")]
    payment_id: String,
    #[serde(rename = "Amount")]
    amount: String,
    #[serde(rename = "Reason")]
    reason: String,
}

#[derive(Clone)]
pub struct CardGatewayProvider {
    merchant_id: String,
    secret_key: String,
    callback_salt: String,
    callback_url: String,
    checkout_url: String,
    refund_url: String,
    client: Client,
}

impl CardGatewayProvider {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        let (checkout_url, refund_url) = config.get_gateway_urls();

        CardGatewayProvider {
            merchant_id: config.gateway_merchant_id.clone(),
            secret_key: config.gateway_secret_key.clone(),
            callback_salt: config.gateway_callback_salt.clone(),
            callback_url: config.gateway_callback_url.clone(),
            checkout_url,
            refund_url,
            client,
        }
    }

    fn auth_header(&self) -> String {
        let auth_string = format!("{}:{}", self.merchant_id, self.secret_key);
        format!("Basic {}", base64.encode(auth_string))
    }

    fn map_send_error(e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::ProviderTimeout
        } else {
            AppError::provider(format!("gateway request failed: {}", e))
        }
    }
}

#[async_trait]
impl PaymentProvider for CardGatewayProvider {
    fn name(&self) -> &'static str {
        "cardgate"
    }

    async fn create_checkout(
        &self,
        transaction: &Transaction,
        reservation: &Reservation,
    ) -> Result<CheckoutSession> {
        info!(
            transaction_id = %transaction.id,
            amount = %transaction.amount,
            "opening gateway checkout"
        );

        let request = GatewayCheckoutRequest {
            merchant_id: self.merchant_id.clone(),
            order_reference: transaction.id.clone(),
            amount: canonical_amount(transaction.amount),
            currency: transaction.currency.clone(),
            callback_url: self.callback_url.clone(),
            customer_email: reservation.customer_email.clone(),
        };

        let response = self
            .client
            .post(&self.checkout_url)
            .header(header::AUTHORIZATION, self.auth_header())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("gateway checkout failed: {} - {}", status, body);
            return Err(AppError::provider(format!("checkout failed: {}", status)));
        }

        let checkout: GatewayCheckoutResponse =
            response.json().await.map_err(Self::map_send_error)?;

        Ok(CheckoutSession {
            provider_ref: checkout.payment_id,
            payment_url: checkout.payment_url,
        })
    }

    async fn refund(
        &self,
        transaction: &Transaction,
        amount: Decimal,
        reason: &str,
    ) -> Result<()> {
        let provider_ref = transaction.provider_ref.clone().ok_or_else(|| {
            AppError::provider("transaction has no provider reference to refund against")
        })?;

        let request = GatewayRefundRequest {
            merchant_id: self.merchant_id.clone(),
            payment_id: provider_ref,
            amount: canonical_amount(amount),
            reason: reason.to_string(),
        };

        let response = self
            .client
            .post(&self.refund_url)
            .header(header::AUTHORIZATION, self.auth_header())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("gateway refund failed: {} - {}", status, body);
            return Err(AppError::provider(format!("refund failed: {}", status)));
        }

        Ok(())
    }

    fn verify_callback(&self, callback: &ProviderCallback) -> bool {
        let expected = callback_signature(
            &self.secret_key,
            &self.callback_salt,
            &callback.order_reference,
            &callback.status,
            &callback.amount,
        );
        signature_matches(&expected, &callback.signature)
    }
}

/// Fake provider for demo and test runs: checkout succeeds immediately with
/// a sandbox URL, refunds always go through, and callbacks are verified with
/// the same HMAC scheme as the real gateway.
#[derive(Clone)]
pub struct SandboxProvider {
    secret_key: String,
    callback_salt: String,
}

impl SandboxProvider {
    pub fn new(secret_key: String, callback_salt: String) -> Self {
        SandboxProvider {
            secret_key,
            callback_salt,
        }
    }

    /// Signs a payload the way the sandbox gateway would. Handy for tests
    /// and manual callback replays.
    pub fn sign(&self, order_reference: &str, status: &str, amount: &str) -> String {
        callback_signature(
            &self.secret_key,
            &self.callback_salt,
            order_reference,
            status,
            amount,
        )
    }
}

#[async_trait]
impl PaymentProvider for SandboxProvider {
    fn name(&self) -> &'static str {
        "sandbox"
    }

    async fn create_checkout(
        &self,
        transaction: &Transaction,
        _reservation: &Reservation,
    ) -> Result<CheckoutSession> {
        Ok(CheckoutSession {
            provider_ref: format!("SBX-{}", Uuid::new_v4()),
            payment_url: format!("https://sandbox.pay.invalid/checkout/{}", transaction.id),
        })
    }

    async fn refund(
        &self,
        transaction: &Transaction,
        amount: Decimal,
        _reason: &str,
    ) -> Result<()> {
        info!(
            transaction_id = %transaction.id,
            amount = %amount,
            "sandbox refund acknowledged"
        );
        Ok(())
    }

    fn verify_callback(&self, callback: &ProviderCallback) -> bool {
        let expected = self.sign(
            &callback.order_reference,
            &callback.status,
            &callback.amount,
        );
        signature_matches(&expected, &callback.signature)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BankInstructions {
    pub beneficiary: String,
    pub iban: String,
    pub reference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenedPayment {
    pub transaction: Transaction,
    pub payment_url: Option<String>,
    pub bank_instructions: Option<BankInstructions>,
}

/// Drives a transaction from `pending` to a terminal state and keeps the
/// reservation's payment view consistent with it.
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn BookingStore>,
    provider: Arc<dyn PaymentProvider>,
    notifications: NotificationService,
    bank_beneficiary: String,
    bank_iban: String,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        provider: Arc<dyn PaymentProvider>,
        notifications: NotificationService,
        bank_beneficiary: String,
        bank_iban: String,
    ) -> Self {
        PaymentService {
            store,
            provider,
            notifications,
            bank_beneficiary,
            bank_iban,
        }
    }

    fn bank_instructions(&self, transaction: &Transaction) -> BankInstructions {
        BankInstructions {
            beneficiary: self.bank_beneficiary.clone(),
            iban: self.bank_iban.clone(),
            reference: transaction.id.clone(),
        }
    }

    fn opened(&self, transaction: Transaction) -> OpenedPayment {
        let bank_instructions = match transaction.method {
            PaymentMethod::BankTransfer => Some(self.bank_instructions(&transaction)),
            PaymentMethod::Card => None,
        };
        OpenedPayment {
            payment_url: transaction.payment_url.clone(),
            bank_instructions,
            transaction,
        }
    }

    /// Opens a payment intent for the reservation's current total. Safe to
    /// call repeatedly: while a transaction is still pending the stored one
    /// is returned instead of a duplicate intent.
    pub async fn open(&self, reservation_id: &str) -> Result<OpenedPayment> {
        let reservation = self.store.get_reservation(reservation_id).await?;

        if reservation.status == ReservationStatus::Cancelled {
            return Err(AppError::validation(
                "cannot open a payment for a cancelled reservation",
            ));
        }
        if reservation.payment_status == PaymentStatus::Completed {
            return Err(AppError::validation("reservation is already paid"));
        }

        if let Some(existing) = self.store.find_open_transaction(reservation_id).await? {
            if existing.amount != reservation.total_price {
                error!(
                    transaction_id = %existing.id,
                    transaction_amount = %existing.amount,
                    reservation_total = %reservation.total_price,
                    "open transaction no longer matches the reservation total"
                );
                return Err(AppError::precondition(
                    "reservation total changed after the transaction was opened",
                ));
            }
            info!(
                transaction_id = %existing.id,
                "returning existing open transaction"
            );
            return Ok(self.opened(existing));
        }

        let now = Utc::now();
        let mut transaction = Transaction {
            id: Uuid::new_v4().to_string(),
            version: 0,
            reservation_id: reservation.id.clone(),
            amount: reservation.total_price,
            currency: reservation.currency.clone(),
            method: reservation.payment_method,
            provider: self.provider.name().to_string(),
            provider_ref: None,
            payment_url: None,
            status: TransactionStatus::Pending,
            attempts: 1,
            last_attempt_at: Some(now),
            error_code: None,
            error_message: None,
            refunded_amount: None,
            refund_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        // Persist first; a timed-out provider call leaves the intent
        // pending for later reconciliation instead of losing it.
        self.store.insert_transaction(&transaction).await?;

        match transaction.method {
            PaymentMethod::Card => {
                match self.provider.create_checkout(&transaction, &reservation).await {
                    Ok(session) => {
                        let expected = transaction.version;
                        transaction.version += 1;
                        transaction.provider_ref = Some(session.provider_ref);
                        transaction.payment_url = Some(session.payment_url);
                        transaction.updated_at = Utc::now();
                        self.store
                            .replace_transaction(expected, &transaction)
                            .await?;
                    }
                    Err(AppError::ProviderTimeout) => {
                        warn!(
                            transaction_id = %transaction.id,
                            "gateway timed out; transaction left pending for reconciliation"
                        );
                        return Err(AppError::ProviderTimeout);
                    }
                    Err(e) => {
                        let expected = transaction.version;
                        transaction.version += 1;
                        transaction.status = TransactionStatus::Failed;
                        transaction.error_message = Some(e.to_string());
                        transaction.updated_at = Utc::now();
                        self.store
                            .replace_transaction(expected, &transaction)
                            .await?;
                        return Err(e);
                    }
                }
            }
            PaymentMethod::BankTransfer => {
                info!(
                    transaction_id = %transaction.id,
                    "bank transfer intent opened; waiting on manual settlement"
                );
            }
        }

        Ok(self.opened(transaction))
    }

    /// Applies a provider callback. Replay-safe: terminal transactions are
    /// returned untouched, and an identical callback applied twice ends in
    /// the same state as applying it once.
    pub async fn reconcile(&self, callback: ProviderCallback) -> Result<Transaction> {
        let transaction = self.store.get_transaction(&callback.order_reference).await?;

        if !self.provider.verify_callback(&callback) {
            warn!(
                order_reference = %callback.order_reference,
                "rejecting provider callback with bad signature (possible forgery)"
            );
            return Err(AppError::InvalidSignature);
        }

        if transaction.status.is_terminal() {
            info!(
                transaction_id = %transaction.id,
                status = %transaction.status,
                "callback replay for terminal transaction ignored"
            );
            return Ok(transaction);
        }

        let callback_amount = Decimal::from_str(&callback.amount)
            .map_err(|_| AppError::validation("callback amount is not a number"))?;
        if callback_amount != transaction.amount {
            warn!(
                transaction_id = %transaction.id,
                callback_amount = %callback_amount,
                transaction_amount = %transaction.amount,
                "callback amount does not match transaction"
            );
            return Err(AppError::validation(
                "callback amount does not match the transaction",
            ));
        }

        let mut updated = transaction.clone();
        let expected = updated.version;
        updated.version += 1;
        updated.attempts += 1;
        updated.last_attempt_at = Some(Utc::now());
        updated.updated_at = Utc::now();
        if let Some(provider_ref) = &callback.provider_ref {
            updated.provider_ref = Some(provider_ref.clone());
        }

        match callback.status.as_str() {
            "success" => {
                updated.status = TransactionStatus::Completed;
                updated.completed_at = Some(Utc::now());
            }
            "failed" => {
                updated.status = TransactionStatus::Failed;
                updated.error_code = callback.error_code.clone();
                updated.error_message = callback.error_message.clone();
            }
            other => {
                return Err(AppError::validation(format!(
                    "unknown callback status: {}",
                    other
                )));
            }
        }

        match self.store.replace_transaction(expected, &updated).await {
            Ok(()) => {}
            Err(AppError::Conflict(_)) => {
                // Lost a race against another delivery of the same callback;
                // whatever landed is authoritative.
                let current = self.store.get_transaction(&updated.id).await?;
                if current.status.is_terminal() {
                    return Ok(current);
                }
                return Err(AppError::conflict(
                    "transaction was modified concurrently",
                ));
            }
            Err(e) => return Err(e),
        }

        if updated.status == TransactionStatus::Completed {
            self.mark_reservation_paid(&updated).await?;
        } else {
            info!(
                transaction_id = %updated.id,
                error_code = ?updated.error_code,
                "payment failed; reservation left in its prior state"
            );
        }

        Ok(updated)
    }

    /// Confirms the reservation after a verified successful payment.
    /// Conditional write, retried once on a lost race.
    async fn mark_reservation_paid(&self, transaction: &Transaction) -> Result<()> {
        for attempt in 0..2 {
            let mut reservation = self
                .store
                .get_reservation(&transaction.reservation_id)
                .await?;

            if reservation.payment_status == PaymentStatus::Completed {
                return Ok(());
            }

            let expected = reservation.version;
            reservation.version += 1;
            reservation.payment_status = PaymentStatus::Completed;
            if reservation.status == ReservationStatus::Pending {
                reservation.status = ReservationStatus::Confirmed;
            }
            reservation.updated_at = Utc::now();

            match self.store.replace_reservation(expected, &reservation).await {
                Ok(()) => {
                    self.notifications
                        .notify(
                            NotificationKind::PaymentReceived,
                            &reservation.customer_phone,
                            &format!(
                                "Payment of {} {} received. Your transfer is confirmed.",
                                canonical_amount(transaction.amount),
                                transaction.currency
                            ),
                        )
                        .await;
                    return Ok(());
                }
                Err(AppError::Conflict(_)) if attempt == 0 => continue,
                Err(e) => return Err(e),
            }
        }
        Err(AppError::conflict(
            "reservation kept changing while confirming payment",
        ))
    }

    /// Refund a completed transaction. Card refunds go through the
    /// provider; bank transfers are acknowledged as a manual process.
    pub async fn refund(
        &self,
        transaction_id: &str,
        amount: Option<Decimal>,
        reason: &str,
    ) -> Result<Transaction> {
        let transaction = self.store.get_transaction(transaction_id).await?;

        if transaction.status != TransactionStatus::Completed {
            return Err(AppError::validation(
                "only completed transactions can be refunded",
            ));
        }

        let amount = amount.unwrap_or(transaction.amount);
        if amount <= Decimal::ZERO || amount > transaction.amount {
            return Err(AppError::validation("refund amount out of range"));
        }

        match transaction.method {
            PaymentMethod::Card => {
                self.provider.refund(&transaction, amount, reason).await?;
            }
            PaymentMethod::BankTransfer => {
                info!(
                    transaction_id = %transaction.id,
                    amount = %amount,
                    "bank transfer refund recorded; wire it back manually"
                );
            }
        }

        let mut updated = transaction;
        let expected = updated.version;
        updated.version += 1;
        updated.status = TransactionStatus::Refunded;
        updated.refunded_amount = Some(amount);
        updated.refund_reason = Some(reason.to_string());
        updated.updated_at = Utc::now();
        self.store.replace_transaction(expected, &updated).await?;

        for attempt in 0..2 {
            let mut reservation = self.store.get_reservation(&updated.reservation_id).await?;
            if reservation.payment_status == PaymentStatus::Refunded {
                break;
            }
            let expected = reservation.version;
            reservation.version += 1;
            reservation.payment_status = PaymentStatus::Refunded;
            reservation.updated_at = Utc::now();
            match self.store.replace_reservation(expected, &reservation).await {
                Ok(()) => break,
                Err(AppError::Conflict(_)) if attempt == 0 => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(updated)
    }

    pub async fn get(&self, transaction_id: &str) -> Result<Transaction> {
        self.store.get_transaction(transaction_id).await
    }

    pub async fn list_for_reservation(&self, reservation_id: &str) -> Result<Vec<Transaction>> {
        self.store.list_transactions(reservation_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_for_canonical_input() {
        let a = callback_signature("secret", "salt", "tx-1", "success", "180.00");
        let b = callback_signature("secret", "salt", "tx-1", "success", "180.00");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn any_field_change_breaks_the_signature() {
        let base = callback_signature("secret", "salt", "tx-1", "success", "180.00");
        assert_ne!(base, callback_signature("secret", "salt", "tx-2", "success", "180.00"));
        assert_ne!(base, callback_signature("secret", "salt", "tx-1", "failed", "180.00"));
        assert_ne!(base, callback_signature("secret", "salt", "tx-1", "success", "180.01"));
        assert_ne!(base, callback_signature("other", "salt", "tx-1", "success", "180.00"));
        assert_ne!(base, callback_signature("secret", "pepper", "tx-1", "success", "180.00"));
    }

    #[test]
    fn sandbox_provider_verifies_its_own_signing() {
        let provider = SandboxProvider::new("secret".into(), "salt".into());
        let callback = ProviderCallback {
            order_reference: "tx-1".into(),
            status: "success".into(),
            amount: "180.00".into(),
            signature: provider.sign("tx-1", "success", "180.00"),
            provider_ref: None,
            error_code: None,
            error_message: None,
        };
        assert!(provider.verify_callback(&callback));

        let mut tampered = callback;
        tampered.amount = "1.00".into();
        assert!(!provider.verify_callback(&tampered));
    }

    #[test]
    fn canonical_amount_always_has_two_decimals() {
        use rust_decimal_macros::dec;
        assert_eq!(canonical_amount(dec!(180)), "180.00");
        assert_eq!(canonical_amount(dec!(180.5)), "180.50");
        assert_eq!(canonical_amount(dec!(0.05)), "0.05");
    }
}
