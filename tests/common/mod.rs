//! Shared harness: the whole engine wired over the in-memory store and the
//! sandbox payment provider.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal_macros::dec;

use transfer_api::database::memory::MemoryStore;
use transfer_api::database::store::BookingStore;
use transfer_api::models::reservation::{
    BookingRequest, Location, PaymentMethod, VehicleClass,
};
use transfer_api::services::commission_service::CommissionService;
use transfer_api::services::notification_service::{LogSink, NotificationService};
use transfer_api::services::payment_service::{
    PaymentService, ProviderCallback, SandboxProvider,
};
use transfer_api::services::pricing_service::{PricingConfig, PricingService};
use transfer_api::services::reservation_service::ReservationService;

pub const TEST_SECRET: &str = "test-secret";
pub const TEST_SALT: &str = "test-salt";

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub reservations: ReservationService,
    pub payments: PaymentService,
    pub provider: SandboxProvider,
}

pub fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn BookingStore> = store.clone();

    let notifications = NotificationService::new(Arc::new(LogSink));
    let provider = SandboxProvider::new(TEST_SECRET.to_string(), TEST_SALT.to_string());

    let reservations = ReservationService::new(
        dyn_store.clone(),
        PricingService::new(PricingConfig::default()),
        CommissionService::new(dec!(0.25)).unwrap(),
        notifications.clone(),
        "EUR".to_string(),
    );

    let payments = PaymentService::new(
        dyn_store,
        Arc::new(provider.clone()),
        notifications,
        "AeroRide Transfers Ltd.".to_string(),
        "HU42 1177 3016 1111 1018 0000 0000".to_string(),
    );

    TestApp {
        store,
        reservations,
        payments,
        provider,
    }
}

/// Wednesday midday in March: no pricing multiplier fires, so a 40 km
/// standard trip totals exactly 180.00.
pub fn weekday_midday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 11, 12, 0, 0).unwrap()
}

pub fn booking(method: PaymentMethod) -> BookingRequest {
    BookingRequest {
        customer_name: "Ada Lovelace".to_string(),
        customer_phone: "+36201234567".to_string(),
        customer_email: Some("ada@example.com".to_string()),
        pickup: Location {
            name: "Airport T2".to_string(),
            lat: 47.4369,
            lng: 19.2556,
        },
        dropoff: Location {
            name: "Deak Ter".to_string(),
            lat: 47.4979,
            lng: 19.0544,
        },
        pickup_at: weekday_midday(),
        passengers: 2,
        baggage: 2,
        vehicle_class: VehicleClass::Standard,
        distance_km: dec!(40),
        services: vec![],
        payment_method: method,
    }
}

pub fn signed_callback(
    provider: &SandboxProvider,
    order_reference: &str,
    status: &str,
    amount: &str,
) -> ProviderCallback {
    ProviderCallback {
        order_reference: order_reference.to_string(),
        status: status.to_string(),
        amount: amount.to_string(),
        signature: provider.sign(order_reference, status, amount),
        provider_ref: None,
        error_code: None,
        error_message: None,
    }
}
