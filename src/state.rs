use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::store::{BookingStore, StoreEvent};
use crate::services::notification_service::NotificationService;
use crate::services::payment_service::PaymentService;
use crate::services::reservation_service::ReservationService;

const ACTIVITY_CAPACITY: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: StoreEvent,
}

/// Rolling window of recent store events, filled by the subscription
/// listener spawned in main.
#[derive(Clone)]
pub struct ActivityFeed {
    entries: Arc<RwLock<VecDeque<ActivityEntry>>>,
}

impl ActivityFeed {
    pub fn new() -> Self {
        ActivityFeed {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(ACTIVITY_CAPACITY))),
        }
    }

    pub fn push(&self, event: StoreEvent) {
        let mut entries = self.entries.write().unwrap();
        if entries.len() == ACTIVITY_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(ActivityEntry {
            at: Utc::now(),
            event,
        });
    }

    pub fn recent(&self, limit: usize) -> Vec<ActivityEntry> {
        let entries = self.entries.read().unwrap();
        entries.iter().rev().take(limit).cloned().collect()
    }
}

impl Default for ActivityFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BookingStore>,
    pub reservations: ReservationService,
    pub payments: PaymentService,
    pub notifications: NotificationService,
    pub activity: ActivityFeed,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BookingStore>,
        reservations: ReservationService,
        payments: PaymentService,
        notifications: NotificationService,
    ) -> Self {
        AppState {
            store,
            reservations,
            payments,
            notifications,
            activity: ActivityFeed::new(),
        }
    }
}
