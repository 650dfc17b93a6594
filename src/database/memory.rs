// database/memory.rs
//
// In-memory BookingStore. Backs the integration suite and local dev runs
// without a MongoDB instance; semantics (version conditions, settlement
// uniqueness, change feed) match the Mongo implementation.
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::database::store::{BookingStore, SettlementInsert, StoreEvent};
use crate::errors::{AppError, Result};
use crate::models::{
    reservation::{Reservation, ReservationQuery},
    settlement::Settlement,
    transaction::Transaction,
};

pub struct MemoryStore {
    reservations: RwLock<HashMap<String, Reservation>>,
    transactions: RwLock<HashMap<String, Transaction>>,
    /// Keyed by reservation id, the uniqueness the Mongo index provides.
    settlements: RwLock<HashMap<String, Settlement>>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        MemoryStore {
            reservations: RwLock::new(HashMap::new()),
            transactions: RwLock::new(HashMap::new()),
            settlements: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn publish(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()> {
        let mut map = self.reservations.write().unwrap();
        if map.contains_key(&reservation.id) {
            return Err(AppError::DuplicateKey);
        }
        map.insert(reservation.id.clone(), reservation.clone());
        drop(map);

        self.publish(StoreEvent::ReservationChanged {
            id: reservation.id.clone(),
            status: reservation.status,
            payment_status: reservation.payment_status,
        });
        Ok(())
    }

    async fn get_reservation(&self, id: &str) -> Result<Reservation> {
        self.reservations
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::not_found("reservation"))
    }

    async fn list_reservations(&self, query: &ReservationQuery) -> Result<Vec<Reservation>> {
        let map = self.reservations.read().unwrap();
        let mut reservations: Vec<Reservation> = map
            .values()
            .filter(|r| query.status.map_or(true, |s| r.status == s))
            .filter(|r| {
                query
                    .driver_id
                    .as_ref()
                    .map_or(true, |d| r.driver_id.as_deref() == Some(d.as_str()))
            })
            .filter(|r| {
                query
                    .customer_phone
                    .as_ref()
                    .map_or(true, |p| &r.customer_phone == p)
            })
            .cloned()
            .collect();
        reservations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reservations)
    }

    async fn replace_reservation(
        &self,
        expected_version: i64,
        reservation: &Reservation,
    ) -> Result<()> {
        let mut map = self.reservations.write().unwrap();
        let current = map
            .get(&reservation.id)
            .ok_or_else(|| AppError::not_found("reservation"))?;
        if current.version != expected_version {
            return Err(AppError::conflict("reservation was modified concurrently"));
        }
        map.insert(reservation.id.clone(), reservation.clone());
        drop(map);

        self.publish(StoreEvent::ReservationChanged {
            id: reservation.id.clone(),
            status: reservation.status,
            payment_status: reservation.payment_status,
        });
        Ok(())
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<()> {
        let mut map = self.transactions.write().unwrap();
        if map.contains_key(&transaction.id) {
            return Err(AppError::DuplicateKey);
        }
        map.insert(transaction.id.clone(), transaction.clone());
        drop(map);

        self.publish(StoreEvent::TransactionChanged {
            id: transaction.id.clone(),
            reservation_id: transaction.reservation_id.clone(),
            status: transaction.status,
        });
        Ok(())
    }

    async fn get_transaction(&self, id: &str) -> Result<Transaction> {
        self.transactions
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::not_found("transaction"))
    }

    async fn find_open_transaction(&self, reservation_id: &str) -> Result<Option<Transaction>> {
        Ok(self
            .transactions
            .read()
            .unwrap()
            .values()
            .find(|t| t.reservation_id == reservation_id && !t.status.is_terminal())
            .cloned())
    }

    async fn list_transactions(&self, reservation_id: &str) -> Result<Vec<Transaction>> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .read()
            .unwrap()
            .values()
            .filter(|t| t.reservation_id == reservation_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(transactions)
    }

    async fn replace_transaction(
        &self,
        expected_version: i64,
        transaction: &Transaction,
    ) -> Result<()> {
        let mut map = self.transactions.write().unwrap();
        let current = map
            .get(&transaction.id)
            .ok_or_else(|| AppError::not_found("transaction"))?;
        if current.version != expected_version {
            return Err(AppError::conflict("transaction was modified concurrently"));
        }
        map.insert(transaction.id.clone(), transaction.clone());
        drop(map);

        self.publish(StoreEvent::TransactionChanged {
            id: transaction.id.clone(),
            reservation_id: transaction.reservation_id.clone(),
            status: transaction.status,
        });
        Ok(())
    }

    async fn insert_settlement(&self, settlement: &Settlement) -> Result<SettlementInsert> {
        let mut map = self.settlements.write().unwrap();
        if let Some(existing) = map.get(&settlement.reservation_id) {
            return Ok(SettlementInsert::AlreadyExists(existing.clone()));
        }
        map.insert(settlement.reservation_id.clone(), settlement.clone());
        drop(map);

        self.publish(StoreEvent::SettlementCreated {
            id: settlement.id.clone(),
            reservation_id: settlement.reservation_id.clone(),
        });
        Ok(SettlementInsert::Created(settlement.clone()))
    }

    async fn get_settlement_for_reservation(
        &self,
        reservation_id: &str,
    ) -> Result<Option<Settlement>> {
        Ok(self
            .settlements
            .read()
            .unwrap()
            .get(reservation_id)
            .cloned())
    }

    async fn list_settlements(&self) -> Result<Vec<Settlement>> {
        let mut settlements: Vec<Settlement> =
            self.settlements.read().unwrap().values().cloned().collect();
        settlements.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(settlements)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
