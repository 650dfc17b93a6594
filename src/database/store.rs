// database/store.rs
use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    bson::doc,
    options::IndexOptions,
    Collection, Database, IndexModel,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::errors::{is_duplicate_key, AppError, Result};
use crate::models::{
    reservation::{PaymentStatus, Reservation, ReservationQuery, ReservationStatus},
    settlement::Settlement,
    transaction::{Transaction, TransactionStatus},
};

const RESERVATIONS: &str = "reservations";
const TRANSACTIONS: &str = "transactions";
const SETTLEMENTS: &str = "settlements";

/// Pushed on the store's broadcast channel after every successful write.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreEvent {
    ReservationChanged {
        id: String,
        status: ReservationStatus,
        payment_status: PaymentStatus,
    },
    TransactionChanged {
        id: String,
        reservation_id: String,
        status: TransactionStatus,
    },
    SettlementCreated {
        id: String,
        reservation_id: String,
    },
}

/// Outcome of a settlement insert against the unique reservation index.
#[derive(Debug, Clone)]
pub enum SettlementInsert {
    Created(Settlement),
    /// A settlement for this reservation already exists; the stored one.
    AlreadyExists(Settlement),
}

impl SettlementInsert {
    pub fn into_inner(self) -> Settlement {
        match self {
            SettlementInsert::Created(s) | SettlementInsert::AlreadyExists(s) => s,
        }
    }
}

/// The storage collaborator the engine is written against. Document-level
/// reads and writes only; replacements are conditional on the document
/// version read beforehand and fail with [`AppError::Conflict`] when the
/// document moved underneath the caller.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()>;
    async fn get_reservation(&self, id: &str) -> Result<Reservation>;
    async fn list_reservations(&self, query: &ReservationQuery) -> Result<Vec<Reservation>>;
    /// Replace the reservation document iff its stored version still equals
    /// `expected_version`. The replacement must carry the bumped version.
    async fn replace_reservation(
        &self,
        expected_version: i64,
        reservation: &Reservation,
    ) -> Result<()>;

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<()>;
    async fn get_transaction(&self, id: &str) -> Result<Transaction>;
    /// The at-most-one non-terminal transaction for a reservation.
    async fn find_open_transaction(&self, reservation_id: &str) -> Result<Option<Transaction>>;
    async fn list_transactions(&self, reservation_id: &str) -> Result<Vec<Transaction>>;
    async fn replace_transaction(
        &self,
        expected_version: i64,
        transaction: &Transaction,
    ) -> Result<()>;

    /// Insert keyed uniquely by reservation id. A concurrent or repeated
    /// insert resolves to the settlement already on record.
    async fn insert_settlement(&self, settlement: &Settlement) -> Result<SettlementInsert>;
    async fn get_settlement_for_reservation(
        &self,
        reservation_id: &str,
    ) -> Result<Option<Settlement>>;
    async fn list_settlements(&self) -> Result<Vec<Settlement>>;

    /// Push feed of document changes.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

#[derive(Clone)]
pub struct MongoStore {
    db: Database,
    events: broadcast::Sender<StoreEvent>,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        let (events, _) = broadcast::channel(256);
        MongoStore { db, events }
    }

    /// Unique settlement-per-reservation is enforced by the database, not
    /// by application-side checks.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let settlements: Collection<Settlement> = self.db.collection(SETTLEMENTS);
        settlements
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "reservation_id": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;

        let transactions: Collection<Transaction> = self.db.collection(TRANSACTIONS);
        transactions
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "reservation_id": 1 })
                    .build(),
            )
            .await?;

        info!("MongoDB indexes ensured");
        Ok(())
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine; the feed is best-effort.
        let _ = self.events.send(event);
    }

    fn reservations(&self) -> Collection<Reservation> {
        self.db.collection(RESERVATIONS)
    }

    fn transactions(&self) -> Collection<Transaction> {
        self.db.collection(TRANSACTIONS)
    }

    fn settlements(&self) -> Collection<Settlement> {
        self.db.collection(SETTLEMENTS)
    }
}

#[async_trait]
impl BookingStore for MongoStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()> {
        self.reservations().insert_one(reservation).await?;
        self.publish(StoreEvent::ReservationChanged {
            id: reservation.id.clone(),
            status: reservation.status,
            payment_status: reservation.payment_status,
        });
        Ok(())
    }

    async fn get_reservation(&self, id: &str) -> Result<Reservation> {
        self.reservations()
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| AppError::not_found("reservation"))
    }

    async fn list_reservations(&self, query: &ReservationQuery) -> Result<Vec<Reservation>> {
        let mut filter = doc! {};
        if let Some(status) = &query.status {
            filter.insert("status", status.as_str());
        }
        if let Some(driver_id) = &query.driver_id {
            filter.insert("driver_id", driver_id);
        }
        if let Some(phone) = &query.customer_phone {
            filter.insert("customer_phone", phone);
        }

        let cursor = self.reservations().find(filter).await?;
        let mut reservations: Vec<Reservation> = cursor.try_collect().await?;
        reservations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reservations)
    }

    async fn replace_reservation(
        &self,
        expected_version: i64,
        reservation: &Reservation,
    ) -> Result<()> {
        let result = self
            .reservations()
            .replace_one(
                doc! { "_id": &reservation.id, "version": expected_version },
                reservation,
            )
            .await?;

        if result.matched_count == 0 {
            // Distinguish a lost race from a missing document.
            return match self.get_reservation(&reservation.id).await {
                Ok(current) => {
                    warn!(
                        reservation_id = %reservation.id,
                        expected = expected_version,
                        actual = current.version,
                        "reservation version conflict"
                    );
                    Err(AppError::conflict("reservation was modified concurrently"))
                }
                Err(e) => Err(e),
            };
        }

        self.publish(StoreEvent::ReservationChanged {
            id: reservation.id.clone(),
            status: reservation.status,
            payment_status: reservation.payment_status,
        });
        Ok(())
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<()> {
        self.transactions().insert_one(transaction).await?;
        self.publish(StoreEvent::TransactionChanged {
            id: transaction.id.clone(),
            reservation_id: transaction.reservation_id.clone(),
            status: transaction.status,
        });
        Ok(())
    }

    async fn get_transaction(&self, id: &str) -> Result<Transaction> {
        self.transactions()
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| AppError::not_found("transaction"))
    }

    async fn find_open_transaction(&self, reservation_id: &str) -> Result<Option<Transaction>> {
        Ok(self
            .transactions()
            .find_one(doc! {
                "reservation_id": reservation_id,
                "status": TransactionStatus::Pending.as_str(),
            })
            .await?)
    }

    async fn list_transactions(&self, reservation_id: &str) -> Result<Vec<Transaction>> {
        let cursor = self
            .transactions()
            .find(doc! { "reservation_id": reservation_id })
            .await?;
        let mut transactions: Vec<Transaction> = cursor.try_collect().await?;
        transactions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(transactions)
    }

    async fn replace_transaction(
        &self,
        expected_version: i64,
        transaction: &Transaction,
    ) -> Result<()> {
        let result = self
            .transactions()
            .replace_one(
                doc! { "_id": &transaction.id, "version": expected_version },
                transaction,
            )
            .await?;

        if result.matched_count == 0 {
            return match self.get_transaction(&transaction.id).await {
                Ok(current) => {
                    warn!(
                        transaction_id = %transaction.id,
                        expected = expected_version,
                        actual = current.version,
                        "transaction version conflict"
                    );
                    Err(AppError::conflict("transaction was modified concurrently"))
                }
                Err(e) => Err(e),
            };
        }

        self.publish(StoreEvent::TransactionChanged {
            id: transaction.id.clone(),
            reservation_id: transaction.reservation_id.clone(),
            status: transaction.status,
        });
        Ok(())
    }

    async fn insert_settlement(&self, settlement: &Settlement) -> Result<SettlementInsert> {
        match self.settlements().insert_one(settlement).await {
            Ok(_) => {
                self.publish(StoreEvent::SettlementCreated {
                    id: settlement.id.clone(),
                    reservation_id: settlement.reservation_id.clone(),
                });
                Ok(SettlementInsert::Created(settlement.clone()))
            }
            Err(e) if is_duplicate_key(&e) => {
                let existing = self
                    .get_settlement_for_reservation(&settlement.reservation_id)
                    .await?
                    .ok_or(AppError::DuplicateKey)?;
                Ok(SettlementInsert::AlreadyExists(existing))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_settlement_for_reservation(
        &self,
        reservation_id: &str,
    ) -> Result<Option<Settlement>> {
        Ok(self
            .settlements()
            .find_one(doc! { "reservation_id": reservation_id })
            .await?)
    }

    async fn list_settlements(&self) -> Result<Vec<Settlement>> {
        let cursor = self.settlements().find(doc! {}).await?;
        let mut settlements: Vec<Settlement> = cursor.try_collect().await?;
        settlements.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(settlements)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
