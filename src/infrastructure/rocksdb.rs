use crate::domain::order::{
    BasketId, OrderDetail, OrderHeader, OrderHeaderId, OrderStatus, Review, Tombstone, Trigger,
};
use crate::domain::payment::{Payment, PaymentId, PaymentStatus};
use crate::domain::ports::{
    HeaderFilter, OrderDetailStore, OrderHeaderStore, PaymentStore, SWEEP_ACTOR, SweepStore,
};
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Column family for payments.
pub const CF_PAYMENTS: &str = "payments";
/// Column family for order headers.
pub const CF_ORDER_HEADERS: &str = "order_headers";
/// Column family for order baskets.
pub const CF_ORDER_DETAILS: &str = "order_details";

/// A persistent record store on RocksDB.
///
/// Each table lives in its own column family, keyed by the row's uuid with
/// JSON values. Conditional updates and sweeps read and rewrite rows under
/// a process-wide write guard; tombstoned rows stay on disk but are skipped
/// by every read.
///
/// `Clone` shares the underlying `Arc<DB>` and guard.
#[derive(Clone)]
pub struct RocksDbRecordStore {
    db: Arc<DB>,
    write_guard: Arc<Mutex<()>>,
}

impl RocksDbRecordStore {
    /// Opens or creates the database at `path` with all column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_PAYMENTS, CF_ORDER_HEADERS, CF_ORDER_DETAILS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_guard: Arc::default(),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| OrderError::storage(format!("column family {name} not found")))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get<T: DeserializeOwned>(&self, cf: &str, id: Uuid) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, cf: &str, id: Uuid, value: &T) -> Result<()> {
        self.db
            .put_cf(self.cf(cf)?, id.as_bytes(), serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        self.db
            .iterator_cf(self.cf(cf)?, IteratorMode::Start)
            .map(|item| -> Result<T> {
                let (_key, value) = item?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }

    fn write_all<T: Serialize>(
        &self,
        cf: &str,
        rows: impl IntoIterator<Item = (Uuid, T)>,
    ) -> Result<u64> {
        let handle = self.cf(cf)?;
        let mut batch = WriteBatch::default();
        let mut count = 0;
        for (id, row) in rows {
            batch.put_cf(handle, id.as_bytes(), serde_json::to_vec(&row)?);
            count += 1;
        }
        if count > 0 {
            self.db.write(batch)?;
        }
        Ok(count)
    }

    fn active_header(&self, id: OrderHeaderId) -> Result<Option<OrderHeader>> {
        Ok(self
            .get::<OrderHeader>(CF_ORDER_HEADERS, id)?
            .filter(|h| !h.audit.is_deleted()))
    }

    /// Rewrites an active basket. Callers hold the write guard.
    fn replace_detail(&self, detail: &OrderDetail) -> Result<u64> {
        let active = self
            .get::<OrderDetail>(CF_ORDER_DETAILS, detail.id)?
            .is_some_and(|d| !d.audit.is_deleted());
        if !active {
            return Ok(0);
        }
        self.put(CF_ORDER_DETAILS, detail.id, detail)?;
        Ok(1)
    }

    /// Whether an active `Processing` basket other than `except` runs on `serial`.
    fn machine_taken(&self, serial: &str, except: Option<BasketId>) -> Result<bool> {
        Ok(self.active_details()?.iter().any(|d| {
            d.status == OrderStatus::Processing
                && d.machine_serial.as_deref() == Some(serial)
                && Some(d.id) != except
        }))
    }

    fn active_details(&self) -> Result<Vec<OrderDetail>> {
        let mut details: Vec<OrderDetail> = self
            .scan::<OrderDetail>(CF_ORDER_DETAILS)?
            .into_iter()
            .filter(|d| !d.audit.is_deleted())
            .collect();
        details.sort_by_key(|d| (d.audit.created_at, d.line_no));
        Ok(details)
    }
}

#[async_trait]
impl PaymentStore for RocksDbRecordStore {
    async fn insert_payment(&self, payment: Payment) -> Result<()> {
        let _guard = self.lock();
        if self.get::<Payment>(CF_PAYMENTS, payment.id)?.is_some() {
            return Err(OrderError::Conflict(format!("payment {} already exists", payment.id)));
        }
        self.put(CF_PAYMENTS, payment.id, &payment)
    }

    async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.get(CF_PAYMENTS, id)
    }

    async fn transition_payment(
        &self,
        id: PaymentId,
        next: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let _guard = self.lock();
        match self.get::<Payment>(CF_PAYMENTS, id)? {
            Some(mut p) if p.accepts_transition(now) => {
                p.status = next;
                self.put(CF_PAYMENTS, id, &p)?;
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

#[async_trait]
impl OrderHeaderStore for RocksDbRecordStore {
    async fn insert_header(&self, header: OrderHeader) -> Result<()> {
        let _guard = self.lock();
        if self.get::<OrderHeader>(CF_ORDER_HEADERS, header.id)?.is_some() {
            return Err(OrderError::Conflict(format!("order {} already exists", header.id)));
        }
        self.put(CF_ORDER_HEADERS, header.id, &header)
    }

    async fn find_header(&self, id: OrderHeaderId) -> Result<Option<OrderHeader>> {
        self.active_header(id)
    }

    async fn list_headers(&self, filter: &HeaderFilter) -> Result<Vec<OrderHeader>> {
        let mut headers = Vec::new();
        for header in self.scan::<OrderHeader>(CF_ORDER_HEADERS)? {
            if header.audit.is_deleted() || !filter.matches_header(&header) {
                continue;
            }
            if let Some(status) = filter.payment_status {
                let payment = self.get::<Payment>(CF_PAYMENTS, header.payment_id)?;
                if payment.map(|p| p.status) != Some(status) {
                    continue;
                }
            }
            headers.push(header);
        }
        headers.sort_by_key(|h| h.audit.created_at);
        Ok(headers)
    }

    async fn update_review(
        &self,
        id: OrderHeaderId,
        review: Review,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let _guard = self.lock();
        let Some(mut header) = self.active_header(id)? else {
            return Ok(0);
        };
        header.review = Some(review);
        header.audit.touch(actor, at);
        self.put(CF_ORDER_HEADERS, id, &header)?;
        Ok(1)
    }

    async fn tombstone_header(&self, id: OrderHeaderId, tombstone: Tombstone) -> Result<u64> {
        let _guard = self.lock();
        let Some(mut header) = self.active_header(id)? else {
            return Ok(0);
        };
        header.audit.touch(&tombstone.deleted_by, tombstone.deleted_at);
        header.audit.tombstone = Some(tombstone);
        self.put(CF_ORDER_HEADERS, id, &header)?;
        Ok(1)
    }
}

#[async_trait]
impl OrderDetailStore for RocksDbRecordStore {
    async fn insert_details(&self, details: Vec<OrderDetail>) -> Result<()> {
        let _guard = self.lock();
        self.write_all(CF_ORDER_DETAILS, details.into_iter().map(|d| (d.id, d)))?;
        Ok(())
    }

    async fn insert_details_if_machine_free(
        &self,
        details: Vec<OrderDetail>,
        serial: &str,
    ) -> Result<()> {
        let _guard = self.lock();
        if self.machine_taken(serial, None)? {
            return Err(OrderError::machine_busy(serial));
        }
        self.write_all(CF_ORDER_DETAILS, details.into_iter().map(|d| (d.id, d)))?;
        Ok(())
    }

    async fn find_detail(&self, id: BasketId) -> Result<Option<OrderDetail>> {
        Ok(self
            .get::<OrderDetail>(CF_ORDER_DETAILS, id)?
            .filter(|d| !d.audit.is_deleted()))
    }

    async fn list_details(&self, header_id: Option<OrderHeaderId>) -> Result<Vec<OrderDetail>> {
        let mut details = self.active_details()?;
        if let Some(id) = header_id {
            details.retain(|d| d.header_id == id);
        }
        Ok(details)
    }

    async fn update_detail(&self, detail: OrderDetail) -> Result<u64> {
        let _guard = self.lock();
        self.replace_detail(&detail)
    }

    async fn update_detail_if_machine_free(
        &self,
        detail: OrderDetail,
        serial: &str,
    ) -> Result<u64> {
        let _guard = self.lock();
        if self.machine_taken(serial, Some(detail.id))? {
            return Err(OrderError::machine_busy(serial));
        }
        self.replace_detail(&detail)
    }

    async fn tombstone_details(
        &self,
        header_id: OrderHeaderId,
        tombstone: Tombstone,
    ) -> Result<u64> {
        let _guard = self.lock();
        let rows = self
            .active_details()?
            .into_iter()
            .filter(|d| d.header_id == header_id)
            .map(|mut d| {
                if d.status
                    .can_transition_to(OrderStatus::Canceled, Trigger::Cancellation)
                {
                    d.status = OrderStatus::Canceled;
                }
                d.audit.touch(&tombstone.deleted_by, tombstone.deleted_at);
                d.audit.tombstone = Some(tombstone.clone());
                (d.id, d)
            });
        self.write_all(CF_ORDER_DETAILS, rows)
    }
}

#[async_trait]
impl SweepStore for RocksDbRecordStore {
    async fn expire_pending_payments(&self, now: DateTime<Utc>) -> Result<u64> {
        let _guard = self.lock();
        let rows = self
            .scan::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| p.status == PaymentStatus::Pending && p.is_overdue(now))
            .map(|mut p| {
                p.status = PaymentStatus::Expired;
                (p.id, p)
            });
        self.write_all(CF_PAYMENTS, rows)
    }

    async fn expire_waiting_details(&self, now: DateTime<Utc>) -> Result<u64> {
        let _guard = self.lock();
        let expired_payments: HashSet<PaymentId> = self
            .scan::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| p.status == PaymentStatus::Expired)
            .map(|p| p.id)
            .collect();
        let lapsed: HashSet<OrderHeaderId> = self
            .scan::<OrderHeader>(CF_ORDER_HEADERS)?
            .into_iter()
            .filter(|h| expired_payments.contains(&h.payment_id))
            .map(|h| h.id)
            .collect();

        let rows = self
            .active_details()?
            .into_iter()
            .filter(|d| d.status == OrderStatus::Waiting && lapsed.contains(&d.header_id))
            .map(|mut d| {
                d.status = OrderStatus::Expired;
                d.audit.touch(SWEEP_ACTOR, now);
                (d.id, d)
            });
        self.write_all(CF_ORDER_DETAILS, rows)
    }

    async fn complete_processing_details(&self, now: DateTime<Utc>) -> Result<u64> {
        let _guard = self.lock();
        let rows = self
            .active_details()?
            .into_iter()
            .filter(|d| {
                d.status == OrderStatus::Processing && d.finished_at.is_some_and(|at| at < now)
            })
            .map(|mut d| {
                d.status = OrderStatus::Completed;
                d.audit.touch(SWEEP_ACTOR, now);
                (d.id, d)
            });
        self.write_all(CF_ORDER_DETAILS, rows)
    }
}
