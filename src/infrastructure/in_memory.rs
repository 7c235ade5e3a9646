use crate::domain::machine::{Machine, MachineAvailability};
use crate::domain::order::{
    BasketId, OrderDetail, OrderHeader, OrderHeaderId, OrderStatus, Review, Tombstone, Trigger,
};
use crate::domain::payment::{Payment, PaymentId, PaymentStatus};
use crate::domain::ports::{
    BranchDirectory, HeaderFilter, MachineCatalog, OrderDetailStore, OrderHeaderStore,
    PaymentStore, RecordStoreRef, SWEEP_ACTOR, SweepStore, UserDirectory,
};
use crate::domain::user::{Branch, UserProfile};
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    payments: HashMap<PaymentId, Payment>,
    headers: Vec<OrderHeader>,
    details: Vec<OrderDetail>,
}

impl Tables {
    fn active_header_mut(&mut self, id: OrderHeaderId) -> Option<&mut OrderHeader> {
        self.headers
            .iter_mut()
            .find(|h| h.id == id && !h.audit.is_deleted())
    }

    fn payment_status_of(&self, header: &OrderHeader) -> Option<PaymentStatus> {
        self.payments.get(&header.payment_id).map(|p| p.status)
    }

    /// The active `Processing` basket running on `serial`, if any.
    fn machine_holder(&self, serial: &str) -> Option<BasketId> {
        self.details
            .iter()
            .find(|d| {
                !d.audit.is_deleted()
                    && d.status == OrderStatus::Processing
                    && d.machine_serial.as_deref() == Some(serial)
            })
            .map(|d| d.id)
    }

    fn replace_detail(&mut self, detail: OrderDetail) -> u64 {
        match self
            .details
            .iter_mut()
            .find(|d| d.id == detail.id && !d.audit.is_deleted())
        {
            Some(row) => {
                *row = detail;
                1
            }
            None => 0,
        }
    }
}

/// A thread-safe in-memory record store.
///
/// All three tables sit behind one `tokio::sync::RwLock`, so every sweep
/// step and every conditional update is applied atomically with respect to
/// other callers. Cloning shares the same tables.
#[derive(Default, Clone)]
pub struct InMemoryRecordStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryRecordStore {
    async fn insert_payment(&self, payment: Payment) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.payments.contains_key(&payment.id) {
            return Err(OrderError::Conflict(format!("payment {} already exists", payment.id)));
        }
        tables.payments.insert(payment.id, payment);
        Ok(())
    }

    async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables.payments.get(&id).cloned())
    }

    async fn transition_payment(
        &self,
        id: PaymentId,
        next: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tables = self.tables.write().await;
        match tables.payments.get_mut(&id) {
            Some(p) if p.accepts_transition(now) => {
                p.status = next;
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

#[async_trait]
impl OrderHeaderStore for InMemoryRecordStore {
    async fn insert_header(&self, header: OrderHeader) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.headers.iter().any(|h| h.id == header.id) {
            return Err(OrderError::Conflict(format!("order {} already exists", header.id)));
        }
        tables.headers.push(header);
        Ok(())
    }

    async fn find_header(&self, id: OrderHeaderId) -> Result<Option<OrderHeader>> {
        let tables = self.tables.read().await;
        Ok(tables
            .headers
            .iter()
            .find(|h| h.id == id && !h.audit.is_deleted())
            .cloned())
    }

    async fn list_headers(&self, filter: &HeaderFilter) -> Result<Vec<OrderHeader>> {
        let tables = self.tables.read().await;
        let mut headers: Vec<OrderHeader> = tables
            .headers
            .iter()
            .filter(|h| !h.audit.is_deleted() && filter.matches_header(h))
            .filter(|h| {
                filter
                    .payment_status
                    .is_none_or(|s| tables.payment_status_of(h) == Some(s))
            })
            .cloned()
            .collect();
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
        let mut tables = self.tables.write().await;
        Ok(match tables.active_header_mut(id) {
            Some(header) => {
                header.review = Some(review);
                header.audit.touch(actor, at);
                1
            }
            None => 0,
        })
    }

    async fn tombstone_header(&self, id: OrderHeaderId, tombstone: Tombstone) -> Result<u64> {
        let mut tables = self.tables.write().await;
        Ok(match tables.active_header_mut(id) {
            Some(header) => {
                header.audit.touch(&tombstone.deleted_by, tombstone.deleted_at);
                header.audit.tombstone = Some(tombstone);
                1
            }
            None => 0,
        })
    }
}

#[async_trait]
impl OrderDetailStore for InMemoryRecordStore {
    async fn insert_details(&self, details: Vec<OrderDetail>) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.details.extend(details);
        Ok(())
    }

    async fn insert_details_if_machine_free(
        &self,
        details: Vec<OrderDetail>,
        serial: &str,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.machine_holder(serial).is_some() {
            return Err(OrderError::machine_busy(serial));
        }
        tables.details.extend(details);
        Ok(())
    }

    async fn find_detail(&self, id: BasketId) -> Result<Option<OrderDetail>> {
        let tables = self.tables.read().await;
        Ok(tables
            .details
            .iter()
            .find(|d| d.id == id && !d.audit.is_deleted())
            .cloned())
    }

    async fn list_details(&self, header_id: Option<OrderHeaderId>) -> Result<Vec<OrderDetail>> {
        let tables = self.tables.read().await;
        let mut details: Vec<OrderDetail> = tables
            .details
            .iter()
            .filter(|d| !d.audit.is_deleted() && header_id.is_none_or(|id| d.header_id == id))
            .cloned()
            .collect();
        details.sort_by_key(|d| (d.audit.created_at, d.line_no));
        Ok(details)
    }

    async fn update_detail(&self, detail: OrderDetail) -> Result<u64> {
        Ok(self.tables.write().await.replace_detail(detail))
    }

    async fn update_detail_if_machine_free(
        &self,
        detail: OrderDetail,
        serial: &str,
    ) -> Result<u64> {
        let mut tables = self.tables.write().await;
        if tables.machine_holder(serial).is_some_and(|id| id != detail.id) {
            return Err(OrderError::machine_busy(serial));
        }
        Ok(tables.replace_detail(detail))
    }

    async fn tombstone_details(
        &self,
        header_id: OrderHeaderId,
        tombstone: Tombstone,
    ) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;
        for detail in tables
            .details
            .iter_mut()
            .filter(|d| d.header_id == header_id && !d.audit.is_deleted())
        {
            if detail
                .status
                .can_transition_to(OrderStatus::Canceled, Trigger::Cancellation)
            {
                detail.status = OrderStatus::Canceled;
            }
            detail.audit.touch(&tombstone.deleted_by, tombstone.deleted_at);
            detail.audit.tombstone = Some(tombstone.clone());
            changed += 1;
        }
        Ok(changed)
    }
}

#[async_trait]
impl SweepStore for InMemoryRecordStore {
    async fn expire_pending_payments(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;
        for payment in tables
            .payments
            .values_mut()
            .filter(|p| p.status == PaymentStatus::Pending && p.is_overdue(now))
        {
            payment.status = PaymentStatus::Expired;
            changed += 1;
        }
        Ok(changed)
    }

    async fn expire_waiting_details(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let lapsed: HashSet<OrderHeaderId> = tables
            .headers
            .iter()
            .filter(|h| tables.payment_status_of(h) == Some(PaymentStatus::Expired))
            .map(|h| h.id)
            .collect();

        let mut changed = 0;
        for detail in tables.details.iter_mut().filter(|d| {
            !d.audit.is_deleted()
                && d.status == OrderStatus::Waiting
                && lapsed.contains(&d.header_id)
        }) {
            detail.status = OrderStatus::Expired;
            detail.audit.touch(SWEEP_ACTOR, now);
            changed += 1;
        }
        Ok(changed)
    }

    async fn complete_processing_details(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;
        for detail in tables.details.iter_mut().filter(|d| {
            !d.audit.is_deleted()
                && d.status == OrderStatus::Processing
                && d.finished_at.is_some_and(|at| at < now)
        }) {
            detail.status = OrderStatus::Completed;
            detail.audit.touch(SWEEP_ACTOR, now);
            changed += 1;
        }
        Ok(changed)
    }
}

/// Machines known to the engine, keyed by serial.
///
/// Availability is derived from the record store: a machine is busy while
/// an active `Processing` basket references it.
#[derive(Clone)]
pub struct InMemoryMachineCatalog {
    machines: Arc<RwLock<HashMap<String, Machine>>>,
    store: RecordStoreRef,
}

impl InMemoryMachineCatalog {
    pub fn new(store: RecordStoreRef) -> Self {
        Self {
            machines: Arc::default(),
            store,
        }
    }

    pub async fn add(&self, machine: Machine) {
        self.machines
            .write()
            .await
            .insert(machine.serial.clone(), machine);
    }
}

#[async_trait]
impl MachineCatalog for InMemoryMachineCatalog {
    async fn get_by_serial(&self, serial: &str) -> Result<Machine> {
        self.machines
            .read()
            .await
            .get(serial)
            .cloned()
            .ok_or_else(|| OrderError::not_found("machine", serial))
    }

    async fn list_available_in_branch(&self, branch_id: &str) -> Result<Vec<MachineAvailability>> {
        let busy: HashMap<String, Option<DateTime<Utc>>> = self
            .store
            .list_details(None)
            .await?
            .into_iter()
            .filter(|d| d.status == OrderStatus::Processing)
            .filter_map(|d| d.machine_serial.map(|serial| (serial, d.finished_at)))
            .collect();

        let machines = self.machines.read().await;
        let mut listing: Vec<MachineAvailability> = machines
            .values()
            .filter(|m| m.branch_id == branch_id)
            .map(|m| {
                let busy_until = busy.get(&m.serial).copied();
                MachineAvailability {
                    serial: m.serial.clone(),
                    machine_type: m.machine_type,
                    weight: m.weight,
                    is_available: m.is_active && busy_until.is_none(),
                    busy_until: busy_until.flatten(),
                }
            })
            .collect();
        listing.sort_by(|a, b| a.serial.cmp(&b.serial));
        Ok(listing)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<String, UserProfile>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, profile: UserProfile) {
        self.users
            .write()
            .await
            .insert(profile.user_id.clone(), profile);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_by_id(&self, user_id: &str) -> Result<UserProfile> {
        self.users
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| OrderError::not_found("user", user_id))
    }
}

#[derive(Default, Clone)]
pub struct InMemoryBranchDirectory {
    owners: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryBranchDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, branch: Branch) {
        self.owners
            .write()
            .await
            .insert(branch.branch_id, branch.owner_user_id);
    }
}

#[async_trait]
impl BranchDirectory for InMemoryBranchDirectory {
    async fn owner_of(&self, branch_id: &str) -> Result<Option<String>> {
        Ok(self.owners.read().await.get(branch_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::machine::MachineType;
    use crate::domain::money::Amount;
    use crate::domain::order::{Audit, ServiceType};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn payment(status: PaymentStatus, due_date: DateTime<Utc>) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            amount: Amount::new(dec!(140)).unwrap(),
            status,
            due_date,
            created_at: t0(),
        }
    }

    fn header(payment_id: PaymentId, user: &str) -> OrderHeader {
        OrderHeader {
            id: Uuid::new_v4(),
            user_id: user.into(),
            branch_id: "b1".into(),
            note: None,
            payment_id,
            onsite: false,
            delivery: None,
            review: None,
            audit: Audit::new(user, t0()),
        }
    }

    fn detail(header_id: OrderHeaderId, line_no: u16, status: OrderStatus) -> OrderDetail {
        OrderDetail {
            id: Uuid::new_v4(),
            header_id,
            line_no,
            machine_serial: None,
            weight: 14,
            service_type: ServiceType::Washing,
            status,
            finished_at: None,
            audit: Audit::new("u1", t0()),
        }
    }

    #[tokio::test]
    async fn test_tombstoned_rows_are_invisible() {
        let store = InMemoryRecordStore::new();
        let p = payment(PaymentStatus::Pending, t0());
        let h = header(p.id, "u1");
        store.insert_header(h.clone()).await.unwrap();
        store
            .insert_details(vec![
                detail(h.id, 0, OrderStatus::Waiting),
                detail(h.id, 1, OrderStatus::Completed),
            ])
            .await
            .unwrap();

        let tombstone = Tombstone {
            deleted_by: "u1".into(),
            deleted_at: t0(),
        };
        assert_eq!(store.tombstone_header(h.id, tombstone.clone()).await.unwrap(), 1);
        assert_eq!(store.tombstone_details(h.id, tombstone.clone()).await.unwrap(), 2);

        assert!(store.find_header(h.id).await.unwrap().is_none());
        assert!(store.list_details(Some(h.id)).await.unwrap().is_empty());
        assert_eq!(store.tombstone_header(h.id, tombstone).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_headers_filters_by_payment_status() {
        let store = InMemoryRecordStore::new();
        let paid = payment(PaymentStatus::Paid, t0());
        let pending = payment(PaymentStatus::Pending, t0());
        store.insert_payment(paid.clone()).await.unwrap();
        store.insert_payment(pending.clone()).await.unwrap();
        store.insert_header(header(paid.id, "u1")).await.unwrap();
        store.insert_header(header(pending.id, "u1")).await.unwrap();
        store.insert_header(header(pending.id, "u2")).await.unwrap();

        let filter = HeaderFilter::user("u1").with_payment_status(Some(PaymentStatus::Paid));
        let headers = store.list_headers(&filter).await.unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].payment_id, paid.id);

        assert_eq!(store.list_headers(&HeaderFilter::user("u1")).await.unwrap().len(), 2);
        assert_eq!(store.list_headers(&HeaderFilter::default()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_transition_payment_respects_guard() {
        let store = InMemoryRecordStore::new();
        let p = payment(PaymentStatus::Pending, t0());
        store.insert_payment(p.clone()).await.unwrap();

        let late = t0() + Duration::seconds(1);
        let changed = store
            .transition_payment(p.id, PaymentStatus::Paid, late)
            .await
            .unwrap();
        assert_eq!(changed, 0);

        let changed = store
            .transition_payment(p.id, PaymentStatus::Paid, t0())
            .await
            .unwrap();
        assert_eq!(changed, 1);
        let again = store
            .transition_payment(p.id, PaymentStatus::Cancel, t0())
            .await
            .unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn test_sweep_steps_are_conditional() {
        let store = InMemoryRecordStore::new();
        let now = t0() + Duration::minutes(30);

        let lapsed = payment(PaymentStatus::Pending, t0());
        let paid = payment(PaymentStatus::Paid, t0());
        store.insert_payment(lapsed.clone()).await.unwrap();
        store.insert_payment(paid.clone()).await.unwrap();
        let h1 = header(lapsed.id, "u1");
        let h2 = header(paid.id, "u1");
        store.insert_header(h1.clone()).await.unwrap();
        store.insert_header(h2.clone()).await.unwrap();

        let mut processing = detail(h2.id, 0, OrderStatus::Processing);
        processing.finished_at = Some(now - Duration::seconds(1));
        let mut running = detail(h2.id, 1, OrderStatus::Processing);
        running.finished_at = Some(now + Duration::seconds(1));
        store
            .insert_details(vec![
                detail(h1.id, 0, OrderStatus::Waiting),
                detail(h2.id, 2, OrderStatus::Waiting),
                processing.clone(),
                running.clone(),
            ])
            .await
            .unwrap();

        assert_eq!(store.expire_pending_payments(now).await.unwrap(), 1);
        assert_eq!(store.expire_waiting_details(now).await.unwrap(), 1);
        assert_eq!(store.complete_processing_details(now).await.unwrap(), 1);

        let h2_baskets = store.list_details(Some(h2.id)).await.unwrap();
        let statuses: Vec<OrderStatus> = h2_baskets.iter().map(|d| d.status).collect();
        assert_eq!(
            statuses,
            vec![OrderStatus::Completed, OrderStatus::Processing, OrderStatus::Waiting]
        );
        let expired = &store.list_details(Some(h1.id)).await.unwrap()[0];
        assert_eq!(expired.status, OrderStatus::Expired);
        assert_eq!(expired.audit.updated_by, SWEEP_ACTOR);

        assert_eq!(store.expire_pending_payments(now).await.unwrap(), 0);
        assert_eq!(store.expire_waiting_details(now).await.unwrap(), 0);
        assert_eq!(store.complete_processing_details(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_guarded_writes_refuse_busy_machine() {
        let store = InMemoryRecordStore::new();
        let mut running = detail(Uuid::new_v4(), 0, OrderStatus::Processing);
        running.machine_serial = Some("W-01".into());
        store
            .insert_details_if_machine_free(vec![running.clone()], "W-01")
            .await
            .unwrap();

        let mut rival = detail(Uuid::new_v4(), 0, OrderStatus::Processing);
        rival.machine_serial = Some("W-01".into());
        assert!(matches!(
            store
                .insert_details_if_machine_free(vec![rival.clone()], "W-01")
                .await,
            Err(OrderError::Conflict(_))
        ));
        assert!(store.find_detail(rival.id).await.unwrap().is_none());

        let waiting = detail(Uuid::new_v4(), 0, OrderStatus::Waiting);
        store.insert_details(vec![waiting.clone()]).await.unwrap();
        let mut moved = waiting.clone();
        moved.status = OrderStatus::Processing;
        moved.machine_serial = Some("W-01".into());
        assert!(matches!(
            store.update_detail_if_machine_free(moved, "W-01").await,
            Err(OrderError::Conflict(_))
        ));

        // The holder itself may be rewritten on its own machine.
        running.finished_at = Some(t0());
        assert_eq!(
            store
                .update_detail_if_machine_free(running, "W-01")
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_machine_busy_while_processing() {
        let store = Arc::new(InMemoryRecordStore::new());
        let catalog = InMemoryMachineCatalog::new(store.clone());
        for serial in ["W-01", "W-02"] {
            catalog
                .add(Machine {
                    serial: serial.into(),
                    branch_id: "b1".into(),
                    machine_type: MachineType::Washer,
                    weight: 7,
                    is_active: true,
                })
                .await;
        }
        let mut busy = detail(Uuid::new_v4(), 0, OrderStatus::Processing);
        busy.machine_serial = Some("W-01".into());
        busy.finished_at = Some(t0());
        store.insert_details(vec![busy]).await.unwrap();

        let listing = catalog.list_available_in_branch("b1").await.unwrap();
        assert_eq!(listing.len(), 2);
        assert!(!listing[0].is_available);
        assert_eq!(listing[0].busy_until, Some(t0()));
        assert!(listing[1].is_available);
        assert!(catalog.list_available_in_branch("b2").await.unwrap().is_empty());
        assert!(matches!(
            catalog.get_by_serial("W-99").await,
            Err(OrderError::NotFound { entity: "machine", .. })
        ));
    }
}
