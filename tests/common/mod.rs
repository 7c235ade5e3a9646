#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use laundry_engine::application::engine::{Collaborators, LaundryEngine};
use laundry_engine::config::EngineConfig;
use laundry_engine::domain::machine::{Machine, MachineAvailability, MachineType};
use laundry_engine::domain::order::{
    BasketId, NewBasket, NewOrder, OrderDetail, OrderHeader, OrderHeaderId, Review, ServiceType,
    Tombstone,
};
use laundry_engine::domain::payment::{Payment, PaymentId, PaymentStatus};
use laundry_engine::domain::ports::{
    HeaderFilter, MachineCatalog, OrderDetailStore, OrderHeaderStore, PaymentStore,
    RecordStoreRef, SweepStore, UserDirectory,
};
use laundry_engine::domain::user::{Actor, Branch, Role, UserProfile};
use laundry_engine::error::{OrderError, Result};
use laundry_engine::infrastructure::clock::ManualClock;
use laundry_engine::infrastructure::in_memory::{
    InMemoryBranchDirectory, InMemoryMachineCatalog, InMemoryRecordStore, InMemoryUserDirectory,
};
use laundry_engine::infrastructure::ledger::LedgerPaymentGateway;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const BRANCH: &str = "b1";
pub const OTHER_BRANCH: &str = "b2";

pub fn client() -> Actor {
    Actor::client("u1")
}

pub fn other_client() -> Actor {
    Actor::client("u2")
}

pub fn manager() -> Actor {
    Actor::new("m1", Role::BranchManager)
}

pub fn other_manager() -> Actor {
    Actor::new("m2", Role::BranchManager)
}

pub fn admin() -> Actor {
    Actor::new("admin", Role::SuperAdmin)
}

pub fn basket(service: ServiceType, weight: u16) -> NewBasket {
    NewBasket {
        machine_serial: None,
        weight,
        service_type: Some(service),
    }
}

/// A delivered order with the mandatory pickup and delivery baskets added.
pub fn online_order(mut baskets: Vec<NewBasket>) -> NewOrder {
    baskets.push(basket(ServiceType::Pickup, 1));
    baskets.push(basket(ServiceType::Delivery, 1));
    NewOrder {
        branch_id: BRANCH.into(),
        note: Some("front desk".into()),
        onsite: false,
        delivery_address: Some("12 Canal St".into()),
        delivery_lat: Some(13.75),
        delivery_long: Some(100.5),
        baskets,
    }
}

pub fn onsite_order(serial: &str) -> NewOrder {
    NewOrder {
        branch_id: BRANCH.into(),
        note: None,
        onsite: true,
        delivery_address: None,
        delivery_lat: None,
        delivery_long: None,
        baskets: vec![NewBasket {
            machine_serial: Some(serial.into()),
            weight: 0,
            service_type: None,
        }],
    }
}

fn machine(serial: &str, branch: &str, machine_type: MachineType, weight: u16, active: bool) -> Machine {
    Machine {
        serial: serial.into(),
        branch_id: branch.into(),
        machine_type,
        weight,
        is_active: active,
    }
}

fn profile(user_id: &str, role: Role) -> UserProfile {
    UserProfile {
        user_id: user_id.into(),
        email: format!("{user_id}@example.com"),
        phone: String::new(),
        first_name: user_id.to_uppercase(),
        last_name: "Tester".into(),
        profile_image_url: String::new(),
        role,
    }
}

/// An engine over in-memory adapters with a manual clock and a seeded
/// branch, machines and users.
pub struct Harness {
    pub engine: LaundryEngine,
    pub store: RecordStoreRef,
    pub clock: Arc<ManualClock>,
    pub users: Arc<InMemoryUserDirectory>,
}

impl Harness {
    pub async fn new() -> Self {
        let store: RecordStoreRef = Arc::new(InMemoryRecordStore::new());
        Self::build(store, None, None).await
    }

    pub async fn with_store(store: RecordStoreRef) -> Self {
        Self::build(store, None, None).await
    }

    pub async fn with_user_directory(users: Arc<dyn UserDirectory>) -> Self {
        let store: RecordStoreRef = Arc::new(InMemoryRecordStore::new());
        Self::build(store, Some(users), None).await
    }

    /// Availability reads pause for `delay` before answering.
    pub async fn with_slow_catalog(delay: Duration) -> Self {
        let store: RecordStoreRef = Arc::new(InMemoryRecordStore::new());
        Self::build(store, None, Some(delay)).await
    }

    async fn build(
        store: RecordStoreRef,
        user_override: Option<Arc<dyn UserDirectory>>,
        catalog_delay: Option<Duration>,
    ) -> Self {
        let config = EngineConfig::default();
        let clock = Arc::new(ManualClock::default());

        let machines = InMemoryMachineCatalog::new(store.clone());
        for m in [
            machine("W-07", BRANCH, MachineType::Washer, 7, true),
            machine("W-14", BRANCH, MachineType::Washer, 14, true),
            machine("D-14", BRANCH, MachineType::Dryer, 14, true),
            machine("W-OFF", BRANCH, MachineType::Washer, 14, false),
            machine("W-B2", OTHER_BRANCH, MachineType::Washer, 14, true),
        ] {
            machines.add(m).await;
        }

        let users = Arc::new(InMemoryUserDirectory::new());
        for (id, role) in [
            ("u1", Role::Client),
            ("u2", Role::Client),
            ("m1", Role::BranchManager),
            ("m2", Role::BranchManager),
            ("e1", Role::Employee),
            ("admin", Role::SuperAdmin),
        ] {
            users.add(profile(id, role)).await;
        }

        let branches = InMemoryBranchDirectory::new();
        branches
            .add(Branch {
                branch_id: BRANCH.into(),
                owner_user_id: "m1".into(),
            })
            .await;
        branches
            .add(Branch {
                branch_id: OTHER_BRANCH.into(),
                owner_user_id: "m2".into(),
            })
            .await;

        let machines: Arc<dyn MachineCatalog> = match catalog_delay {
            Some(delay) => Arc::new(SlowMachineCatalog {
                inner: machines,
                delay,
            }),
            None => Arc::new(machines),
        };

        let payments =
            LedgerPaymentGateway::new(store.clone(), clock.clone(), config.payment_ttl);
        let engine = LaundryEngine::new(
            Collaborators {
                store: store.clone(),
                payments: Arc::new(payments),
                machines,
                users: user_override.unwrap_or_else(|| users.clone() as Arc<dyn UserDirectory>),
                branches: Arc::new(branches),
                clock: clock.clone(),
            },
            &config,
        );

        Self {
            engine,
            store,
            clock,
            users,
        }
    }
}

/// Machine catalog whose availability listing answers after a delay.
pub struct SlowMachineCatalog {
    inner: InMemoryMachineCatalog,
    delay: Duration,
}

#[async_trait]
impl MachineCatalog for SlowMachineCatalog {
    async fn get_by_serial(&self, serial: &str) -> Result<Machine> {
        self.inner.get_by_serial(serial).await
    }

    async fn list_available_in_branch(&self, branch_id: &str) -> Result<Vec<MachineAvailability>> {
        let listing = self.inner.list_available_in_branch(branch_id).await?;
        tokio::time::sleep(self.delay).await;
        Ok(listing)
    }
}

/// Record store that counts write calls and can be told to fail some of them.
#[derive(Default)]
pub struct FailingStore {
    inner: InMemoryRecordStore,
    pub writes: AtomicUsize,
    last_payment: Mutex<Option<PaymentId>>,
    pub fail_header_insert: AtomicBool,
    pub fail_detail_insert: AtomicBool,
    pub fail_detail_listing: AtomicBool,
}

impl FailingStore {
    pub fn inner(&self) -> &InMemoryRecordStore {
        &self.inner
    }

    pub fn last_payment_id(&self) -> Option<PaymentId> {
        *self.last_payment.lock().unwrap()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(OrderError::storage(format!("injected {what} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentStore for FailingStore {
    async fn insert_payment(&self, payment: Payment) -> Result<()> {
        self.write();
        *self.last_payment.lock().unwrap() = Some(payment.id);
        self.inner.insert_payment(payment).await
    }

    async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.inner.find_payment(id).await
    }

    async fn transition_payment(
        &self,
        id: PaymentId,
        next: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        self.write();
        self.inner.transition_payment(id, next, now).await
    }
}

#[async_trait]
impl OrderHeaderStore for FailingStore {
    async fn insert_header(&self, header: OrderHeader) -> Result<()> {
        self.write();
        Self::check(&self.fail_header_insert, "header insert")?;
        self.inner.insert_header(header).await
    }

    async fn find_header(&self, id: OrderHeaderId) -> Result<Option<OrderHeader>> {
        self.inner.find_header(id).await
    }

    async fn list_headers(&self, filter: &HeaderFilter) -> Result<Vec<OrderHeader>> {
        self.inner.list_headers(filter).await
    }

    async fn update_review(
        &self,
        id: OrderHeaderId,
        review: Review,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        self.write();
        self.inner.update_review(id, review, actor, at).await
    }

    async fn tombstone_header(&self, id: OrderHeaderId, tombstone: Tombstone) -> Result<u64> {
        self.write();
        self.inner.tombstone_header(id, tombstone).await
    }
}

#[async_trait]
impl OrderDetailStore for FailingStore {
    async fn insert_details(&self, details: Vec<OrderDetail>) -> Result<()> {
        self.write();
        Self::check(&self.fail_detail_insert, "basket insert")?;
        self.inner.insert_details(details).await
    }

    async fn insert_details_if_machine_free(
        &self,
        details: Vec<OrderDetail>,
        serial: &str,
    ) -> Result<()> {
        self.write();
        Self::check(&self.fail_detail_insert, "basket insert")?;
        self.inner.insert_details_if_machine_free(details, serial).await
    }

    async fn find_detail(&self, id: BasketId) -> Result<Option<OrderDetail>> {
        self.inner.find_detail(id).await
    }

    async fn list_details(&self, header_id: Option<OrderHeaderId>) -> Result<Vec<OrderDetail>> {
        Self::check(&self.fail_detail_listing, "basket listing")?;
        self.inner.list_details(header_id).await
    }

    async fn update_detail(&self, detail: OrderDetail) -> Result<u64> {
        self.write();
        self.inner.update_detail(detail).await
    }

    async fn update_detail_if_machine_free(
        &self,
        detail: OrderDetail,
        serial: &str,
    ) -> Result<u64> {
        self.write();
        self.inner.update_detail_if_machine_free(detail, serial).await
    }

    async fn tombstone_details(
        &self,
        header_id: OrderHeaderId,
        tombstone: Tombstone,
    ) -> Result<u64> {
        self.write();
        self.inner.tombstone_details(header_id, tombstone).await
    }
}

#[async_trait]
impl SweepStore for FailingStore {
    async fn expire_pending_payments(&self, now: DateTime<Utc>) -> Result<u64> {
        self.write();
        self.inner.expire_pending_payments(now).await
    }

    async fn expire_waiting_details(&self, now: DateTime<Utc>) -> Result<u64> {
        self.write();
        Self::check(&self.fail_detail_listing, "basket sweep")?;
        self.inner.expire_waiting_details(now).await
    }

    async fn complete_processing_details(&self, now: DateTime<Utc>) -> Result<u64> {
        self.write();
        self.inner.complete_processing_details(now).await
    }
}

/// User directory that fails for one user id and counts every lookup.
pub struct FlakyUserDirectory {
    inner: Arc<InMemoryUserDirectory>,
    failing_user: String,
    pub calls: AtomicUsize,
}

impl FlakyUserDirectory {
    pub fn new(inner: Arc<InMemoryUserDirectory>, failing_user: &str) -> Self {
        Self {
            inner,
            failing_user: failing_user.into(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl UserDirectory for FlakyUserDirectory {
    async fn get_by_id(&self, user_id: &str) -> Result<UserProfile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if user_id == self.failing_user {
            return Err(OrderError::storage("user service unavailable"));
        }
        self.inner.get_by_id(user_id).await
    }
}

/// A directory holding the standard seeded users.
pub async fn seeded_users() -> Arc<InMemoryUserDirectory> {
    let users = Arc::new(InMemoryUserDirectory::new());
    for (id, role) in [
        ("u1", Role::Client),
        ("u2", Role::Client),
        ("m1", Role::BranchManager),
        ("admin", Role::SuperAdmin),
    ] {
        users.add(profile(id, role)).await;
    }
    users
}
