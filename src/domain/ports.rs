use super::machine::{Machine, MachineAvailability};
use super::money::Amount;
use super::order::{BasketId, OrderDetail, OrderHeader, OrderHeaderId, Review, Tombstone};
use super::payment::{Payment, PaymentId, PaymentStatus};
use super::user::UserProfile;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Narrows a header listing. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFilter {
    pub branch_id: Option<String>,
    pub user_id: Option<String>,
    pub payment_status: Option<PaymentStatus>,
}

impl HeaderFilter {
    pub fn branch(branch_id: impl Into<String>) -> Self {
        Self {
            branch_id: Some(branch_id.into()),
            ..Self::default()
        }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_payment_status(mut self, status: Option<PaymentStatus>) -> Self {
        self.payment_status = status;
        self
    }

    /// Matches the header fields; the payment filter is applied by the store.
    pub fn matches_header(&self, header: &OrderHeader) -> bool {
        self.branch_id.as_ref().is_none_or(|b| *b == header.branch_id)
            && self.user_id.as_ref().is_none_or(|u| *u == header.user_id)
    }
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, payment: Payment) -> Result<()>;
    async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>>;
    /// Moves a payment to `next` if it still
    /// [accepts a transition](Payment::accepts_transition) at `now`.
    /// Returns the number of rows changed.
    async fn transition_payment(
        &self,
        id: PaymentId,
        next: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<u64>;
}

/// Header rows. Tombstoned headers are never returned.
#[async_trait]
pub trait OrderHeaderStore: Send + Sync {
    async fn insert_header(&self, header: OrderHeader) -> Result<()>;
    async fn find_header(&self, id: OrderHeaderId) -> Result<Option<OrderHeader>>;
    /// Ordered by creation time.
    async fn list_headers(&self, filter: &HeaderFilter) -> Result<Vec<OrderHeader>>;
    async fn update_review(
        &self,
        id: OrderHeaderId,
        review: Review,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<u64>;
    async fn tombstone_header(&self, id: OrderHeaderId, tombstone: Tombstone) -> Result<u64>;
}

/// Basket rows. Tombstoned baskets are never returned.
#[async_trait]
pub trait OrderDetailStore: Send + Sync {
    async fn insert_details(&self, details: Vec<OrderDetail>) -> Result<()>;
    /// Inserts `details` in the same step that checks no active `Processing`
    /// basket runs on `serial`. A busy machine is a `Conflict` and nothing is
    /// written.
    async fn insert_details_if_machine_free(
        &self,
        details: Vec<OrderDetail>,
        serial: &str,
    ) -> Result<()>;
    async fn find_detail(&self, id: BasketId) -> Result<Option<OrderDetail>>;
    /// Baskets of one order, or of every order when `header_id` is `None`,
    /// ordered by creation time and line number.
    async fn list_details(&self, header_id: Option<OrderHeaderId>) -> Result<Vec<OrderDetail>>;
    /// Replaces an active basket row wholesale (last write wins).
    async fn update_detail(&self, detail: OrderDetail) -> Result<u64>;
    /// [`update_detail`](Self::update_detail) guarded like
    /// [`insert_details_if_machine_free`](Self::insert_details_if_machine_free);
    /// the basket itself may already hold `serial`.
    async fn update_detail_if_machine_free(&self, detail: OrderDetail, serial: &str)
    -> Result<u64>;
    /// Tombstones every basket of an order, moving non-terminal ones to `Canceled`.
    async fn tombstone_details(&self, header_id: OrderHeaderId, tombstone: Tombstone)
    -> Result<u64>;
}

/// Recorded as `updated_by` on rows the reconciliation sweep changes.
pub const SWEEP_ACTOR: &str = "reconciliation";

/// Set-based conditional updates run by the reconciliation sweep.
#[async_trait]
pub trait SweepStore: Send + Sync {
    /// `Pending` payments past their due date become `Expired`.
    async fn expire_pending_payments(&self, now: DateTime<Utc>) -> Result<u64>;
    /// `Waiting` baskets whose payment is `Expired` become `Expired`.
    async fn expire_waiting_details(&self, now: DateTime<Utc>) -> Result<u64>;
    /// `Processing` baskets whose finish time has passed become `Completed`.
    async fn complete_processing_details(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Everything the engine persists.
pub trait RecordStore: PaymentStore + OrderHeaderStore + OrderDetailStore + SweepStore {}

impl<T> RecordStore for T where T: PaymentStore + OrderHeaderStore + OrderDetailStore + SweepStore {}

pub type RecordStoreRef = Arc<dyn RecordStore>;

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a `Pending` payment.
    async fn create(&self, amount: Amount) -> Result<Payment>;
    async fn find_by_id(&self, id: PaymentId) -> Result<Payment>;
    /// Only succeeds while the payment is `Pending` and not past due.
    async fn update_status(&self, id: PaymentId, status: PaymentStatus) -> Result<Payment>;
    async fn sweep_expired(&self) -> Result<u64>;
}

#[async_trait]
pub trait MachineCatalog: Send + Sync {
    async fn get_by_serial(&self, serial: &str) -> Result<Machine>;
    async fn list_available_in_branch(&self, branch_id: &str) -> Result<Vec<MachineAvailability>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_by_id(&self, user_id: &str) -> Result<UserProfile>;
}

#[async_trait]
pub trait BranchDirectory: Send + Sync {
    /// The owning manager's user id, or `None` for an unknown branch.
    async fn owner_of(&self, branch_id: &str) -> Result<Option<String>>;
}
