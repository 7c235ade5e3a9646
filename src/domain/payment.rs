use super::money::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PaymentId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Expired,
    Cancel,
}

/// The single payment attached to an order. Only `Pending` payments change state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub amount: Amount,
    pub status: PaymentStatus,
    pub due_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.due_date < now
    }

    /// Whether a status change may be applied at `now`.
    pub fn accepts_transition(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending && !self.is_overdue(now)
    }
}
