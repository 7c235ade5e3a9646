use super::payment::PaymentId;
use super::user::UserProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type OrderHeaderId = Uuid;
pub type BasketId = Uuid;

/// Status of a single basket.
///
/// ```text
/// Waiting ──manual──▶ Processing ──sweep──▶ Completed
///    │                    │
///    ├──sweep──▶ Expired  │
///    └──────cancel────────┴──▶ Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Waiting,
    Processing,
    Completed,
    Canceled,
    Expired,
}

/// Who is driving a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A staff member or customer through `UpdateStatus`.
    Manual,
    /// The reconciliation sweep.
    Sweep,
    /// Order cancellation cascading to its baskets.
    Cancellation,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Expired)
    }

    pub fn can_transition_to(self, next: Self, trigger: Trigger) -> bool {
        use OrderStatus::*;
        match trigger {
            Trigger::Manual => matches!(
                (self, next),
                (Waiting, Processing)
                    | (Processing, Processing)
                    | (Waiting, Canceled)
                    | (Processing, Canceled)
            ),
            Trigger::Sweep => matches!((self, next), (Waiting, Expired) | (Processing, Completed)),
            Trigger::Cancellation => !self.is_terminal() && next == Canceled,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    Washing,
    Drying,
    Pickup,
    Delivery,
    Agents,
}

impl ServiceType {
    /// Washing and drying occupy a machine; the rest are add-on services.
    pub fn uses_machine(self) -> bool {
        matches!(self, Self::Washing | Self::Drying)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Supported machine / basket capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WeightTier {
    Seven,
    Fourteen,
    TwentyOne,
}

impl WeightTier {
    pub fn from_kg(kg: u16) -> Option<Self> {
        match kg {
            7 => Some(Self::Seven),
            14 => Some(Self::Fourteen),
            21 => Some(Self::TwentyOne),
            _ => None,
        }
    }

    pub fn kg(self) -> u16 {
        match self {
            Self::Seven => 7,
            Self::Fourteen => 14,
            Self::TwentyOne => 21,
        }
    }
}

/// Who did what, and when. Tombstoned rows are invisible to every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audit {
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tombstone: Option<Tombstone>,
}

impl Audit {
    pub fn new(actor: &str, at: DateTime<Utc>) -> Self {
        Self {
            created_at: at,
            created_by: actor.to_string(),
            updated_at: at,
            updated_by: actor.to_string(),
            tombstone: None,
        }
    }

    pub fn touch(&mut self, actor: &str, at: DateTime<Utc>) {
        self.updated_at = at;
        self.updated_by = actor.to_string();
    }

    pub fn is_deleted(&self) -> bool {
        self.tombstone.is_some()
    }
}

/// Deletion marker; both fields are always set together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    pub deleted_by: String,
    pub deleted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLocation {
    pub address: String,
    pub lat: f64,
    pub long: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub star_rating: u8,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHeader {
    pub id: OrderHeaderId,
    pub user_id: String,
    pub branch_id: String,
    pub note: Option<String>,
    pub payment_id: PaymentId,
    pub onsite: bool,
    pub delivery: Option<DeliveryLocation>,
    pub review: Option<Review>,
    pub audit: Audit,
}

/// One basket of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub id: BasketId,
    pub header_id: OrderHeaderId,
    /// Position within the order, used for stable ordering.
    pub line_no: u16,
    pub machine_serial: Option<String>,
    pub weight: u16,
    pub service_type: ServiceType,
    pub status: OrderStatus,
    pub finished_at: Option<DateTime<Utc>>,
    pub audit: Audit,
}

/// A basket as submitted by the customer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewBasket {
    #[serde(default)]
    pub machine_serial: Option<String>,
    #[serde(default)]
    pub weight: u16,
    #[serde(default)]
    pub service_type: Option<ServiceType>,
}

/// An order as submitted by the customer, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub branch_id: String,
    #[serde(default)]
    pub note: Option<String>,
    pub onsite: bool,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub delivery_lat: Option<f64>,
    #[serde(default)]
    pub delivery_long: Option<f64>,
    pub baskets: Vec<NewBasket>,
}

impl NewOrder {
    pub fn has_any_delivery_field(&self) -> bool {
        self.delivery_address.is_some() || self.delivery_lat.is_some() || self.delivery_long.is_some()
    }

    pub fn delivery_location(&self) -> Option<DeliveryLocation> {
        match (&self.delivery_address, self.delivery_lat, self.delivery_long) {
            (Some(address), Some(lat), Some(long)) => Some(DeliveryLocation {
                address: address.clone(),
                lat,
                long,
            }),
            _ => None,
        }
    }
}

/// Manual change to one basket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub basket_id: BasketId,
    pub status: OrderStatus,
    #[serde(default)]
    pub machine_serial: Option<String>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSubmission {
    pub header_id: OrderHeaderId,
    pub star_rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Header, baskets and owner profile in one read model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullOrder {
    #[serde(flatten)]
    pub header: OrderHeader,
    pub user: UserProfile,
    pub baskets: Vec<OrderDetail>,
}

/// Which part of an order a read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Header,
    Detail,
    #[default]
    Full,
}

impl FromStr for ViewKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "header" => Ok(Self::Header),
            "detail" => Ok(Self::Detail),
            "full" => Ok(Self::Full),
            other => Err(format!("unknown order view: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OrderView {
    Header(OrderHeader),
    Details(Vec<OrderDetail>),
    Full(Box<FullOrder>),
}
