use crate::domain::order::ServiceType;
use miette::Diagnostic;
use thiserror::Error;

/// Reasons an order proposal (or a review) is rejected before anything is written.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("onsite policy violated")]
    #[diagnostic(code(validation::onsite_policy))]
    OnsitePolicy,
    #[error("online policy violated")]
    #[diagnostic(code(validation::online_policy))]
    OnlinePolicy,
    #[error("unsupported weight tier: {0} kg")]
    #[diagnostic(
        code(validation::weight_tier),
        help("washing and drying baskets must weigh 7, 14 or 21 kg")
    )]
    UnsupportedWeight(u16),
    #[error("drying request exceeds limit")]
    #[diagnostic(code(validation::drying_limit))]
    DryingLimitExceeded,
    #[error("cannot use agent when only drying")]
    #[diagnostic(code(validation::agents_without_washing))]
    AgentsWithoutWashing,
    #[error("mixed weight tiers for {0} baskets")]
    #[diagnostic(code(validation::mixed_tiers))]
    MixedWeightTiers(ServiceType),
    #[error("total weight {0} kg exceeds 21 kg")]
    #[diagnostic(code(validation::weight_exceeded))]
    WeightExceeded(u32),
    #[error("empty order")]
    #[diagnostic(code(validation::empty_order))]
    EmptyOrder,
    #[error("cannot select pickup or delivery individually")]
    #[diagnostic(code(validation::pickup_delivery_pair))]
    PickupDeliveryMismatch,
    #[error("exactly one pickup and one delivery are required for online orders")]
    #[diagnostic(code(validation::pickup_delivery_required))]
    PickupDeliveryRequired,
    #[error("processing basket requires a machine serial")]
    #[diagnostic(code(validation::machine_required))]
    MachineRequired,
    #[error("{0} baskets do not run on a machine")]
    #[diagnostic(code(validation::no_machine_service))]
    NoMachineService(ServiceType),
    #[error("machine {serial} cannot run {service} baskets")]
    #[diagnostic(code(validation::machine_mismatch))]
    MachineMismatch { serial: String, service: ServiceType },
    #[error("star rating must be between 1 and 5, got {0}")]
    #[diagnostic(code(validation::star_rating))]
    StarRating(u8),
}

impl ValidationError {
    /// Stable identifier callers can branch on.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::OnsitePolicy => "validation.onsite_policy",
            Self::OnlinePolicy => "validation.online_policy",
            Self::UnsupportedWeight(_) => "validation.weight_tier",
            Self::DryingLimitExceeded => "validation.drying_limit",
            Self::AgentsWithoutWashing => "validation.agents_without_washing",
            Self::MixedWeightTiers(_) => "validation.mixed_tiers",
            Self::WeightExceeded(_) => "validation.weight_exceeded",
            Self::EmptyOrder => "validation.empty_order",
            Self::PickupDeliveryMismatch => "validation.pickup_delivery_pair",
            Self::PickupDeliveryRequired => "validation.pickup_delivery_required",
            Self::MachineRequired => "validation.machine_required",
            Self::NoMachineService(_) => "validation.no_machine_service",
            Self::MachineMismatch { .. } => "validation.machine_mismatch",
            Self::StarRating(_) => "validation.star_rating",
        }
    }
}

#[derive(Error, Diagnostic, Debug)]
pub enum OrderError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),
    #[error("{entity} not found: {id}")]
    #[diagnostic(code(order::not_found))]
    NotFound { entity: &'static str, id: String },
    #[error("forbidden: {0}")]
    #[diagnostic(code(order::forbidden))]
    Forbidden(String),
    #[error("{service} call failed: {message}")]
    #[diagnostic(code(order::dependency))]
    Dependency {
        service: &'static str,
        message: String,
    },
    #[error("conflict: {0}")]
    #[diagnostic(code(order::conflict))]
    Conflict(String),
    #[error("storage error: {0}")]
    #[diagnostic(code(order::storage))]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl OrderError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Wraps a failure reported by a collaborator service.
    pub fn dependency(service: &'static str, source: impl std::fmt::Display) -> Self {
        Self::Dependency {
            service,
            message: source.to_string(),
        }
    }

    pub fn machine_busy(serial: &str) -> Self {
        Self::Conflict(format!("machine {serial} is busy"))
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(Box::new(std::io::Error::other(message.into())))
    }

    /// Stable identifier callers can branch on.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.reason(),
            Self::NotFound { .. } => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Dependency { .. } => "dependency",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<serde_json::Error> for OrderError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(Box::new(e))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for OrderError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Storage(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, OrderError>;
