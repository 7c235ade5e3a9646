use super::order::{ServiceType, WeightTier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineType {
    Washer,
    Dryer,
}

impl MachineType {
    pub fn service_type(self) -> ServiceType {
        match self {
            Self::Washer => ServiceType::Washing,
            Self::Dryer => ServiceType::Drying,
        }
    }
}

/// A physical machine as the catalog knows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub serial: String,
    pub branch_id: String,
    pub machine_type: MachineType,
    /// Rated capacity in kg.
    pub weight: u16,
    pub is_active: bool,
}

impl Machine {
    pub fn tier(&self) -> Option<WeightTier> {
        WeightTier::from_kg(self.weight)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineAvailability {
    pub serial: String,
    pub machine_type: MachineType,
    pub weight: u16,
    pub is_available: bool,
    /// When the basket currently occupying the machine is due to finish.
    pub busy_until: Option<DateTime<Utc>>,
}
