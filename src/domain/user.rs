use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    SuperAdmin,
    BranchManager,
    Employee,
    Client,
}

impl Role {
    pub fn is_staff(self) -> bool {
        !matches!(self, Self::Client)
    }
}

/// Public profile fields of a user. Credentials never reach this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub profile_image_url: String,
    pub role: Role,
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn client(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Client)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub branch_id: String,
    pub owner_user_id: String,
}
