//! Account types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account standing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
}

/// An operator account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// Placeholder decentralized identifier; not derived from any key material
    pub did: String,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub status: AccountStatus,
}

/// Account creation request as received from a caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAccount {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}
