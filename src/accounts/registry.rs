//! Account registry

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rand::Rng;

use super::types::{Account, AccountStatus, NewAccount};
use crate::{Error, Result};

/// DID method prefix for generated placeholders
const DID_PREFIX: &str = "did:ifa:";

/// Length of the random DID suffix
const DID_SUFFIX_LEN: usize = 13;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Registry of accounts, in creation order
#[derive(Debug, Default)]
pub struct AccountRegistry {
    accounts: IndexMap<String, Account>,
    last_stamp: i64,
}

impl AccountRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the demo account
    #[must_use]
    pub fn with_demo_account() -> Self {
        let created_at = DateTime::parse_from_rfc3339("2026-02-05T12:00:00Z")
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let demo = Account {
            id: "acc_demo_001".to_string(),
            did: format!("{DID_PREFIX}123abc456def"),
            email: "demo@infraflow.io".to_string(),
            name: "Demo Account".to_string(),
            created_at,
            status: AccountStatus::Active,
        };

        let mut registry = Self::new();
        registry.accounts.insert(demo.id.clone(), demo);
        registry
    }

    /// List all accounts
    #[must_use]
    pub fn list(&self) -> Vec<&Account> {
        self.accounts.values().collect()
    }

    /// Create an account with a placeholder DID
    ///
    /// # Errors
    ///
    /// Returns `MissingFields` if `email` or `name` is missing or empty
    pub fn create(&mut self, request: NewAccount) -> Result<Account> {
        let email = request.email.as_deref().filter(|v| !v.trim().is_empty());
        let name = request.name.as_deref().filter(|v| !v.trim().is_empty());

        let (Some(email), Some(name)) = (email, name) else {
            return Err(Error::MissingFields(vec!["email", "name"]));
        };

        let now = Utc::now();
        self.last_stamp = now.timestamp_millis().max(self.last_stamp + 1);

        let account = Account {
            id: format!("acc_{}", self.last_stamp),
            did: placeholder_did(&mut rand::thread_rng()),
            email: email.to_string(),
            name: name.to_string(),
            created_at: now,
            status: AccountStatus::Active,
        };

        self.accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    /// Get an account by ID
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` if no account has that ID
    pub fn get(&self, account_id: &str) -> Result<&Account> {
        self.accounts
            .get(account_id)
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))
    }

    /// Number of accounts
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Random `did:ifa:` identifier
///
/// Not an identity scheme: a real deployment delegates to a DID method
/// implementation or an identity service.
fn placeholder_did(rng: &mut impl Rng) -> String {
    let suffix: String = (0..DID_SUFFIX_LEN)
        .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
        .collect();
    format!("{DID_PREFIX}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: Option<&str>, name: Option<&str>) -> NewAccount {
        NewAccount {
            email: email.map(ToString::to_string),
            name: name.map(ToString::to_string),
        }
    }

    #[test]
    fn create_and_get() {
        let mut registry = AccountRegistry::new();
        let account = registry
            .create(request(Some("ops@example.com"), Some("Ops")))
            .unwrap();

        assert!(account.id.starts_with("acc_"));
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(registry.get(&account.id).unwrap(), &account);
    }

    #[test]
    fn create_requires_email_and_name() {
        let mut registry = AccountRegistry::new();
        assert!(matches!(
            registry.create(request(Some("ops@example.com"), None)),
            Err(Error::MissingFields(_))
        ));
        assert!(matches!(
            registry.create(request(Some(""), Some("Ops"))),
            Err(Error::MissingFields(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn email_and_name_are_stored_as_supplied() {
        let mut registry = AccountRegistry::new();
        let account = registry
            .create(request(Some(" ops@example.com"), Some("Ops Team ")))
            .unwrap();
        assert_eq!(account.email, " ops@example.com");
        assert_eq!(account.name, "Ops Team ");

        assert!(matches!(
            registry.create(request(Some("ops@example.com"), Some("   "))),
            Err(Error::MissingFields(_))
        ));
    }

    #[test]
    fn get_performs_real_lookup() {
        let registry = AccountRegistry::with_demo_account();
        assert_eq!(registry.get("acc_demo_001").unwrap().name, "Demo Account");
        assert!(matches!(
            registry.get("acc_other"),
            Err(Error::AccountNotFound(id)) if id == "acc_other"
        ));
    }

    #[test]
    fn placeholder_did_shape() {
        let did = placeholder_did(&mut rand::thread_rng());
        let suffix = did.strip_prefix(DID_PREFIX).unwrap();
        assert_eq!(suffix.len(), DID_SUFFIX_LEN);
        assert!(suffix.bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn ids_stay_unique_under_burst() {
        let mut registry = AccountRegistry::new();
        for i in 0..20 {
            registry
                .create(request(Some(&format!("u{i}@example.com")), Some("User")))
                .unwrap();
        }
        assert_eq!(registry.len(), 20);
        assert_eq!(registry.list().len(), 20);
    }
}
