//! Account registry for sovereign-identity accounts

pub mod registry;
pub mod types;

pub use registry::AccountRegistry;
pub use types::{Account, AccountStatus, NewAccount};
