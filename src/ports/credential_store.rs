//! Port for per-hostname inspector credentials.
//!
//! Passwords are opaque shared secrets provisioned externally; the gateway
//! only reads them for the dashboard access gate.
use async_trait::async_trait;

use crate::ports::log_store::StoreError;

#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Create or replace the password for a hostname.
    async fn upsert(&self, hostname: &str, password: &str) -> Result<(), StoreError>;

    /// The stored password, if one has been provisioned.
    async fn get(&self, hostname: &str) -> Result<Option<String>, StoreError>;
}
