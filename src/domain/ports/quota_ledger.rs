//! Quota ledger port.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Credential, CredentialModelKey, QuotaRecord};

/// Durable per-(credential, model) health store.
///
/// Every operation first applies the lazy daily reset. Implementations must keep each
/// mutation atomic with respect to other processes sharing the same store.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Build the ledger key for a credential and model.
    fn key_for(&self, credential: &Credential, model: &str) -> CredentialModelKey;

    /// Whether the key is currently disqualified.
    async fn is_exhausted(&self, key: &CredentialModelKey) -> DomainResult<bool>;

    /// Record a quota signal without a provider hint. Returns the applied cooldown.
    async fn mark_exhausted(&self, key: &CredentialModelKey) -> DomainResult<Duration>;

    /// Cool the key down for exactly `cooldown`.
    async fn mark_temporary_exhaustion(
        &self,
        key: &CredentialModelKey,
        cooldown: Duration,
    ) -> DomainResult<()>;

    /// Disqualify the key until the next daily reset.
    async fn mark_daily_exhausted(&self, key: &CredentialModelKey) -> DomainResult<()>;

    /// Count a non-quota failure. Returns the new consecutive failure count.
    async fn mark_failure(&self, key: &CredentialModelKey) -> DomainResult<u32>;

    /// Record a successful call.
    async fn mark_success(&self, key: &CredentialModelKey) -> DomainResult<()>;

    /// Snapshot of one record, if it exists.
    async fn record(&self, key: &CredentialModelKey) -> DomainResult<Option<QuotaRecord>>;

    /// Snapshot of every record.
    async fn records(&self) -> DomainResult<Vec<QuotaRecord>>;

    /// Clear every record. Returns the number of records removed.
    async fn reset_all(&self) -> DomainResult<u64>;
}
