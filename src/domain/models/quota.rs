//! Quota ledger domain models.
//!
//! A ledger entry is keyed by a credential fingerprint plus a model name. The raw
//! credential never leaves [`Credential`]; only its truncated SHA-256 digest is
//! persisted or logged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Default number of hex characters kept from the credential digest.
pub const DEFAULT_FINGERPRINT_LEN: usize = 12;

/// Consecutive failures at which a key is treated as unstable.
pub const INSTABILITY_THRESHOLD: u32 = 3;

/// Base cooldown for the first observed exhaustion, in seconds.
pub const BASE_BACKOFF_SECS: u64 = 30;

/// Cooldown ceiling, in seconds (16 minutes).
pub const MAX_BACKOFF_SECS: u64 = 960;

/// A provider credential (API key).
///
/// Deserializes from the raw secret. `Debug`, `Display` and `Serialize` only ever
/// show the fingerprint.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for building outbound requests only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Truncated hex SHA-256 digest of the secret.
    ///
    /// `len` is clamped to the digest width (64).
    pub fn fingerprint(&self, len: usize) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        let mut hex = String::with_capacity(64);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        hex.truncate(len.min(64));
        hex
    }
}

impl Serialize for Credential {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.fingerprint(DEFAULT_FINGERPRINT_LEN))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.fingerprint(DEFAULT_FINGERPRINT_LEN))
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint(DEFAULT_FINGERPRINT_LEN))
    }
}

/// Identity of a ledger entry: `(credential fingerprint, model)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialModelKey {
    /// Truncated credential digest.
    pub fingerprint: String,
    /// Model name.
    pub model: String,
}

impl CredentialModelKey {
    /// Key for `credential` on `model`.
    pub fn new(credential: &Credential, model: impl Into<String>, fingerprint_len: usize) -> Self {
        Self {
            fingerprint: credential.fingerprint(fingerprint_len),
            model: model.into(),
        }
    }

    /// The persisted primary key, `"{fingerprint}_{model}"`.
    pub fn key_id(&self) -> String {
        format!("{}_{}", self.fingerprint, self.model)
    }
}

impl fmt::Display for CredentialModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key_id())
    }
}

/// Per-key quota state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    /// `{fingerprint}_{model}`.
    pub key_id: String,
    /// Exhausted until the next daily reset.
    pub daily_exhausted: bool,
    /// End of the current cooldown.
    pub temporary_exhausted_until: Option<DateTime<Utc>>,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Time of the most recent failure.
    pub last_failure: Option<DateTime<Utc>>,
    /// Consecutive exhaustions, driving the cooldown length.
    pub backoff_count: u32,
}

impl QuotaRecord {
    /// Whether the record disqualifies its key at `now`.
    ///
    /// Does not account for the daily reset; the ledger runs that first.
    pub fn is_exhausted_at(&self, now: DateTime<Utc>) -> bool {
        self.daily_exhausted
            || self.temporary_exhausted_until.is_some_and(|until| now < until)
            || self.consecutive_failures >= INSTABILITY_THRESHOLD
    }

    /// Whether the failure count reached the instability threshold.
    pub fn is_unstable(&self) -> bool {
        self.consecutive_failures >= INSTABILITY_THRESHOLD
    }
}

/// Cooldown applied on the `backoff_count`-th consecutive exhaustion.
///
/// `30, 60, 120, 240, 480, 960, 960, ...` seconds. A count of zero is treated as one.
pub fn backoff_cooldown_secs(backoff_count: u32) -> u64 {
    let exponent = backoff_count.saturating_sub(1).min(16);
    (BASE_BACKOFF_SECS << exponent).min(MAX_BACKOFF_SECS)
}
