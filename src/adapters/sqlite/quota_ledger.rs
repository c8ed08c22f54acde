//! SQLite implementation of the [`QuotaLedger`] port.
//!
//! Several processes may share one database file. Every mutation is either a single
//! statement or a transaction whose first statement is a write, so SQLite takes the
//! write lock before anything is read and concurrent callers serialize on it.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, TimeZone, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    backoff_cooldown_secs, Credential, CredentialModelKey, LedgerConfig, QuotaRecord,
    DEFAULT_FINGERPRINT_LEN, INSTABILITY_THRESHOLD,
};
use crate::domain::ports::{Clock, QuotaLedger, SystemClock};

use super::parse_optional_datetime;

const LAST_RESET_KEY: &str = "last_reset";

#[derive(sqlx::FromRow)]
struct QuotaRow {
    key_id: String,
    exhausted_at: Option<String>,
    failure_count: i64,
    last_failure: Option<String>,
    temp_exhausted_until: Option<String>,
    backoff_count: i64,
}

fn row_to_record(row: QuotaRow) -> DomainResult<QuotaRecord> {
    Ok(QuotaRecord {
        key_id: row.key_id,
        daily_exhausted: row.exhausted_at.is_some(),
        temporary_exhausted_until: parse_optional_datetime(row.temp_exhausted_until)?,
        consecutive_failures: counter(row.failure_count),
        last_failure: parse_optional_datetime(row.last_failure)?,
        backoff_count: counter(row.backoff_count),
    })
}

fn counter(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Timestamps are always written in one shape so that equal instants compare equal as text.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::days(365))
}

/// [`QuotaLedger`] persisted in SQLite.
#[derive(Clone)]
pub struct SqliteQuotaLedger {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    fingerprint_len: usize,
    reset_hour_utc: u32,
}

impl SqliteQuotaLedger {
    /// Ledger with the system clock and default reset settings.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
            fingerprint_len: DEFAULT_FINGERPRINT_LEN,
            reset_hour_utc: 8,
        }
    }

    /// Ledger using the configured reset hour and fingerprint length.
    pub fn from_config(pool: SqlitePool, config: &LedgerConfig) -> Self {
        Self::new(pool)
            .with_fingerprint_len(config.fingerprint_len)
            .with_reset_hour(config.reset_hour_utc)
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Characters of the secret hash used as the record key.
    #[must_use]
    pub fn with_fingerprint_len(mut self, len: usize) -> Self {
        self.fingerprint_len = len;
        self
    }

    /// UTC hour at which daily exhaustion clears.
    #[must_use]
    pub fn with_reset_hour(mut self, hour: u32) -> Self {
        self.reset_hour_utc = hour;
        self
    }

    /// Timestamp of the last daily sweep, if one has run.
    pub async fn last_reset(&self) -> DomainResult<Option<DateTime<Utc>>> {
        let value: Option<(Option<String>,)> =
            sqlx::query_as("SELECT value FROM metadata WHERE key = ?")
                .bind(LAST_RESET_KEY)
                .fetch_optional(&self.pool)
                .await?;
        parse_optional_datetime(value.and_then(|(v,)| v))
    }

    /// Today's reset boundary for `now`.
    fn boundary(&self, now: DateTime<Utc>) -> DomainResult<DateTime<Utc>> {
        now.date_naive()
            .and_hms_opt(self.reset_hour_utc, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive))
            .ok_or_else(|| {
                DomainError::ValidationFailed(format!(
                    "invalid reset hour {}",
                    self.reset_hour_utc
                ))
            })
    }

    fn reset_due(
        &self,
        now: DateTime<Utc>,
        last_reset: Option<DateTime<Utc>>,
    ) -> DomainResult<bool> {
        let Some(last_reset) = last_reset else {
            return Ok(true);
        };
        let boundary = self.boundary(now)?;
        Ok(now >= boundary && last_reset < boundary)
    }

    /// Lazy daily sweep, run before every ledger operation.
    ///
    /// A lock-free read rules out the common case. Otherwise the decision is taken again
    /// under the write lock, so only one process clears the records for a given boundary.
    async fn apply_daily_reset(&self) -> DomainResult<()> {
        let now = self.clock.now();
        if !self.reset_due(now, self.last_reset().await?)? {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO metadata (key, value) VALUES (?, NULL) ON CONFLICT(key) DO NOTHING")
            .bind(LAST_RESET_KEY)
            .execute(&mut *tx)
            .await?;

        let (stored,): (Option<String>,) =
            sqlx::query_as("SELECT value FROM metadata WHERE key = ?")
                .bind(LAST_RESET_KEY)
                .fetch_one(&mut *tx)
                .await?;

        if !self.reset_due(now, parse_optional_datetime(stored)?)? {
            tx.commit().await?;
            return Ok(());
        }

        let cleared = Self::clear_records(&mut tx, now).await?;
        tx.commit().await?;
        tracing::info!(cleared, reset_at = %format_timestamp(now), "daily quota reset");
        Ok(())
    }

    async fn clear_records(tx: &mut Transaction<'_, Sqlite>, now: DateTime<Utc>) -> DomainResult<u64> {
        let cleared = sqlx::query("DELETE FROM quotas").execute(&mut **tx).await?.rows_affected();
        sqlx::query(
            "INSERT INTO metadata (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(LAST_RESET_KEY)
        .bind(format_timestamp(now))
        .execute(&mut **tx)
        .await?;
        Ok(cleared)
    }

    async fn fetch_row(&self, key_id: &str) -> DomainResult<Option<QuotaRow>> {
        let row: Option<QuotaRow> = sqlx::query_as(
            "SELECT key_id, exhausted_at, failure_count, last_failure, temp_exhausted_until, backoff_count
             FROM quotas WHERE key_id = ?",
        )
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl QuotaLedger for SqliteQuotaLedger {
    fn key_for(&self, credential: &Credential, model: &str) -> CredentialModelKey {
        CredentialModelKey::new(credential, model, self.fingerprint_len)
    }

    async fn is_exhausted(&self, key: &CredentialModelKey) -> DomainResult<bool> {
        self.apply_daily_reset().await?;
        let key_id = key.key_id();
        let Some(row) = self.fetch_row(&key_id).await? else {
            return Ok(false);
        };

        let now = self.clock.now();
        let raw_until = row.temp_exhausted_until.clone();
        let record = row_to_record(row)?;

        if let (Some(until), Some(raw)) = (record.temporary_exhausted_until, raw_until) {
            if now >= until {
                // Only clear the window we observed; a concurrent re-arm wins.
                sqlx::query(
                    "UPDATE quotas SET temp_exhausted_until = NULL
                     WHERE key_id = ? AND temp_exhausted_until = ?",
                )
                .bind(&key_id)
                .bind(raw)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(record.is_exhausted_at(now))
    }

    async fn mark_exhausted(&self, key: &CredentialModelKey) -> DomainResult<Duration> {
        self.apply_daily_reset().await?;
        let key_id = key.key_id();
        let now = self.clock.now();

        let mut tx = self.pool.begin().await?;
        let (backoff_count,): (i64,) = sqlx::query_as(
            "INSERT INTO quotas (key_id, backoff_count) VALUES (?, 1)
             ON CONFLICT(key_id) DO UPDATE SET backoff_count = backoff_count + 1
             RETURNING backoff_count",
        )
        .bind(&key_id)
        .fetch_one(&mut *tx)
        .await?;

        let cooldown = Duration::from_secs(backoff_cooldown_secs(counter(backoff_count)));
        let until = now + to_chrono(cooldown);
        sqlx::query("UPDATE quotas SET temp_exhausted_until = ? WHERE key_id = ?")
            .bind(format_timestamp(until))
            .bind(&key_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::warn!(
            key = %key_id,
            backoff_count,
            cooldown_secs = cooldown.as_secs(),
            "credential exhausted, backing off"
        );
        Ok(cooldown)
    }

    async fn mark_temporary_exhaustion(
        &self,
        key: &CredentialModelKey,
        cooldown: Duration,
    ) -> DomainResult<()> {
        self.apply_daily_reset().await?;
        let key_id = key.key_id();
        let until = self.clock.now() + to_chrono(cooldown);

        sqlx::query(
            "INSERT INTO quotas (key_id, temp_exhausted_until) VALUES (?, ?)
             ON CONFLICT(key_id) DO UPDATE SET temp_exhausted_until = excluded.temp_exhausted_until",
        )
        .bind(&key_id)
        .bind(format_timestamp(until))
        .execute(&self.pool)
        .await?;

        tracing::info!(key = %key_id, cooldown_secs = cooldown.as_secs(), "credential cooling down");
        Ok(())
    }

    async fn mark_daily_exhausted(&self, key: &CredentialModelKey) -> DomainResult<()> {
        self.apply_daily_reset().await?;
        let key_id = key.key_id();

        sqlx::query(
            "INSERT INTO quotas (key_id, exhausted_at) VALUES (?, ?)
             ON CONFLICT(key_id) DO UPDATE SET exhausted_at = excluded.exhausted_at",
        )
        .bind(&key_id)
        .bind(format_timestamp(self.clock.now()))
        .execute(&self.pool)
        .await?;

        tracing::warn!(key = %key_id, "daily quota exhausted");
        Ok(())
    }

    async fn mark_failure(&self, key: &CredentialModelKey) -> DomainResult<u32> {
        self.apply_daily_reset().await?;
        let key_id = key.key_id();

        let (failure_count,): (i64,) = sqlx::query_as(
            "INSERT INTO quotas (key_id, failure_count, last_failure) VALUES (?, 1, ?)
             ON CONFLICT(key_id) DO UPDATE SET
                 failure_count = failure_count + 1,
                 last_failure = excluded.last_failure
             RETURNING failure_count",
        )
        .bind(&key_id)
        .bind(format_timestamp(self.clock.now()))
        .fetch_one(&self.pool)
        .await?;

        let failures = counter(failure_count);
        if failures >= INSTABILITY_THRESHOLD {
            tracing::warn!(key = %key_id, failures, "credential marked unstable");
        } else {
            tracing::debug!(key = %key_id, failures, "credential failure recorded");
        }
        Ok(failures)
    }

    async fn mark_success(&self, key: &CredentialModelKey) -> DomainResult<()> {
        self.apply_daily_reset().await?;

        sqlx::query(
            "UPDATE quotas SET
                 failure_count = 0,
                 last_failure = NULL,
                 temp_exhausted_until = NULL,
                 backoff_count = MAX(0, backoff_count - 2)
             WHERE key_id = ?",
        )
        .bind(key.key_id())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record(&self, key: &CredentialModelKey) -> DomainResult<Option<QuotaRecord>> {
        self.apply_daily_reset().await?;
        self.fetch_row(&key.key_id()).await?.map(row_to_record).transpose()
    }

    async fn records(&self) -> DomainResult<Vec<QuotaRecord>> {
        self.apply_daily_reset().await?;
        let rows: Vec<QuotaRow> = sqlx::query_as(
            "SELECT key_id, exhausted_at, failure_count, last_failure, temp_exhausted_until, backoff_count
             FROM quotas ORDER BY key_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_record).collect()
    }

    async fn reset_all(&self) -> DomainResult<u64> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;
        let cleared = Self::clear_records(&mut tx, now).await?;
        tx.commit().await?;
        tracing::info!(cleared, "quota ledger reset by operator");
        Ok(cleared)
    }
}
