//! Mail state repository backed by SQLite.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Decode, Row, Type};
use tracing::{debug, info, warn};

use super::model::{MailState, RecordId, StateRecord};
use crate::config::StoreConfig;
use crate::fingerprint::{Fingerprint, Fingerprinter, Sha256Fingerprinter};
use crate::mail::{self, Mail};
use crate::{Error, Result};

/// Timestamp layout written by the `created_at` column default.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Durable store of mail dispositions keyed by content fingerprint.
///
/// Uniqueness of fingerprints is enforced by the database, so concurrent
/// callers racing on the same mail see exactly one successful insert and
/// [`Error::DuplicateKey`] for the rest. Each operation borrows a pooled
/// connection for its duration only.
#[derive(Debug, Clone)]
pub struct StateStore<F = Sha256Fingerprinter> {
    pool: SqlitePool,
    fingerprinter: F,
}

impl StateStore {
    /// Open the store described by `config`, creating the database if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the database cannot
    /// be opened, or schema creation fails.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        Self::connect_with(config, Sha256Fingerprinter).await
    }

    /// Open a store at the given database path with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub async fn open(database_path: impl AsRef<Path>) -> Result<Self> {
        Self::connect(&StoreConfig::with_database_path(database_path.as_ref())).await
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        Self::in_memory_with(Sha256Fingerprinter).await
    }
}

impl<F: Fingerprinter> StateStore<F> {
    /// Open the store described by `config` using a custom fingerprinter.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the database cannot
    /// be opened, or schema creation fails.
    pub async fn connect_with(config: &StoreConfig, fingerprinter: F) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config.database_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool, fingerprinter).await?;
        info!("Mail state store opened at {:?}", config.database_path);
        Ok(store)
    }

    /// Create an in-memory store using a custom fingerprinter.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory_with(fingerprinter: F) -> Result<Self> {
        // Every in-memory connection is its own database, so the pool must
        // hold exactly one connection and never recycle it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(pool, fingerprinter).await
    }

    /// Wrap an existing pool. Creates the schema if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn from_pool(pool: SqlitePool, fingerprinter: F) -> Result<Self> {
        let store = Self {
            pool,
            fingerprinter,
        };
        store.initialize().await?;
        Ok(store)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mail_state (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                fingerprint TEXT NOT NULL UNIQUE
                    CHECK (length(fingerprint) BETWEEN 1 AND 64),
                state TEXT NOT NULL DEFAULT 'unprocessed'
                    CHECK (state IN ('unprocessed', 'processed', 'manual')),
                sheet_name TEXT NOT NULL
                    CHECK (length(trim(sheet_name)) > 0 AND length(sheet_name) <= 64)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Index for counting by sheet
        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_mail_state_sheet
            ON mail_state(sheet_name, state)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The fingerprinter used for mail identity.
    #[must_use]
    pub const fn fingerprinter(&self) -> &F {
        &self.fingerprinter
    }

    /// Record the disposition of a mail.
    ///
    /// The mail is validated and fingerprinted before any storage access.
    /// Returns the committed record.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedMail`] if the mail lacks content or a valid sheet name.
    /// - [`Error::DuplicateKey`] if the mail has already been recorded.
    /// - [`Error::StoreUnavailable`] if the database operation fails.
    pub async fn record_state<M: Mail + ?Sized>(
        &self,
        mail: &M,
        state: MailState,
    ) -> Result<StateRecord> {
        let fingerprint = self.fingerprinter.fingerprint(mail)?;
        self.record_fingerprint(&fingerprint, mail.sheet_name(), state)
            .await
    }

    /// Record a disposition for an already computed fingerprint.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedMail`] if the sheet name is invalid.
    /// - [`Error::DuplicateKey`] if the fingerprint has already been recorded.
    /// - [`Error::StoreUnavailable`] if the database operation fails.
    pub async fn record_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        sheet_name: &str,
        state: MailState,
    ) -> Result<StateRecord> {
        mail::validate_sheet_name(sheet_name)?;

        let mut conn = self.pool.acquire().await?;

        // Single statement: the insert either commits whole or not at all,
        // and the UNIQUE constraint arbitrates concurrent writers.
        let row = sqlx::query(
            r"
            INSERT INTO mail_state (fingerprint, state, sheet_name)
            VALUES (?, ?, ?)
            RETURNING id, created_at, fingerprint, state, sheet_name
            ",
        )
        .bind(fingerprint.as_str())
        .bind(state.as_str())
        .bind(sheet_name)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| insert_error(e, fingerprint))?;

        let record = row_to_record(&row)?;
        debug!(
            "Recorded mail {} as {} in sheet '{}' (id {})",
            record.fingerprint(),
            record.state(),
            record.sheet_name(),
            record.id()
        );
        Ok(record)
    }

    /// Check whether a mail has already been recorded.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedMail`] if the mail cannot be fingerprinted.
    /// - [`Error::StoreUnavailable`] if the database query fails.
    pub async fn is_mail_exists<M: Mail + ?Sized>(&self, mail: &M) -> Result<bool> {
        let fingerprint = self.fingerprinter.fingerprint(mail)?;
        self.fingerprint_exists(&fingerprint).await
    }

    /// Check whether a fingerprint has already been recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn fingerprint_exists(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query(
            r"
            SELECT EXISTS(SELECT 1 FROM mail_state WHERE fingerprint = ?) AS present
            ",
        )
        .bind(fingerprint.as_str())
        .fetch_one(&mut *conn)
        .await?;

        let present = column::<i64>(&row, "present")? != 0;
        debug!("Fingerprint {} present: {}", fingerprint, present);
        Ok(present)
    }

    /// Look up the record for a fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or the row cannot be decoded.
    pub async fn find(&self, fingerprint: &Fingerprint) -> Result<Option<StateRecord>> {
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query(
            r"
            SELECT id, created_at, fingerprint, state, sheet_name
            FROM mail_state
            WHERE fingerprint = ?
            ",
        )
        .bind(fingerprint.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    /// Count automatically processed mails for a sheet.
    ///
    /// Unprocessed and manually handled mails are not counted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_by_sheet(&self, sheet_name: &str) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS count
            FROM mail_state
            WHERE sheet_name = ? AND state = ?
            ",
        )
        .bind(sheet_name)
        .bind(MailState::Processed.as_str())
        .fetch_one(&mut *conn)
        .await?;

        let count = count_column(&row)?;
        debug!("Sheet '{}' has {} processed mails", sheet_name, count);
        Ok(count)
    }

    /// Count automatically processed mails for a sheet recorded at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_by_sheet_since(
        &self,
        sheet_name: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS count
            FROM mail_state
            WHERE sheet_name = ? AND state = ? AND created_at >= ?
            ",
        )
        .bind(sheet_name)
        .bind(MailState::Processed.as_str())
        .bind(since.format(TIMESTAMP_FORMAT).to_string())
        .fetch_one(&mut *conn)
        .await?;

        count_column(&row)
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Map an insert failure, separating rejected input from outages.
fn insert_error(err: sqlx::Error, fingerprint: &Fingerprint) -> Error {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            warn!("Rejected duplicate mail {}", fingerprint);
            return Error::DuplicateKey {
                fingerprint: fingerprint.to_string(),
            };
        }
        if db_err.is_check_violation() {
            warn!("Rejected mail {}: {}", fingerprint, db_err.message());
            return Error::MalformedMail(db_err.message().to_string());
        }
    }
    Error::StoreUnavailable(err)
}

/// Read a column, reporting undecodable values as corrupt rather than as outages.
fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T>
where
    T: Decode<'r, Sqlite> + Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| Error::CorruptRecord(format!("column '{name}': {e}")))
}

fn count_column(row: &SqliteRow) -> Result<u64> {
    let count: i64 = column(row, "count")?;
    u64::try_from(count).map_err(|_| Error::CorruptRecord(format!("negative count {count}")))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::CorruptRecord(format!("invalid created_at '{value}': {e}")))
}

/// Convert a database row to a `StateRecord`.
fn row_to_record(row: &SqliteRow) -> Result<StateRecord> {
    let created_at: String = column(row, "created_at")?;
    let fingerprint: String = column(row, "fingerprint")?;
    let state: String = column(row, "state")?;

    Ok(StateRecord::new(
        RecordId::new(column(row, "id")?),
        parse_timestamp(&created_at)?,
        Fingerprint::new(fingerprint)
            .map_err(|e| Error::CorruptRecord(format!("invalid fingerprint: {e}")))?,
        state.parse()?,
        column(row, "sheet_name")?,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::MailMessage;
    use chrono::Duration;

    fn mail(subject: &str, sheet: &str) -> MailMessage {
        MailMessage::new(sheet)
            .with_from("orders@example.com")
            .with_subject(subject)
    }

    fn fp(value: &str) -> Fingerprint {
        Fingerprint::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_record_and_exists() {
        let store = StateStore::in_memory().await.unwrap();
        let m = mail("Order 1", "Sales");

        assert!(!store.is_mail_exists(&m).await.unwrap());

        let record = store.record_state(&m, MailState::Processed).await.unwrap();
        assert_eq!(record.sheet_name(), "Sales");
        assert_eq!(record.state(), MailState::Processed);

        assert!(store.is_mail_exists(&m).await.unwrap());
    }

    #[tokio::test]
    async fn test_scenario_a_processed_counts() {
        let store = StateStore::in_memory().await.unwrap();

        store
            .record_fingerprint(&fp("h1"), "Sales", MailState::Processed)
            .await
            .unwrap();

        assert!(store.fingerprint_exists(&fp("h1")).await.unwrap());
        assert_eq!(store.count_by_sheet("Sales").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scenario_c_unprocessed_not_counted() {
        let store = StateStore::in_memory().await.unwrap();

        store
            .record_fingerprint(&fp("h3"), "Ops", MailState::Unprocessed)
            .await
            .unwrap();

        assert_eq!(store.count_by_sheet("Ops").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scenario_d_unseen_fingerprint() {
        let store = StateStore::in_memory().await.unwrap();
        assert!(!store.fingerprint_exists(&fp("h4")).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let store = StateStore::in_memory().await.unwrap();
        let m = mail("Order 1", "Sales");

        store.record_state(&m, MailState::Manual).await.unwrap();
        let err = store
            .record_state(&m, MailState::Processed)
            .await
            .unwrap_err();
        assert!(err.is_duplicate());

        // The first disposition stands.
        let fingerprint = store.fingerprinter().fingerprint(&m).unwrap();
        let record = store.find(&fingerprint).await.unwrap().unwrap();
        assert_eq!(record.state(), MailState::Manual);
        assert_eq!(store.count_by_sheet("Sales").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_same_mail_other_sheet_is_duplicate() {
        let store = StateStore::in_memory().await.unwrap();

        store
            .record_state(&mail("Order 1", "Sales"), MailState::Processed)
            .await
            .unwrap();
        let err = store
            .record_state(&mail("Order 1", "Ops"), MailState::Processed)
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_count_only_processed_for_sheet() {
        let store = StateStore::in_memory().await.unwrap();

        store
            .record_fingerprint(&fp("a"), "Sales", MailState::Processed)
            .await
            .unwrap();
        store
            .record_fingerprint(&fp("b"), "Sales", MailState::Processed)
            .await
            .unwrap();
        store
            .record_fingerprint(&fp("c"), "Sales", MailState::Manual)
            .await
            .unwrap();
        store
            .record_fingerprint(&fp("d"), "Sales", MailState::Unprocessed)
            .await
            .unwrap();
        store
            .record_fingerprint(&fp("e"), "Ops", MailState::Processed)
            .await
            .unwrap();

        assert_eq!(store.count_by_sheet("Sales").await.unwrap(), 2);
        assert_eq!(store.count_by_sheet("Ops").await.unwrap(), 1);
        assert_eq!(store.count_by_sheet("sales").await.unwrap(), 0);
        assert_eq!(store.count_by_sheet("Missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_since() {
        let store = StateStore::in_memory().await.unwrap();
        let before = Utc::now() - Duration::hours(1);

        store
            .record_fingerprint(&fp("a"), "Sales", MailState::Processed)
            .await
            .unwrap();
        store
            .record_fingerprint(&fp("b"), "Sales", MailState::Manual)
            .await
            .unwrap();

        assert_eq!(
            store.count_by_sheet_since("Sales", before).await.unwrap(),
            1
        );
        assert_eq!(
            store
                .count_by_sheet_since("Sales", Utc::now() + Duration::hours(1))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_ids_increase_and_timestamps_set() {
        let store = StateStore::in_memory().await.unwrap();
        let start = Utc::now() - Duration::seconds(5);

        let first = store
            .record_fingerprint(&fp("a"), "Sales", MailState::Processed)
            .await
            .unwrap();
        let second = store
            .record_fingerprint(&fp("b"), "Sales", MailState::Processed)
            .await
            .unwrap();

        assert!(second.id() > first.id());
        assert!(first.created_at() >= start);
        assert_eq!(first.fingerprint().as_str(), "a");
    }

    #[tokio::test]
    async fn test_malformed_mail_never_reaches_store() {
        let store = StateStore::in_memory().await.unwrap();

        let err = store
            .record_state(&MailMessage::new("Sales"), MailState::Processed)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedMail(_)));

        let err = store
            .record_fingerprint(&fp("a"), "", MailState::Processed)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedMail(_)));
        assert!(!store.fingerprint_exists(&fp("a")).await.unwrap());
    }

    #[tokio::test]
    async fn test_repeated_checks_are_stable() {
        let store = StateStore::in_memory().await.unwrap();
        let m = mail("Order 9", "Sales");

        for _ in 0..3 {
            assert!(!store.is_mail_exists(&m).await.unwrap());
        }
        store.record_state(&m, MailState::Processed).await.unwrap();
        for _ in 0..3 {
            assert!(store.is_mail_exists(&m).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_find_missing() {
        let store = StateStore::in_memory().await.unwrap();
        assert!(store.find(&fp("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_store_reports_unavailable() {
        let store = StateStore::in_memory().await.unwrap();
        store.close().await;

        let err = store.count_by_sheet("Sales").await.unwrap_err();
        assert!(err.is_retryable());
        let err = store.fingerprint_exists(&fp("h1")).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_schema_rejects_unknown_state() {
        let store = StateStore::in_memory().await.unwrap();

        let result = sqlx::query(
            "INSERT INTO mail_state (fingerprint, state, sheet_name) VALUES ('x', 'archived', 'Sales')",
        )
        .execute(store.pool())
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_control_characters_rejected_before_storage() {
        let store = StateStore::in_memory().await.unwrap();

        let err = store
            .record_state(
                &MailMessage::new("\0Sales").with_subject("x"),
                MailState::Processed,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedMail(_)));
        assert!(!err.is_retryable());

        assert!(matches!(
            Fingerprint::new("\0"),
            Err(Error::MalformedMail(_))
        ));
        assert_eq!(store.count_by_sheet("Sales").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_check_violation_maps_to_malformed() {
        let store = StateStore::in_memory().await.unwrap();

        // Bypass validation to get the constraint error from the engine.
        let err = sqlx::query(
            "INSERT INTO mail_state (fingerprint, state, sheet_name) VALUES ('x', 'processed', '   ')",
        )
        .execute(store.pool())
        .await
        .unwrap_err();

        let err = insert_error(err, &fp("x"));
        assert!(matches!(err, Error::MalformedMail(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_undecodable_row_is_corrupt() {
        let store = StateStore::in_memory().await.unwrap();

        let row = sqlx::query("SELECT 'not a number' AS count")
            .fetch_one(store.pool())
            .await
            .unwrap();
        let err = count_column(&row).unwrap_err();
        assert!(matches!(err, Error::CorruptRecord(_)));
        assert!(!err.is_retryable());

        let row = sqlx::query("SELECT 1 AS id")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(matches!(
            row_to_record(&row),
            Err(Error::CorruptRecord(_))
        ));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let with_millis = parse_timestamp("2026-01-02 03:04:05.678").unwrap();
        assert_eq!(with_millis.timestamp_subsec_millis(), 678);

        let plain = parse_timestamp("2026-01-02 03:04:05").unwrap();
        assert_eq!(plain.timestamp_subsec_millis(), 0);

        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(Error::CorruptRecord(_))
        ));
    }
}
