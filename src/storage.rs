//! SQLite storage layer for La Bajada.
//!
//! Three tables:
//!
//! - `epic_tracker`: a single row (`id = 1`) holding the durable streak
//!   record, overwritten on every alert run
//! - `alert_log`: append-only, one row per run that delivered an alert
//! - `push_subscriptions`: one row per push endpoint, soft-deleted through
//!   the `active` flag and never removed by the alert path
//!
//! Timestamps are unix nanoseconds, so a stored instant reads back exactly. Push credentials are stored as opaque JSON
//! text and never logged.

use std::time::Duration as StdDuration;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::epic::EpicTracker;
use crate::model::{
    AlertLogEntry, AlertType, CardinalDirection, Subscriber, SubscriberConfig, WindSnapshot,
};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:labajada.db?mode=rwc" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let options = if database_url.contains(":memory:") {
            // Every connection to :memory: is a separate database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(StdDuration::from_secs(10))
        };

        let pool = options.connect(database_url).await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS epic_tracker (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                started_at INTEGER,
                sustained INTEGER NOT NULL DEFAULT 0,
                last_checked_at INTEGER,
                last_speed REAL,
                last_direction REAL,
                broken_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alert_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sent_at INTEGER NOT NULL,
                alert_type TEXT NOT NULL,
                speed REAL NOT NULL,
                gust REAL NOT NULL,
                direction REAL NOT NULL,
                subscribers_sent INTEGER NOT NULL,
                subscribers_skipped INTEGER NOT NULL,
                subscribers_expired INTEGER NOT NULL,
                subscribers_failed INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_alert_log_sent_at
            ON alert_log(sent_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS push_subscriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                endpoint TEXT NOT NULL UNIQUE,
                credentials TEXT NOT NULL,
                min_navigable_wind INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Read the tracker record. A fresh database yields the idle record.
    pub async fn load_epic_tracker(&self) -> anyhow::Result<EpicTracker> {
        let row = sqlx::query(
            r#"
            SELECT started_at, sustained, last_checked_at, last_speed, last_direction, broken_at
            FROM epic_tracker
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(EpicTracker::default());
        };

        let sustained: i64 = row.get("sustained");
        Ok(EpicTracker {
            started_at: optional_time(row.get("started_at")),
            sustained: sustained != 0,
            last_checked_at: optional_time(row.get("last_checked_at")),
            last_speed_knots: row.get("last_speed"),
            last_direction_degrees: row.get("last_direction"),
            broken_at: optional_time(row.get("broken_at")),
        })
    }

    /// Overwrite the tracker record.
    pub async fn save_epic_tracker(&self, tracker: &EpicTracker) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO epic_tracker
                (id, started_at, sustained, last_checked_at, last_speed, last_direction, broken_at)
            VALUES (1, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                started_at = excluded.started_at,
                sustained = excluded.sustained,
                last_checked_at = excluded.last_checked_at,
                last_speed = excluded.last_speed,
                last_direction = excluded.last_direction,
                broken_at = excluded.broken_at
            "#,
        )
        .bind(tracker.started_at.map(unix_nanos).transpose()?)
        .bind(i64::from(tracker.sustained))
        .bind(tracker.last_checked_at.map(unix_nanos).transpose()?)
        .bind(tracker.last_speed_knots)
        .bind(tracker.last_direction_degrees)
        .bind(tracker.broken_at.map(unix_nanos).transpose()?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn append_alert_log(&self, entry: &AlertLogEntry) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_log (
                sent_at, alert_type, speed, gust, direction,
                subscribers_sent, subscribers_skipped, subscribers_expired, subscribers_failed
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(unix_nanos(entry.sent_at)?)
        .bind(entry.alert_type.as_str())
        .bind(entry.wind.speed_knots)
        .bind(entry.wind.gust_knots)
        .bind(entry.wind.direction_degrees)
        .bind(i64::from(entry.subscribers_sent))
        .bind(i64::from(entry.subscribers_skipped))
        .bind(i64::from(entry.subscribers_expired))
        .bind(i64::from(entry.subscribers_failed))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The most recent alert log entry, used by the cooldown gate.
    pub async fn latest_alert_log(&self) -> anyhow::Result<Option<AlertLogEntry>> {
        let row = sqlx::query(
            r#"
            SELECT sent_at, alert_type, speed, gust, direction,
                   subscribers_sent, subscribers_skipped, subscribers_expired, subscribers_failed
            FROM alert_log
            ORDER BY sent_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| alert_log_from_row(&row)).transpose()
    }

    pub async fn active_subscribers(&self) -> anyhow::Result<Vec<Subscriber>> {
        let rows = sqlx::query(
            r#"
            SELECT id, endpoint, credentials, min_navigable_wind, active
            FROM push_subscriptions
            WHERE active = 1
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(subscriber_from_row).collect()
    }

    /// Soft-delete a subscriber whose endpoint the push service reported gone.
    pub async fn deactivate_subscriber(&self, id: i64, now: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE push_subscriptions
            SET active = 0, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(unix_nanos(now)?)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or refresh a subscription, keyed by endpoint. Always reactivates.
    pub async fn upsert_subscriber(
        &self,
        endpoint: &str,
        credentials: &serde_json::Value,
        config: SubscriberConfig,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Subscriber> {
        let row = sqlx::query(
            r#"
            INSERT INTO push_subscriptions
                (endpoint, credentials, min_navigable_wind, active, created_at, updated_at)
            VALUES (?, ?, ?, 1, ?, ?)
            ON CONFLICT(endpoint) DO UPDATE SET
                credentials = excluded.credentials,
                min_navigable_wind = excluded.min_navigable_wind,
                active = 1,
                updated_at = excluded.updated_at
            RETURNING id, endpoint, credentials, min_navigable_wind, active
            "#,
        )
        .bind(endpoint)
        .bind(credentials.to_string())
        .bind(i64::from(config.min_navigable_wind_knots))
        .bind(unix_nanos(now)?)
        .bind(unix_nanos(now)?)
        .fetch_one(&self.pool)
        .await?;

        subscriber_from_row(&row)
    }

    /// Soft-delete by endpoint. Returns false when the endpoint is unknown.
    pub async fn unsubscribe(&self, endpoint: &str, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE push_subscriptions
            SET active = 0, updated_at = ?
            WHERE endpoint = ?
            "#,
        )
        .bind(unix_nanos(now)?)
        .bind(endpoint)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn unix_nanos(time: DateTime<Utc>) -> anyhow::Result<i64> {
    time.timestamp_nanos_opt()
        .ok_or_else(|| anyhow::anyhow!("timestamp out of storable range: {time}"))
}

fn time_from_unix(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

fn optional_time(nanos: Option<i64>) -> Option<DateTime<Utc>> {
    nanos.map(time_from_unix)
}

fn count(row: &SqliteRow, column: &str) -> anyhow::Result<u32> {
    let value: i64 = row.get(column);
    Ok(u32::try_from(value)?)
}

fn alert_log_from_row(row: &SqliteRow) -> anyhow::Result<AlertLogEntry> {
    let kind: String = row.get("alert_type");
    let alert_type = AlertType::parse(&kind)
        .ok_or_else(|| anyhow::anyhow!("unknown alert type in database: {kind}"))?;
    let direction: f64 = row.get("direction");

    Ok(AlertLogEntry {
        sent_at: time_from_unix(row.get("sent_at")),
        alert_type,
        wind: WindSnapshot {
            speed_knots: row.get("speed"),
            gust_knots: row.get("gust"),
            direction_degrees: direction,
            cardinal: CardinalDirection::from_degrees(direction),
        },
        subscribers_sent: count(row, "subscribers_sent")?,
        subscribers_skipped: count(row, "subscribers_skipped")?,
        subscribers_expired: count(row, "subscribers_expired")?,
        subscribers_failed: count(row, "subscribers_failed")?,
    })
}

fn subscriber_from_row(row: &SqliteRow) -> anyhow::Result<Subscriber> {
    let credentials: String = row.get("credentials");
    let active: i64 = row.get("active");

    Ok(Subscriber {
        id: row.get("id"),
        endpoint: row.get("endpoint"),
        credentials: serde_json::from_str(&credentials)?,
        config: SubscriberConfig {
            min_navigable_wind_knots: count(row, "min_navigable_wind")?,
        },
        active: active != 0,
    })
}
