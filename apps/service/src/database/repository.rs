use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use libsql::{Row, params};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use super::models::{Monitor, UptimeEvent, millis_to_timestamp, timestamp_to_millis};
use crate::monitoring::types::{Availability, PingReachability, PortState, ScheduleTier};
use crate::monitoring::verification::Verification;
use crate::pool::LibsqlPool;

/// Database trait for abstracting database operations
#[async_trait]
pub trait Database: Send + Sync {
    /// Unpaused monitors of `tier` never checked or last checked at or before `stale_before`
    async fn find_due_monitors(&self, tier: ScheduleTier, stale_before: SystemTime) -> Result<Vec<Monitor>>;

    /// Save an uptime event, returns its row id
    async fn save_event(&self, event: &UptimeEvent) -> Result<i64>;

    /// Refresh a monitor's last-checked stamp
    async fn update_monitor_timestamp(&self, monitor_id: Uuid, checked_at: SystemTime) -> Result<()>;

    /// Insert or replace a monitor
    async fn save_monitor(&self, monitor: &Monitor) -> Result<()>;

    async fn get_monitor(&self, monitor_id: Uuid) -> Result<Option<Monitor>>;

    async fn list_monitors_for_owner(&self, owner: &str) -> Result<Vec<Monitor>>;

    /// Events of a monitor, newest first
    async fn get_events_for_monitor(&self, monitor_id: Uuid, limit: usize) -> Result<Vec<UptimeEvent>>;

    /// Pause a monitor, returns false if it does not exist
    async fn pause_monitor(&self, monitor_id: Uuid) -> Result<bool>;
}

const MONITOR_COLUMNS: &str = "id, owner, url, port, tier, is_paused, last_checked_at, created_at";

const EVENT_COLUMNS: &str =
    "id, monitor_id, timestamp, availability, ping, port, response_time_ms, confirmed_by_agent, verification";

fn monitor_from_row(row: &Row) -> Result<Monitor> {
    let id: String = row.get(0)?;
    let port = row
        .get::<Option<i64>>(3)?
        .map(u16::try_from)
        .transpose()
        .context("stored port out of range")?;
    let tier_minutes: i64 = row.get(4)?;
    let tier = u32::try_from(tier_minutes)
        .ok()
        .and_then(ScheduleTier::from_minutes)
        .ok_or_else(|| anyhow!("unknown schedule tier {tier_minutes} for monitor {id}"))?;

    Ok(Monitor {
        id: Uuid::parse_str(&id)?,
        owner: row.get(1)?,
        url: row.get(2)?,
        port,
        tier,
        is_paused: row.get::<i64>(5)? != 0,
        last_checked_at: row.get::<Option<i64>>(6)?.map(millis_to_timestamp),
        created_at: millis_to_timestamp(row.get(7)?),
    })
}

fn event_from_row(row: &Row) -> Result<UptimeEvent> {
    let monitor_id: String = row.get(1)?;
    let verification: String = row.get(8)?;

    Ok(UptimeEvent {
        id: Some(row.get(0)?),
        monitor_id: Uuid::parse_str(&monitor_id)?,
        timestamp: millis_to_timestamp(row.get(2)?),
        availability: Availability::parse(&row.get::<String>(3)?),
        ping: PingReachability::parse(&row.get::<String>(4)?),
        port: PortState::parse(&row.get::<String>(5)?),
        response_time: Duration::from_millis(row.get::<i64>(6)?.max(0) as u64),
        confirmed_by_agent: row.get(7)?,
        verification: Verification::parse(&verification)
            .ok_or_else(|| anyhow!("unknown verification state {verification:?}"))?,
    })
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    async fn query_monitors(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut monitors = Vec::new();

        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }

        Ok(monitors)
    }
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn find_due_monitors(&self, tier: ScheduleTier, stale_before: SystemTime) -> Result<Vec<Monitor>> {
        let sql = format!(
            "SELECT {MONITOR_COLUMNS} FROM monitors \
             WHERE tier = ? AND is_paused = 0 \
             AND (last_checked_at IS NULL OR last_checked_at <= ?) \
             ORDER BY created_at"
        );
        self.query_monitors(
            &sql,
            params![i64::from(tier.minutes()), timestamp_to_millis(stale_before)],
        )
        .await
    }

    async fn save_event(&self, event: &UptimeEvent) -> Result<i64> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO uptime_events (monitor_id, timestamp, availability, ping, port, response_time_ms, confirmed_by_agent, verification) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                event.monitor_id.to_string(),
                timestamp_to_millis(event.timestamp),
                event.availability.as_str(),
                event.ping.as_str(),
                event.port.as_str(),
                event.response_time_ms(),
                event.confirmed_by_agent.clone(),
                event.verification.as_str()
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn update_monitor_timestamp(&self, monitor_id: Uuid, checked_at: SystemTime) -> Result<()> {
        let conn = self.get_conn().await?;
        let updated = conn
            .execute(
                "UPDATE monitors SET last_checked_at = ? WHERE id = ?",
                params![timestamp_to_millis(checked_at), monitor_id.to_string()],
            )
            .await?;

        if updated == 0 {
            return Err(anyhow!("monitor {monitor_id} no longer exists"));
        }
        Ok(())
    }

    async fn save_monitor(&self, monitor: &Monitor) -> Result<()> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO monitors (id, owner, url, port, tier, is_paused, last_checked_at, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                owner = excluded.owner,
                url = excluded.url,
                port = excluded.port,
                tier = excluded.tier,
                is_paused = excluded.is_paused,
                last_checked_at = excluded.last_checked_at",
            params![
                monitor.id.to_string(),
                monitor.owner.clone(),
                monitor.url.clone(),
                monitor.port.map(i64::from),
                i64::from(monitor.tier.minutes()),
                if monitor.is_paused { 1 } else { 0 },
                monitor.last_checked_at.map(timestamp_to_millis),
                timestamp_to_millis(monitor.created_at)
            ],
        )
        .await?;

        Ok(())
    }

    async fn get_monitor(&self, monitor_id: Uuid) -> Result<Option<Monitor>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?");
        let mut monitors = self.query_monitors(&sql, params![monitor_id.to_string()]).await?;
        Ok(monitors.pop())
    }

    async fn list_monitors_for_owner(&self, owner: &str) -> Result<Vec<Monitor>> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE owner = ? ORDER BY created_at");
        self.query_monitors(&sql, params![owner]).await
    }

    async fn get_events_for_monitor(&self, monitor_id: Uuid, limit: usize) -> Result<Vec<UptimeEvent>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM uptime_events WHERE monitor_id = ? ORDER BY timestamp DESC, id DESC LIMIT ?"
        );
        let mut rows = conn
            .query(&sql, params![monitor_id.to_string(), i64::try_from(limit).unwrap_or(i64::MAX)])
            .await?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(event_from_row(&row)?);
        }

        Ok(events)
    }

    async fn pause_monitor(&self, monitor_id: Uuid) -> Result<bool> {
        let conn = self.get_conn().await?;
        let updated = conn
            .execute("UPDATE monitors SET is_paused = 1 WHERE id = ?", params![monitor_id.to_string()])
            .await?;
        Ok(updated > 0)
    }
}
