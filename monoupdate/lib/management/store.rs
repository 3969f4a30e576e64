use std::{collections::VecDeque, path::Path};

use sqlx::{Pool, Row, Sqlite};
use tokio::sync::RwLock;

use crate::{config::Schedule, update::UpdateRecord, MonoupdateResult};

use super::get_or_create_db_pool;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The settings key holding the schedules document.
pub const UPDATE_SCHEDULES_KEY: &str = "updateSchedules";

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Persistent settings and history owned outside the engine.
#[async_trait::async_trait]
pub trait ConfigStore: Send + Sync {
    /// Returns the configured update schedules. No document means no schedules.
    async fn get_update_schedules(&self) -> MonoupdateResult<Vec<Schedule>>;

    /// Replaces the update schedules.
    async fn set_update_schedules(&self, schedules: &[Schedule]) -> MonoupdateResult<()>;

    /// Appends a terminal record, keeping at most `capacity` records.
    async fn append_update_record(
        &self,
        record: &UpdateRecord,
        capacity: usize,
    ) -> MonoupdateResult<()>;

    /// Returns up to `limit` of the most recent records, oldest first.
    async fn load_update_history(&self, limit: usize) -> MonoupdateResult<Vec<UpdateRecord>>;
}

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// In-memory [`ConfigStore`]. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    schedules: RwLock<Vec<Schedule>>,
    history: RwLock<VecDeque<UpdateRecord>>,
}

/// [`ConfigStore`] backed by a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteConfigStore {
    pool: Pool<Sqlite>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MemoryConfigStore {
    /// Creates a store holding `schedules`.
    pub fn with_schedules(schedules: Vec<Schedule>) -> Self {
        Self {
            schedules: RwLock::new(schedules),
            history: RwLock::default(),
        }
    }
}

impl SqliteConfigStore {
    /// Opens the database at `db_path`, creating and migrating it when needed.
    pub async fn open(db_path: impl AsRef<Path>) -> MonoupdateResult<Self> {
        let pool = get_or_create_db_pool(db_path).await?;
        Ok(Self { pool })
    }

    /// Wraps an already migrated pool.
    pub fn with_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait::async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get_update_schedules(&self) -> MonoupdateResult<Vec<Schedule>> {
        Ok(self.schedules.read().await.clone())
    }

    async fn set_update_schedules(&self, schedules: &[Schedule]) -> MonoupdateResult<()> {
        *self.schedules.write().await = schedules.to_vec();
        Ok(())
    }

    async fn append_update_record(
        &self,
        record: &UpdateRecord,
        capacity: usize,
    ) -> MonoupdateResult<()> {
        let mut history = self.history.write().await;
        history.push_back(record.clone());
        while history.len() > capacity {
            history.pop_front();
        }
        Ok(())
    }

    async fn load_update_history(&self, limit: usize) -> MonoupdateResult<Vec<UpdateRecord>> {
        let history = self.history.read().await;
        let skip = history.len().saturating_sub(limit);
        Ok(history.iter().skip(skip).cloned().collect())
    }
}

#[async_trait::async_trait]
impl ConfigStore for SqliteConfigStore {
    async fn get_update_schedules(&self) -> MonoupdateResult<Vec<Schedule>> {
        let row = sqlx::query("SELECT value_json FROM settings WHERE key = ?")
            .bind(UPDATE_SCHEDULES_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(serde_json::from_str(&row.get::<String, _>("value_json"))?),
            None => Ok(Vec::new()),
        }
    }

    async fn set_update_schedules(&self, schedules: &[Schedule]) -> MonoupdateResult<()> {
        let value_json = serde_json::to_string(schedules)?;
        sqlx::query(
            r#"
            INSERT INTO settings (key, value_json, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET
                value_json = excluded.value_json,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(UPDATE_SCHEDULES_KEY)
        .bind(value_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_update_record(
        &self,
        record: &UpdateRecord,
        capacity: usize,
    ) -> MonoupdateResult<()> {
        let record_json = serde_json::to_string(record)?;
        let status = serde_json::to_value(record.status)?
            .as_str()
            .unwrap_or_default()
            .to_string();
        let capacity = i64::try_from(capacity).unwrap_or(i64::MAX);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO update_history (record_id, image, status, record_json)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(record_id) DO UPDATE SET
                status = excluded.status,
                record_json = excluded.record_json
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.image)
        .bind(status)
        .bind(record_json)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM update_history
            WHERE id NOT IN (
                SELECT id FROM update_history ORDER BY id DESC LIMIT ?
            )
            "#,
        )
        .bind(capacity)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn load_update_history(&self, limit: usize) -> MonoupdateResult<Vec<UpdateRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT record_json FROM (
                SELECT id, record_json FROM update_history ORDER BY id DESC LIMIT ?
            ) ORDER BY id ASC
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let json = row.get::<String, _>("record_json");
            match serde_json::from_str(&json) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(error = %e, "skipping unreadable update record"),
            }
        }

        Ok(records)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{config::ScheduleMode, update::UpdateStatus};

    fn schedule(id: &str) -> Schedule {
        Schedule::builder()
            .id(id)
            .name("nightly")
            .cron_expression("0 3 * * *")
            .mode(ScheduleMode::Minor)
            .excluded_images(vec!["postgres".to_string()])
            .build()
    }

    fn completed(image: &str) -> UpdateRecord {
        let mut record = UpdateRecord::new(image);
        record.advance(UpdateStatus::Completed);
        record
    }

    async fn exercise_store(store: &dyn ConfigStore) -> anyhow::Result<()> {
        assert!(store.get_update_schedules().await?.is_empty());

        store
            .set_update_schedules(&[schedule("a"), schedule("b")])
            .await?;
        store.set_update_schedules(&[schedule("c")]).await?;
        let schedules = store.get_update_schedules().await?;
        assert_eq!(schedules, vec![schedule("c")]);

        for idx in 0..5 {
            store
                .append_update_record(&completed(&format!("app{idx}:latest")), 3)
                .await?;
        }

        let history = store.load_update_history(10).await?;
        let images: Vec<_> = history.iter().map(|r| r.image.as_str()).collect();
        assert_eq!(images, vec!["app2:latest", "app3:latest", "app4:latest"]);

        let latest = store.load_update_history(1).await?;
        assert_eq!(latest[0].image, "app4:latest");

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_memory_config_store() -> anyhow::Result<()> {
        exercise_store(&MemoryConfigStore::default()).await
    }

    #[test_log::test(tokio::test)]
    async fn test_sqlite_config_store() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("monoupdate.db");

        let store = SqliteConfigStore::open(&db_path).await?;
        exercise_store(&store).await?;

        // Reopening sees the same data.
        let reopened = SqliteConfigStore::open(&db_path).await?;
        assert_eq!(reopened.get_update_schedules().await?, vec![schedule("c")]);
        assert_eq!(reopened.load_update_history(10).await?.len(), 3);

        Ok(())
    }
}
