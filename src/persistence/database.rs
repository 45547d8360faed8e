//! SQLite database implementation for persistent storage

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, error, info};

use crate::core::{CoreParams, InstanceEvent, Settings};

const CORE_PARAMS_KEY: &str = "coreParams";
const SETTINGS_KEY: &str = "settings";

/// File name of the database inside the data directory
pub const DATABASE_FILE: &str = "supervisor.db";

/// One row of the instance history
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub event_type: String,
    pub event_time: String,
    pub details: Option<String>,
}

/// Database wrapper for SQLite operations
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database in `data_dir`, creating the directory if needed
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .context(format!("Failed to create data directory {:?}", data_dir))?;
        Self::open(&data_dir.join(DATABASE_FILE))
    }

    /// Open (or create) a database file and make sure the schema exists
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .context(format!("Failed to open database at {:?}", db_path))?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        info!("Database opened at {:?}", db_path);
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Default location, used before settings are available
    pub fn default_directory() -> Result<PathBuf> {
        Ok(dirs::data_dir()
            .context("Failed to get data directory")?
            .join("LedFx Supervisor"))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Database lock poisoned: {}", e))
    }

    /// Initialize database schema
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            -- Key-value store (launch parameters, settings)
            CREATE TABLE IF NOT EXISTS store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Instance history
            CREATE TABLE IF NOT EXISTS instance_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instance_name TEXT NOT NULL,
                event_type TEXT NOT NULL,
                event_time TEXT NOT NULL,
                details TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_history_instance
                ON instance_history (instance_name);
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    fn read_value(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write_value(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO store (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // === Launch parameters ===

    /// Load launch parameters, falling back to built-in defaults when the
    /// stored value is missing or unreadable
    pub fn load_core_params(&self) -> Result<CoreParams> {
        let Some(json) = self.read_value(CORE_PARAMS_KEY)? else {
            return Ok(CoreParams::default());
        };
        match serde_json::from_str::<CoreParams>(&json) {
            Ok(mut params) => {
                params.ensure_platforms();
                Ok(params)
            }
            Err(e) => {
                error!("Failed to deserialize launch parameters, using defaults: {}", e);
                Ok(CoreParams::default())
            }
        }
    }

    /// Save launch parameters to database
    pub fn save_core_params(&self, params: &CoreParams) -> Result<()> {
        let json = serde_json::to_string(params)?;
        self.write_value(CORE_PARAMS_KEY, &json)
            .context("Failed to save launch parameters")?;
        debug!("Launch parameters saved");
        Ok(())
    }

    // === Settings ===

    /// Load settings from database
    pub fn load_settings(&self) -> Result<Option<Settings>> {
        match self.read_value(SETTINGS_KEY)? {
            Some(json) => {
                let mut settings: Settings =
                    serde_json::from_str(&json).context("Failed to deserialize settings")?;
                settings.validate();
                Ok(Some(settings))
            }
            None => Ok(None),
        }
    }

    /// Save settings to database
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        self.write_value(SETTINGS_KEY, &json)?;
        debug!("Settings saved");
        Ok(())
    }

    // === History ===

    /// Record an instance event
    pub fn record_instance_event(
        &self,
        instance_name: &str,
        event: InstanceEvent,
        details: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO instance_history (instance_name, event_type, event_time, details)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                instance_name,
                event.as_str(),
                chrono::Utc::now().to_rfc3339(),
                details,
            ],
        )?;
        Ok(())
    }

    /// Get instance history, newest first
    #[cfg(test)]
    pub fn get_instance_history(&self, instance_name: &str) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT event_type, event_time, details FROM instance_history WHERE instance_name = ?1 ORDER BY id DESC",
        )?;

        let history = stmt.query_map(params![instance_name], |row| {
            Ok(HistoryEntry {
                event_type: row.get(0)?,
                event_time: row.get(1)?,
                details: row.get(2)?,
            })
        })?;

        let mut result = Vec::new();
        for event in history {
            result.push(event?);
        }

        Ok(result)
    }

    /// Clean up old history entries
    pub fn cleanup_history(&self, retention_days: u32) -> Result<usize> {
        if retention_days == 0 {
            return Ok(0); // Keep forever
        }

        let conn = self.lock()?;
        let cutoff = chrono::Utc::now()
            - chrono::TimeDelta::try_days(retention_days as i64)
                .unwrap_or_else(|| chrono::TimeDelta::days(30));
        let count = conn.execute(
            "DELETE FROM instance_history WHERE event_time < ?1",
            params![cutoff.to_rfc3339()],
        )?;

        debug!("Cleaned up {} old history entries", count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformId;

    fn temp_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path()).unwrap();
        (dir, db)
    }

    #[test]
    fn missing_params_load_as_defaults() {
        let (_dir, db) = temp_db();
        assert_eq!(db.load_core_params().unwrap(), CoreParams::default());
        assert!(db.load_settings().unwrap().is_none());
    }

    #[test]
    fn params_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let mut params = CoreParams::default();
        params.resolve_for_start(
            PlatformId::Linux,
            Some("instance2"),
            Some(8890),
            8889,
            Path::new("/data/.ledfx-cc"),
        );

        {
            let db = Database::new(dir.path()).unwrap();
            db.save_core_params(&params).unwrap();
        }

        let db = Database::new(dir.path()).unwrap();
        assert_eq!(db.load_core_params().unwrap(), params);
    }

    #[test]
    fn corrupt_params_fall_back_to_defaults() {
        let (_dir, db) = temp_db();
        db.write_value(CORE_PARAMS_KEY, "{not json").unwrap();
        assert_eq!(db.load_core_params().unwrap(), CoreParams::default());
    }

    #[test]
    fn settings_round_trip_through_validation() {
        let (_dir, db) = temp_db();
        let settings = Settings {
            poll_interval_ms: 5,
            debug_logging: true,
            ..Default::default()
        };
        db.save_settings(&settings).unwrap();

        let loaded = db.load_settings().unwrap().unwrap();
        assert!(loaded.debug_logging);
        assert_eq!(loaded.poll_interval_ms, 100);
    }

    #[test]
    fn history_is_recorded_per_instance() {
        let (_dir, db) = temp_db();
        db.record_instance_event("instance2", InstanceEvent::Started, Some("pid 42"))
            .unwrap();
        db.record_instance_event("instance2", InstanceEvent::Ready, None)
            .unwrap();
        db.record_instance_event("instance3", InstanceEvent::SpawnFailed, None)
            .unwrap();

        let history = db.get_instance_history("instance2").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].event_type, "ready");
        assert_eq!(history[1].details.as_deref(), Some("pid 42"));

        // Fresh entries are within any retention window
        assert_eq!(db.cleanup_history(1).unwrap(), 0);
        assert_eq!(db.cleanup_history(0).unwrap(), 0);
    }
}
