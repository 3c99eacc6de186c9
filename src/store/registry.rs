//! SQLite-backed registry of providers and their schemas.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::error::{AppError, Result};
use crate::domain::{EvidenceProvider, EvidenceSchema, PagedResult};

use super::{ProviderRepository, SchemaRepository};

const MIGRATIONS: &str = "
    CREATE TABLE IF NOT EXISTS providers (
        provider_id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        enabled INTEGER NOT NULL,
        api_key_hash TEXT NOT NULL,
        created_timestamp TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS provider_schemas (
        provider_id TEXT NOT NULL REFERENCES providers(provider_id),
        schema_id TEXT NOT NULL,
        PRIMARY KEY (provider_id, schema_id)
    );
    CREATE TABLE IF NOT EXISTS schemas (
        provider_id TEXT NOT NULL,
        schema_id TEXT NOT NULL,
        content TEXT NOT NULL,           -- JSON Schema document
        created_timestamp TEXT NOT NULL,
        expires_at TEXT,                 -- set for ephemeral schemas
        PRIMARY KEY (provider_id, schema_id)
    );
";

/// Provider and schema registry in a single SQLite database
pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRegistry {
    /// Open or create the registry at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        info!(path = %path.display(), "Opened registry");

        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(MIGRATIONS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// Fixed-width timestamps so text comparison orders them correctly
fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn provider_from_row(row: &Row<'_>) -> rusqlite::Result<EvidenceProvider> {
    let created: String = row.get("created_timestamp")?;
    Ok(EvidenceProvider {
        provider_id: row.get("provider_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        enabled: row.get("enabled")?,
        api_key_hash: row.get("api_key_hash")?,
        schema_ids: Vec::new(),
        created_timestamp: parse_timestamp(&created)?,
    })
}

fn schema_ids(conn: &Connection, provider_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT schema_id FROM provider_schemas WHERE provider_id = ?1 ORDER BY rowid",
    )?;
    let ids = stmt
        .query_map(params![provider_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

fn load_provider(conn: &Connection, provider_id: &str) -> rusqlite::Result<Option<EvidenceProvider>> {
    let provider = conn
        .query_row(
            "SELECT * FROM providers WHERE provider_id = ?1",
            params![provider_id],
            provider_from_row,
        )
        .optional()?;

    match provider {
        Some(mut provider) => {
            provider.schema_ids = schema_ids(conn, provider_id)?;
            Ok(Some(provider))
        }
        None => Ok(None),
    }
}

#[async_trait]
impl ProviderRepository for SqliteRegistry {
    async fn get_evidence_provider(&self, provider_id: &str) -> Result<Option<EvidenceProvider>> {
        let conn = self.conn.lock().await;
        Ok(load_provider(&conn, provider_id)?)
    }

    async fn is_valid_provider(&self, provider_id: &str, name: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let taken: i64 = conn.query_row(
            "SELECT COUNT(*) FROM providers WHERE provider_id = ?1 OR name = ?2",
            params![provider_id, name],
            |row| row.get(0),
        )?;
        Ok(taken == 0)
    }

    async fn create_evidence_provider(&self, provider: &EvidenceProvider) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO providers
                (provider_id, name, description, enabled, api_key_hash, created_timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                provider.provider_id,
                provider.name,
                provider.description,
                provider.enabled,
                provider.api_key_hash,
                format_timestamp(provider.created_timestamp),
            ],
        )?;
        for schema_id in &provider.schema_ids {
            tx.execute(
                "INSERT OR IGNORE INTO provider_schemas (provider_id, schema_id) VALUES (?1, ?2)",
                params![provider.provider_id, schema_id],
            )?;
        }

        tx.commit()?;
        debug!(provider_id = %provider.provider_id, "Stored provider");
        Ok(())
    }

    async fn toggle_provider_status(
        &self,
        provider_id: &str,
        enabled: bool,
    ) -> Result<Option<EvidenceProvider>> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE providers SET enabled = ?1 WHERE provider_id = ?2",
            params![enabled, provider_id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(load_provider(&conn, provider_id)?)
    }

    async fn add_schema_id(&self, provider_id: &str, schema_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO provider_schemas (provider_id, schema_id) VALUES (?1, ?2)",
            params![provider_id, schema_id],
        )?;
        Ok(())
    }

    async fn list_evidence_providers(
        &self,
        page_size: usize,
        start_index: usize,
    ) -> Result<PagedResult<EvidenceProvider>> {
        let conn = self.conn.lock().await;

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM providers", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT * FROM providers
             ORDER BY created_timestamp, provider_id
             LIMIT ?1 OFFSET ?2",
        )?;
        let mut items = stmt
            .query_map(
                params![to_sql_int(page_size)?, to_sql_int(start_index)?],
                provider_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for provider in &mut items {
            provider.schema_ids = schema_ids(&conn, &provider.provider_id)?;
        }

        Ok(PagedResult {
            items,
            total: usize::try_from(total).unwrap_or(0),
        })
    }
}

fn to_sql_int(n: usize) -> Result<i64> {
    i64::try_from(n).map_err(|_| AppError::Validation(format!("value out of range: {}", n)))
}

#[async_trait]
impl SchemaRepository for SqliteRegistry {
    async fn get_schema(
        &self,
        provider_id: &str,
        schema_id: &str,
    ) -> Result<Option<EvidenceSchema>> {
        let conn = self.conn.lock().await;
        let schema = conn
            .query_row(
                "SELECT provider_id, schema_id, content, created_timestamp, expires_at
                 FROM schemas WHERE provider_id = ?1 AND schema_id = ?2",
                params![provider_id, schema_id],
                |row| {
                    let content: String = row.get(2)?;
                    let created: String = row.get(3)?;
                    let expires: Option<String> = row.get(4)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        content,
                        parse_timestamp(&created)?,
                        expires.as_deref().map(parse_timestamp).transpose()?,
                    ))
                },
            )
            .optional()?;

        let Some((provider_id, schema_id, content, created_timestamp, expires_at)) = schema else {
            return Ok(None);
        };

        let schema = EvidenceSchema {
            provider_id,
            schema_id,
            content: serde_json::from_str(&content)?,
            created_timestamp,
            expires_at,
        };

        if schema.is_expired(Utc::now()) {
            return Ok(None);
        }
        Ok(Some(schema))
    }

    async fn create_schema(&self, schema: &EvidenceSchema) -> Result<()> {
        let content = serde_json::to_string(&schema.content)?;
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        // An expired ephemeral schema frees its id
        tx.execute(
            "DELETE FROM schemas
             WHERE provider_id = ?1 AND schema_id = ?2
               AND expires_at IS NOT NULL AND expires_at <= ?3",
            params![schema.provider_id, schema.schema_id, format_timestamp(Utc::now())],
        )?;
        tx.execute(
            "INSERT INTO schemas (provider_id, schema_id, content, created_timestamp, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                schema.provider_id,
                schema.schema_id,
                content,
                format_timestamp(schema.created_timestamp),
                schema.expires_at.map(format_timestamp),
            ],
        )?;

        tx.commit()?;
        debug!(
            provider_id = %schema.provider_id,
            schema_id = %schema.schema_id,
            ephemeral = schema.is_ephemeral(),
            "Stored schema"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn provider(id: &str, name: &str) -> EvidenceProvider {
        EvidenceProvider {
            provider_id: id.to_string(),
            name: name.to_string(),
            description: Some("test provider".to_string()),
            enabled: true,
            api_key_hash: "ab".repeat(32),
            schema_ids: Vec::new(),
            created_timestamp: Utc::now(),
        }
    }

    fn schema(id: &str, expires_at: Option<DateTime<Utc>>) -> EvidenceSchema {
        EvidenceSchema {
            provider_id: "p1".to_string(),
            schema_id: id.to_string(),
            content: json!({"type": "object"}),
            created_timestamp: Utc::now(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_provider_lifecycle() {
        let registry = SqliteRegistry::open_in_memory().unwrap();
        assert!(registry.is_valid_provider("p1", "Scanner").await.unwrap());

        registry
            .create_evidence_provider(&provider("p1", "Scanner"))
            .await
            .unwrap();
        assert!(!registry.is_valid_provider("p1", "Other").await.unwrap());
        assert!(!registry.is_valid_provider("p2", "Scanner").await.unwrap());

        registry.add_schema_id("p1", "s1").await.unwrap();
        registry.add_schema_id("p1", "s1").await.unwrap();
        registry.add_schema_id("p1", "s2").await.unwrap();

        let loaded = registry.get_evidence_provider("p1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Scanner");
        assert_eq!(loaded.schema_ids, vec!["s1", "s2"]);

        let disabled = registry
            .toggle_provider_status("p1", false)
            .await
            .unwrap()
            .unwrap();
        assert!(!disabled.enabled);

        assert!(registry
            .toggle_provider_status("missing", true)
            .await
            .unwrap()
            .is_none());
        assert!(registry.get_evidence_provider("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_provider_is_validation_error() {
        let registry = SqliteRegistry::open_in_memory().unwrap();
        registry
            .create_evidence_provider(&provider("p1", "Scanner"))
            .await
            .unwrap();

        let result = registry
            .create_evidence_provider(&provider("p2", "Scanner"))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_provider_listing_window() {
        let registry = SqliteRegistry::open_in_memory().unwrap();
        for i in 0..3 {
            let mut p = provider(&format!("p{}", i), &format!("Provider {}", i));
            p.created_timestamp = Utc::now() + chrono::Duration::seconds(i);
            registry.create_evidence_provider(&p).await.unwrap();
        }

        let page = registry.list_evidence_providers(2, 1).await.unwrap();
        assert_eq!(page.total, 3);
        let ids: Vec<_> = page.items.iter().map(|p| p.provider_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_schema_roundtrip_and_expiry() {
        let registry = SqliteRegistry::open_in_memory().unwrap();

        registry.create_schema(&schema("durable", None)).await.unwrap();
        let loaded = registry.get_schema("p1", "durable").await.unwrap().unwrap();
        assert_eq!(loaded.content, json!({"type": "object"}));
        assert!(loaded.expires_at.is_none());

        let past = Utc::now() - chrono::Duration::seconds(5);
        registry.create_schema(&schema("stale", Some(past))).await.unwrap();
        assert!(registry.get_schema("p1", "stale").await.unwrap().is_none());

        // The expired id can be registered again
        let future = Utc::now() + chrono::Duration::hours(1);
        registry.create_schema(&schema("stale", Some(future))).await.unwrap();
        assert!(registry.get_schema("p1", "stale").await.unwrap().is_some());

        let duplicate = registry.create_schema(&schema("durable", None)).await;
        assert!(matches!(duplicate, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_registry_persists_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("registry.db");

        {
            let registry = SqliteRegistry::open(&path).unwrap();
            registry
                .create_evidence_provider(&provider("p1", "Scanner"))
                .await
                .unwrap();
        }

        let reopened = SqliteRegistry::open(&path).unwrap();
        assert!(reopened.get_evidence_provider("p1").await.unwrap().is_some());
    }
}
