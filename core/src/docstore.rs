use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Local;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored document: its ID plus a flat JSON object body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub body: Map<String, Value>,
    pub updated_at: String,
}

/// Collections of JSON documents keyed by ID, stored in SQLite.
///
/// This is the backing store for the local favorites mirror and for the
/// document server started by `savor serve`.
pub struct DocumentStore {
    conn: Connection,
}

impl DocumentStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open document store: {}", path.display()))?;
        let store = DocumentStore { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = DocumentStore { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS documents (
                    collection TEXT NOT NULL,
                    id TEXT NOT NULL,
                    body TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (collection, id)
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    fn parse_body(raw: &str) -> Result<Map<String, Value>> {
        match serde_json::from_str(raw).context("Corrupt document body")? {
            Value::Object(map) => Ok(map),
            _ => bail!("Document body is not a JSON object"),
        }
    }

    pub fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, body, updated_at FROM documents WHERE collection = ?1 AND id = ?2",
        )?;
        let mut rows = stmt.query(params![collection, id])?;
        if let Some(row) = rows.next()? {
            let raw: String = row.get(1)?;
            Ok(Some(Document {
                id: row.get(0)?,
                body: Self::parse_body(&raw)?,
                updated_at: row.get(2)?,
            }))
        } else {
            Ok(None)
        }
    }

    pub fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, body, updated_at FROM documents WHERE collection = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, raw, updated_at)| {
                Ok(Document {
                    id,
                    body: Self::parse_body(&raw)?,
                    updated_at,
                })
            })
            .collect()
    }

    /// Create the document, or replace its whole body if it exists.
    pub fn set(&self, collection: &str, id: &str, body: &Map<String, Value>) -> Result<Document> {
        let now = Local::now().to_rfc3339();
        let raw = serde_json::to_string(body)?;
        self.conn.execute(
            "INSERT INTO documents (collection, id, body, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![collection, id, raw, now],
        )?;
        Ok(Document {
            id: id.to_string(),
            body: body.clone(),
            updated_at: now,
        })
    }

    /// Overwrite the given top-level fields of an existing document.
    ///
    /// Returns `None` when the document does not exist.
    pub fn merge(
        &self,
        collection: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> Result<Option<Document>> {
        let Some(mut existing) = self.get(collection, id)? else {
            return Ok(None);
        };
        for (k, v) in fields {
            existing.body.insert(k.clone(), v.clone());
        }
        self.set(collection, id, &existing.body).map(Some)
    }

    pub fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(rows > 0)
    }
}
