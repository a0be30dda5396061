use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::types::Type;
use rusqlite::{Connection, params};

use crate::models::Recipe;

const RECIPE_COLUMNS: &str = "composite_key, label, calories, total_time, health_labels, image, ingredient_lines, url, is_favorite";

/// Local recipe cache, keyed by composite key.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS recipes (
                    composite_key TEXT PRIMARY KEY NOT NULL,
                    label TEXT,
                    calories REAL,
                    total_time REAL,
                    health_labels TEXT,
                    image TEXT,
                    ingredient_lines TEXT,
                    url TEXT,
                    is_favorite INTEGER NOT NULL DEFAULT 0,
                    cached_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_recipes_label ON recipes(label);
                CREATE INDEX IF NOT EXISTS idx_recipes_favorite ON recipes(is_favorite);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn list_to_sql(list: Option<&Vec<String>>) -> Result<Option<String>> {
        list.map(serde_json::to_string)
            .transpose()
            .context("Failed to encode list column")
    }

    fn list_from_sql(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<Vec<String>>> {
        let raw: Option<String> = row.get(idx)?;
        raw.map(|s| {
            serde_json::from_str(&s)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        })
        .transpose()
    }

    // Expects RECIPE_COLUMNS order.
    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        let mut recipe = Recipe::with_key(row.get(0)?);
        recipe.label = row.get(1)?;
        recipe.calories = row.get(2)?;
        recipe.total_time = row.get(3)?;
        recipe.health_labels = Self::list_from_sql(row, 4)?;
        recipe.image = row.get(5)?;
        recipe.ingredient_lines = Self::list_from_sql(row, 6)?;
        recipe.url = row.get(7)?;
        recipe.is_favorite = row.get(8)?;
        Ok(recipe)
    }

    // --- Recipes ---

    /// Insert or replace every record by composite key, in one transaction.
    ///
    /// A record that already exists keeps its stored favorite flag; every
    /// other column takes the incoming value.
    pub fn upsert_all(&self, recipes: &[Recipe]) -> Result<usize> {
        let now = Local::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO recipes (composite_key, label, calories, total_time, health_labels, image, ingredient_lines, url, is_favorite, cached_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                 ON CONFLICT(composite_key) DO UPDATE SET
                    label = excluded.label,
                    calories = excluded.calories,
                    total_time = excluded.total_time,
                    health_labels = excluded.health_labels,
                    image = excluded.image,
                    ingredient_lines = excluded.ingredient_lines,
                    url = excluded.url,
                    cached_at = excluded.cached_at",
            )?;
            for recipe in recipes {
                stmt.execute(params![
                    recipe.composite_key(),
                    recipe.label,
                    recipe.calories,
                    recipe.total_time,
                    Self::list_to_sql(recipe.health_labels.as_ref())?,
                    recipe.image,
                    Self::list_to_sql(recipe.ingredient_lines.as_ref())?,
                    recipe.url,
                    recipe.is_favorite,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(recipes.len())
    }

    pub fn get_by_key(&self, key: &str) -> Result<Option<Recipe>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE composite_key = ?1"
        ))?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::recipe_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Overwrite a cached record, favorite flag included.
    ///
    /// Returns `false` when no record with this key exists; nothing is written.
    pub fn update(&self, recipe: &Recipe) -> Result<bool> {
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE recipes SET label = ?2, calories = ?3, total_time = ?4, health_labels = ?5,
                image = ?6, ingredient_lines = ?7, url = ?8, is_favorite = ?9, updated_at = ?10
             WHERE composite_key = ?1",
            params![
                recipe.composite_key(),
                recipe.label,
                recipe.calories,
                recipe.total_time,
                Self::list_to_sql(recipe.health_labels.as_ref())?,
                recipe.image,
                Self::list_to_sql(recipe.ingredient_lines.as_ref())?,
                recipe.url,
                recipe.is_favorite,
                now,
            ],
        )?;
        Ok(rows > 0)
    }

    pub fn list_favorites(&self) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE is_favorite = 1 ORDER BY label"
        ))?;
        let recipes = stmt
            .query_map([], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    pub fn search_local(&self, query: &str) -> Result<Vec<Recipe>> {
        let escaped = query
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{escaped}%");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE label LIKE ?1 ESCAPE '\\' ORDER BY label LIMIT 50"
        ))?;
        let recipes = stmt
            .query_map(params![pattern], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    pub fn count(&self) -> Result<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM recipes", [], |row| row.get(0))?;
        Ok(n)
    }

    /// Stored favorite flag for each key that exists in the cache.
    pub fn favorite_flags(&self, keys: &[&str]) -> Result<HashMap<String, bool>> {
        let mut stmt = self
            .conn
            .prepare("SELECT is_favorite FROM recipes WHERE composite_key = ?1")?;
        let mut flags = HashMap::new();
        for key in keys {
            let mut rows = stmt.query(params![key])?;
            if let Some(row) = rows.next()? {
                flags.insert((*key).to_string(), row.get(0)?);
            }
        }
        Ok(flags)
    }
}
