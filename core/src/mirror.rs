use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::docstore::DocumentStore;
use crate::models::{MirrorDocument, Recipe};

/// Collection that holds favorite recipes in every mirror backend.
pub const FAVORITES_COLLECTION: &str = "recipes";

/// Cloud copy of the user's favorite recipes, one document per composite key.
///
/// Implementations: [`LocalMirror`] here, and an HTTP client in the CLI.
#[async_trait]
pub trait FavoritesMirror: Send + Sync {
    /// Whether a document is stored under `key`, whatever its body holds.
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn get(&self, key: &str) -> Result<Option<MirrorDocument>>;
    async fn create(&self, doc: &MirrorDocument) -> Result<()>;
    async fn update(&self, doc: &MirrorDocument) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Documents that parse as [`MirrorDocument`]; malformed ones are skipped.
    async fn list(&self) -> Result<Vec<MirrorDocument>>;
    /// IDs of every stored document, including malformed ones.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// What a reconciliation did to the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorAction {
    Created,
    Updated,
    Deleted,
    Unchanged,
}

/// Bring the mirror document for `recipe` in line with `favorite`.
///
/// | in mirror | favorite | action  |
/// |-----------|----------|---------|
/// | no        | true     | create  |
/// | yes       | true     | update  |
/// | yes       | false    | delete  |
/// | no        | false    | nothing |
///
/// Presence is decided without parsing the stored body, so a malformed
/// document is still deleted, or overwritten field by field on update.
pub async fn reconcile(
    mirror: &dyn FavoritesMirror,
    recipe: &Recipe,
    favorite: bool,
) -> Result<MirrorAction> {
    let key = recipe.composite_key();
    let present = mirror
        .exists(key)
        .await
        .with_context(|| format!("Failed to look up mirror document {key}"))?;

    let action = match (present, favorite) {
        (false, true) => {
            mirror.create(&recipe.to_mirror_document(true)).await?;
            MirrorAction::Created
        }
        (true, true) => {
            mirror.update(&recipe.to_mirror_document(true)).await?;
            MirrorAction::Updated
        }
        (true, false) => {
            mirror.delete(key).await?;
            MirrorAction::Deleted
        }
        (false, false) => MirrorAction::Unchanged,
    };
    tracing::debug!(key, ?action, "mirror reconciled");
    Ok(action)
}

pub fn document_to_fields(doc: &MirrorDocument) -> Result<Map<String, Value>> {
    match serde_json::to_value(doc)? {
        Value::Object(map) => Ok(map),
        _ => bail!("Mirror document did not serialize to an object"),
    }
}

pub fn fields_to_document(fields: Map<String, Value>) -> Result<MirrorDocument> {
    serde_json::from_value(Value::Object(fields)).context("Malformed mirror document")
}

/// Favorites mirror kept in a local [`DocumentStore`].
pub struct LocalMirror {
    store: Arc<Mutex<DocumentStore>>,
}

impl LocalMirror {
    #[must_use]
    pub fn new(store: Arc<Mutex<DocumentStore>>) -> Self {
        Self { store }
    }

    fn with_store<T>(&self, f: impl FnOnce(&DocumentStore) -> Result<T>) -> Result<T> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&store)
    }
}

#[async_trait]
impl FavoritesMirror for LocalMirror {
    async fn exists(&self, key: &str) -> Result<bool> {
        let doc = self.with_store(|s| s.get(FAVORITES_COLLECTION, key))?;
        Ok(doc.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<MirrorDocument>> {
        let doc = self.with_store(|s| s.get(FAVORITES_COLLECTION, key))?;
        doc.map(|d| fields_to_document(d.body)).transpose()
    }

    async fn create(&self, doc: &MirrorDocument) -> Result<()> {
        let fields = document_to_fields(doc)?;
        self.with_store(|s| s.set(FAVORITES_COLLECTION, &doc.composite_key, &fields))?;
        Ok(())
    }

    async fn update(&self, doc: &MirrorDocument) -> Result<()> {
        let fields = document_to_fields(doc)?;
        let merged =
            self.with_store(|s| s.merge(FAVORITES_COLLECTION, &doc.composite_key, &fields))?;
        if merged.is_none() {
            bail!("Mirror document {} no longer exists", doc.composite_key);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.with_store(|s| s.delete(FAVORITES_COLLECTION, key))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<MirrorDocument>> {
        let docs = self.with_store(|s| s.list(FAVORITES_COLLECTION))?;
        Ok(docs
            .into_iter()
            .filter_map(|d| match fields_to_document(d.body) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    tracing::warn!(id = %d.id, "skipping mirror document: {e:#}");
                    None
                }
            })
            .collect())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let docs = self.with_store(|s| s.list(FAVORITES_COLLECTION))?;
        Ok(docs.into_iter().map(|d| d.id).collect())
    }
}
