//! Recipe sync coordinator.
//!
//! Owns the flow between the remote catalog, the local cache, the view
//! state and the favorites mirror. The cache is authoritative for favorite
//! status; the mirror is a projection of it, written in the background.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::catalog::{CatalogQuery, FEATURED_QUERY, RecipeCatalog};
use crate::db::Database;
use crate::edamam::{RecipePayload, payload_to_recipe};
use crate::error::SyncError;
use crate::mirror::{FavoritesMirror, MirrorAction, reconcile};
use crate::models::{HealthFilter, Recipe, RecipeEdit};
use crate::state::PresentationState;
use crate::tasks::BackgroundTasks;

/// Recipes shown after a fetch, plus the pending cache write.
pub struct Ingested {
    pub recipes: Vec<Recipe>,
    pub persisted: JoinHandle<Result<usize, SyncError>>,
}

pub struct FavoriteToggle {
    pub key: String,
    pub is_favorite: bool,
    pub mirrored: JoinHandle<Result<MirrorAction, SyncError>>,
}

pub struct RecipeEdited {
    pub recipe: Recipe,
    /// Present when the recipe is a favorite and its mirror document is being refreshed.
    pub mirrored: Option<JoinHandle<Result<MirrorAction, SyncError>>>,
}

/// Comparison of cached favorites against mirror documents.
#[derive(Debug, Default, Serialize)]
pub struct MirrorStatus {
    pub in_sync: Vec<String>,
    /// Favorite in the cache, no document in the mirror.
    pub missing: Vec<String>,
    /// Document in the mirror that is not a favorite in the cache, or whose
    /// body no longer parses.
    pub stale: Vec<String>,
}

impl MirrorStatus {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.stale.is_empty()
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ResyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
}

type KeyLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

pub struct SyncCoordinator {
    db: Arc<Mutex<Database>>,
    catalog: Arc<dyn RecipeCatalog>,
    mirror: Arc<dyn FavoritesMirror>,
    state: Arc<PresentationState>,
    tasks: BackgroundTasks,
    key_locks: Arc<KeyLocks>,
}

impl SyncCoordinator {
    #[must_use]
    pub fn new(
        db: Arc<Mutex<Database>>,
        catalog: Arc<dyn RecipeCatalog>,
        mirror: Arc<dyn FavoritesMirror>,
        state: Arc<PresentationState>,
        tasks: BackgroundTasks,
    ) -> Self {
        Self {
            db,
            catalog,
            mirror,
            state,
            tasks,
            key_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn state(&self) -> &Arc<PresentationState> {
        &self.state
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    // --- Catalog ---

    /// Show `payloads` as the current results and queue them for caching.
    ///
    /// Must be called inside a tokio runtime.
    pub fn ingest_search_results(&self, payloads: Vec<RecipePayload>) -> Ingested {
        self.ingest(payloads.into_iter().map(payload_to_recipe).collect())
    }

    fn ingest(&self, recipes: Vec<Recipe>) -> Ingested {
        self.state.set_results(recipes.clone());

        let db = Arc::clone(&self.db);
        let state = Arc::clone(&self.state);
        let batch = recipes.clone();
        let persisted = self.tasks.spawn(async move {
            let result = persist_results(&db, &state, &batch);
            match &result {
                Ok(n) => tracing::debug!(count = n, "cached search results"),
                Err(e) => tracing::warn!("failed to cache search results: {e}"),
            }
            result
        });

        Ingested { recipes, persisted }
    }

    pub async fn search(&self, term: &str, filter: HealthFilter) -> Result<Ingested, SyncError> {
        self.state.set_search_term(term);
        self.fetch(&CatalogQuery::new(term, filter)).await
    }

    pub async fn refresh_featured(&self) -> Result<Ingested, SyncError> {
        self.fetch(&CatalogQuery::new(FEATURED_QUERY, HealthFilter::All))
            .await
    }

    async fn fetch(&self, query: &CatalogQuery) -> Result<Ingested, SyncError> {
        tracing::info!(term = %query.term, filter = %query.filter, "searching recipe catalog");
        match self.catalog.search(query).await {
            Ok(data) => {
                tracing::info!(hits = data.hits.len(), total = data.count, "catalog responded");
                Ok(self.ingest(data.into_recipes()))
            }
            Err(e) => {
                tracing::error!("recipe catalog request failed: {e:#}");
                Err(SyncError::Catalog(e))
            }
        }
    }

    // --- Cache reads ---

    pub fn get_recipe(&self, key: &str) -> Result<Recipe, SyncError> {
        self.db()
            .get_by_key(key)
            .map_err(SyncError::Cache)?
            .ok_or_else(|| SyncError::NotFound(key.to_string()))
    }

    pub fn saved_recipes(&self) -> Result<Vec<Recipe>, SyncError> {
        self.db().list_favorites().map_err(SyncError::Cache)
    }

    pub fn search_cached(&self, query: &str) -> Result<Vec<Recipe>, SyncError> {
        self.db().search_local(query).map_err(SyncError::Cache)
    }

    // --- Favorites ---

    /// Flip the cached favorite flag and queue a mirror reconciliation.
    ///
    /// Must be called inside a tokio runtime.
    pub fn toggle_favorite(&self, key: &str) -> Result<FavoriteToggle, SyncError> {
        let recipe = {
            let db = self.db();
            let mut recipe = db
                .get_by_key(key)
                .map_err(SyncError::Cache)?
                .ok_or_else(|| SyncError::NotFound(key.to_string()))?;
            recipe.is_favorite = !recipe.is_favorite;
            if !db.update(&recipe).map_err(SyncError::Cache)? {
                return Err(SyncError::NotFound(key.to_string()));
            }
            recipe
        };

        self.state.set_favorite(key, recipe.is_favorite);
        tracing::info!(key, favorite = recipe.is_favorite, "favorite toggled");

        Ok(FavoriteToggle {
            key: key.to_string(),
            is_favorite: recipe.is_favorite,
            mirrored: self.spawn_reconcile(key),
        })
    }

    /// Apply `edit` to a cached recipe. Favorites also get their mirror
    /// document refreshed.
    ///
    /// Must be called inside a tokio runtime.
    pub fn edit_recipe(&self, key: &str, edit: &RecipeEdit) -> Result<RecipeEdited, SyncError> {
        let recipe = {
            let db = self.db();
            let mut recipe = db
                .get_by_key(key)
                .map_err(SyncError::Cache)?
                .ok_or_else(|| SyncError::NotFound(key.to_string()))?;
            recipe.apply_edit(edit);
            if !db.update(&recipe).map_err(SyncError::Cache)? {
                return Err(SyncError::NotFound(key.to_string()));
            }
            recipe
        };

        self.state.replace_result(&recipe);
        tracing::info!(key, "recipe edited");

        let mirrored = recipe.is_favorite.then(|| self.spawn_reconcile(key));
        Ok(RecipeEdited { recipe, mirrored })
    }

    /// Queue a reconciliation of `key` against whatever the cache holds when
    /// the task runs. Tasks for the same key run one at a time, so the mirror
    /// ends up matching the latest cached flag even if toggles race.
    fn spawn_reconcile(&self, key: &str) -> JoinHandle<Result<MirrorAction, SyncError>> {
        let key = key.to_string();
        let db = Arc::clone(&self.db);
        let mirror = Arc::clone(&self.mirror);
        let key_locks = Arc::clone(&self.key_locks);
        let lock = self.key_lock(&key);

        self.tasks.spawn(async move {
            let result = {
                let _guard = lock.lock().await;
                reconcile_cached(&db, mirror.as_ref(), &key).await
            };
            release_key_lock(&key_locks, &key, lock);

            if let Err(e) = &result {
                tracing::warn!(key = %key, "mirror reconciliation failed: {e}");
            }
            result
        })
    }

    // --- Mirror maintenance ---

    pub async fn mirror_status(&self) -> Result<MirrorStatus, SyncError> {
        let favorites: BTreeSet<String> = self
            .saved_recipes()?
            .into_iter()
            .map(|r| r.composite_key().to_string())
            .collect();
        let stored: BTreeSet<String> = self
            .mirror
            .keys()
            .await
            .map_err(SyncError::Mirror)?
            .into_iter()
            .collect();
        let readable: BTreeSet<String> = self
            .mirror
            .list()
            .await
            .map_err(SyncError::Mirror)?
            .into_iter()
            .map(|d| d.composite_key)
            .collect();

        let (in_sync, malformed): (Vec<String>, Vec<String>) = favorites
            .intersection(&stored)
            .cloned()
            .partition(|key| readable.contains(key));
        let mut stale: BTreeSet<String> = stored.difference(&favorites).cloned().collect();
        stale.extend(malformed);

        Ok(MirrorStatus {
            in_sync,
            missing: favorites.difference(&stored).cloned().collect(),
            stale: stale.into_iter().collect(),
        })
    }

    /// Reconcile every cached favorite and every mirror document.
    pub async fn resync_mirror(&self) -> Result<ResyncReport, SyncError> {
        let mut keys: BTreeSet<String> = self
            .saved_recipes()?
            .into_iter()
            .map(|r| r.composite_key().to_string())
            .collect();
        keys.extend(self.mirror.keys().await.map_err(SyncError::Mirror)?);

        let handles: Vec<_> = keys.iter().map(|key| self.spawn_reconcile(key)).collect();

        let mut report = ResyncReport::default();
        for handle in handles {
            match handle.await? {
                Ok(MirrorAction::Created) => report.created += 1,
                Ok(MirrorAction::Updated) => report.updated += 1,
                Ok(MirrorAction::Deleted) => report.deleted += 1,
                Ok(MirrorAction::Unchanged) => report.unchanged += 1,
                Err(_) => report.failed += 1,
            }
        }
        tracing::info!(?report, "mirror resync finished");
        Ok(report)
    }

    // --- Lifecycle ---

    /// Wait for every queued cache and mirror write.
    pub async fn drain(&self) {
        self.tasks.drain().await;
    }

    /// Wait for queued background work before the process exits.
    pub async fn shutdown(&self) {
        self.tasks.shutdown().await;
    }
}

/// Reconcile `key` against the flag the cache holds right now.
async fn reconcile_cached(
    db: &Mutex<Database>,
    mirror: &dyn FavoritesMirror,
    key: &str,
) -> Result<MirrorAction, SyncError> {
    let current = db
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get_by_key(key)
        .map_err(SyncError::Cache)?;

    let result = match current {
        Some(recipe) => {
            let favorite = recipe.is_favorite;
            reconcile(mirror, &recipe, favorite).await
        }
        // Not cached means not a favorite: drop any leftover document.
        None => reconcile(mirror, &Recipe::with_key(key.to_string()), false).await,
    };
    result.map_err(SyncError::Mirror)
}

/// Drop the map entry for `key` unless another task still holds its lock.
fn release_key_lock(locks: &KeyLocks, key: &str, lock: Arc<tokio::sync::Mutex<()>>) {
    let mut locks = locks.lock().unwrap_or_else(PoisonError::into_inner);
    let idle = Arc::strong_count(&lock) == 2
        && locks.get(key).is_some_and(|held| Arc::ptr_eq(held, &lock));
    if idle {
        locks.remove(key);
    }
    // Release our reference while the map is still locked, so a concurrent
    // release never counts it.
    drop(lock);
}

fn persist_results(
    db: &Mutex<Database>,
    state: &PresentationState,
    recipes: &[Recipe],
) -> Result<usize, SyncError> {
    let keys: Vec<&str> = recipes.iter().map(Recipe::composite_key).collect();
    let (count, flags) = {
        let db = db.lock().unwrap_or_else(PoisonError::into_inner);
        let count = db.upsert_all(recipes).map_err(SyncError::Cache)?;
        let flags = db.favorite_flags(&keys).map_err(SyncError::Cache)?;
        (count, flags)
    };
    state.merge_favorites(flags);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::DocumentStore;
    use crate::edamam::RecipeData;
    use crate::identity::composite_key;
    use crate::mirror::{FAVORITES_COLLECTION, LocalMirror, document_to_fields};
    use crate::models::MirrorDocument;
    use anyhow::{Result, bail};
    use async_trait::async_trait;

    const CHICKEN: &str = r#"{
        "count": 1, "from": 1, "to": 1,
        "hits": [
            { "recipe": { "label": "Chicken Soup", "url": "http://x/1", "calories": 850.0,
                          "ingredientLines": ["1 chicken"] } }
        ]
    }"#;

    /// Catalog that answers every query with the same body, or fails.
    struct StubCatalog {
        body: Option<&'static str>,
        queries: Mutex<Vec<CatalogQuery>>,
    }

    impl StubCatalog {
        fn ok(body: &'static str) -> Self {
            Self {
                body: Some(body),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                body: None,
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RecipeCatalog for StubCatalog {
        async fn search(&self, query: &CatalogQuery) -> Result<RecipeData> {
            self.queries.lock().unwrap().push(query.clone());
            match self.body {
                Some(body) => Ok(serde_json::from_str(body)?),
                None => bail!("Edamam returned 401 Unauthorized: bad app_key"),
            }
        }
    }

    struct DownMirror;

    #[async_trait]
    impl FavoritesMirror for DownMirror {
        async fn exists(&self, _key: &str) -> Result<bool> {
            bail!("connection refused")
        }
        async fn get(&self, _key: &str) -> Result<Option<MirrorDocument>> {
            bail!("connection refused")
        }
        async fn create(&self, _doc: &MirrorDocument) -> Result<()> {
            bail!("connection refused")
        }
        async fn update(&self, _doc: &MirrorDocument) -> Result<()> {
            bail!("connection refused")
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            bail!("connection refused")
        }
        async fn list(&self) -> Result<Vec<MirrorDocument>> {
            bail!("connection refused")
        }
        async fn keys(&self) -> Result<Vec<String>> {
            bail!("connection refused")
        }
    }

    struct Harness {
        coordinator: SyncCoordinator,
        db: Arc<Mutex<Database>>,
        mirror: Arc<LocalMirror>,
        store: Arc<Mutex<DocumentStore>>,
        catalog: Arc<StubCatalog>,
    }

    fn harness(catalog: StubCatalog) -> Harness {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let store = Arc::new(Mutex::new(DocumentStore::open_in_memory().unwrap()));
        let mirror = Arc::new(LocalMirror::new(Arc::clone(&store)));
        let catalog = Arc::new(catalog);
        let coordinator = SyncCoordinator::new(
            Arc::clone(&db),
            Arc::clone(&catalog) as Arc<dyn RecipeCatalog>,
            Arc::clone(&mirror) as Arc<dyn FavoritesMirror>,
            Arc::new(PresentationState::new()),
            BackgroundTasks::default(),
        );
        Harness {
            coordinator,
            db,
            mirror,
            store,
            catalog,
        }
    }

    fn soup_key() -> String {
        composite_key(Some("Chicken Soup"), Some("http://x/1"))
    }

    async fn searched(h: &Harness) {
        let ingested = h
            .coordinator
            .search("chicken", HealthFilter::All)
            .await
            .unwrap();
        ingested.persisted.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_search_caches_results() {
        let h = harness(StubCatalog::ok(CHICKEN));
        let ingested = h
            .coordinator
            .search("chicken", HealthFilter::All)
            .await
            .unwrap();
        assert_eq!(ingested.recipes.len(), 1);
        assert_eq!(ingested.persisted.await.unwrap().unwrap(), 1);

        let db = h.db.lock().unwrap();
        assert_eq!(db.count().unwrap(), 1);
        let cached = db.get_by_key(&soup_key()).unwrap().unwrap();
        assert!(!cached.is_favorite);

        let state = h.coordinator.state();
        assert_eq!(state.search_term(), "chicken");
        assert_eq!(state.results().len(), 1);
        assert_eq!(state.is_favorite(&soup_key()), Some(false));
    }

    #[tokio::test]
    async fn test_search_passes_term_and_filter() {
        let h = harness(StubCatalog::ok(CHICKEN));
        h.coordinator
            .search("soup", HealthFilter::Paleo)
            .await
            .unwrap();
        let queries = h.catalog.queries.lock().unwrap();
        assert_eq!(queries[0], CatalogQuery::new("soup", HealthFilter::Paleo));
    }

    #[tokio::test]
    async fn test_research_does_not_duplicate() {
        let h = harness(StubCatalog::ok(CHICKEN));
        searched(&h).await;
        searched(&h).await;
        assert_eq!(h.db.lock().unwrap().count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_research_keeps_favorite() {
        let h = harness(StubCatalog::ok(CHICKEN));
        searched(&h).await;
        let toggle = h.coordinator.toggle_favorite(&soup_key()).unwrap();
        toggle.mirrored.await.unwrap().unwrap();

        searched(&h).await;
        let cached = h.coordinator.get_recipe(&soup_key()).unwrap();
        assert!(cached.is_favorite);
        assert_eq!(h.coordinator.state().is_favorite(&soup_key()), Some(true));
    }

    #[tokio::test]
    async fn test_research_shows_cached_favorite_in_results() {
        let h = harness(StubCatalog::ok(CHICKEN));
        searched(&h).await;
        let toggle = h.coordinator.toggle_favorite(&soup_key()).unwrap();
        assert!(h.coordinator.state().results()[0].is_favorite);
        toggle.mirrored.await.unwrap().unwrap();

        let ingested = h
            .coordinator
            .search("chicken", HealthFilter::All)
            .await
            .unwrap();
        // Fresh payloads carry no flag until the cache has been consulted
        assert!(!ingested.recipes[0].is_favorite);
        ingested.persisted.await.unwrap().unwrap();

        let results = h.coordinator.state().results();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_favorite);
    }

    #[tokio::test]
    async fn test_search_failure_leaves_state() {
        let h = harness(StubCatalog::failing());
        h.coordinator.state().set_results(vec![Recipe::new(
            Some("Old".to_string()),
            None,
        )]);

        let err = h
            .coordinator
            .search("chicken", HealthFilter::All)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::Catalog(_)));
        assert!(err.to_string().contains("401"));
        let results = h.coordinator.state().results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].label.as_deref(), Some("Old"));
        assert_eq!(h.db.lock().unwrap().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_refresh_featured_uses_featured_query() {
        let h = harness(StubCatalog::ok(CHICKEN));
        let ingested = h.coordinator.refresh_featured().await.unwrap();
        ingested.persisted.await.unwrap().unwrap();
        let queries = h.catalog.queries.lock().unwrap();
        assert_eq!(queries[0].term, FEATURED_QUERY);
        // Featured refresh does not touch the search box
        assert_eq!(h.coordinator.state().search_term(), "");
    }

    #[tokio::test]
    async fn test_toggle_creates_mirror_document() {
        let h = harness(StubCatalog::ok(CHICKEN));
        searched(&h).await;

        let toggle = h.coordinator.toggle_favorite(&soup_key()).unwrap();
        assert!(toggle.is_favorite);
        assert_eq!(toggle.mirrored.await.unwrap().unwrap(), MirrorAction::Created);

        assert!(h.coordinator.get_recipe(&soup_key()).unwrap().is_favorite);
        let doc = h.mirror.get(&soup_key()).await.unwrap().unwrap();
        assert!(doc.is_favorite);
        assert_eq!(doc.label.as_deref(), Some("Chicken Soup"));
        assert_eq!(h.mirror.list().await.unwrap().len(), 1);
        assert_eq!(h.coordinator.state().is_favorite(&soup_key()), Some(true));
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_state() {
        let h = harness(StubCatalog::ok(CHICKEN));
        searched(&h).await;

        let first = h.coordinator.toggle_favorite(&soup_key()).unwrap();
        assert_eq!(first.mirrored.await.unwrap().unwrap(), MirrorAction::Created);
        let second = h.coordinator.toggle_favorite(&soup_key()).unwrap();
        assert!(!second.is_favorite);
        assert_eq!(second.mirrored.await.unwrap().unwrap(), MirrorAction::Deleted);

        assert!(!h.coordinator.get_recipe(&soup_key()).unwrap().is_favorite);
        assert!(h.mirror.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rapid_toggles_converge() {
        let h = harness(StubCatalog::ok(CHICKEN));
        searched(&h).await;

        for _ in 0..3 {
            h.coordinator.toggle_favorite(&soup_key()).unwrap();
        }
        h.coordinator.drain().await;

        // Odd number of toggles: favorite, and mirrored exactly once
        assert!(h.coordinator.get_recipe(&soup_key()).unwrap().is_favorite);
        assert_eq!(h.mirror.list().await.unwrap().len(), 1);

        h.coordinator.toggle_favorite(&soup_key()).unwrap();
        h.coordinator.drain().await;
        assert!(h.mirror.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_missing_key_is_not_found() {
        let h = harness(StubCatalog::ok(CHICKEN));
        let err = h.coordinator.toggle_favorite("ghost_null").err().unwrap();
        assert!(matches!(err, SyncError::NotFound(ref k) if k == "ghost_null"));
        assert!(h.coordinator.state().favorites().is_empty());
    }

    #[tokio::test]
    async fn test_mirror_failure_keeps_cache() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let coordinator = SyncCoordinator::new(
            Arc::clone(&db),
            Arc::new(StubCatalog::ok(CHICKEN)),
            Arc::new(DownMirror),
            Arc::new(PresentationState::new()),
            BackgroundTasks::default(),
        );
        let ingested = coordinator.search("chicken", HealthFilter::All).await.unwrap();
        ingested.persisted.await.unwrap().unwrap();

        let toggle = coordinator.toggle_favorite(&soup_key()).unwrap();
        let err = toggle.mirrored.await.unwrap().unwrap_err();
        assert!(matches!(err, SyncError::Mirror(_)));
        // No compensation: the cache keeps the new flag
        assert!(coordinator.get_recipe(&soup_key()).unwrap().is_favorite);
    }

    #[tokio::test]
    async fn test_edit_favorite_refreshes_mirror() {
        let h = harness(StubCatalog::ok(CHICKEN));
        searched(&h).await;
        let toggle = h.coordinator.toggle_favorite(&soup_key()).unwrap();
        toggle.mirrored.await.unwrap().unwrap();

        let edited = h
            .coordinator
            .edit_recipe(
                &soup_key(),
                &RecipeEdit {
                    label: Some("Sunday Soup".to_string()),
                    total_time: Some(75.0),
                    ..RecipeEdit::default()
                },
            )
            .unwrap();
        assert_eq!(edited.recipe.composite_key(), soup_key());
        let action = edited.mirrored.unwrap().await.unwrap().unwrap();
        assert_eq!(action, MirrorAction::Updated);

        let doc = h.mirror.get(&soup_key()).await.unwrap().unwrap();
        assert_eq!(doc.label.as_deref(), Some("Sunday Soup"));
        assert_eq!(doc.total_time, Some(75.0));
        let shown = h.coordinator.state().results();
        assert_eq!(shown[0].label.as_deref(), Some("Sunday Soup"));
    }

    #[tokio::test]
    async fn test_edit_non_favorite_skips_mirror() {
        let h = harness(StubCatalog::ok(CHICKEN));
        searched(&h).await;
        let edited = h
            .coordinator
            .edit_recipe(
                &soup_key(),
                &RecipeEdit {
                    calories: Some(10.0),
                    ..RecipeEdit::default()
                },
            )
            .unwrap();
        assert!(edited.mirrored.is_none());
        assert_eq!(
            h.coordinator.get_recipe(&soup_key()).unwrap().calories,
            Some(10.0)
        );
        assert!(h.mirror.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_missing_key_is_not_found() {
        let h = harness(StubCatalog::ok(CHICKEN));
        let err = h
            .coordinator
            .edit_recipe("ghost_null", &RecipeEdit::default())
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_saved_recipes() {
        let h = harness(StubCatalog::ok(CHICKEN));
        searched(&h).await;
        assert!(h.coordinator.saved_recipes().unwrap().is_empty());
        h.coordinator.toggle_favorite(&soup_key()).unwrap();
        h.coordinator.drain().await;
        let saved = h.coordinator.saved_recipes().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].composite_key(), soup_key());
    }

    #[tokio::test]
    async fn test_mirror_status_and_resync() {
        let h = harness(StubCatalog::ok(CHICKEN));
        searched(&h).await;

        // Favorite in the cache without going through the coordinator
        {
            let db = h.db.lock().unwrap();
            let mut r = db.get_by_key(&soup_key()).unwrap().unwrap();
            r.is_favorite = true;
            db.update(&r).unwrap();
        }
        // Orphan document with no cached recipe
        let orphan = Recipe::new(Some("Orphan".to_string()), None);
        h.mirror
            .create(&orphan.to_mirror_document(true))
            .await
            .unwrap();

        let status = h.coordinator.mirror_status().await.unwrap();
        assert_eq!(status.missing, vec![soup_key()]);
        assert_eq!(status.stale, vec!["Orphan_null".to_string()]);
        assert!(!status.is_consistent());

        let report = h.coordinator.resync_mirror().await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 0);

        let status = h.coordinator.mirror_status().await.unwrap();
        assert!(status.is_consistent());
        assert_eq!(status.in_sync, vec![soup_key()]);
    }

    /// Store a document for `key` whose calories no longer parse as a number.
    fn put_malformed(h: &Harness, recipe: &Recipe) {
        let mut fields = document_to_fields(&recipe.to_mirror_document(true)).unwrap();
        fields.insert(
            "recipe_calories".to_string(),
            serde_json::Value::from("850 kcal"),
        );
        h.store
            .lock()
            .unwrap()
            .set(FAVORITES_COLLECTION, recipe.composite_key(), &fields)
            .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_documents_are_stale_and_repaired() {
        let h = harness(StubCatalog::ok(CHICKEN));
        searched(&h).await;
        h.coordinator
            .toggle_favorite(&soup_key())
            .unwrap()
            .mirrored
            .await
            .unwrap()
            .unwrap();

        let soup = h.coordinator.get_recipe(&soup_key()).unwrap();
        put_malformed(&h, &soup);
        let orphan = Recipe::new(Some("Orphan".to_string()), None);
        put_malformed(&h, &orphan);

        let status = h.coordinator.mirror_status().await.unwrap();
        assert!(status.in_sync.is_empty());
        assert!(status.missing.is_empty());
        assert_eq!(status.stale, vec![soup_key(), "Orphan_null".to_string()]);

        let report = h.coordinator.resync_mirror().await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 0);

        let status = h.coordinator.mirror_status().await.unwrap();
        assert!(status.is_consistent());
        assert_eq!(status.in_sync, vec![soup_key()]);
        let doc = h.mirror.get(&soup_key()).await.unwrap().unwrap();
        assert_eq!(doc.calories, Some(850.0));
    }

    #[tokio::test]
    async fn test_unfavorite_removes_malformed_document() {
        let h = harness(StubCatalog::ok(CHICKEN));
        searched(&h).await;
        h.coordinator.toggle_favorite(&soup_key()).unwrap();
        h.coordinator.drain().await;
        let soup = h.coordinator.get_recipe(&soup_key()).unwrap();
        put_malformed(&h, &soup);

        let toggle = h.coordinator.toggle_favorite(&soup_key()).unwrap();
        assert_eq!(
            toggle.mirrored.await.unwrap().unwrap(),
            MirrorAction::Deleted
        );
        assert!(h.mirror.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_key_locks_released_after_reconcile() {
        let h = harness(StubCatalog::ok(CHICKEN));
        searched(&h).await;
        for _ in 0..4 {
            h.coordinator.toggle_favorite(&soup_key()).unwrap();
        }
        h.coordinator.resync_mirror().await.unwrap();
        h.coordinator.drain().await;
        assert!(h.coordinator.key_locks.lock().unwrap().is_empty());

        // Fresh lock after release still serializes correctly
        h.coordinator.toggle_favorite(&soup_key()).unwrap();
        h.coordinator.drain().await;
        assert!(h.mirror.exists(&soup_key()).await.unwrap());
        assert!(h.coordinator.key_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_pending_writes() {
        let h = harness(StubCatalog::ok(CHICKEN));
        let ingested = h
            .coordinator
            .search("chicken", HealthFilter::All)
            .await
            .unwrap();
        drop(ingested.persisted);
        h.coordinator.shutdown().await;
        assert_eq!(h.db.lock().unwrap().count().unwrap(), 1);
    }
}
