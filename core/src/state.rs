use std::collections::HashMap;

use tokio::sync::watch;

use crate::models::Recipe;

/// Observable view state for whatever front end renders recipes.
///
/// Each field is a `watch` channel: readers either take a snapshot or
/// subscribe and wait for changes.
pub struct PresentationState {
    results: watch::Sender<Vec<Recipe>>,
    favorites: watch::Sender<HashMap<String, bool>>,
    search_term: watch::Sender<String>,
}

impl PresentationState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            results: watch::Sender::new(Vec::new()),
            favorites: watch::Sender::new(HashMap::new()),
            search_term: watch::Sender::new(String::new()),
        }
    }

    #[must_use]
    pub fn results(&self) -> Vec<Recipe> {
        self.results.borrow().clone()
    }

    #[must_use]
    pub fn favorites(&self) -> HashMap<String, bool> {
        self.favorites.borrow().clone()
    }

    #[must_use]
    pub fn is_favorite(&self, key: &str) -> Option<bool> {
        self.favorites.borrow().get(key).copied()
    }

    #[must_use]
    pub fn search_term(&self) -> String {
        self.search_term.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_results(&self) -> watch::Receiver<Vec<Recipe>> {
        self.results.subscribe()
    }

    #[must_use]
    pub fn subscribe_favorites(&self) -> watch::Receiver<HashMap<String, bool>> {
        self.favorites.subscribe()
    }

    #[must_use]
    pub fn subscribe_search_term(&self) -> watch::Receiver<String> {
        self.search_term.subscribe()
    }

    pub fn set_results(&self, recipes: Vec<Recipe>) {
        self.results.send_replace(recipes);
    }

    /// Replace the result with the same key, if it is currently shown.
    pub fn replace_result(&self, recipe: &Recipe) {
        self.results.send_if_modified(|results| {
            match results
                .iter_mut()
                .find(|r| r.composite_key() == recipe.composite_key())
            {
                Some(slot) => {
                    *slot = recipe.clone();
                    true
                }
                None => false,
            }
        });
    }

    pub fn set_favorite(&self, key: &str, favorite: bool) {
        self.favorites.send_modify(|map| {
            map.insert(key.to_string(), favorite);
        });
        self.results.send_if_modified(|results| {
            let mut changed = false;
            for r in results.iter_mut().filter(|r| r.composite_key() == key) {
                changed |= r.is_favorite != favorite;
                r.is_favorite = favorite;
            }
            changed
        });
    }

    /// Record cached flags in the favorites map and on any shown result.
    pub fn merge_favorites(&self, flags: HashMap<String, bool>) {
        if flags.is_empty() {
            return;
        }
        self.results.send_if_modified(|results| {
            let mut changed = false;
            for r in results.iter_mut() {
                if let Some(&favorite) = flags.get(r.composite_key()) {
                    changed |= r.is_favorite != favorite;
                    r.is_favorite = favorite;
                }
            }
            changed
        });
        self.favorites.send_modify(|map| map.extend(flags));
    }

    pub fn set_search_term(&self, term: &str) {
        self.search_term.send_replace(term.to_string());
    }
}

impl Default for PresentationState {
    fn default() -> Self {
        Self::new()
    }
}
