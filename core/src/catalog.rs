use anyhow::Result;
use async_trait::async_trait;

use crate::edamam::RecipeData;
use crate::models::HealthFilter;

/// Query used for the home screen's featured recipes.
pub const FEATURED_QUERY: &str = "healthy";

/// Query sent when neither a term nor a health filter is given; the catalog
/// rejects requests without either.
pub const DEFAULT_QUERY: &str = "recipe";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    pub term: String,
    pub filter: HealthFilter,
}

impl CatalogQuery {
    #[must_use]
    pub fn new(term: &str, filter: HealthFilter) -> Self {
        Self {
            term: term.trim().to_string(),
            filter,
        }
    }

    /// Query-string parameters, credentials excluded.
    #[must_use]
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("type", "public".to_string())];
        if !self.term.is_empty() {
            params.push(("q", self.term.clone()));
        } else if self.filter == HealthFilter::All {
            params.push(("q", DEFAULT_QUERY.to_string()));
        }
        if let Some(health) = self.filter.api_value() {
            params.push(("health", health.to_string()));
        }
        params
    }
}

/// Remote recipe search provider.
///
/// The CLI implements this with reqwest against Edamam; tests use stubs.
#[async_trait]
pub trait RecipeCatalog: Send + Sync {
    async fn search(&self, query: &CatalogQuery) -> Result<RecipeData>;

    async fn by_health_label(&self, filter: HealthFilter) -> Result<RecipeData> {
        self.search(&CatalogQuery::new("", filter)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_term_only() {
        let q = CatalogQuery::new("  chicken ", HealthFilter::All);
        assert_eq!(
            q.params(),
            vec![("type", "public".to_string()), ("q", "chicken".to_string())]
        );
    }

    #[test]
    fn test_params_term_and_filter() {
        let q = CatalogQuery::new("soup", HealthFilter::Vegan);
        assert_eq!(
            q.params(),
            vec![
                ("type", "public".to_string()),
                ("q", "soup".to_string()),
                ("health", "vegan".to_string()),
            ]
        );
    }

    #[test]
    fn test_params_filter_only() {
        let q = CatalogQuery::new("", HealthFilter::LowSugar);
        assert_eq!(
            q.params(),
            vec![
                ("type", "public".to_string()),
                ("health", "low-sugar".to_string()),
            ]
        );
    }

    #[test]
    fn test_params_empty_uses_default_query() {
        let q = CatalogQuery::new("", HealthFilter::All);
        assert!(q.params().contains(&("q", DEFAULT_QUERY.to_string())));
    }
}
