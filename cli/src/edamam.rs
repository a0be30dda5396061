use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use savor_core::catalog::{CatalogQuery, RecipeCatalog};
use savor_core::edamam::RecipeData;

pub const EDAMAM_URL: &str = "https://api.edamam.com/api/recipes/v2";

/// Edamam recipe search v2 client.
pub struct EdamamClient {
    client: reqwest::Client,
    base_url: String,
    app_id: String,
    app_key: String,
}

impl EdamamClient {
    pub fn new(app_id: &str, app_key: &str) -> Result<Self> {
        Self::with_base_url(EDAMAM_URL, app_id, app_key)
    }

    pub fn with_base_url(base_url: &str, app_id: &str, app_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("savor/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            app_id: app_id.to_string(),
            app_key: app_key.to_string(),
        })
    }
}

#[async_trait]
impl RecipeCatalog for EdamamClient {
    async fn search(&self, query: &CatalogQuery) -> Result<RecipeData> {
        let mut params = query.params();
        params.push(("app_id", self.app_id.clone()));
        params.push(("app_key", self.app_key.clone()));

        let resp = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .context("Failed to reach Edamam API")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Edamam returned {status}: {}", body.trim());
        }

        resp.json()
            .await
            .context("Failed to parse Edamam search response")
    }
}

/// Stand-in catalog when no Edamam credentials are configured. Offline
/// commands still work; catalog searches fail with `reason`.
pub struct MissingCredentials {
    reason: String,
}

impl MissingCredentials {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RecipeCatalog for MissingCredentials {
    async fn search(&self, _query: &CatalogQuery) -> Result<RecipeData> {
        bail!("{}", self.reason)
    }
}
