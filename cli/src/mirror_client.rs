use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};

use savor_core::docstore::Document;
use savor_core::mirror::{
    FAVORITES_COLLECTION, FavoritesMirror, document_to_fields, fields_to_document,
};
use savor_core::models::MirrorDocument;

/// Favorites mirror on a remote document server (`savor serve`).
pub struct HttpMirror {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpMirror {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid mirror URL '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            bail!("Invalid mirror URL '{base_url}'");
        }
        let client = reqwest::Client::builder()
            .user_agent(format!("savor/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// `{base}/api/collections/recipes/documents[/{id}]`, with `id` percent-encoded.
    fn url(&self, id: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| anyhow!("Invalid mirror URL '{}'", self.base_url))?;
            segments
                .pop_if_empty()
                .extend(["api", "collections", FAVORITES_COLLECTION, "documents"]);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.authorized(request)
            .send()
            .await
            .context("Failed to reach mirror server")
    }

    async fn documents(&self) -> Result<Vec<Document>> {
        let resp = self.send(self.client.get(self.url(None)?)).await?;
        ensure_success(resp)
            .await?
            .json()
            .await
            .context("Failed to parse mirror document list")
    }
}

async fn ensure_success(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("Mirror server returned {status}: {}", body.trim())
}

#[async_trait]
impl FavoritesMirror for HttpMirror {
    async fn exists(&self, key: &str) -> Result<bool> {
        let resp = self.send(self.client.get(self.url(Some(key))?)).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(resp).await?;
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<MirrorDocument>> {
        let resp = self.send(self.client.get(self.url(Some(key))?)).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc: Document = ensure_success(resp)
            .await?
            .json()
            .await
            .context("Failed to parse mirror document")?;
        fields_to_document(doc.body).map(Some)
    }

    async fn create(&self, doc: &MirrorDocument) -> Result<()> {
        let fields = document_to_fields(doc)?;
        let request = self
            .client
            .put(self.url(Some(&doc.composite_key))?)
            .json(&fields);
        ensure_success(self.send(request).await?).await?;
        Ok(())
    }

    async fn update(&self, doc: &MirrorDocument) -> Result<()> {
        let fields = document_to_fields(doc)?;
        let request = self
            .client
            .patch(self.url(Some(&doc.composite_key))?)
            .json(&fields);
        let resp = self.send(request).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            bail!("Mirror document {} no longer exists", doc.composite_key);
        }
        ensure_success(resp).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let resp = self.send(self.client.delete(self.url(Some(key))?)).await?;
        // Already gone is fine.
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(resp).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<MirrorDocument>> {
        Ok(self
            .documents()
            .await?
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
        Ok(self.documents().await?.into_iter().map(|d| d.id).collect())
    }
}
