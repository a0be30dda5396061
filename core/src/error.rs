use thiserror::Error;

/// Failures surfaced by [`crate::sync::SyncCoordinator`].
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Recipe '{0}' is not in the local cache")]
    NotFound(String),

    #[error("Recipe catalog request failed: {0:#}")]
    Catalog(anyhow::Error),

    #[error("Local cache error: {0:#}")]
    Cache(anyhow::Error),

    #[error("Favorites mirror error: {0:#}")]
    Mirror(anyhow::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
