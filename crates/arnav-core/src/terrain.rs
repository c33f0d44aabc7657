//! Elevation sources and the loadable terrain surface the draping pipeline queries.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ElevationError {
    #[error("elevation source is not loaded")]
    NotLoaded,
    #[error("elevation source failed to load: {0}")]
    LoadFailed(String),
    #[error("elevation query timed out after {0:?}")]
    Timeout(Duration),
    #[error("no elevation data at ({lat:.6}, {lon:.6})")]
    NoData { lat: f64, lon: f64 },
    #[error("elevation provider error: {0}")]
    Provider(String),
}

/// A terrain elevation provider.
///
/// `load` prepares the source (fetching tiles, opening files); `elevation`
/// must only be called after a successful load. Both are non-blocking.
pub trait ElevationSource: Send + Sync {
    fn load(&self) -> BoxFuture<'_, Result<(), ElevationError>>;

    /// Ground elevation in meters at a WGS84 position.
    fn elevation(&self, lat: f64, lon: f64) -> BoxFuture<'_, Result<f64, ElevationError>>;
}

/// Elevation surface with a single shared load.
///
/// Every draping pass awaits [`TerrainSurface::ensure_loaded`]; concurrent
/// callers share one in-flight load and a successful load is never repeated.
/// A failed load is not remembered, so the next pass tries again.
pub struct TerrainSurface {
    source: Arc<dyn ElevationSource>,
    loaded: OnceCell<()>,
}

impl TerrainSurface {
    pub fn new(source: Arc<dyn ElevationSource>) -> Self {
        Self {
            source,
            loaded: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    /// Load the underlying source if needed and wait for completion.
    pub async fn ensure_loaded(&self) -> Result<(), ElevationError> {
        let result = self
            .loaded
            .get_or_try_init(|| async {
                tracing::debug!("Loading terrain elevation source");
                self.source.load().await
            })
            .await;

        result.map(|_| ()).map_err(|err| {
            let reason = match err {
                ElevationError::LoadFailed(reason) => reason,
                other => other.to_string(),
            };
            tracing::warn!("Terrain elevation source failed to load: {}", reason);
            ElevationError::LoadFailed(reason)
        })
    }

    /// Query ground elevation; refuses to touch an unloaded source.
    pub async fn elevation(&self, lat: f64, lon: f64) -> Result<f64, ElevationError> {
        if !self.loaded.initialized() {
            return Err(ElevationError::NotLoaded);
        }
        self.source.elevation(lat, lon).await
    }
}
