pub mod features;
pub mod fetch;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::state::AppState;
use axum::Router;
use features::ImageFeatures;
use fetch::ImageFetcher;

const FEATURE_TTL: Duration = Duration::from_secs(10 * 60);
const FEATURE_CAPACITY: u64 = 5_000;

/// Features of product pictures, keyed by URL.
#[derive(Clone)]
pub struct FeatureCache {
    inner: Cache<String, Arc<ImageFeatures>>,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(FEATURE_CAPACITY)
                .time_to_live(FEATURE_TTL)
                .build(),
        }
    }

    /// Cached features for `url`, downloading and measuring on a miss.
    /// Concurrent misses for the same URL share one download.
    pub async fn get_or_load(
        &self,
        url: &str,
        fetcher: &dyn ImageFetcher,
    ) -> Result<Arc<ImageFeatures>, Arc<anyhow::Error>> {
        self.inner
            .try_get_with(url.to_string(), async {
                let bytes = fetcher.fetch(url).await?;
                let features = tokio::task::spawn_blocking(move || features::extract(&bytes))
                    .await??;
                Ok::<_, anyhow::Error>(Arc::new(features))
            })
            .await
    }
}

impl Default for FeatureCache {
    fn default() -> Self {
        Self::new()
    }
}

pub fn router() -> Router<AppState> {
    Router::new().nest("/image-search", handlers::image_search_routes())
}
