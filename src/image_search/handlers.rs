use std::collections::HashMap;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Router,
};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::features::{self, ImageFeatures};
use crate::{
    error::{AppError, AppResult},
    images::MultipartForm,
    products::{ProductRow, ProductView},
    response::{ok, ApiJson},
    state::AppState,
};

const UPLOAD_LIMIT: usize = 10 * 1024 * 1024;
const FETCH_CONCURRENCY: usize = 8;

pub fn image_search_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(image_search))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSearchResult {
    pub products: Vec<ProductView>,
    pub total_results: usize,
    pub message: String,
    pub fallback_used: bool,
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarities: Option<Vec<f64>>,
}

/// Reply of the external similarity service.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceReply {
    product_ids: Vec<String>,
    total_found: Option<i64>,
    threshold: Option<f64>,
    #[serde(default)]
    similarities: Option<Vec<f64>>,
    note: Option<String>,
}

#[instrument(skip(state, mp))]
pub async fn image_search(
    State(state): State<AppState>,
    mp: Multipart,
) -> AppResult<ApiJson<ImageSearchResult>> {
    let form = MultipartForm::collect(mp).await?;
    let upload = form
        .file("image")
        .ok_or_else(|| AppError::bad_request("No image uploaded"))?;

    let mut notice = None;
    if let Some(url) = state.config.image_search_service_url.as_deref() {
        match search_remote(&state, url, upload.body.clone()).await {
            Ok(result) => return Ok(ok("Image search completed", result)),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "image search service failed, using fallback");
                notice = Some("Image search service unavailable, using fallback.");
            }
        }
    }

    let body = upload.body.clone();
    let query = tokio::task::spawn_blocking(move || features::extract(&body))
        .await
        .context("feature extraction task")?
        .map_err(|_| AppError::bad_request("Uploaded file is not a readable image"))?;

    let products = ProductRow::list_all(&state.db).await?;
    let (ranked, threshold) = rank_products(&state, &query, products).await;

    let message = notice.map(str::to_string).unwrap_or_else(|| {
        format!(
            "Found {} similar products (similarity threshold: {}%)",
            ranked.len(),
            (threshold * 100.0).round()
        )
    });
    info!(results = ranked.len(), threshold, "fallback image search done");

    let similarities = ranked.iter().map(|(_, s)| *s).collect();
    let products: Vec<ProductView> = ranked.into_iter().map(|(p, _)| p.into()).collect();
    Ok(ok(
        "Image search completed",
        ImageSearchResult {
            total_results: products.len(),
            products,
            message,
            fallback_used: true,
            threshold: Some(threshold),
            similarities: Some(similarities),
        },
    ))
}

async fn search_remote(
    state: &AppState,
    url: &str,
    image: bytes::Bytes,
) -> anyhow::Result<ImageSearchResult> {
    let part = reqwest::multipart::Part::stream(image)
        .file_name("image.jpg")
        .mime_str("image/jpeg")?;
    let form = reqwest::multipart::Form::new().part("file", part);

    let reply: ServiceReply = state
        .http
        .post(url)
        .multipart(form)
        .send()
        .await
        .context("image search service request")?
        .error_for_status()
        .context("image search service status")?
        .json()
        .await
        .context("decode image search service reply")?;

    let ids: Vec<Uuid> = reply
        .product_ids
        .iter()
        .filter_map(|id| Uuid::parse_str(id).ok())
        .collect();
    let mut by_id: HashMap<Uuid, ProductRow> = ProductRow::find_many(&state.db, &ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    // Keep the service's ranking.
    let products: Vec<ProductView> = ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .map(ProductView::from)
        .collect();

    let mut message = format!(
        "Deep learning image search successful. Found {} similar products",
        reply.total_found.unwrap_or(products.len() as i64)
    );
    if let Some(t) = reply.threshold {
        message.push_str(&format!(" (similarity threshold: {}%)", (t * 100.0).round()));
    }
    if let Some(note) = reply.note.filter(|n| !n.is_empty()) {
        message.push_str(&format!(" - {note}"));
    }

    Ok(ImageSearchResult {
        total_results: products.len(),
        products,
        message,
        fallback_used: false,
        threshold: reply.threshold,
        similarities: reply.similarities,
    })
}

/// Scores every product picture against the query. Pictures that cannot be
/// fetched or decoded are skipped.
pub(crate) async fn rank_products(
    state: &AppState,
    query: &ImageFeatures,
    products: Vec<ProductRow>,
) -> (Vec<(ProductRow, f64)>, f64) {
    let scored: Vec<(ProductRow, f64)> = stream::iter(products)
        .filter(|p| std::future::ready(!p.picture_url.is_empty()))
        .map(|product| async move {
            match state
                .feature_cache
                .get_or_load(&product.picture_url, state.image_fetcher.as_ref())
                .await
            {
                Ok(candidate) => {
                    let score = features::similarity(query, &candidate);
                    Some((product, score))
                }
                Err(e) => {
                    debug!(error = %e, url = %product.picture_url, "skipping product picture");
                    None
                }
            }
        })
        .buffer_unordered(FETCH_CONCURRENCY)
        .filter_map(std::future::ready)
        .collect()
        .await;

    features::select(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_search::features::tests::two_tone_png;
    use crate::state::testing::FakeImages;
    use bytes::Bytes;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use time::OffsetDateTime;

    fn product(title: &str, url: &str) -> ProductRow {
        ProductRow {
            id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            category_id: Uuid::new_v4(),
            category_name: "Mugs".into(),
            category_slug: "mugs".into(),
            price: Decimal::ONE,
            discount: 0,
            stock: 1,
            picture_url: url.into(),
            picture_public_id: String::new(),
            user_id: None,
            average_rating: 0.0,
            num_reviews: 0,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn fallback_ranks_the_matching_picture_first() {
        let red = two_tone_png([220, 20, 20], [200, 30, 30]);
        let blue = two_tone_png([20, 20, 220], [30, 30, 200]);

        let images = FakeImages::default();
        {
            let mut map = images.by_url.lock().unwrap();
            map.insert("https://cdn/red.png".into(), Bytes::from(red.clone()));
            map.insert("https://cdn/blue.png".into(), Bytes::from(blue));
        }
        let mut state = AppState::fake();
        state.image_fetcher = Arc::new(images);

        let query = features::extract(&red).unwrap();
        let (ranked, threshold) = rank_products(
            &state,
            &query,
            vec![
                product("Blue", "https://cdn/blue.png"),
                product("Red", "https://cdn/red.png"),
                product("Missing", "https://cdn/gone.png"),
                product("No picture", ""),
            ],
        )
        .await;

        assert_eq!(threshold, features::STRICT_THRESHOLD);
        assert_eq!(ranked[0].0.title, "Red");
        assert!(ranked.iter().all(|(p, _)| p.title != "Missing"));
    }

    #[tokio::test]
    async fn features_are_cached_per_url() {
        let images = Arc::new(FakeImages::default());
        images.by_url.lock().unwrap().insert(
            "https://cdn/a.png".into(),
            Bytes::from(two_tone_png([1, 2, 3], [4, 5, 6])),
        );
        let state = AppState::fake();

        let first = state
            .feature_cache
            .get_or_load("https://cdn/a.png", images.as_ref())
            .await
            .unwrap();
        images.by_url.lock().unwrap().clear();
        let second = state
            .feature_cache
            .get_or_load("https://cdn/a.png", images.as_ref())
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
