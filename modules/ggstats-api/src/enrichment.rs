// Round enrichment: trait boundary + Street View / embedding backend.
//
// process-round turns a round's panorama into an image embedding. The
// image fetch and the embedding call sit behind ImageEmbedder so the HTTP
// surface can be tested without Google credentials; production wires in
// StreetViewEmbedder, tests use FixedEmbedder.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;

use ggstats_common::StreetView;

const STREETVIEW_URL: &str = "https://maps.googleapis.com/maps/api/streetview";
const IMAGE_SIZE: &str = "640x640";

#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    /// Embedding of the Street View image a player saw.
    async fn embed(&self, view: &StreetView) -> Result<Vec<f32>>;
}

// ---------------------------------------------------------------------------
// StreetViewEmbedder (production)
// ---------------------------------------------------------------------------

/// Fetches the Street View static image and sends it to a multimodal
/// embedding predict endpoint as `{ instances: [{ image: { bytesBase64Encoded } }] }`.
pub struct StreetViewEmbedder {
    http: reqwest::Client,
    streetview_url: String,
    streetview_key: String,
    embedding_endpoint: String,
    embedding_token: String,
}

impl StreetViewEmbedder {
    pub fn new(
        streetview_key: impl Into<String>,
        embedding_endpoint: impl Into<String>,
        embedding_token: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            streetview_url: STREETVIEW_URL.to_string(),
            streetview_key: streetview_key.into(),
            embedding_endpoint: embedding_endpoint.into(),
            embedding_token: embedding_token.into(),
        }
    }

    async fn fetch_image(&self, view: &StreetView) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(&self.streetview_url)
            .query(&[
                ("size", IMAGE_SIZE.to_string()),
                ("location", format!("{},{}", view.lat, view.lng)),
                ("fov", view.fov().to_string()),
                ("heading", view.heading.to_string()),
                ("pitch", view.pitch.to_string()),
                ("key", self.streetview_key.clone()),
            ])
            .send()
            .await
            .context("Street View request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("Failed to fetch Street View image: {}", resp.status());
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
struct Prediction {
    #[serde(default, rename = "imageEmbedding")]
    image_embedding: Vec<f32>,
}

#[async_trait]
impl ImageEmbedder for StreetViewEmbedder {
    async fn embed(&self, view: &StreetView) -> Result<Vec<f32>> {
        let image = self.fetch_image(view).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&image);
        let body = serde_json::json!({
            "instances": [{ "image": { "bytesBase64Encoded": encoded } }]
        });

        let resp = self
            .http
            .post(&self.embedding_endpoint)
            .bearer_auth(&self.embedding_token)
            .json(&body)
            .send()
            .await
            .context("Embedding request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Embedding endpoint error ({status}): {error_text}");
        }

        let parsed: PredictResponse = resp
            .json()
            .await
            .context("Invalid embedding response")?;
        let embedding = parsed
            .predictions
            .into_iter()
            .next()
            .map(|p| p.image_embedding)
            .unwrap_or_default();
        if embedding.is_empty() {
            anyhow::bail!("Embedding response did not contain an image embedding");
        }
        Ok(embedding)
    }
}

// ---------------------------------------------------------------------------
// FixedEmbedder (tests)
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "test-support"))]
pub use fixed::FixedEmbedder;

#[cfg(any(test, feature = "test-support"))]
mod fixed {
    use std::sync::Mutex;

    use super::*;

    /// Deterministic embedder: a short vector derived from the view, or a
    /// failure when built with `failing()`.
    #[derive(Default)]
    pub struct FixedEmbedder {
        fail: bool,
        calls: Mutex<Vec<StreetView>>,
    }

    impl FixedEmbedder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<StreetView> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ImageEmbedder for FixedEmbedder {
        async fn embed(&self, view: &StreetView) -> Result<Vec<f32>> {
            self.calls.lock().unwrap().push(*view);
            if self.fail {
                anyhow::bail!("embedding backend unavailable");
            }
            Ok(vec![
                view.lat as f32,
                view.lng as f32,
                view.heading as f32,
                view.fov() as f32,
            ])
        }
    }
}
