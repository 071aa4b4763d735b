use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::{ServiceConfig, RETRY_BASE_DELAY};
use crate::error::EmbedError;
use crate::traits::EmbeddingClient;

/// Client for an Azure OpenAI-style embeddings deployment. Every returned
/// vector is checked against the configured dimensionality, so a store can
/// trust what it persists.
pub struct AzureEmbeddingClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    dimensions: usize,
    max_retries: u32,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: [&'a str; 1],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl AzureEmbeddingClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, EmbedError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            url: config.deployment_url(&config.embedding_deployment, "embeddings"),
            api_key: config.api_key.clone(),
            dimensions: config.embedding_dimensions,
            max_retries: config.max_retries,
        })
    }

    async fn request_once(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&EmbeddingRequest { input: [text] })
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbedError::RateLimited);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Status { status, body });
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbedError::InvalidResponse(error.to_string()))?;

        let vector = payload
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or_else(|| {
                EmbedError::InvalidResponse("response carried no embeddings".to_string())
            })?;

        if vector.len() != self.dimensions {
            return Err(EmbedError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }

        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingClient for AzureEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut attempt = 0u32;
        loop {
            match self.request_once(text).await {
                Err(error) if error.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt - 1)).await;
                }
                other => return other,
            }
        }
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
