use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_API_VERSION: &str = "2024-02-15-preview";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 3072;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Base delay for the retry backoff; doubles per attempt.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Connection settings for the hosted embedding and chat deployments.
///
/// Built once at startup with [`ServiceConfig::from_env`] and passed into the
/// client constructors. Validation happens here, eagerly, so a missing key
/// fails before any document is touched.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub endpoint: Url,
    pub api_key: String,
    pub api_version: String,
    pub chat_deployment: String,
    pub embedding_deployment: String,
    /// Expected length of every embedding vector, e.g. 3072 for
    /// text-embedding-3-large or 1536 for text-embedding-3-small.
    pub embedding_dimensions: usize,
    pub request_timeout: Duration,
    pub max_retries: u32,
}

impl ServiceConfig {
    /// Reads `AZURE_OPENAI_*` variables (the originals the hosted service
    /// documents) plus the optional `PDF_CHAT_REQUEST_TIMEOUT_SECS` and
    /// `PDF_CHAT_MAX_RETRIES` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = required_var(
            "AZURE_OPENAI_ENDPOINT",
            "base url of the Azure OpenAI resource, e.g. https://my-resource.openai.azure.com",
        )?;
        let endpoint = Url::parse(&endpoint).map_err(|source| ConfigError::InvalidEndpoint {
            value: endpoint,
            source,
        })?;

        let api_key = required_var("AZURE_OPENAI_API_KEY", "api key for the resource")?;
        let chat_deployment = required_var(
            "AZURE_OPENAI_CHAT_DEPLOYMENT_NAME",
            "deployment name of the chat model, e.g. gpt-4o",
        )?;
        let embedding_deployment = required_var(
            "AZURE_OPENAI_EMBEDDING_DEPLOYMENT_NAME",
            "deployment name of the embedding model, e.g. text-embedding-3-large",
        )?;

        let api_version = optional_var("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let embedding_dimensions = parse_var(
            "AZURE_OPENAI_EMBEDDING_DIMENSIONS",
            DEFAULT_EMBEDDING_DIMENSIONS,
        )?;
        if embedding_dimensions == 0 {
            return Err(ConfigError::InvalidValue {
                name: "AZURE_OPENAI_EMBEDDING_DIMENSIONS",
                value: "0".to_string(),
                reason: "dimensions must be positive".to_string(),
            });
        }

        let timeout_secs = parse_var("PDF_CHAT_REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let max_retries = parse_var("PDF_CHAT_MAX_RETRIES", DEFAULT_MAX_RETRIES)?;

        Ok(Self {
            endpoint,
            api_key,
            api_version,
            chat_deployment,
            embedding_deployment,
            embedding_dimensions,
            request_timeout: Duration::from_secs(timeout_secs),
            max_retries,
        })
    }

    /// Url of one deployment-scoped operation, e.g. `embeddings` or
    /// `chat/completions`.
    pub fn deployment_url(&self, deployment: &str, operation: &str) -> String {
        let base = self.endpoint.as_str().trim_end_matches('/');
        format!(
            "{base}/openai/deployments/{deployment}/{operation}?api-version={version}",
            version = self.api_version
        )
    }
}

fn required_var(name: &'static str, hint: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) => {
            let value = value.trim().to_string();
            if value.is_empty() {
                Err(ConfigError::MissingVar { name, hint })
            } else {
                Ok(value)
            }
        }
        Err(_) => Err(ConfigError::MissingVar { name, hint }),
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let value = value.trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        Some(raw) => raw.parse().map_err(|err| ConfigError::InvalidValue {
            name,
            value: raw,
            reason: format!("{err}"),
        }),
        None => Ok(default),
    }
}
