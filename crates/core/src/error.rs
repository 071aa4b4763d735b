use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {name} ({hint})")]
    MissingVar {
        name: &'static str,
        hint: &'static str,
    },

    #[error("invalid endpoint url {value:?}: {source}")]
    InvalidEndpoint {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("no extractable text in {0}")]
    EmptyDocument(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("document produced no usable chunks: {0}")]
    NoChunks(String),
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding request failed with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("embedding service rate limited the request")]
    RateLimited,

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding has {actual} dimensions, configuration expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbedError {
    /// Worth retrying with backoff: connection trouble, timeouts, throttling
    /// and server-side failures. Everything else surfaces immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbedError::Http(error) => error.is_timeout() || error.is_connect(),
            EmbedError::RateLimited => true,
            EmbedError::Status { status, .. } => *status >= 500,
            EmbedError::InvalidResponse(_) | EmbedError::DimensionMismatch { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat request failed with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("chat service rate limited the request")]
    RateLimited,

    #[error("invalid chat response: {0}")]
    InvalidResponse(String),

    #[error("chat stream interrupted: {0}")]
    Stream(String),
}

impl ChatError {
    pub fn is_transient(&self) -> bool {
        match self {
            ChatError::Http(error) => error.is_timeout() || error.is_connect(),
            ChatError::RateLimited => true,
            ChatError::Status { status, .. } => *status >= 500,
            ChatError::InvalidResponse(_) | ChatError::Stream(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Env(#[from] heed::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("table {table:?} is missing or empty; run the embed step before querying")]
    NotInitialized { table: String },

    #[error("stored vectors have {expected} dimensions, query vector has {actual}; \
             ingestion and query must use the same embedding model")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Failure that aborts an embed-and-write run outright. Individual chunk
/// embedding failures do not abort the run; they are collected in the write
/// report instead.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("embedding failed: {0}")]
    Embed(#[source] EmbedError),

    #[error("store write failed: {0}")]
    Store(#[from] StoreError),
}

/// Failure while answering a similarity query.
#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("query embedding failed: {0}")]
    Embed(#[from] EmbedError),

    #[error("store search failed: {0}")]
    Store(#[from] StoreError),
}

/// Phase of a chat turn in which a failure occurred. A turn always returns
/// the session to idle; the phase is reported so the user sees where it broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Embedding,
    Retrieving,
    Composing,
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TurnPhase::Embedding => "embedding",
            TurnPhase::Retrieving => "retrieving",
            TurnPhase::Composing => "composing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("embedding the query failed: {0}")]
    Embedding(#[source] EmbedError),

    #[error("retrieval failed: {0}")]
    Retrieving(#[source] StoreError),

    #[error("chat completion failed: {0}")]
    Composing(#[source] ChatError),
}

impl TurnError {
    pub fn phase(&self) -> TurnPhase {
        match self {
            TurnError::Embedding(_) => TurnPhase::Embedding,
            TurnError::Retrieving(_) => TurnPhase::Retrieving,
            TurnError::Composing(_) => TurnPhase::Composing,
        }
    }

    /// True when the turn failed because the knowledge base has not been
    /// ingested yet, which the session reports as a hint rather than an error.
    pub fn is_store_missing(&self) -> bool {
        matches!(
            self,
            TurnError::Retrieving(StoreError::NotInitialized { .. })
        )
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_and_server_errors_are_transient() {
        assert!(EmbedError::RateLimited.is_transient());
        assert!(EmbedError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!EmbedError::Status {
            status: 401,
            body: String::new()
        }
        .is_transient());
        assert!(!EmbedError::InvalidResponse("truncated".to_string()).is_transient());
    }

    #[test]
    fn missing_table_is_detectable_on_a_turn() {
        let error = TurnError::Retrieving(StoreError::NotInitialized {
            table: "report_en".to_string(),
        });
        assert_eq!(error.phase(), TurnPhase::Retrieving);
        assert!(error.is_store_missing());
    }
}
