use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parameter lookup failed for {name}: {details}")]
    Lookup { name: String, details: String },

    #[error("parameter {0} resolved to an empty value")]
    EmptyValue(String),

    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("request signing failed: {0}")]
    Signing(String),

    #[error("invalid selector `{selector}`: {details}")]
    InvalidSelector { selector: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to fetch s3://{bucket}/{key}: {details}")]
    ObjectFetch {
        bucket: String,
        key: String,
        details: String,
    },

    #[error("failed to create or update index document {document_id}: {details}")]
    Upsert { document_id: String, details: String },

    #[error("failed to delete index document {document_id}: {details}")]
    Delete { document_id: String, details: String },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("unexpected result `{actual}`, expected one of {expected:?}")]
    UnexpectedResult {
        expected: &'static [&'static str],
        actual: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("search execution failed: {0}")]
    Execution(String),

    #[error("cors configuration failed: {0}")]
    CorsConfiguration(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
