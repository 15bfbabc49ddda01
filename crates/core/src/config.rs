//! Runtime configuration: parameter store access and component settings.
//!
//! Every value is looked up again on each invocation, so a changed parameter
//! takes effect on the next event or request without a restart.

use crate::aws::AwsSession;
use crate::eligibility::DEFAULT_DOCUMENT_SUFFIX;
use crate::error::ConfigError;
use crate::extractor::MarkerSelectors;
use crate::retry::RetryPolicy;
use crate::traits::ParameterStore;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

pub const SEARCH_HOST_PARAMETER: &str = "/lambda/opensearch-host";
pub const LINK_HOST_PARAMETER: &str = "/lambda/create-index/host-name";
pub const ALLOWED_ORIGIN_PARAMETER: &str = "/lambda/opensearch-allowed-origin";

pub const DEFAULT_INDEX_NAME: &str = "site-index";
pub const DEFAULT_DOCUMENT_TYPE: &str = "_doc";
pub const DEFAULT_MAX_HITS: usize = 300;
pub const DEFAULT_PARAMETERS_ENDPOINT: &str = "http://localhost:2773";

#[derive(Debug, Clone)]
pub struct IndexerSettings {
    pub document_suffix: String,
    pub search_host_parameter: String,
    pub link_host_parameter: String,
    pub markers: MarkerSelectors,
    pub retry: RetryPolicy,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            document_suffix: DEFAULT_DOCUMENT_SUFFIX.to_string(),
            search_host_parameter: SEARCH_HOST_PARAMETER.to_string(),
            link_host_parameter: LINK_HOST_PARAMETER.to_string(),
            markers: MarkerSelectors::default(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub search_host_parameter: String,
    pub allowed_origin_parameter: String,
    pub max_hits: usize,
    pub retry: RetryPolicy,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            search_host_parameter: SEARCH_HOST_PARAMETER.to_string(),
            allowed_origin_parameter: ALLOWED_ORIGIN_PARAMETER.to_string(),
            max_hits: DEFAULT_MAX_HITS,
            retry: RetryPolicy::default(),
        }
    }
}

/// Looks a parameter up, retrying per `policy`.
pub async fn lookup_parameter<P>(
    store: &P,
    name: &str,
    policy: &RetryPolicy,
) -> Result<String, ConfigError>
where
    P: ParameterStore + Sync + ?Sized,
{
    policy
        .run("parameter lookup", |_| store.get_parameter(name))
        .await
}

/// Reads parameters through the parameters-and-secrets extension's local
/// HTTP endpoint.
pub struct ExtensionParameterStore {
    client: Client,
    endpoint: String,
    session_token: Option<String>,
}

impl ExtensionParameterStore {
    pub fn new(endpoint: impl Into<String>, session: &AwsSession) -> Self {
        Self::with_token(endpoint, session.session_token().map(str::to_string))
    }

    pub fn with_token(endpoint: impl Into<String>, session_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            session_token,
        }
    }

    fn request_url(&self, name: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
        format!(
            "{}/systemsmanager/parameters/get/?name={}",
            self.endpoint.trim_end_matches('/'),
            encoded
        )
    }
}

#[derive(Debug, Deserialize)]
struct ParameterEnvelope {
    #[serde(rename = "Parameter")]
    parameter: ParameterValue,
}

#[derive(Debug, Deserialize)]
struct ParameterValue {
    #[serde(rename = "Value")]
    value: String,
}

#[async_trait]
impl ParameterStore for ExtensionParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<String, ConfigError> {
        let mut request = self.client.get(self.request_url(name));
        if let Some(token) = &self.session_token {
            request = request.header("X-Aws-Parameters-Secrets-Token", token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ConfigError::Lookup {
                name: name.to_string(),
                details: response.status().to_string(),
            });
        }

        let envelope: ParameterEnvelope = response.json().await?;
        Ok(envelope.parameter.value)
    }
}

/// In-memory parameters for local runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticParameterStore {
    values: HashMap<String, String>,
}

impl StaticParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Loads a flat JSON object of `name -> value` pairs.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let values: HashMap<String, String> = serde_json::from_str(&raw)?;
        Ok(Self { values })
    }
}

#[async_trait]
impl ParameterStore for StaticParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<String, ConfigError> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::Lookup {
                name: name.to_string(),
                details: "parameter not found".to_string(),
            })
    }
}
