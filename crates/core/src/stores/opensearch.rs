use crate::aws::SigV4Signer;
use crate::config::{DEFAULT_DOCUMENT_TYPE, DEFAULT_INDEX_NAME};
use crate::models::IndexDocument;
use crate::traits::{SearchBackend, WriteResponse};
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// OpenSearch REST client. The endpoint is passed per call because it is
/// resolved from the parameter store on every invocation.
pub struct OpenSearchStore {
    client: Arc<Client>,
    index_name: String,
    document_type: String,
    signer: Option<SigV4Signer>,
}

impl Default for OpenSearchStore {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_NAME)
    }
}

impl OpenSearchStore {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            client: Arc::new(Client::new()),
            index_name: index_name.into(),
            document_type: DEFAULT_DOCUMENT_TYPE.to_string(),
            signer: None,
        }
    }

    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = document_type.into();
        self
    }

    /// Signs every request, as serverless collections require.
    pub fn with_signer(mut self, signer: SigV4Signer) -> Self {
        self.signer = Some(signer);
        self
    }

    fn document_url(&self, endpoint: &str, document_id: &str) -> Result<Url, SearchError> {
        build_url(endpoint, &[&self.index_name, &self.document_type, document_id])
    }

    fn search_url(&self, endpoint: &str) -> Result<Url, SearchError> {
        build_url(endpoint, &[&self.index_name, "_search"])
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<String, SearchError> {
        let payload = body.unwrap_or_default();
        let mut request = self.client.request(method.clone(), url.clone());

        if let Some(signer) = &self.signer {
            for (name, value) in signer.sign(method.as_str(), &url, &payload)? {
                request = request.header(name, value);
            }
        }
        if !payload.is_empty() {
            request = request
                .header("Content-Type", "application/json")
                .body(payload);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::BackendResponse {
                backend: "opensearch".to_string(),
                details: status.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

fn build_url(endpoint: &str, segments: &[&str]) -> Result<Url, SearchError> {
    let mut url = Url::parse(endpoint.trim_end_matches('/'))?;
    url.path_segments_mut()
        .map_err(|_| SearchError::Request(format!("endpoint cannot carry a path: {endpoint}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[async_trait]
impl SearchBackend for OpenSearchStore {
    async fn put_document(
        &self,
        endpoint: &str,
        document_id: &str,
        document: &IndexDocument,
    ) -> Result<WriteResponse, SearchError> {
        let url = self.document_url(endpoint, document_id)?;
        let body = serde_json::to_vec(document)?;
        let raw = self.send(Method::PUT, url, Some(body)).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn delete_document(
        &self,
        endpoint: &str,
        document_id: &str,
    ) -> Result<WriteResponse, SearchError> {
        let url = self.document_url(endpoint, document_id)?;
        let raw = self.send(Method::DELETE, url, None).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn search(&self, endpoint: &str, query: &Value) -> Result<String, SearchError> {
        let url = self.search_url(endpoint)?;
        let body = serde_json::to_vec(query)?;
        self.send(Method::GET, url, Some(body)).await
    }
}
