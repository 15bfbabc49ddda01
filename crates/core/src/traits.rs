use crate::error::{ConfigError, IngestError, SearchError};
use crate::models::IndexDocument;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

/// Body of an index write response; only `result` drives the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WriteResponse {
    pub result: String,
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(rename = "_version", default)]
    pub version: Option<u64>,
}

impl WriteResponse {
    pub fn with_result(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            id: None,
            version: None,
        }
    }
}

#[async_trait]
pub trait SearchBackend {
    async fn put_document(
        &self,
        endpoint: &str,
        document_id: &str,
        document: &IndexDocument,
    ) -> Result<WriteResponse, SearchError>;

    async fn delete_document(
        &self,
        endpoint: &str,
        document_id: &str,
    ) -> Result<WriteResponse, SearchError>;

    /// Executes a query and returns the engine's response body untouched.
    async fn search(&self, endpoint: &str, query: &Value) -> Result<String, SearchError>;
}

#[async_trait]
pub trait ParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<String, ConfigError>;
}

#[async_trait]
pub trait ObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, IngestError>;
}

#[async_trait]
impl<T> SearchBackend for Box<T>
where
    T: SearchBackend + Send + Sync + ?Sized,
{
    async fn put_document(
        &self,
        endpoint: &str,
        document_id: &str,
        document: &IndexDocument,
    ) -> Result<WriteResponse, SearchError> {
        (**self).put_document(endpoint, document_id, document).await
    }

    async fn delete_document(
        &self,
        endpoint: &str,
        document_id: &str,
    ) -> Result<WriteResponse, SearchError> {
        (**self).delete_document(endpoint, document_id).await
    }

    async fn search(&self, endpoint: &str, query: &Value) -> Result<String, SearchError> {
        (**self).search(endpoint, query).await
    }
}

#[async_trait]
impl<T> ParameterStore for Box<T>
where
    T: ParameterStore + Send + Sync + ?Sized,
{
    async fn get_parameter(&self, name: &str) -> Result<String, ConfigError> {
        (**self).get_parameter(name).await
    }
}

#[async_trait]
impl<T> ObjectStore for Box<T>
where
    T: ObjectStore + Send + Sync + ?Sized,
{
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, IngestError> {
        (**self).get_object(bucket, key).await
    }
}
