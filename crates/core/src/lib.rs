pub mod aws;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod extractor;
pub mod gateway;
pub mod indexer;
pub mod models;
pub mod retry;
pub mod storage;
pub mod stores;
pub mod text;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use aws::{AwsCredentials, AwsSession, SigV4Signer};
pub use config::{
    lookup_parameter, ExtensionParameterStore, GatewaySettings, IndexerSettings,
    StaticParameterStore,
};
pub use eligibility::{Eligibility, EligibilityFilter, EligibilityRule, KeyPattern};
pub use error::{ConfigError, IngestError, SearchError};
pub use extractor::{HtmlExtractor, MarkerSelectors};
pub use gateway::{build_search_query, GatewayRequest, GatewayResponse, QueryGateway};
pub use indexer::{delete_document, upsert_document, Indexer};
pub use models::{
    BatchSummary, EventKind, FailureStage, IndexAction, IndexDocument, RecordOutcome,
    StorageEvent, StorageRecord,
};
pub use retry::RetryPolicy;
pub use storage::{discover_object_keys, FsObjectStore, S3ObjectStore};
pub use stores::OpenSearchStore;
pub use text::{decode_storage_key, document_id_for_key, encode_storage_key, normalize_whitespace};
pub use traits::{ObjectStore, ParameterStore, SearchBackend, WriteResponse};
