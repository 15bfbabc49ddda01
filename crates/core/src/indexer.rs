//! Storage-event driven index maintenance.
//!
//! Each record of a notification batch is filtered, then either fetched,
//! extracted and upserted, or deleted from the index. Records are handled
//! one after another and a failing record never stops the rest of the batch.

use crate::config::{lookup_parameter, IndexerSettings};
use crate::eligibility::{Eligibility, EligibilityFilter};
use crate::error::{ConfigError, IngestError};
use crate::extractor::HtmlExtractor;
use crate::models::{
    BatchSummary, EventKind, FailureStage, IndexAction, IndexDocument, RecordOutcome,
    StorageEvent, StorageRecord,
};
use crate::retry::RetryPolicy;
use crate::text::document_id_for_key;
use crate::traits::{ObjectStore, ParameterStore, SearchBackend};
use crate::SearchError;
use tracing::{error, info, warn};

const UPSERT_RESULTS: &[&str] = &["created", "updated"];
const DELETE_RESULTS: &[&str] = &["deleted"];

pub struct Indexer<O, P, B> {
    objects: O,
    parameters: P,
    backend: B,
    extractor: HtmlExtractor,
    filter: EligibilityFilter,
    settings: IndexerSettings,
}

impl<O, P, B> Indexer<O, P, B>
where
    O: ObjectStore + Send + Sync,
    P: ParameterStore + Send + Sync,
    B: SearchBackend + Send + Sync,
{
    pub fn new(
        objects: O,
        parameters: P,
        backend: B,
        settings: IndexerSettings,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            objects,
            parameters,
            backend,
            extractor: HtmlExtractor::new(&settings.markers)?,
            filter: EligibilityFilter::site_defaults(&settings.document_suffix),
            settings,
        })
    }

    pub fn with_filter(mut self, filter: EligibilityFilter) -> Self {
        self.filter = filter;
        self
    }

    pub async fn handle_event(&self, event: &StorageEvent) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for record in &event.records {
            let outcome = match self.process_record(record).await {
                Ok(outcome) => outcome,
                Err(failure) => {
                    let key = record.object_key();
                    error!(key = %key, error = %failure, "record processing aborted");
                    RecordOutcome::Failed {
                        key,
                        stage: failure_stage(&failure),
                        reason: failure.to_string(),
                    }
                }
            };
            summary.push(outcome);
        }

        info!(
            records = event.records.len(),
            processed = summary.processed(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "storage event batch complete"
        );
        summary
    }

    /// Handles one record. Fetch failures come back as a handled
    /// `Failed` outcome; configuration and index failures are errors.
    pub async fn process_record(&self, record: &StorageRecord) -> Result<RecordOutcome, IngestError> {
        let key = record.object_key();

        if let Eligibility::Skip(reason) = self.filter.evaluate(&key) {
            info!(key = %key, reason = %reason, "skipping ineligible key");
            return Ok(RecordOutcome::Skipped { key, reason });
        }

        match record.kind() {
            EventKind::Put => self.index_object(record, key).await,
            EventKind::DeleteMarker => self.remove_object(record, key).await,
            EventKind::Other => {
                warn!(key = %key, event_name = %record.event_name, "unsupported event name");
                Ok(RecordOutcome::Skipped {
                    key,
                    reason: format!("unsupported event {}", record.event_name),
                })
            }
        }
    }

    /// Fetches under the decoded key; the link and the id use the raw key.
    async fn index_object(
        &self,
        record: &StorageRecord,
        key: String,
    ) -> Result<RecordOutcome, IngestError> {
        let bucket = record.bucket();
        let bytes = match self.objects.get_object(bucket, &key).await {
            Ok(bytes) => bytes,
            Err(failure) => {
                warn!(bucket, key = %key, error = %failure, "failed to fetch object");
                return Ok(RecordOutcome::Failed {
                    key,
                    stage: FailureStage::Fetch,
                    reason: failure.to_string(),
                });
            }
        };

        let html = String::from_utf8_lossy(&bytes);
        let document = self.extract_document(&html, record.raw_key()).await?;
        let document_id = document_id_for_key(record.raw_key(), &self.settings.document_suffix);
        let endpoint = self.search_endpoint().await?;

        upsert_document(&self.backend, &self.settings.retry, &endpoint, &document_id, &document)
            .await?;

        info!(key = %key, document_id = %document_id, "index document upserted");
        Ok(RecordOutcome::Processed {
            key,
            document_id,
            action: IndexAction::Upserted,
        })
    }

    async fn remove_object(
        &self,
        record: &StorageRecord,
        key: String,
    ) -> Result<RecordOutcome, IngestError> {
        let endpoint = self.search_endpoint().await?;
        let document_id = document_id_for_key(record.raw_key(), &self.settings.document_suffix);

        delete_document(&self.backend, &self.settings.retry, &endpoint, &document_id).await?;

        info!(key = %key, document_id = %document_id, "index document deleted");
        Ok(RecordOutcome::Processed {
            key,
            document_id,
            action: IndexAction::Deleted,
        })
    }

    /// Extracts the page fields; the link host is looked up fresh.
    pub async fn extract_document(&self, html: &str, key: &str) -> Result<IndexDocument, IngestError> {
        let host = lookup_parameter(
            &self.parameters,
            &self.settings.link_host_parameter,
            &self.settings.retry,
        )
        .await?;
        Ok(self.extractor.extract(html, format!("{host}{key}")))
    }

    async fn search_endpoint(&self) -> Result<String, IngestError> {
        Ok(lookup_parameter(
            &self.parameters,
            &self.settings.search_host_parameter,
            &self.settings.retry,
        )
        .await?)
    }
}

fn failure_stage(failure: &IngestError) -> FailureStage {
    match failure {
        IngestError::ObjectFetch { .. } => FailureStage::Fetch,
        IngestError::Config(_) => FailureStage::Config,
        _ => FailureStage::Index,
    }
}

fn check_result(response_result: &str, expected: &'static [&'static str]) -> Result<(), SearchError> {
    if expected.contains(&response_result) {
        Ok(())
    } else {
        Err(SearchError::UnexpectedResult {
            expected,
            actual: response_result.to_string(),
        })
    }
}

/// Creates or replaces `document_id`. Succeeds only on a `created` or
/// `updated` result; anything else is retried per `policy`.
pub async fn upsert_document<B>(
    backend: &B,
    policy: &RetryPolicy,
    endpoint: &str,
    document_id: &str,
    document: &IndexDocument,
) -> Result<(), IngestError>
where
    B: SearchBackend + Sync + ?Sized,
{
    policy
        .run("index upsert", |_| async move {
            let response = backend.put_document(endpoint, document_id, document).await?;
            check_result(&response.result, UPSERT_RESULTS)
        })
        .await
        .map_err(|failure| IngestError::Upsert {
            document_id: document_id.to_string(),
            details: failure.to_string(),
        })
}

/// Deletes `document_id`. Succeeds only on a `deleted` result.
pub async fn delete_document<B>(
    backend: &B,
    policy: &RetryPolicy,
    endpoint: &str,
    document_id: &str,
) -> Result<(), IngestError>
where
    B: SearchBackend + Sync + ?Sized,
{
    policy
        .run("index delete", |_| async move {
            let response = backend.delete_document(endpoint, document_id).await?;
            check_result(&response.result, DELETE_RESULTS)
        })
        .await
        .map_err(|failure| IngestError::Delete {
            document_id: document_id.to_string(),
            details: failure.to_string(),
        })
}
