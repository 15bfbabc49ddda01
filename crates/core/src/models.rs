use serde::{Deserialize, Serialize};

pub const OBJECT_CREATED_PUT: &str = "ObjectCreated:Put";
pub const OBJECT_REMOVED_DELETE_MARKER: &str = "ObjectRemoved:DeleteMarkerCreated";

/// One search index entry per eligible HTML page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub title: String,
    pub content: String,
    pub link: String,
    #[serde(rename = "categoryL")]
    pub category_l: Vec<String>,
    #[serde(rename = "categoryM")]
    pub category_m: Vec<String>,
    #[serde(rename = "categoryS")]
    pub category_s: Vec<String>,
}

/// Storage change notification as delivered by the object store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<StorageRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageRecord {
    #[serde(rename = "eventName")]
    pub event_name: String,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3ObjectRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3ObjectRef {
    pub key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    DeleteMarker,
    Other,
}

impl StorageRecord {
    pub fn new(event_name: impl Into<String>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            s3: S3Entity {
                bucket: S3Bucket { name: bucket.into() },
                object: S3ObjectRef { key: key.into() },
            },
        }
    }

    pub fn object_created(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(OBJECT_CREATED_PUT, bucket, key)
    }

    pub fn kind(&self) -> EventKind {
        match self.event_name.as_str() {
            OBJECT_CREATED_PUT => EventKind::Put,
            OBJECT_REMOVED_DELETE_MARKER => EventKind::DeleteMarker,
            _ => EventKind::Other,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.s3.bucket.name
    }

    /// Key exactly as the notification carries it (URL-encoded). Links and
    /// document ids are built from this form.
    pub fn raw_key(&self) -> &str {
        &self.s3.object.key
    }

    /// Object key with the notification's URL encoding removed.
    pub fn object_key(&self) -> String {
        crate::text::decode_storage_key(&self.s3.object.key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexAction {
    Upserted,
    Deleted,
}

/// Where a record's processing stopped. Fetch failures are handled in place;
/// configuration and index failures abort the record and fail the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    Config,
    Index,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Processed {
        key: String,
        document_id: String,
        action: IndexAction,
    },
    Skipped {
        key: String,
        reason: String,
    },
    Failed {
        key: String,
        stage: FailureStage,
        reason: String,
    },
}

impl RecordOutcome {
    pub fn key(&self) -> &str {
        match self {
            Self::Processed { key, .. } | Self::Skipped { key, .. } | Self::Failed { key, .. } => key,
        }
    }

    pub fn is_unhandled_failure(&self) -> bool {
        matches!(self, Self::Failed { stage, .. } if *stage != FailureStage::Fetch)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub outcomes: Vec<RecordOutcome>,
}

impl BatchSummary {
    pub fn push(&mut self, outcome: RecordOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn processed(&self) -> usize {
        self.count(|outcome| matches!(outcome, RecordOutcome::Processed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, RecordOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, RecordOutcome::Failed { .. }))
    }

    /// True when no record ended in an unhandled error.
    pub fn is_success(&self) -> bool {
        !self.outcomes.iter().any(RecordOutcome::is_unhandled_failure)
    }

    fn count(&self, predicate: impl Fn(&RecordOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|outcome| predicate(outcome)).count()
    }
}
