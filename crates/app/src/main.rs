mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use site_search_core::config::{DEFAULT_INDEX_NAME, DEFAULT_PARAMETERS_ENDPOINT};
use site_search_core::eligibility::DEFAULT_DOCUMENT_SUFFIX;
use site_search_core::{
    discover_object_keys, document_id_for_key, encode_storage_key, AwsSession, EligibilityFilter,
    EligibilityRule, ExtensionParameterStore, FsObjectStore, GatewayRequest, GatewaySettings,
    HtmlExtractor, Indexer, IndexerSettings, KeyPattern, ObjectStore, OpenSearchStore,
    ParameterStore, QueryGateway, RetryPolicy, S3ObjectStore, StaticParameterStore, StorageEvent,
    StorageRecord,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type DynParameters = Box<dyn ParameterStore + Send + Sync>;
type DynObjects = Box<dyn ObjectStore + Send + Sync>;

#[derive(Parser)]
#[command(name = "site-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenSearch index name
    #[arg(long, env = "SITE_SEARCH_INDEX", default_value = DEFAULT_INDEX_NAME)]
    index_name: String,

    /// AWS region used for request signing
    #[arg(long, env = "AWS_REGION", default_value = "ap-northeast-1")]
    region: String,

    /// Parameters-and-secrets extension endpoint
    #[arg(
        long,
        env = "PARAMETERS_SECRETS_EXTENSION_ENDPOINT",
        default_value = DEFAULT_PARAMETERS_ENDPOINT
    )]
    parameters_endpoint: String,

    /// JSON object of parameter values, used instead of the extension endpoint
    #[arg(long, env = "SITE_SEARCH_PARAMETERS_FILE")]
    parameters_file: Option<PathBuf>,

    /// Sign OpenSearch requests for this service name (`aoss` for serverless)
    #[arg(long, env = "SITE_SEARCH_SIGNING_SERVICE")]
    signing_service: Option<String>,

    /// Attempts per parameter lookup and index write
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// Pause between attempts, in milliseconds
    #[arg(long, default_value_t = 0)]
    retry_delay_ms: u64,

    /// Extra regex of storage keys to keep out of the index (repeatable)
    #[arg(long = "exclude", value_name = "REGEX")]
    excludes: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a storage notification JSON file through the indexer.
    IndexEvent {
        /// Notification file with a top-level `Records` array.
        #[arg(long)]
        event: PathBuf,
        /// Read objects from `<root>/<bucket>/<key>` instead of S3.
        #[arg(long)]
        objects_root: Option<PathBuf>,
        /// S3-compatible endpoint (MinIO, LocalStack).
        #[arg(long, env = "S3_ENDPOINT_URL")]
        s3_endpoint: Option<String>,
    },
    /// Index every file of a local bucket directory as if it had just been uploaded.
    Backfill {
        /// Directory that holds one sub-directory per bucket.
        #[arg(long)]
        objects_root: PathBuf,
        /// Bucket directory to walk.
        #[arg(long)]
        bucket: String,
    },
    /// Serve `GET /search` and `OPTIONS /search` through the gateway.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
    /// Run a proxy-integration request event through the gateway and print
    /// the proxy response.
    GatewayEvent {
        #[arg(long)]
        event: PathBuf,
    },
    /// Run one search and print the raw engine response.
    Search {
        #[arg(long, default_value = "")]
        query: String,
    },
    /// Print the index document extracted from a local HTML file.
    Extract {
        #[arg(long)]
        file: PathBuf,
        /// Storage key the page would be uploaded under.
        #[arg(long)]
        key: String,
        /// Link host prepended to the key.
        #[arg(long, default_value = "")]
        host: String,
    },
}

impl Cli {
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    fn parameter_store(&self, session: Option<&AwsSession>) -> anyhow::Result<DynParameters> {
        if let Some(path) = &self.parameters_file {
            let store = StaticParameterStore::from_json_file(path)
                .with_context(|| format!("reading parameters from {}", path.display()))?;
            return Ok(Box::new(store));
        }

        Ok(Box::new(match session {
            Some(session) => ExtensionParameterStore::new(&self.parameters_endpoint, session),
            None => ExtensionParameterStore::with_token(&self.parameters_endpoint, None),
        }))
    }

    fn search_backend(&self, session: Option<&AwsSession>) -> anyhow::Result<OpenSearchStore> {
        let store = OpenSearchStore::new(&self.index_name);
        match &self.signing_service {
            Some(service) => {
                let session = session.context("request signing needs AWS credentials")?;
                Ok(store.with_signer(session.signer(service)))
            }
            None => Ok(store),
        }
    }

    fn eligibility_filter(&self) -> anyhow::Result<EligibilityFilter> {
        let mut filter = EligibilityFilter::site_defaults(DEFAULT_DOCUMENT_SUFFIX);
        for pattern in &self.excludes {
            filter = filter.with_rule(EligibilityRule::exclude(
                KeyPattern::regex(pattern)?,
                format!("matches --exclude {pattern}"),
            ));
        }
        Ok(filter)
    }

    fn indexer_settings(&self) -> IndexerSettings {
        IndexerSettings {
            retry: self.retry_policy(),
            ..Default::default()
        }
    }

    fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            retry: self.retry_policy(),
            ..Default::default()
        }
    }
}

fn object_store(
    objects_root: Option<PathBuf>,
    s3_endpoint: Option<String>,
    session: Option<&AwsSession>,
) -> anyhow::Result<DynObjects> {
    if let Some(root) = objects_root {
        return Ok(Box::new(FsObjectStore::new(root)));
    }

    let session = session.context("reading from S3 needs AWS credentials")?;
    let store = S3ObjectStore::new(session);
    Ok(Box::new(match s3_endpoint {
        Some(endpoint) => store.with_endpoint(endpoint),
        None => store,
    }))
}

async fn run_indexer(
    cli: &Cli,
    session: Option<&AwsSession>,
    objects: DynObjects,
    event: &StorageEvent,
) -> anyhow::Result<()> {
    let indexer = Indexer::new(
        objects,
        cli.parameter_store(session)?,
        cli.search_backend(session)?,
        cli.indexer_settings(),
    )?
    .with_filter(cli.eligibility_filter()?);

    let summary = indexer.handle_event(event).await;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !summary.is_success() {
        anyhow::bail!(
            "{} of {} records failed",
            summary.failed(),
            summary.outcomes.len()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let session = match AwsSession::from_env(&cli.region) {
        Ok(session) => Some(session),
        Err(error) => {
            warn!(error = %error, "no AWS session; signed requests are unavailable");
            None
        }
    };

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "site-search boot"
    );

    match &cli.command {
        Command::IndexEvent {
            event,
            objects_root,
            s3_endpoint,
        } => {
            let raw = tokio::fs::read_to_string(event)
                .await
                .with_context(|| format!("reading {}", event.display()))?;
            let event: StorageEvent = serde_json::from_str(&raw)?;
            let objects = object_store(objects_root.clone(), s3_endpoint.clone(), session.as_ref())?;

            info!(records = event.records.len(), "processing storage event");
            run_indexer(&cli, session.as_ref(), objects, &event).await?;
        }
        Command::Backfill {
            objects_root,
            bucket,
        } => {
            let records: Vec<_> = discover_object_keys(&objects_root.join(bucket))
                .iter()
                .map(|key| StorageRecord::object_created(bucket.as_str(), encode_storage_key(key)))
                .collect();

            info!(bucket = %bucket, records = records.len(), "backfilling bucket");
            let objects: DynObjects = Box::new(FsObjectStore::new(objects_root));
            run_indexer(&cli, session.as_ref(), objects, &StorageEvent { records }).await?;
        }
        Command::Serve { bind } => {
            let gateway = QueryGateway::new(
                cli.parameter_store(session.as_ref())?,
                cli.search_backend(session.as_ref())?,
                cli.gateway_settings(),
            );
            server::serve(bind, Arc::new(gateway)).await?;
        }
        Command::GatewayEvent { event } => {
            let raw = tokio::fs::read_to_string(event)
                .await
                .with_context(|| format!("reading {}", event.display()))?;
            let request = GatewayRequest::from_proxy_event(&serde_json::from_str(&raw)?);
            let gateway = QueryGateway::new(
                cli.parameter_store(session.as_ref())?,
                cli.search_backend(session.as_ref())?,
                cli.gateway_settings(),
            );
            let response = gateway.handle(&request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Search { query } => {
            let gateway = QueryGateway::new(
                cli.parameter_store(session.as_ref())?,
                cli.search_backend(session.as_ref())?,
                cli.gateway_settings(),
            );
            let response = gateway.handle(&GatewayRequest::search(query.as_str())).await;
            if response.status_code != 200 {
                anyhow::bail!("search failed with status {}: {}", response.status_code, response.body);
            }
            println!("{}", response.body);
        }
        Command::Extract { file, key, host } => {
            let html = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let extractor = HtmlExtractor::with_default_markers()?;
            let document = extractor.extract(&html, format!("{host}{key}"));

            println!("document_id: {}", document_id_for_key(key, DEFAULT_DOCUMENT_SUFFIX));
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
    }

    Ok(())
}
