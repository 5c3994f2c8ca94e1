/*!
Amazon DynamoDB record store.

This module backs [`RecordStoreClient`] with the official AWS SDK. The SDK is
async; the adapter owns a Tokio runtime and blocks on each call so the rest of
the pipeline stays synchronous.
*/

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
#[cfg(feature = "metrics")]
use std::time::Instant;

use aws_sdk_dynamodb::config::{Credentials, Region};
use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{KeyType, PutRequest, WriteRequest};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use tablesnap_retry::{throughput_backoff_policy, with_backoff, Backoff, RetryableError};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use super::attribute::{item_to_record, record_to_item};
use super::{BulkWriteSession, RecordStoreClient, ScanPage};
use crate::config::StoreConfig;
use crate::record::{ContinuationToken, Record};
use crate::{Result, TableSnapError};

/// BatchWriteItem accepts at most this many requests per call
const MAX_BATCH_SIZE: usize = 25;

/// Amazon DynamoDB record store
///
/// # Authentication
/// Explicit credentials from [`StoreConfig`] win; otherwise the standard AWS
/// credential provider chain applies (environment, profile, instance role).
///
/// # Example
/// ```rust,no_run
/// use tablesnap_core::{scan_table, DynamoDbRecordStore, StoreConfig};
///
/// let mut config = StoreConfig::default();
/// config.endpoint_url = Some("http://localhost:8000".to_string());
///
/// let store = DynamoDbRecordStore::new(&config)?;
/// let records = scan_table(&store, "users")?;
/// # Ok::<(), tablesnap_core::TableSnapError>(())
/// ```
#[derive(Debug, Clone)]
pub struct DynamoDbRecordStore {
    client: DynamoDbClient,
    runtime: Arc<Runtime>,
}

impl DynamoDbRecordStore {
    /// Create a store from connection settings
    ///
    /// # Errors
    /// Returns a validation error for inconsistent settings, or a retrieval
    /// error when the async runtime cannot be created.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let runtime = Runtime::new().map_err(|e| {
            TableSnapError::retrieval(format!(
                "Failed to create async runtime for DynamoDB client: {e}"
            ))
        })?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint_url) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url.clone());
        }
        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                None,
                None,
                "tablesnap",
            ));
        }

        let sdk_config = runtime.block_on(loader.load());
        let client = DynamoDbClient::new(&sdk_config);

        info!(
            region = %config.region,
            endpoint = config.endpoint_url.as_deref().unwrap_or("default"),
            "Initialized DynamoDB record store"
        );

        Ok(Self {
            client,
            runtime: Arc::new(runtime),
        })
    }

    /// Create a store around an already configured SDK client
    pub fn with_client(client: DynamoDbClient) -> Result<Self> {
        let runtime = Runtime::new().map_err(|e| {
            TableSnapError::retrieval(format!(
                "Failed to create async runtime for DynamoDB client: {e}"
            ))
        })?;
        Ok(Self {
            client,
            runtime: Arc::new(runtime),
        })
    }
}

impl RecordStoreClient for DynamoDbRecordStore {
    fn scan_page(&self, table: &str, token: Option<ContinuationToken>) -> Result<ScanPage> {
        let start_key = token.map(|token| record_to_item(token.into_key()));
        debug!(table = %table, resumed = start_key.is_some(), "Starting DynamoDB scan request");

        #[cfg(feature = "metrics")]
        let started = Instant::now();

        let result = self.runtime.block_on(with_backoff("dynamodb.scan", |_attempt| {
            let request = self
                .client
                .scan()
                .table_name(table)
                .set_exclusive_start_key(start_key.clone());
            async move {
                request
                    .send()
                    .await
                    .map_err(|e| map_dynamodb_error("scan", e))
            }
        }));

        #[cfg(feature = "metrics")]
        crate::observability::record_store_call(started.elapsed(), result.is_ok());

        let output = result.map_err(|e| {
            TableSnapError::retrieval(format!("Scan of table '{table}' failed: {e}"))
        })?;

        let records = output
            .items()
            .iter()
            .map(item_to_record)
            .collect::<Result<Vec<_>>>()?;
        let next = output
            .last_evaluated_key()
            .map(item_to_record)
            .transpose()?
            .map(ContinuationToken::new);

        Ok(ScanPage::new(records, next))
    }

    fn bulk_writer(&self, table: &str) -> Result<Box<dyn BulkWriteSession>> {
        Ok(Box::new(DynamoDbWriteSession {
            client: self.client.clone(),
            runtime: Arc::clone(&self.runtime),
            table: table.to_string(),
            pending: Vec::with_capacity(MAX_BATCH_SIZE),
        }))
    }

    fn partition_key(&self, table: &str) -> Result<Option<String>> {
        let output = self
            .runtime
            .block_on(with_backoff("dynamodb.describe_table", |_attempt| {
                let request = self.client.describe_table().table_name(table);
                async move {
                    request
                        .send()
                        .await
                        .map_err(|e| map_dynamodb_error("describe_table", e))
                }
            }))
            .map_err(|e| {
                TableSnapError::retrieval(format!("Describe of table '{table}' failed: {e}"))
            })?;

        let key = output
            .table()
            .map(|description| description.key_schema())
            .unwrap_or_default()
            .iter()
            .find(|element| element.key_type() == &KeyType::Hash)
            .map(|element| element.attribute_name().to_string());

        debug!(table = %table, partition_key = ?key, "Resolved partition key");
        Ok(key)
    }
}

/// Buffers puts and sends them as BatchWriteItem calls of up to 25 requests
struct DynamoDbWriteSession {
    client: DynamoDbClient,
    runtime: Arc<Runtime>,
    table: String,
    pending: Vec<WriteRequest>,
}

impl DynamoDbWriteSession {
    /// Send one batch, resubmitting whatever DynamoDB reports as unprocessed
    fn send_batch(&self, batch: Vec<WriteRequest>) -> Result<()> {
        let mut policy = throughput_backoff_policy();
        self.runtime.block_on(resubmit_unprocessed(
            &self.table,
            batch,
            &mut policy,
            |pending| self.batch_write(pending),
        ))
    }

    /// One BatchWriteItem call; returns the requests left unprocessed
    async fn batch_write(&self, pending: Vec<WriteRequest>) -> Result<Vec<WriteRequest>> {
        let table = self.table.as_str();

        #[cfg(feature = "metrics")]
        let started = Instant::now();

        let result = with_backoff("dynamodb.batch_write_item", |_attempt| {
            let request = self
                .client
                .batch_write_item()
                .request_items(table, pending.clone());
            async move {
                request
                    .send()
                    .await
                    .map_err(|e| map_dynamodb_error("batch_write_item", e))
            }
        })
        .await;

        #[cfg(feature = "metrics")]
        crate::observability::record_store_call(started.elapsed(), result.is_ok());

        let output = result.map_err(|e| {
            TableSnapError::write(format!("Batch write to table '{table}' failed: {e}"))
        })?;

        Ok(output
            .unprocessed_items()
            .and_then(|items| items.get(table))
            .cloned()
            .unwrap_or_default())
    }
}

/// Drive `send` until it reports nothing unprocessed
///
/// `send` returns the part of its input the store did not apply. Leftovers
/// are resubmitted after the next delay from `policy`; once the policy gives
/// up the write fails.
async fn resubmit_unprocessed<T, B, F, Fut>(
    table: &str,
    batch: Vec<T>,
    policy: &mut B,
    mut send: F,
) -> Result<()>
where
    B: Backoff,
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let size = batch.len();
    let mut pending = batch;

    loop {
        let unprocessed = send(pending).await?;

        if unprocessed.is_empty() {
            debug!(table = %table, size, "Wrote batch");
            return Ok(());
        }

        match policy.next_backoff() {
            Some(delay) => {
                warn!(
                    table = %table,
                    unprocessed = unprocessed.len(),
                    delay_ms = delay.as_millis() as u64,
                    "DynamoDB left items unprocessed, resubmitting"
                );
                tokio::time::sleep(delay).await;
                pending = unprocessed;
            }
            None => {
                return Err(TableSnapError::write(format!(
                    "{} items still unprocessed for table '{table}' after backing off",
                    unprocessed.len()
                )))
            }
        }
    }
}

impl BulkWriteSession for DynamoDbWriteSession {
    fn put(&mut self, record: Record) -> Result<()> {
        let put = PutRequest::builder()
            .set_item(Some(record_to_item(record)))
            .build()
            .map_err(|e| TableSnapError::write(format!("Invalid put request: {e}")))?;
        self.pending
            .push(WriteRequest::builder().put_request(put).build());

        if self.pending.len() >= MAX_BATCH_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        while !self.pending.is_empty() {
            let take = self.pending.len().min(MAX_BATCH_SIZE);
            let batch: Vec<WriteRequest> = self.pending.drain(..take).collect();
            self.send_batch(batch)?;
        }
        Ok(())
    }
}

/// A failed SDK call, classified for the retry helper
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
struct StoreCallError {
    message: String,
    transient: bool,
}

impl RetryableError for StoreCallError {
    fn is_transient(&self) -> bool {
        self.transient
    }
}

/// Codes DynamoDB uses for throttling and server-side hiccups
const TRANSIENT_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "ThrottlingException",
    "RequestLimitExceeded",
    "InternalServerError",
    "ServiceUnavailable",
];

/// Map AWS SDK errors to a retry-classified error with context
fn map_dynamodb_error<E, R>(op: &str, error: SdkError<E, R>) -> StoreCallError
where
    E: ProvideErrorMetadata + Debug,
    R: Debug,
{
    match &error {
        SdkError::DispatchFailure(dispatch_err) => StoreCallError {
            message: format!("DynamoDB {op} request failed to dispatch: {dispatch_err:?}"),
            transient: true,
        },
        SdkError::TimeoutError(_) => StoreCallError {
            message: format!("DynamoDB {op} request timed out"),
            transient: true,
        },
        SdkError::ResponseError(response_err) => StoreCallError {
            message: format!("DynamoDB {op} response error: {response_err:?}"),
            transient: true,
        },
        SdkError::ServiceError(service_err) => {
            classify_service_error(op, service_err.err().code(), service_err.err().message())
        }
        _ => StoreCallError {
            message: format!("DynamoDB {op} error: {error:?}"),
            transient: false,
        },
    }
}

/// Classify a service error by its DynamoDB error code
fn classify_service_error(op: &str, code: Option<&str>, message: Option<&str>) -> StoreCallError {
    let message = match code {
        Some("ResourceNotFoundException") => format!("DynamoDB {op}: table not found"),
        Some("AccessDeniedException" | "UnrecognizedClientException") => {
            format!("DynamoDB {op}: access denied (check credentials and permissions)")
        }
        Some(code) => format!(
            "DynamoDB {op} service error ({code}): {}",
            message.unwrap_or("Unknown error")
        ),
        None => format!(
            "DynamoDB {op} service error: {}",
            message.unwrap_or("Unknown error")
        ),
    };
    StoreCallError {
        message,
        transient: code.is_some_and(|code| TRANSIENT_CODES.contains(&code)),
    }
}
