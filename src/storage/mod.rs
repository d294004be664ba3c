// src/storage/mod.rs
//! Client for the content-addressed blob storage network
//!
//! The network is reached through a list of interchangeable endpoints, each pairing a
//! publisher (uploads, deletes) with an aggregator (downloads, probes). Every call walks the
//! list from the top in priority order; nothing about a previous call's failures is remembered.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::BlobRecord;

pub mod http;
pub mod tiered;

/// Why one endpoint could not serve a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointFailure {
    pub endpoint: String,
    pub reason: String,
}

/// Errors related to blob storage
#[derive(Debug, Error)]
pub enum StorageError {
    /// Every configured endpoint failed; one entry per endpoint, in the order tried
    #[error("All {} storage endpoints failed", .0.len())]
    AllEndpointsFailed(Vec<EndpointFailure>),

    /// No endpoints were configured
    #[error("No storage endpoints configured")]
    NoEndpoints,
}

/// A publisher/aggregator pair serving the same network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEndpoint {
    pub publisher: String,
    pub aggregator: String,
}

impl StorageEndpoint {
    pub fn new(publisher: &str, aggregator: &str) -> Self {
        Self {
            publisher: publisher.trim_end_matches('/').to_string(),
            aggregator: aggregator.trim_end_matches('/').to_string(),
        }
    }

    fn store_url(&self, options: &StoreOptions) -> String {
        let mut url = format!("{}/v1/store?epochs={}", self.publisher, options.epochs);
        if options.deletable {
            url.push_str("&deletable=true");
        }
        url
    }

    fn blob_url(&self, blob_id: &str) -> String {
        format!("{}/v1/{}", self.aggregator, blob_id)
    }

    fn publisher_blob_url(&self, blob_id: &str) -> String {
        format!("{}/v1/{}", self.publisher, blob_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Number of storage epochs to pay for
    pub epochs: u32,
    pub deletable: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            epochs: 5,
            deletable: false,
        }
    }
}

/// Result of a metadata probe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobMetadata {
    pub exists: bool,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Put,
    Head,
    Delete,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Uploaded as a multipart file part
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct HttpReply {
    pub status: u16,
    /// Header names are lower case
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// The wire underneath the blob store. Errors are network-level failures described as text.
#[async_trait]
pub trait BlobTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, String>;
}

/// Upload response. Publishers answer either with a flat `{blobId}` or with a
/// `newlyCreated`/`alreadyCertified` wrapper.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreResponse {
    blob_id: Option<String>,
    newly_created: Option<NewlyCreated>,
    already_certified: Option<AlreadyCertified>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewlyCreated {
    blob_object: BlobObject,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobObject {
    blob_id: String,
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlreadyCertified {
    blob_id: String,
}

impl StoreResponse {
    fn into_blob_id_and_size(self) -> Option<(String, Option<u64>)> {
        if let Some(created) = self.newly_created {
            return Some((created.blob_object.blob_id, created.blob_object.size));
        }
        if let Some(certified) = self.already_certified {
            return Some((certified.blob_id, None));
        }
        self.blob_id.map(|id| (id, None))
    }
}

pub struct BlobStore {
    endpoints: Vec<StorageEndpoint>,
    transport: Arc<dyn BlobTransport>,
}

impl BlobStore {
    pub fn new(endpoints: Vec<StorageEndpoint>, transport: Arc<dyn BlobTransport>) -> Self {
        Self {
            endpoints: endpoints
                .iter()
                .map(|e| StorageEndpoint::new(&e.publisher, &e.aggregator))
                .collect(),
            transport,
        }
    }

    pub fn endpoints(&self) -> &[StorageEndpoint] {
        &self.endpoints
    }

    /// Upload `data`, succeeding on the first endpoint that accepts it
    pub async fn store(&self, data: &[u8], options: StoreOptions) -> Result<BlobRecord, StorageError> {
        if self.endpoints.is_empty() {
            return Err(StorageError::NoEndpoints);
        }

        let mut failures = Vec::new();
        for endpoint in &self.endpoints {
            let request = HttpRequest {
                method: HttpMethod::Put,
                url: endpoint.store_url(&options),
                body: Some(data.to_vec()),
            };

            match self.try_store(request, data.len()).await {
                Ok((blob_id, size)) => {
                    info!("Stored {} byte blob {} via {}", data.len(), blob_id, endpoint.publisher);
                    return Ok(BlobRecord {
                        blob_id,
                        size,
                        endpoint: endpoint.publisher.clone(),
                    });
                }
                Err(reason) => {
                    warn!("Store via {} failed: {}", endpoint.publisher, reason);
                    failures.push(EndpointFailure {
                        endpoint: endpoint.publisher.clone(),
                        reason,
                    });
                }
            }
        }

        Err(StorageError::AllEndpointsFailed(failures))
    }

    async fn try_store(&self, request: HttpRequest, len: usize) -> Result<(String, u64), String> {
        let reply = self.transport.send(request).await?;
        if !reply.is_success() {
            return Err(format!("HTTP {}", reply.status));
        }

        let parsed: StoreResponse = serde_json::from_slice(&reply.body)
            .map_err(|e| format!("invalid store response: {}", e))?;
        let (blob_id, size) = parsed
            .into_blob_id_and_size()
            .ok_or_else(|| "store response carries no blob id".to_string())?;

        Ok((blob_id, size.unwrap_or(len as u64)))
    }

    /// Download a blob, trying each aggregator until one answers with 2xx
    pub async fn retrieve(&self, blob_id: &str) -> Result<Vec<u8>, StorageError> {
        if self.endpoints.is_empty() {
            return Err(StorageError::NoEndpoints);
        }

        let mut failures = Vec::new();
        for endpoint in &self.endpoints {
            let request = HttpRequest {
                method: HttpMethod::Get,
                url: endpoint.blob_url(blob_id),
                body: None,
            };

            let reason = match self.transport.send(request).await {
                Ok(reply) if reply.is_success() => {
                    debug!("Retrieved blob {} ({} bytes) via {}", blob_id, reply.body.len(), endpoint.aggregator);
                    return Ok(reply.body);
                }
                Ok(reply) => format!("HTTP {}", reply.status),
                Err(e) => e,
            };

            warn!("Retrieve of {} via {} failed: {}", blob_id, endpoint.aggregator, reason);
            failures.push(EndpointFailure {
                endpoint: endpoint.aggregator.clone(),
                reason,
            });
        }

        Err(StorageError::AllEndpointsFailed(failures))
    }

    /// Best-effort existence probe against the first endpoint only
    pub async fn exists(&self, blob_id: &str) -> bool {
        self.get_metadata(blob_id).await.exists
    }

    /// Best-effort metadata probe against the first endpoint only.
    ///
    /// Any failure is reported as a missing blob.
    pub async fn get_metadata(&self, blob_id: &str) -> BlobMetadata {
        let Some(endpoint) = self.endpoints.first() else {
            return BlobMetadata::default();
        };

        let request = HttpRequest {
            method: HttpMethod::Head,
            url: endpoint.blob_url(blob_id),
            body: None,
        };

        match self.transport.send(request).await {
            Ok(reply) if reply.is_success() => BlobMetadata {
                exists: true,
                size: reply.header("content-length").and_then(|v| v.parse().ok()),
                content_type: reply.header("content-type").map(str::to_string),
                last_modified: reply.header("last-modified").map(str::to_string),
            },
            Ok(reply) => {
                debug!("Metadata probe for {} returned HTTP {}", blob_id, reply.status);
                BlobMetadata::default()
            }
            Err(e) => {
                warn!("Metadata probe for {} failed: {}", blob_id, e);
                BlobMetadata::default()
            }
        }
    }

    /// Best-effort delete against the first endpoint only
    pub async fn delete(&self, blob_id: &str) -> bool {
        let Some(endpoint) = self.endpoints.first() else {
            return false;
        };

        let request = HttpRequest {
            method: HttpMethod::Delete,
            url: endpoint.publisher_blob_url(blob_id),
            body: None,
        };

        match self.transport.send(request).await {
            Ok(reply) if reply.is_success() => {
                info!("Deleted blob {}", blob_id);
                true
            }
            Ok(reply) => {
                warn!("Delete of {} returned HTTP {}", blob_id, reply.status);
                false
            }
            Err(e) => {
                warn!("Delete of {} failed: {}", blob_id, e);
                false
            }
        }
    }

    /// Store each item in turn. One result per item, in input order.
    pub async fn batch_store(
        &self,
        items: &[Vec<u8>],
        options: StoreOptions,
    ) -> Vec<Result<BlobRecord, StorageError>> {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            results.push(self.store(item, options).await);
        }
        log_batch("store", &results);
        results
    }

    /// Retrieve each blob in turn. One result per id, in input order.
    pub async fn batch_retrieve(&self, blob_ids: &[String]) -> Vec<Result<Vec<u8>, StorageError>> {
        let mut results = Vec::with_capacity(blob_ids.len());
        for blob_id in blob_ids {
            results.push(self.retrieve(blob_id).await);
        }
        log_batch("retrieve", &results);
        results
    }
}

fn log_batch<T>(operation: &str, results: &[Result<T, StorageError>]) {
    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        warn!("Batch {}: {} of {} items failed", operation, failed, results.len());
    } else {
        debug!("Batch {}: {} items succeeded", operation, results.len());
    }
}
