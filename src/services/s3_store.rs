//! SDK-backed implementation of [`ObjectStore`]
//!
//! Auth settings live behind a lock and are re-read on every call, so a
//! settings change between two pages of the same listing takes effect on the
//! very next request. Clients are cached per identity, region and endpoint
//! because the SDK is designed to reuse them.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::{ByteStream, SdkBody};
use aws_sdk_s3::Client;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use tokio::sync::mpsc::Sender;
use tokio::sync::RwLock;

use crate::model::error::StoreError;
use crate::model::page::{ListObjectsPage, RemoteObject};
use crate::services::object_store::{ObjectStore, PutBody};
use crate::services::progress::{ProgressBody, TransferUpdate};
use crate::settings::Settings;

/// Turn a service error into a [`StoreError`] using its code when present
pub(crate) fn classify_service<E>(err: E) -> StoreError
where
    E: ProvideErrorMetadata + fmt::Display,
{
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string());
    StoreError::from_code(err.code(), message)
}

/// Everything a request needs to pick or build its client
#[derive(Debug, Clone)]
struct AuthState {
    signed: bool,
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
    region: String,
    endpoint_url: Option<String>,
    force_path_style: bool,
}

impl AuthState {
    fn from_settings(settings: &Settings) -> AuthState {
        AuthState {
            signed: settings.has_keys(),
            access_key_id: settings.credentials.access_key_id.clone(),
            secret_access_key: settings.credentials.secret_access_key.clone(),
            session_token: settings.credentials.session_token.clone(),
            region: settings.region.clone(),
            endpoint_url: settings.endpoint_url.clone(),
            force_path_style: settings.force_path_style,
        }
    }

    /// Cache identity: anonymous clients all share one slot per region
    fn identity(&self) -> &str {
        if self.signed {
            &self.access_key_id
        } else {
            "anonymous"
        }
    }
}

/// Cache key for S3 clients, combining identity, region and endpoint
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ClientCacheKey {
    identity: String,
    region: String,
    endpoint: Option<String>,
}

/// Pool of S3 clients for reuse across operations.
///
/// AWS SDK clients are designed to be reused. This pool caches clients
/// by identity, region and endpoint to avoid recreating them per request.
#[derive(Clone)]
pub(crate) struct ClientPool {
    clients: Arc<RwLock<HashMap<ClientCacheKey, Client>>>,
}

impl ClientPool {
    pub(crate) fn new() -> Self {
        ClientPool {
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get an existing client or create a new one for the given auth state
    async fn get_or_create(&self, auth: &AuthState) -> Client {
        let key = ClientCacheKey {
            identity: auth.identity().to_string(),
            region: auth.region.clone(),
            endpoint: auth.endpoint_url.clone(),
        };

        // Try to get existing client (read lock)
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(&key) {
                tracing::debug!(
                    region = %key.region,
                    identity = %key.identity,
                    "reusing cached S3 client"
                );
                return client.clone();
            }
        }

        // Create new client (write lock)
        let mut clients = self.clients.write().await;

        // Double-check in case another task created it while we waited for write lock
        if let Some(client) = clients.get(&key) {
            return client.clone();
        }

        tracing::debug!(
            region = %key.region,
            identity = %key.identity,
            "creating new S3 client"
        );

        let client = build_client(auth).await;
        clients.insert(key, client.clone());
        client
    }

    /// Drop all cached clients (used when settings are replaced)
    pub(crate) async fn clear(&self) {
        let mut clients = self.clients.write().await;
        clients.clear();
    }

    #[allow(dead_code)] // Used in tests
    pub(crate) async fn cached_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

async fn build_client(auth: &AuthState) -> Client {
    let region_provider = if auth.region.is_empty() {
        RegionProviderChain::default_provider().or_else(Region::new("us-east-1"))
    } else {
        RegionProviderChain::first_try(Region::new(auth.region.clone()))
            .or_default_provider()
            .or_else(Region::new("us-east-1"))
    };

    let loader = aws_config::from_env().region(region_provider);
    let loader = if auth.signed {
        loader.credentials_provider(Credentials::new(
            auth.access_key_id.clone(),
            auth.secret_access_key.clone(),
            auth.session_token.clone(),
            None,
            "settings",
        ))
    } else {
        // Unsigned requests for public buckets
        loader.no_credentials()
    };
    let shared_config = loader.load().await;

    let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
    if let Some(url) = &auth.endpoint_url {
        builder = builder.endpoint_url(url);
    }
    if auth.force_path_style {
        builder = builder.force_path_style(true);
    }
    Client::from_conf(builder.build())
}

/// The production [`ObjectStore`], backed by `aws-sdk-s3`
pub struct S3Store {
    auth: RwLock<AuthState>,
    pool: ClientPool,
}

impl S3Store {
    pub fn new(settings: &Settings) -> S3Store {
        S3Store {
            auth: RwLock::new(AuthState::from_settings(settings)),
            pool: ClientPool::new(),
        }
    }

    /// Client for the auth state as of right now
    async fn client(&self) -> Client {
        let auth = self.auth.read().await.clone();
        self.pool.get_or_create(&auth).await
    }

    async fn body_stream(body: PutBody) -> Result<ByteStream, StoreError> {
        match body {
            PutBody::File(path) => file_stream(&path).await,
            PutBody::Bytes(data) => Ok(ByteStream::from(data)),
        }
    }
}

async fn file_stream(path: &PathBuf) -> Result<ByteStream, StoreError> {
    ByteStream::from_path(path)
        .await
        .map_err(|e| StoreError::Transport(format!("cannot read {}: {}", path.display(), e)))
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
        marker: Option<String>,
    ) -> Result<ListObjectsPage, StoreError> {
        let client = self.client().await;

        let mut request = client.list_objects().bucket(bucket);
        if !prefix.is_empty() {
            request = request.prefix(prefix);
        }
        if !delimiter.is_empty() {
            request = request.delimiter(delimiter);
        }
        if let Some(marker) = marker {
            request = request.marker(marker);
        }

        let output = request
            .send()
            .await
            .map_err(|e| classify_service(e.into_service_error()))?;

        let contents = output
            .contents()
            .iter()
            .map(|obj| RemoteObject {
                key: obj.key().unwrap_or_default().to_string(),
                size: obj.size().and_then(|s| u64::try_from(s).ok()),
                last_modified: obj.last_modified().cloned(),
                storage_class: obj.storage_class().map(|c| c.as_str().to_string()),
            })
            .collect();
        let common_prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        Ok(ListObjectsPage {
            contents,
            common_prefixes,
            is_truncated: output.is_truncated().unwrap_or(false),
            next_marker: output.next_marker().map(str::to_string),
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: PutBody,
        content_type: Option<String>,
        progress: Option<Sender<TransferUpdate>>,
    ) -> Result<(), StoreError> {
        let client = self.client().await;
        let stream = Self::body_stream(body).await?;

        let mut request = client.put_object().bucket(bucket).key(key).body(stream);
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        match progress {
            Some(tx) => {
                let key = key.to_string();
                request
                    .customize()
                    .map_request(move |req| {
                        ProgressBody::<SdkBody>::replace(req, &key, tx.clone())
                    })
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| classify_service(e.into_service_error()))
            }
            None => request
                .send()
                .await
                .map(|_| ())
                .map_err(|e| classify_service(e.into_service_error())),
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let client = self.client().await;
        client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify_service(e.into_service_error()))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        let client = self.client().await;
        match client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(classify_service(service_error))
                }
            }
        }
    }

    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StoreError> {
        let client = self.client().await;
        let config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let presigned = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| classify_service(e.into_service_error()))?;
        Ok(presigned.uri().to_string())
    }

    async fn head_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        let client = self.client().await;
        match client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Err(StoreError::NotFound(format!("bucket {} not found", bucket)))
                } else {
                    Err(classify_service(service_error))
                }
            }
        }
    }

    async fn apply_settings(&self, settings: &Settings) {
        {
            let mut auth = self.auth.write().await;
            *auth = AuthState::from_settings(settings);
        }
        // Drop cached clients so refreshed credentials take effect even when
        // the access key id is unchanged.
        self.pool.clear().await;
    }
}
