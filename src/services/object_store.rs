//! The storage seam every higher layer talks through
//!
//! `ObjectStore` is the one-page-at-a-time, single-object view of the remote
//! store. Listing sessions, the view state and batch operations all depend on
//! this trait rather than on the SDK client, which keeps them testable with
//! scripted or mocked stores.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc::Sender;

use crate::model::error::StoreError;
use crate::model::page::ListObjectsPage;
use crate::services::progress::TransferUpdate;
use crate::settings::Settings;

/// Payload for a single-object upload
#[derive(Debug, Clone, PartialEq)]
pub enum PutBody {
    File(PathBuf),
    Bytes(Vec<u8>),
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one page of a listing. `marker` is the exclusive key to resume
    /// after; `delimiter` may be empty for a flat listing.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
        marker: Option<String>,
    ) -> Result<ListObjectsPage, StoreError>;

    /// Upload a single object, reporting progress per streamed chunk when a
    /// sender is supplied.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: PutBody,
        content_type: Option<String>,
        progress: Option<Sender<TransferUpdate>>,
    ) -> Result<(), StoreError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// `Ok(true)` when the key exists, `Ok(false)` when the store reports 404.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<bool, StoreError>;

    /// Short-lived signed GET url for a single object
    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StoreError>;

    /// Cheap reachability probe for the configured bucket
    async fn head_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    /// Swap in new connection settings. Calls already in flight keep the
    /// settings they started with; every later call sees the new ones.
    async fn apply_settings(&self, settings: &Settings);
}
