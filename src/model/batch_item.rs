use std::path::PathBuf;

/// Payload for an upload item
#[derive(Debug, Clone, PartialEq)]
pub enum BatchSource {
    /// Upload the file at this local path
    File(PathBuf),
    /// Upload an in-memory body (zero-byte for folder placeholders)
    Bytes(Vec<u8>),
    /// Delete the remote key named by the item's target
    Remote,
}

/// One unit of work inside a batch: a single put or delete.
///
/// Items are a plain ordered collection indexed explicitly; completion order
/// across items is not defined.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub source: BatchSource,
    /// Remote key the call targets
    pub target_key: String,
    /// Content type forwarded on uploads
    pub content_type: Option<String>,
}

impl BatchItem {
    pub fn upload(path: impl Into<PathBuf>, target_key: impl Into<String>) -> BatchItem {
        BatchItem {
            source: BatchSource::File(path.into()),
            target_key: target_key.into(),
            content_type: None,
        }
    }

    pub fn upload_bytes(bytes: Vec<u8>, target_key: impl Into<String>) -> BatchItem {
        BatchItem {
            source: BatchSource::Bytes(bytes),
            target_key: target_key.into(),
            content_type: None,
        }
    }

    pub fn delete(target_key: impl Into<String>) -> BatchItem {
        BatchItem {
            source: BatchSource::Remote,
            target_key: target_key.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> BatchItem {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn is_delete(&self) -> bool {
        matches!(self.source, BatchSource::Remote)
    }
}

/// Terminal outcome of one batch item
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Success,
    /// Expected lack of permission; shown inline, never escalated
    AccessDenied,
    /// Cancelled before or during the call
    Aborted,
    /// Anything else; escalated to the error surface
    OtherFailure(String),
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success)
    }
}
