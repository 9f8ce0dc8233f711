use aws_smithy_types::DateTime;

/// One object as reported in a listing response, before partitioning
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteObject {
    pub key: String,
    pub size: Option<u64>,
    pub last_modified: Option<DateTime>,
    pub storage_class: Option<String>,
}

impl RemoteObject {
    pub fn new(key: impl Into<String>) -> RemoteObject {
        RemoteObject {
            key: key.into(),
            ..Default::default()
        }
    }
}

/// One page of a paginated `list_objects` response.
///
/// Folders arrive in `common_prefixes` when a delimiter was supplied and as
/// trailing-slash keys inside `contents` when it was not.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListObjectsPage {
    pub contents: Vec<RemoteObject>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    /// Marker for the next page; absent on some S3-compatibles even when truncated
    pub next_marker: Option<String>,
}
