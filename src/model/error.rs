//! Structured error types for storage operations and the error surface

use std::fmt;

/// Errors coming back from the object store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Insufficient permissions; an expected, per-item condition
    AccessDenied(String),
    /// Bucket or key does not exist
    NotFound(String),
    /// An object already exists at the key (folder creation)
    AlreadyExists(String),
    /// Cancelled by the user; not an error
    Aborted,
    /// Anything else: networking, signing, throttling, service faults
    Transport(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::AccessDenied(msg) => write!(f, "Access denied: {}", msg),
            StoreError::NotFound(msg) => write!(f, "Not found: {}", msg),
            StoreError::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),
            StoreError::Aborted => write!(f, "Aborted"),
            StoreError::Transport(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl StoreError {
    /// Classify a storage error from its service error code, falling back to
    /// message sniffing when no code is available.
    pub fn from_code(code: Option<&str>, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match code {
            Some("AccessDenied") | Some("Forbidden") => StoreError::AccessDenied(msg),
            Some("NoSuchBucket") | Some("NoSuchKey") | Some("NotFound") => {
                StoreError::NotFound(msg)
            }
            Some(_) => StoreError::Transport(msg),
            None => StoreError::from_message(msg),
        }
    }

    /// Best-effort classification from an error message alone
    pub fn from_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let msg_lower = msg.to_lowercase();

        if msg_lower.contains("access denied") || msg_lower.contains("accessdenied") {
            StoreError::AccessDenied(msg)
        } else if msg_lower.contains("no such bucket")
            || msg_lower.contains("nosuchbucket")
            || msg_lower.contains("no such key")
            || msg_lower.contains("nosuchkey")
            || msg_lower.contains("not found")
        {
            StoreError::NotFound(msg)
        } else {
            StoreError::Transport(msg)
        }
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, StoreError::AccessDenied(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Short code string for display alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::AccessDenied(_) => "AccessDenied",
            StoreError::NotFound(_) => "NotFound",
            StoreError::AlreadyExists(_) => "AlreadyExists",
            StoreError::Aborted => "Aborted",
            StoreError::Transport(_) => "TransportFailure",
        }
    }
}

/// What the global error surface displays: the failing call's context plus
/// key/value pairs extracted from the error and the request parameters.
/// Requires explicit acknowledgment by the consumer; nothing auto-dismisses.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    /// Which operation failed, e.g. `list_objects`
    pub context: String,
    pub code: String,
    pub message: String,
    pub details: Vec<(String, String)>,
}

impl ErrorReport {
    pub fn new(context: impl Into<String>, error: &StoreError) -> ErrorReport {
        ErrorReport {
            context: context.into(),
            code: error.code().to_string(),
            message: error.to_string(),
            details: Vec::new(),
        }
    }

    /// Attach a request parameter or error attribute for inspection
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> ErrorReport {
        self.details.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.context, self.code, self.message)?;
        for (key, value) in &self.details {
            write!(f, "\n  {} = {}", key, value)?;
        }
        Ok(())
    }
}
