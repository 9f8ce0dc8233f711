use std::fmt;

/// Lifecycle of a listing session.
///
/// Terminal states are final: a new user action always creates a brand-new
/// session rather than resuming an old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created but not yet running
    Idle,
    /// Requesting pages
    Running,
    /// Listing exhausted
    Completed,
    /// Stop flag observed between pages
    Stopped,
    /// A page request failed; no retry
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Stopped | SessionState::Failed
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Running counts accumulated over a session; monotonically increasing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListingCounts {
    pub objects: usize,
    pub folders: usize,
}

impl ListingCounts {
    pub fn total(&self) -> usize {
        self.objects + self.folders
    }

    pub fn add(&mut self, delta: ListingCounts) {
        self.objects += delta.objects;
        self.folders += delta.folders;
    }
}
