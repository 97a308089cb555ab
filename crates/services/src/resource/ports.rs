#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

/// Title attached to notifications raised for failed fetches
pub const ERROR_TITLE: &str = "Error";

/// Message used when a failure carries no text of its own
pub const FALLBACK_ERROR_MESSAGE: &str = "An error occurred";

/// Snapshot of an [`super::AsyncResource`].
///
/// `data` is left in place when a later fetch fails, so `data` and `error`
/// may both be set.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> ResourceState<T> {
    pub fn idle() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }

    pub fn loading() -> Self {
        Self {
            data: None,
            loading: true,
            error: None,
        }
    }

    pub fn phase(&self) -> ResourcePhase {
        if self.loading {
            ResourcePhase::Loading
        } else if self.error.is_some() {
            ResourcePhase::Failed
        } else if self.data.is_some() {
            ResourcePhase::Success
        } else {
            ResourcePhase::Idle
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePhase {
    /// Nothing fetched yet (initial fetch skipped)
    Idle,
    Loading,
    Success,
    Failed,
}

/// Which completions may write state when fetches overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettlePolicy {
    /// Every completion writes state; whichever settles last wins
    #[default]
    LastSettledWins,
    /// Only the most recently started fetch may write state; completions of
    /// older fetches are dropped without notification
    LatestStartedWins,
}

/// Surfaces fetch failures to the user (alert, toast, console line)
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// Sink that only records the notification in the log
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, title: &str, message: &str) {
        tracing::warn!(title = %title, "{message}");
    }
}
