//! Run context — deadline and cooperative cancellation for one invocation.
//!
//! Every agent run carries a `RunContext`. The model call is raced against
//! both the deadline and the cancellation token, so an expired or cancelled
//! context makes the next send fail fast. Tool executions are not raced:
//! tools own their internal timeouts.

use crate::error::ProviderError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct RunContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl RunContext {
    /// A context with no deadline that is only ended by cancellation.
    pub fn background() -> Self {
        Self {
            deadline: None,
            token: CancellationToken::new(),
        }
    }

    /// A fresh context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            token: CancellationToken::new(),
        }
    }

    /// A context sharing this one's cancellation but with a new deadline
    /// `timeout` from now.
    pub fn renewed(&self, timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            token: self.token.child_token(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Drive `fut` to completion unless the context is cancelled or its
    /// deadline passes first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        if self.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        if self.is_expired() {
            return Err(ProviderError::DeadlineExceeded);
        }

        let deadline = self.deadline;
        let expiry = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ProviderError::Cancelled),
            _ = expiry => Err(ProviderError::DeadlineExceeded),
            result = fut => result,
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::background()
    }
}
