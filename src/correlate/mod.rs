//! Request/reply correlation: turns a fire-and-forget request submission
//! into an awaitable completion.
//!
//! The correlator polls the client's reply log on a fixed interval until a
//! reply satisfying the condition appears, then resolves exactly once. The
//! timeout is an explicit policy: bounded by default, `None` opts into
//! unbounded polling deliberately.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::client::{Client, Reply, RequestStatus};

#[derive(Debug, Clone, Copy)]
pub struct CorrelatorConfig {
    pub poll_interval: Duration,
    pub timeout: Option<Duration>,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    TimedOut,
    Cancelled,
    Failed(String),
}

impl fmt::Display for CorrelationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationError::TimedOut => write!(f, "no reply arrived before the timeout"),
            CorrelationError::Cancelled => write!(f, "correlation cancelled"),
            CorrelationError::Failed(err) => write!(f, "request failed: {err}"),
        }
    }
}

impl std::error::Error for CorrelationError {}

pub struct Correlator<C> {
    client: Arc<C>,
    config: CorrelatorConfig,
}

impl<C> Clone for Correlator<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config,
        }
    }
}

impl<C: Client + 'static> Correlator<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            config: CorrelatorConfig::default(),
        }
    }

    pub fn with_config(client: Arc<C>, config: CorrelatorConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> CorrelatorConfig {
        self.config
    }

    /// Wait until any reply is recorded for the key.
    pub async fn wait(&self, request_key: &str) -> Result<Reply, CorrelationError> {
        self.wait_until(request_key, |_| true).await
    }

    /// Wait until a reply satisfying `condition` is recorded for the key.
    /// Resolves on the first poll whose reply satisfies the condition; a
    /// recorded error resolves immediately as `Failed`.
    pub async fn wait_until(
        &self,
        request_key: &str,
        condition: impl Fn(&Reply) -> bool,
    ) -> Result<Reply, CorrelationError> {
        let started = tokio::time::Instant::now();
        loop {
            match self.client.status_of(request_key) {
                RequestStatus::Replied(reply) if condition(&reply) => {
                    debug!(request_key, "request completed");
                    return Ok(reply);
                }
                RequestStatus::Failed(err) => {
                    debug!(request_key, %err, "request failed");
                    return Err(CorrelationError::Failed(err));
                }
                RequestStatus::Replied(_) | RequestStatus::Pending => {}
            }
            if let Some(limit) = self.config.timeout {
                if started.elapsed() >= limit {
                    debug!(request_key, "request timed out");
                    return Err(CorrelationError::TimedOut);
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Fire-and-forget shape: spawn the wait and invoke the continuation
    /// with its outcome. The continuation is `FnOnce`, so firing more than
    /// once is unrepresentable. The returned handle cancels the polling
    /// loop; dropping the handle detaches it instead.
    pub fn notify<F>(&self, request_key: impl Into<String>, continuation: F) -> CorrelationHandle
    where
        F: FnOnce(Result<Reply, CorrelationError>) + Send + 'static,
    {
        let correlator = self.clone();
        let key = request_key.into();
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let wait = correlator.wait(&key);
            tokio::pin!(wait);
            let outcome = tokio::select! {
                res = &mut wait => res,
                cancelled = &mut cancel_rx => {
                    if cancelled.is_ok() {
                        Err(CorrelationError::Cancelled)
                    } else {
                        // Handle dropped without cancelling; keep waiting.
                        wait.await
                    }
                }
            };
            continuation(outcome);
        });
        CorrelationHandle {
            cancel: Some(cancel_tx),
            task,
        }
    }
}

pub struct CorrelationHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl CorrelationHandle {
    /// Stop polling; the continuation fires once with `Cancelled`.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }

    /// Wait for the continuation to have fired.
    pub async fn finished(self) {
        let _ = self.task.await;
    }
}
