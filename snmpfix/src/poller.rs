//! Polling of asynchronous controller operations.
//!
//! Every remote operation the pipeline waits on (config export, template
//! creation and commit, deployment) is driven by the same loop: query the
//! status, report progress, stop on a terminal status, otherwise sleep for a
//! fixed interval. The loop is bounded by an optional deadline and can be
//! cancelled from outside through a [`CancellationToken`].

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::controller::{Controller, DeploymentStatus, TaskHandle, TaskStatus};
use crate::error::{PollError, Result};
use crate::reporter::Reporter;

/// Status records that a poll loop can watch.
pub trait PollStatus {
    /// Human-readable progress for this observation.
    fn progress(&self) -> String;

    /// Whether no further transition can occur.
    fn is_terminal(&self) -> bool;
}

impl PollStatus for TaskStatus {
    fn progress(&self) -> String {
        self.progress_text().to_string()
    }

    fn is_terminal(&self) -> bool {
        self.is_finished()
    }
}

impl PollStatus for DeploymentStatus {
    fn progress(&self) -> String {
        self.status.clone()
    }

    fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }
}

/// Poll cadence and bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    interval: Duration,
    deadline: Option<Duration>,
}

impl PollPolicy {
    /// Poll every `interval`, with the default 30 minute deadline.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: Some(Duration::from_secs(30 * 60)),
        }
    }

    /// Give up once `deadline` has elapsed since the first poll.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Poll until a terminal status, however long it takes.
    pub fn without_deadline(mut self) -> Self {
        self.deadline = None;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

/// Runs poll loops under a shared policy and cancellation token.
#[derive(Debug, Clone)]
pub struct Poller {
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts every loop run by this poller.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Call `probe` until it yields a terminal status and return that status.
    ///
    /// Errors from `probe` propagate immediately; there is no retry at this
    /// level.
    pub async fn poll_until_terminal<S, F, Fut>(
        &self,
        what: &str,
        reporter: &dyn Reporter,
        mut probe: F,
    ) -> Result<S>
    where
        S: PollStatus,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<S>>,
    {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled(what));
            }

            attempts += 1;
            let status = probe().await?;
            reporter.progress(&format!("{}: {}", what, status.progress()));

            if status.is_terminal() {
                debug!("{} finished after {} polls", what, attempts);
                return Ok(status);
            }

            if let Some(deadline) = self.policy.deadline {
                if started.elapsed() + self.policy.interval > deadline {
                    return Err(PollError::Timeout {
                        what: what.to_string(),
                        deadline,
                        attempts,
                    }
                    .into());
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.policy.interval) => {}
                _ = self.cancel.cancelled() => return Err(self.cancelled(what)),
            }
        }
    }

    /// Wait for a controller task to report a completion timestamp.
    ///
    /// Returns the full terminal status record.
    pub async fn await_completion<C: Controller>(
        &self,
        controller: &C,
        task: &TaskHandle,
        reporter: &dyn Reporter,
    ) -> Result<TaskStatus> {
        let what = format!("task {}", task);
        self.poll_until_terminal(&what, reporter, move || controller.task_status(task))
            .await
    }

    fn cancelled(&self, what: &str) -> crate::Error {
        PollError::Cancelled {
            what: what.to_string(),
        }
        .into()
    }
}
