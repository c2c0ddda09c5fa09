//! Template deployment and status tracking.

use log::{error, info};

use crate::controller::{
    Controller, DeploymentHandle, DeploymentState, DeploymentStatus, DeploymentTarget,
};
use crate::error::Result;
use crate::poller::Poller;
use crate::reporter::Reporter;

/// Terminal result of one deployment.
#[derive(Debug, Clone, PartialEq)]
pub enum DeploymentOutcome {
    Succeeded(DeploymentStatus),

    /// The controller reported `FAILURE`; the payload carries per-device detail.
    Failed(DeploymentStatus),

    /// The controller reported a status outside the known set.
    Unrecognized(DeploymentStatus),
}

impl DeploymentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// The terminal status record.
    pub fn status(&self) -> &DeploymentStatus {
        match self {
            Self::Succeeded(s) | Self::Failed(s) | Self::Unrecognized(s) => s,
        }
    }
}

/// Submits a committed template and follows the deployment to a terminal state.
pub struct DeploymentTracker<'a, C> {
    controller: &'a C,
    poller: &'a Poller,
    reporter: &'a dyn Reporter,
}

impl<'a, C: Controller> DeploymentTracker<'a, C> {
    pub fn new(controller: &'a C, poller: &'a Poller, reporter: &'a dyn Reporter) -> Self {
        Self {
            controller,
            poller,
            reporter,
        }
    }

    /// Deploy `template_id` to `targets` and wait for the outcome.
    ///
    /// A failed deployment is reported and returned, not raised; it is never
    /// retried. Transport errors and poll timeouts propagate.
    pub async fn deploy(
        &self,
        template_id: &str,
        targets: &[DeploymentTarget],
    ) -> Result<DeploymentOutcome> {
        self.reporter
            .progress(&format!("Deploying template to {} devices", targets.len()));

        let handle = self.controller.deploy_template(template_id, targets).await?;
        info!("Deployment {} submitted", handle);

        let status = self.track(&handle).await?;
        Ok(self.conclude(status))
    }

    /// Poll an existing deployment until it reaches a terminal state.
    pub async fn track(&self, handle: &DeploymentHandle) -> Result<DeploymentStatus> {
        let controller = self.controller;
        let what = format!("deployment {}", handle);
        self.poller
            .poll_until_terminal(&what, self.reporter, move || {
                controller.deployment_status(handle)
            })
            .await
    }

    fn conclude(&self, status: DeploymentStatus) -> DeploymentOutcome {
        match status.state() {
            DeploymentState::Success => {
                self.reporter.progress("Deployment complete!");
                DeploymentOutcome::Succeeded(status)
            }
            DeploymentState::Failure => {
                error!(
                    "Deployment failed! Status payload:\n{}",
                    status.to_pretty_json()
                );
                DeploymentOutcome::Failed(status)
            }
            // In-flight states never leave the poll loop.
            DeploymentState::Unrecognized | DeploymentState::InProgress => {
                error!(
                    "Deployment ended in unrecognized state '{}':\n{}",
                    status.status,
                    status.to_pretty_json()
                );
                DeploymentOutcome::Unrecognized(status)
            }
        }
    }
}
