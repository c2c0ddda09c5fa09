//! Controller capability consumed by the remediation pipeline.
//!
//! The pipeline never talks HTTP itself. Everything it needs from the
//! central controller is expressed by the [`Controller`] trait so that a
//! scripted fake can stand in for the real thing in tests.

mod http;
pub mod models;

#[cfg(test)]
pub(crate) mod fake;

pub use http::HttpController;
pub use models::{
    DeploymentHandle, DeploymentState, DeploymentStatus, DeploymentTarget, DeviceDetail,
    DeviceSummary, DeviceType, Project, TaskHandle, TaskStatus, TemplateRef, TemplateSpec,
};

use std::future::Future;
use std::path::{Path, PathBuf};

use secrecy::SecretString;

use crate::config::DeviceFilter;
use crate::error::Result;

/// Operations the pipeline needs from the central network controller.
pub trait Controller: Send + Sync {
    /// Establish the session. Must be called before any other operation.
    fn authenticate(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Enumerate devices matching the attribute filter.
    fn list_devices(
        &self,
        filter: &DeviceFilter,
    ) -> impl Future<Output = Result<Vec<DeviceSummary>>> + Send;

    /// Look up device details (location) by controller id.
    fn device_detail(&self, device_id: &str) -> impl Future<Output = Result<DeviceDetail>> + Send;

    /// Request an encrypted running-config export for the given devices.
    fn export_configurations(
        &self,
        device_ids: &[String],
        passphrase: &SecretString,
    ) -> impl Future<Output = Result<TaskHandle>> + Send;

    /// Query the current status of an asynchronous task.
    fn task_status(&self, task: &TaskHandle) -> impl Future<Output = Result<TaskStatus>> + Send;

    /// Download a file by id into `dest_dir`, returning the written path.
    fn download_file(
        &self,
        file_id: &str,
        dest_dir: &Path,
    ) -> impl Future<Output = Result<PathBuf>> + Send;

    /// Look up a template project by name, including its templates.
    fn project(&self, name: &str) -> impl Future<Output = Result<Project>> + Send;

    /// Create a template in a project.
    ///
    /// Returns [`ControllerError::TemplateConflict`](crate::error::ControllerError::TemplateConflict)
    /// if the name is already taken.
    fn create_template(
        &self,
        project_id: &str,
        spec: &TemplateSpec,
    ) -> impl Future<Output = Result<TaskHandle>> + Send;

    /// Commit a new version of a template.
    fn commit_template(
        &self,
        template_id: &str,
        comments: &str,
    ) -> impl Future<Output = Result<TaskHandle>> + Send;

    /// Submit a template deployment.
    fn deploy_template(
        &self,
        template_id: &str,
        targets: &[DeploymentTarget],
    ) -> impl Future<Output = Result<DeploymentHandle>> + Send;

    /// Query the status of a deployment.
    fn deployment_status(
        &self,
        deployment: &DeploymentHandle,
    ) -> impl Future<Output = Result<DeploymentStatus>> + Send;
}
