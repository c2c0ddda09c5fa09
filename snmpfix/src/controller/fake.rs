//! Scripted in-memory controller for tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use secrecy::{ExposeSecret, SecretString};

use super::Controller;
use super::models::{
    DeploymentHandle, DeploymentStatus, DeploymentTarget, DeviceDetail, DeviceSummary, Project,
    TaskHandle, TaskStatus, TemplateRef, TemplateSpec,
};
use crate::archive::testing::write_bundle;
use crate::config::DeviceFilter;
use crate::error::{ControllerError, Result};

#[derive(Default)]
pub struct FakeController {
    devices: Vec<DeviceSummary>,
    locations: HashMap<String, String>,
    task_statuses: Mutex<VecDeque<TaskStatus>>,
    task_status_fails: bool,
    deployment_statuses: Mutex<VecDeque<DeploymentStatus>>,
    bundle: Vec<(String, String)>,
    project: Option<Project>,
    template_conflict: bool,
    reject_credentials: bool,

    calls: Mutex<Vec<&'static str>>,
    passphrase: Mutex<Option<String>>,
    exported_ids: Mutex<Vec<String>>,
    created: Mutex<Vec<TemplateSpec>>,
    deployed: Mutex<Vec<Vec<DeploymentTarget>>>,
}

impl FakeController {
    pub fn running_task(progress: &str) -> TaskStatus {
        TaskStatus {
            progress: Some(progress.to_string()),
            ..Default::default()
        }
    }

    pub fn finished_task(progress: &str) -> TaskStatus {
        TaskStatus {
            progress: Some(progress.to_string()),
            end_time: Some(1_700_000_000_000),
            additional_status_url: Some("/api/v1/file/f-1".to_string()),
            ..Default::default()
        }
    }

    pub fn deployment(status: &str) -> DeploymentStatus {
        DeploymentStatus {
            deployment_id: Some("d-1".to_string()),
            status: status.to_string(),
            ..Default::default()
        }
    }

    pub fn with_devices(mut self, devices: Vec<DeviceSummary>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_location(mut self, device_id: &str, location: &str) -> Self {
        self.locations
            .insert(device_id.to_string(), location.to_string());
        self
    }

    /// Statuses handed out in order; once exhausted every task is finished.
    pub fn with_task_statuses(self, statuses: Vec<TaskStatus>) -> Self {
        *self.task_statuses.lock().unwrap() = statuses.into();
        self
    }

    pub fn failing_task_status(mut self) -> Self {
        self.task_status_fails = true;
        self
    }

    pub fn with_deployment_statuses(self, statuses: Vec<DeploymentStatus>) -> Self {
        *self.deployment_statuses.lock().unwrap() = statuses.into();
        self
    }

    /// Files placed in the exported bundle, encrypted with the export passphrase.
    pub fn with_bundle(mut self, entries: &[(&str, &str)]) -> Self {
        self.bundle = entries
            .iter()
            .map(|(name, content)| (name.to_string(), content.to_string()))
            .collect();
        self
    }

    pub fn with_project(mut self, project: Project) -> Self {
        self.project = Some(project);
        self
    }

    pub fn with_template_conflict(mut self) -> Self {
        self.template_conflict = true;
        self
    }

    pub fn rejecting_credentials(mut self) -> Self {
        self.reject_credentials = true;
        self
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn exported_ids(&self) -> Vec<String> {
        self.exported_ids.lock().unwrap().clone()
    }

    pub fn created_templates(&self) -> Vec<TemplateSpec> {
        self.created.lock().unwrap().clone()
    }

    pub fn deployed_targets(&self) -> Vec<Vec<DeploymentTarget>> {
        self.deployed.lock().unwrap().clone()
    }

    fn record(&self, name: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(name);
        Ok(())
    }

    fn project_or_missing(&self, name: &str) -> Result<Project> {
        self.project
            .clone()
            .filter(|p| p.name == name)
            .ok_or_else(|| {
                ControllerError::ProjectNotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }
}

impl Controller for FakeController {
    async fn authenticate(&mut self) -> Result<()> {
        self.record("authenticate")?;
        if self.reject_credentials {
            return Err(ControllerError::AuthenticationFailed {
                user: "admin".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn list_devices(&self, _filter: &DeviceFilter) -> Result<Vec<DeviceSummary>> {
        self.record("list_devices")?;
        Ok(self.devices.clone())
    }

    async fn device_detail(&self, device_id: &str) -> Result<DeviceDetail> {
        self.record("device_detail")?;
        Ok(DeviceDetail {
            location: self.locations.get(device_id).cloned(),
        })
    }

    async fn export_configurations(
        &self,
        device_ids: &[String],
        passphrase: &SecretString,
    ) -> Result<TaskHandle> {
        self.record("export_configurations")?;
        *self.passphrase.lock().unwrap() = Some(passphrase.expose_secret().to_string());
        *self.exported_ids.lock().unwrap() = device_ids.to_vec();
        Ok(TaskHandle::new("export-task"))
    }

    async fn task_status(&self, _task: &TaskHandle) -> Result<TaskStatus> {
        self.record("task_status")?;
        if self.task_status_fails {
            return Err(ControllerError::Api {
                method: "GET",
                path: "/task".to_string(),
                status: 502,
                body: "bad gateway".to_string(),
            }
            .into());
        }
        let next = self.task_statuses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| Self::finished_task("done")))
    }

    async fn download_file(&self, file_id: &str, dest_dir: &Path) -> Result<PathBuf> {
        self.record("download_file")?;
        let passphrase = self
            .passphrase
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_default();
        std::fs::create_dir_all(dest_dir).unwrap();
        let path = dest_dir.join(format!("Export_Configs_{file_id}.zip"));
        let entries: Vec<(&str, &str)> = self
            .bundle
            .iter()
            .map(|(n, c)| (n.as_str(), c.as_str()))
            .collect();
        write_bundle(&path, &passphrase, &entries);
        Ok(path)
    }

    async fn project(&self, name: &str) -> Result<Project> {
        self.record("project")?;
        let mut project = self.project_or_missing(name)?;
        // Templates created during the run show up in later listings.
        for spec in self.created.lock().unwrap().iter() {
            if project.template_named(&spec.name).is_none() {
                project.templates.push(TemplateRef {
                    id: format!("tmpl-{}", spec.name),
                    name: spec.name.clone(),
                });
            }
        }
        Ok(project)
    }

    async fn create_template(&self, project_id: &str, spec: &TemplateSpec) -> Result<TaskHandle> {
        self.record("create_template")?;
        if self.template_conflict {
            return Err(ControllerError::TemplateConflict {
                name: spec.name.clone(),
            }
            .into());
        }
        assert_eq!(Some(project_id), self.project.as_ref().map(|p| p.id.as_str()));
        self.created.lock().unwrap().push(spec.clone());
        Ok(TaskHandle::new("create-task"))
    }

    async fn commit_template(&self, _template_id: &str, _comments: &str) -> Result<TaskHandle> {
        self.record("commit_template")?;
        Ok(TaskHandle::new("commit-task"))
    }

    async fn deploy_template(
        &self,
        _template_id: &str,
        targets: &[DeploymentTarget],
    ) -> Result<DeploymentHandle> {
        self.record("deploy_template")?;
        self.deployed.lock().unwrap().push(targets.to_vec());
        Ok(DeploymentHandle::from_reference("Template Deployemnt Id: d-1"))
    }

    async fn deployment_status(&self, _deployment: &DeploymentHandle) -> Result<DeploymentStatus> {
        self.record("deployment_status")?;
        let next = self.deployment_statuses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| Self::deployment("SUCCESS")))
    }
}
