//! Wire types exchanged with the controller.

use std::fmt;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `additionalStatusURL` of a finished export task, e.g. `/api/v1/file/<id>`.
static FILE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/file/([^/?#]+)").expect("static file-id pattern"));

/// Most controller responses wrap their payload in `{"response": ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub response: T,
}

/// One device as returned by inventory enumeration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    /// Controller-assigned id.
    pub id: String,

    pub management_ip_address: Option<String>,

    #[serde(default)]
    pub hostname: Option<String>,

    #[serde(default)]
    pub family: Option<String>,

    #[serde(default)]
    pub series: Option<String>,
}

/// Subset of the device-detail record used for location filtering.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceDetail {
    #[serde(default)]
    pub location: Option<String>,
}

/// Product classification a template is valid for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct DeviceType {
    pub product_family: String,
    pub product_series: String,
}

/// Handle of an asynchronous controller task.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskHandle {
    pub task_id: String,
}

impl TaskHandle {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
        }
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.task_id)
    }
}

/// Status record of an asynchronous controller task.
///
/// Fields the pipeline does not interpret are kept in `extra` so the full
/// payload can be reported.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    #[serde(default)]
    pub progress: Option<String>,

    /// Completion timestamp; present once the task is finished.
    #[serde(default)]
    pub end_time: Option<i64>,

    #[serde(default)]
    pub is_error: bool,

    #[serde(default)]
    pub failure_reason: Option<String>,

    #[serde(default, rename = "additionalStatusURL")]
    pub additional_status_url: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskStatus {
    /// A task is finished once it reports a completion timestamp.
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// Progress text, or a placeholder before the controller reports any.
    pub fn progress_text(&self) -> &str {
        self.progress.as_deref().unwrap_or("Not Started")
    }

    /// Id of the file produced by the task, if it produced one.
    pub fn file_id(&self) -> Option<&str> {
        let url = self.additional_status_url.as_deref()?;
        FILE_ID
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// Template project with its templates.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub templates: Vec<TemplateRef>,
}

impl Project {
    /// Find a template in this project by name.
    pub fn template_named(&self, name: &str) -> Option<&TemplateRef> {
        self.templates.iter().find(|t| t.name == name)
    }
}

/// Template entry inside a project listing.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TemplateRef {
    pub id: String,
    pub name: String,
}

/// Body of a template-creation request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    pub name: String,
    pub software_type: String,
    pub device_types: Vec<DeviceType>,
    pub template_content: String,
    pub language: String,
    pub version: String,
}

impl TemplateSpec {
    /// A Velocity template.
    pub fn velocity(
        name: impl Into<String>,
        software_type: impl Into<String>,
        device_types: Vec<DeviceType>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            software_type: software_type.into(),
            device_types,
            template_content: content.into(),
            language: "VELOCITY".to_string(),
            version: "2".to_string(),
        }
    }
}

/// One device a template is deployed to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentTarget {
    pub id: String,

    #[serde(rename = "type")]
    pub target_type: String,

    /// Template variables bound for this device.
    pub params: IndexMap<String, String>,
}

impl DeploymentTarget {
    /// Target addressed by management IP, binding `device_ip` for guard clauses.
    pub fn by_management_ip(address: impl Into<String>) -> Self {
        let address = address.into();
        let mut params = IndexMap::new();
        params.insert("device_ip".to_string(), address.clone());
        Self {
            id: address,
            target_type: "MANAGED_DEVICE_IP".to_string(),
            params,
        }
    }
}

/// Handle of a template deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentHandle {
    pub deployment_id: String,
}

impl DeploymentHandle {
    /// Parse the controller's deployment reference, which prefixes the id
    /// with a label (`"Template Deployemnt Id: <uuid>"`).
    pub fn from_reference(reference: &str) -> Self {
        let id = reference.rsplit(':').next().unwrap_or(reference).trim();
        Self {
            deployment_id: id.to_string(),
        }
    }
}

impl fmt::Display for DeploymentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.deployment_id)
    }
}

/// Classification of a deployment status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    /// Still running; keep polling.
    InProgress,
    Success,
    Failure,
    /// A value outside the known set. Treated as terminal.
    Unrecognized,
}

impl DeploymentState {
    /// Classify a raw status string.
    pub fn classify(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "INIT" | "SUBMITTED" | "IN_PROGRESS" | "PENDING" | "SCHEDULED" | "RUNNING" => {
                Self::InProgress
            }
            "SUCCESS" => Self::Success,
            "FAILURE" => Self::Failure,
            _ => Self::Unrecognized,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// Per-device entry of a deployment status record.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDeploymentStatus {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub detailed_status_message: Option<String>,
}

/// Deployment status record.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    #[serde(default)]
    pub deployment_id: Option<String>,

    pub status: String,

    #[serde(default)]
    pub devices: Vec<DeviceDeploymentStatus>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeploymentStatus {
    pub fn state(&self) -> DeploymentState {
        DeploymentState::classify(&self.status)
    }

    /// Pretty JSON rendering for diagnostics.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}
