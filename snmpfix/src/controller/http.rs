//! Controller implementation over the controller's REST API using reqwest.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use log::{debug, info};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncWriteExt;

use super::Controller;
use super::models::{
    DeploymentHandle, DeploymentStatus, DeploymentTarget, DeviceDetail, DeviceSummary, Envelope,
    Project, TaskHandle, TaskStatus, TemplateSpec,
};
use crate::config::{ControllerConfig, DeviceFilter};
use crate::error::{ControllerError, Result};

const AUTH_PATH: &str = "/dna/system/api/v1/auth/token";
const DEVICES_PATH: &str = "/dna/intent/api/v1/network-device";
const DEVICE_DETAIL_PATH: &str = "/dna/intent/api/v1/device-detail";
const EXPORT_PATH: &str = "/dna/intent/api/v1/network-device-archive/cleartext";
const TASK_PATH: &str = "/dna/intent/api/v1/task";
const FILE_PATH: &str = "/dna/intent/api/v1/file";
const PROJECT_PATH: &str = "/dna/intent/api/v1/template-programmer/project";
const VERSION_PATH: &str = "/dna/intent/api/v1/template-programmer/template/version";
const DEPLOY_PATH: &str = "/dna/intent/api/v1/template-programmer/template/deploy";
const DEPLOY_STATUS_PATH: &str = "/dna/intent/api/v1/template-programmer/template/deploy/status";

const TOKEN_HEADER: &str = "X-Auth-Token";

/// Controller reached over HTTPS with token authentication.
///
/// # Example
///
/// ```rust,no_run
/// use snmpfix::{Controller, ConfigFile, HttpController};
///
/// # async fn example() -> Result<(), snmpfix::Error> {
/// let file = ConfigFile::load("snmpfix.toml")?;
/// let mut controller = HttpController::new(file.controller)?;
/// controller.authenticate().await?;
/// # Ok(())
/// # }
/// ```
pub struct HttpController {
    client: Client,
    base_url: String,
    username: String,
    password: SecretString,
    token: Option<SecretString>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(rename = "Token")]
    token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployResponse {
    deployment_id: String,
}

impl HttpController {
    /// Build the HTTP client. Does not contact the controller.
    pub fn new(config: ControllerConfig) -> Result<Self> {
        if !config.verify_tls {
            debug!("TLS certificate verification disabled for {}", config.url);
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(ControllerError::Transport)?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username,
            password: config.password,
            token: None,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.token.as_ref().ok_or(ControllerError::NotAuthenticated)?;
        Ok(request.header(TOKEN_HEADER, token.expose_secret()))
    }

    /// Turn a non-success status into an API error carrying the body.
    async fn check(method: &'static str, path: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ControllerError::Api {
            method,
            path: path.to_string(),
            status: status.as_u16(),
            body,
        }
        .into())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        debug!("GET {} {:?}", path, query);
        let request = self.authorized(self.client.get(self.url(path)).query(query))?;
        let response = request.send().await.map_err(ControllerError::Transport)?;
        let response = Self::check("GET", path, response).await?;
        Ok(response.json().await.map_err(ControllerError::Transport)?)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("POST {}", path);
        let request = self.authorized(self.client.post(self.url(path)).json(body))?;
        let response = request.send().await.map_err(ControllerError::Transport)?;
        let response = Self::check("POST", path, response).await?;
        Ok(response.json().await.map_err(ControllerError::Transport)?)
    }
}

impl Controller for HttpController {
    async fn authenticate(&mut self) -> Result<()> {
        let url = self.url(AUTH_PATH);
        info!("Connecting to controller at {}", self.base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .send()
            .await
            .map_err(|source| ControllerError::Connectivity {
                url: self.base_url.clone(),
                source,
            })?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(ControllerError::AuthenticationFailed {
                user: self.username.clone(),
            }
            .into());
        }

        let response = Self::check("POST", AUTH_PATH, response).await?;
        let token: TokenResponse = response.json().await.map_err(ControllerError::Transport)?;
        self.token = Some(SecretString::from(token.token));

        info!("Connected to controller");
        Ok(())
    }

    async fn list_devices(&self, filter: &DeviceFilter) -> Result<Vec<DeviceSummary>> {
        let devices: Envelope<Vec<DeviceSummary>> =
            self.get_json(DEVICES_PATH, &filter.query_pairs()).await?;
        Ok(devices.response)
    }

    async fn device_detail(&self, device_id: &str) -> Result<DeviceDetail> {
        let detail: Envelope<DeviceDetail> = self
            .get_json(
                DEVICE_DETAIL_PATH,
                &[("identifier", "uuid"), ("searchBy", device_id)],
            )
            .await?;
        Ok(detail.response)
    }

    async fn export_configurations(
        &self,
        device_ids: &[String],
        passphrase: &SecretString,
    ) -> Result<TaskHandle> {
        let body = json!({
            "deviceId": device_ids,
            "password": passphrase.expose_secret(),
        });
        let task: Envelope<TaskHandle> = self.post_json(EXPORT_PATH, &body).await?;
        Ok(task.response)
    }

    async fn task_status(&self, task: &TaskHandle) -> Result<TaskStatus> {
        let path = format!("{}/{}", TASK_PATH, task.task_id);
        let status: Envelope<TaskStatus> = self.get_json(&path, &[]).await?;
        Ok(status.response)
    }

    async fn download_file(&self, file_id: &str, dest_dir: &Path) -> Result<PathBuf> {
        let path = format!("{}/{}", FILE_PATH, file_id);
        debug!("GET {}", path);
        let request = self.authorized(self.client.get(self.url(&path)))?;
        let response = request.send().await.map_err(ControllerError::Transport)?;
        let response = Self::check("GET", &path, response).await?;

        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| format!("{file_id}.zip"));
        let target = dest_dir.join(&file_name);
        let partial = dest_dir.join(format!("{file_name}.part"));

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(ControllerError::Io)?;

        // Only a complete download ever appears under the final name.
        let written = match stream_to_file(response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    debug!("Could not remove {}: {}", partial.display(), cleanup);
                }
                return Err(e);
            }
        };
        tokio::fs::rename(&partial, &target)
            .await
            .map_err(ControllerError::Io)?;

        debug!("Downloaded {} bytes to {}", written, target.display());
        Ok(target)
    }

    async fn project(&self, name: &str) -> Result<Project> {
        let projects: Vec<Project> = self.get_json(PROJECT_PATH, &[("name", name)]).await?;
        projects
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| {
                ControllerError::ProjectNotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }

    async fn create_template(&self, project_id: &str, spec: &TemplateSpec) -> Result<TaskHandle> {
        let path = format!("{}/{}/template", PROJECT_PATH, project_id);
        match self.post_json::<_, Envelope<TaskHandle>>(&path, spec).await {
            Ok(task) => Ok(task.response),
            Err(crate::Error::Controller(ControllerError::Api { status, body, .. }))
                if status == StatusCode::CONFLICT.as_u16() || mentions_existing(&body) =>
            {
                Err(ControllerError::TemplateConflict {
                    name: spec.name.clone(),
                }
                .into())
            }
            Err(e) => Err(e),
        }
    }

    async fn commit_template(&self, template_id: &str, comments: &str) -> Result<TaskHandle> {
        let body = json!({
            "templateId": template_id,
            "comments": comments,
        });
        let task: Envelope<TaskHandle> = self.post_json(VERSION_PATH, &body).await?;
        Ok(task.response)
    }

    async fn deploy_template(
        &self,
        template_id: &str,
        targets: &[DeploymentTarget],
    ) -> Result<DeploymentHandle> {
        let body = json!({
            "templateId": template_id,
            "targetInfo": targets,
        });
        let deploy: DeployResponse = self.post_json(DEPLOY_PATH, &body).await?;
        Ok(DeploymentHandle::from_reference(&deploy.deployment_id))
    }

    async fn deployment_status(&self, deployment: &DeploymentHandle) -> Result<DeploymentStatus> {
        let path = format!("{}/{}", DEPLOY_STATUS_PATH, deployment.deployment_id);
        self.get_json(&path, &[]).await
    }
}

/// Write a response body to `path`, returning the byte count.
async fn stream_to_file(response: Response, path: &Path) -> Result<usize> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(ControllerError::Io)?;

    let mut written = 0usize;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ControllerError::Transport)?;
        written += chunk.len();
        file.write_all(&chunk).await.map_err(ControllerError::Io)?;
    }
    file.flush().await.map_err(ControllerError::Io)?;
    Ok(written)
}

/// Whether an error body reports a name collision.
fn mentions_existing(body: &str) -> bool {
    body.to_ascii_lowercase().contains("already exist")
}

/// Extract a bare file name from a `Content-Disposition` header value.
fn filename_from_disposition(value: &str) -> Option<String> {
    let raw = value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))?
        .trim_matches('"');

    // Never let the header choose a directory.
    Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}
