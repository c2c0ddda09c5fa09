//! The end-to-end remediation run.
//!
//! A run is strictly sequential:
//!
//! 1. authenticate against the controller
//! 2. enumerate the targeted devices
//! 3. export, download and extract their running configurations
//! 4. validate every device in discovery order
//! 5. synthesize, create and commit the remediation template
//! 6. deploy it after operator confirmation and track the outcome
//!
//! Any error aborts the run. Nothing is rolled back: a template created
//! before the failure is left on the controller for manual follow-up.

mod builder;
mod confirm;

pub use builder::RemediationBuilder;
pub use confirm::{AutoConfirm, Confirmation};

#[cfg(test)]
pub(crate) use confirm::scripted;

use std::fmt;

use log::{debug, info, warn};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveExtractor, BundleLocator, ExtractedRoot, generate_passphrase};
use crate::compliance::ConfigValidator;
use crate::config::RemediationConfig;
use crate::controller::{Controller, TemplateSpec};
use crate::deploy::{DeploymentOutcome, DeploymentTracker};
use crate::error::{ControllerError, Error, Result};
use crate::inventory::{DeviceRecord, Inventory};
use crate::poller::Poller;
use crate::reporter::Reporter;
use crate::template::{RemediationTemplate, synthesize};

/// Point at which the operator declined to go on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineStage {
    /// Template creation failed (name taken) and the operator stopped.
    TemplateConflict,

    /// The operator chose not to deploy the committed template.
    Deployment,
}

impl fmt::Display for DeclineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TemplateConflict => f.write_str("template conflict"),
            Self::Deployment => f.write_str("deployment"),
        }
    }
}

/// How a run that did not error ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No device matched the filters; nothing was exported.
    NoDevices,

    /// The template was deployed and tracked to a terminal state.
    Deployed {
        template_id: String,
        outcome: DeploymentOutcome,
    },

    /// The operator answered "no" at a confirmation prompt.
    Declined {
        stage: DeclineStage,
        template_id: Option<String>,
    },
}

impl RunOutcome {
    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoDevices => 0,
            Self::Deployed { outcome, .. } if outcome.is_success() => 0,
            Self::Deployed { .. } | Self::Declined { .. } => 1,
        }
    }
}

/// One configured remediation run over an injected controller.
pub struct Remediation<C> {
    controller: C,
    config: RemediationConfig,
    poller: Poller,
    confirmation: Box<dyn Confirmation>,
    reporter: Box<dyn Reporter>,
}

impl<C: Controller> Remediation<C> {
    /// Start building a run over `controller`.
    pub fn builder(controller: C) -> RemediationBuilder<C> {
        RemediationBuilder::new(controller)
    }

    pub fn config(&self) -> &RemediationConfig {
        &self.config
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn into_controller(self) -> C {
        self.controller
    }

    /// Token that aborts whichever poll loop is running.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.poller.cancellation_token().clone()
    }

    /// Execute every step in order.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        self.reporter.step(1, "Connect to controller");
        self.controller.authenticate().await?;
        self.reporter.progress("Authenticated");

        self.reporter.step(2, "Retrieve device list from controller");
        let mut inventory = self.enumerate().await?;
        if inventory.is_empty() {
            warn!("No devices matched the configured filters");
            return Ok(RunOutcome::NoDevices);
        }
        self.reporter.progress(&format!(
            "Found {} devices that matched criteria",
            inventory.len()
        ));

        self.reporter.step(3, "Export current device configurations");
        let root = self.export(&inventory).await?;

        self.reporter
            .step(4, "Compare current configurations to expected configurations");
        self.validate(&mut inventory, &root)?;

        self.reporter
            .step(5, "Create new controller template to modify device configurations");
        let template = synthesize(&inventory, &self.config.template.directive);
        debug!("Synthesized template:\n{}", template);
        self.reporter.progress("Template generated!");

        let Some(template_id) = self.publish(&inventory, template).await? else {
            return Ok(RunOutcome::Declined {
                stage: DeclineStage::TemplateConflict,
                template_id: None,
            });
        };

        self.reporter.step(6, "Deploy template to targeted devices");
        self.deploy(&inventory, template_id).await
    }

    /// List devices, apply the location allow-list and key them by address.
    pub async fn enumerate(&self) -> Result<Inventory> {
        let filter = &self.config.filter;
        self.reporter.progress("Getting device list...");
        let summaries = self.controller.list_devices(filter).await?;
        debug!("Controller returned {} devices", summaries.len());

        let mut inventory = Inventory::new();
        for summary in &summaries {
            let Some(record) = DeviceRecord::from_summary(summary) else {
                debug!("Skipping device {} without a management address", summary.id);
                continue;
            };

            if filter.filters_location() {
                let detail = self.controller.device_detail(&summary.id).await?;
                if !filter.allows_location(detail.location.as_deref()) {
                    debug!(
                        "Skipping {}: location {:?} not selected",
                        record.address, detail.location
                    );
                    continue;
                }
            }

            inventory.insert(record);
        }
        Ok(inventory)
    }

    /// Export, download and unpack the running configs of every device.
    ///
    /// The passphrase is generated here and dropped once extraction returns.
    async fn export(&self, inventory: &Inventory) -> Result<ExtractedRoot> {
        let passphrase: SecretString = generate_passphrase();

        self.reporter.progress("Requesting config export...");
        let task = self
            .controller
            .export_configurations(&inventory.device_ids(), &passphrase)
            .await?;
        let status = self
            .poller
            .await_completion(&self.controller, &task, self.reporter.as_ref())
            .await?;

        if status.is_error {
            return Err(ControllerError::TaskFailed {
                task_id: task.task_id.clone(),
                reason: status
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| status.progress_text().to_string()),
            }
            .into());
        }

        let file_id = status
            .file_id()
            .ok_or_else(|| ControllerError::UnexpectedResponse {
                path: format!("task {}", task),
                message: "finished export carries no file reference".to_string(),
            })?;

        self.reporter.progress("Downloading configuration bundle...");
        let bundle = self
            .controller
            .download_file(file_id, &self.config.work_dir)
            .await?;
        info!("Saved configuration bundle to {}", bundle.display());

        let root = ArchiveExtractor::new(self.config.extract_dir())
            .replacing()
            .extract(&BundleLocator::Path(bundle), &passphrase)?;
        self.reporter.progress("Configuration files extracted");
        Ok(root)
    }

    fn validate(&self, inventory: &mut Inventory, root: &ExtractedRoot) -> Result<()> {
        let validator = ConfigValidator::new(self.config.compliance.clone());
        let addresses: Vec<String> = inventory.addresses().map(str::to_string).collect();

        for address in &addresses {
            let outcome = validator.validate(address, root)?;
            inventory.record_compliance(address, outcome);
        }

        let flagged = inventory.non_compliant().count();
        self.reporter.progress(&format!(
            "{} of {} devices need remediation",
            flagged,
            inventory.len()
        ));
        Ok(())
    }

    /// Create and commit the template. `None` when the operator stops after
    /// a failed creation.
    async fn publish(
        &self,
        inventory: &Inventory,
        template: RemediationTemplate,
    ) -> Result<Option<String>> {
        let settings = &self.config.template;
        let project = self.controller.project(&settings.project).await?;
        let spec = TemplateSpec::velocity(
            settings.name.as_str(),
            settings.software_type.as_str(),
            inventory.device_types(),
            template.into_string(),
        );

        self.reporter.progress("Uploading template to controller...");
        let created = match self.controller.create_template(&project.id, &spec).await {
            Ok(task) => {
                let status = self
                    .poller
                    .await_completion(&self.controller, &task, self.reporter.as_ref())
                    .await?;
                if status.is_error {
                    warn!(
                        "Template creation failed: {}",
                        status.failure_reason.as_deref().unwrap_or("no reason given")
                    );
                }
                !status.is_error
            }
            Err(Error::Controller(ControllerError::TemplateConflict { name })) => {
                warn!("Template '{}' already exists", name);
                false
            }
            Err(e) => return Err(e),
        };

        if created {
            self.reporter.progress("Template uploaded!");
        } else {
            self.reporter
                .progress("Error creating template. Template may already exist.");
            if !self.confirmation.confirm("Continue", true) {
                return Ok(None);
            }
        }

        self.reporter.progress("Querying controller for template id...");
        let project = self.controller.project(&settings.project).await?;
        let template_id = project
            .template_named(&settings.name)
            .map(|t| t.id.clone())
            .ok_or_else(|| ControllerError::TemplateNotFound {
                name: settings.name.clone(),
                project: settings.project.clone(),
            })?;

        let task = self
            .controller
            .commit_template(&template_id, &settings.commit_comment)
            .await?;
        let status = self
            .poller
            .await_completion(&self.controller, &task, self.reporter.as_ref())
            .await?;
        if status.is_error {
            return Err(ControllerError::TaskFailed {
                task_id: task.task_id.clone(),
                reason: status
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "template commit failed".to_string()),
            }
            .into());
        }
        self.reporter.progress("Template committed!");
        Ok(Some(template_id))
    }

    async fn deploy(&self, inventory: &Inventory, template_id: String) -> Result<RunOutcome> {
        let targets = inventory.deployment_targets();

        warn!("Config deployment may take several minutes and may fail for a variety of reasons");
        let prompt = format!(
            "Are you sure you want to deploy these changes to {} devices",
            targets.len()
        );
        if !self.confirmation.confirm(&prompt, false) {
            self.reporter.progress(&format!(
                "Skipping automatic deployment. Template {} can be deployed manually from the controller",
                template_id
            ));
            return Ok(RunOutcome::Declined {
                stage: DeclineStage::Deployment,
                template_id: Some(template_id),
            });
        }

        let outcome = DeploymentTracker::new(&self.controller, &self.poller, self.reporter.as_ref())
            .deploy(&template_id, &targets)
            .await?;
        Ok(RunOutcome::Deployed {
            template_id,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::scripted::ScriptedConfirmation;
    use super::*;
    use crate::compliance::ComplianceRule;
    use crate::config::{DeviceFilter, PollingConfig, TemplateConfig};
    use crate::controller::fake::FakeController;
    use crate::controller::{DeviceSummary, Project, TemplateRef};
    use crate::error::ArchiveError;
    use crate::poller::PollPolicy;
    use crate::reporter::recording::RecordingReporter;

    const DIRECTIVE: &str = "snmp-server host 10.0.0.2 version 2c public";

    fn device(id: &str, address: &str) -> DeviceSummary {
        DeviceSummary {
            id: id.to_string(),
            management_ip_address: Some(address.to_string()),
            hostname: Some(format!("sw-{id}")),
            family: Some("Switches and Hubs".to_string()),
            series: Some("Cisco Catalyst 9300 Series Switches".to_string()),
        }
    }

    fn project() -> Project {
        Project {
            id: "proj-1".to_string(),
            name: "Remediation".to_string(),
            templates: vec![],
        }
    }

    fn config(work_dir: &std::path::Path) -> RemediationConfig {
        RemediationConfig {
            compliance: ComplianceRule::snmp_host("10.0.0.2", "public"),
            template: TemplateConfig {
                project: "Remediation".to_string(),
                name: "snmp-fix".to_string(),
                directive: DIRECTIVE.to_string(),
                software_type: "IOS-XE".to_string(),
                commit_comment: "Commit via API".to_string(),
            },
            filter: DeviceFilter::default(),
            polling: PollingConfig::default(),
            work_dir: work_dir.to_path_buf(),
        }
    }

    fn fleet() -> FakeController {
        FakeController::default()
            .with_devices(vec![device("a", "10.0.0.1"), device("b", "10.0.0.2")])
            .with_bundle(&[
                (
                    "10.0.0.1/sw-a_RUNNINGCONFIG.cfg",
                    "hostname sw-a\nsnmp-server host 10.0.0.1 community wrongcomm\n",
                ),
                (
                    "10.0.0.2/sw-b_RUNNINGCONFIG.cfg",
                    "hostname sw-b\nsnmp-server host 10.0.0.2 community public\n",
                ),
            ])
            .with_project(project())
    }

    fn remediation(
        controller: FakeController,
        work_dir: &std::path::Path,
        answers: &[bool],
    ) -> (
        Remediation<FakeController>,
        Arc<ScriptedConfirmation>,
        Arc<RecordingReporter>,
    ) {
        let confirmation = Arc::new(ScriptedConfirmation::answering(answers));
        let reporter = Arc::new(RecordingReporter::default());
        let remediation = Remediation::builder(controller)
            .config(config(work_dir))
            .poll_policy(PollPolicy::new(Duration::from_millis(1)))
            .confirmation(confirmation.clone())
            .reporter(reporter.clone())
            .build()
            .unwrap();
        (remediation, confirmation, reporter)
    }

    #[tokio::test]
    async fn test_full_run_deploys_to_every_device() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut run, confirmation, reporter) = remediation(fleet(), tmp.path(), &[true]);

        let outcome = run.run().await.unwrap();

        assert_eq!(outcome.exit_code(), 0);
        match &outcome {
            RunOutcome::Deployed {
                template_id,
                outcome,
            } => {
                assert_eq!(template_id, "tmpl-snmp-fix");
                assert!(outcome.is_success());
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let controller = run.controller();
        assert_eq!(controller.calls()[0], "authenticate");
        assert_eq!(controller.exported_ids(), vec!["a", "b"]);

        let created = controller.created_templates();
        assert_eq!(created.len(), 1);
        assert_eq!(
            created[0].template_content,
            "#if($device_ip == '10.0.0.1')\n\
             no snmp-server host 10.0.0.1 community wrongcomm\n\
             #end\n\
             \n\
             snmp-server host 10.0.0.2 version 2c public"
        );
        assert_eq!(created[0].device_types.len(), 1);

        let deployed = controller.deployed_targets();
        assert_eq!(deployed.len(), 1);
        let ids: Vec<&str> = deployed[0].iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["10.0.0.1", "10.0.0.2"]);

        let prompts = confirmation.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].0.contains("2 devices"));
        assert!(!prompts[0].1);

        assert_eq!(reporter.steps().len(), 6);
        assert!(tmp.path().join("configfiles/10.0.0.1").is_dir());
    }

    #[tokio::test]
    async fn test_declined_deployment_keeps_template() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut run, _, _) = remediation(fleet(), tmp.path(), &[false]);

        let outcome = run.run().await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Declined {
                stage: DeclineStage::Deployment,
                template_id: Some("tmpl-snmp-fix".to_string()),
            }
        );
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(run.controller().call_count("commit_template"), 1);
        assert_eq!(run.controller().call_count("deploy_template"), 0);
    }

    #[tokio::test]
    async fn test_template_conflict_continues_with_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut existing = project();
        existing.templates.push(TemplateRef {
            id: "existing-id".to_string(),
            name: "snmp-fix".to_string(),
        });
        let controller = fleet().with_project(existing).with_template_conflict();
        let (mut run, confirmation, _) = remediation(controller, tmp.path(), &[true, true]);

        let outcome = run.run().await.unwrap();

        match outcome {
            RunOutcome::Deployed { template_id, .. } => assert_eq!(template_id, "existing-id"),
            other => panic!("unexpected outcome {other:?}"),
        }
        let prompts = confirmation.prompts();
        assert_eq!(prompts[0], ("Continue".to_string(), true));
    }

    #[tokio::test]
    async fn test_template_conflict_declined() {
        let tmp = tempfile::tempdir().unwrap();
        let controller = fleet().with_template_conflict();
        let (mut run, _, _) = remediation(controller, tmp.path(), &[false]);

        let outcome = run.run().await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Declined {
                stage: DeclineStage::TemplateConflict,
                template_id: None,
            }
        );
        assert_eq!(run.controller().call_count("commit_template"), 0);
    }

    #[tokio::test]
    async fn test_location_filter_skips_devices() {
        let tmp = tempfile::tempdir().unwrap();
        let controller = fleet()
            .with_location("a", "Global/Lab")
            .with_location("b", "Global/Prod");
        let mut cfg = config(tmp.path());
        cfg.filter.locations = vec!["Global/Lab".to_string()];

        let run = Remediation::builder(controller)
            .config(cfg)
            .build()
            .unwrap();
        let inventory = run.enumerate().await.unwrap();

        assert_eq!(inventory.addresses().collect::<Vec<_>>(), vec!["10.0.0.1"]);
        assert_eq!(run.controller().call_count("device_detail"), 2);
    }

    #[tokio::test]
    async fn test_no_devices_stops_before_export() {
        let tmp = tempfile::tempdir().unwrap();
        let controller = FakeController::default().with_project(project());
        let (mut run, _, _) = remediation(controller, tmp.path(), &[]);

        let outcome = run.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::NoDevices);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(run.controller().call_count("export_configurations"), 0);
    }

    #[tokio::test]
    async fn test_failed_export_task_aborts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut failed = FakeController::finished_task("export failed");
        failed.is_error = true;
        failed.failure_reason = Some("device unreachable".to_string());
        let controller = fleet().with_task_statuses(vec![failed]);
        let (mut run, _, _) = remediation(controller, tmp.path(), &[]);

        let err = run.run().await.unwrap_err();

        assert!(matches!(
            err,
            Error::Controller(ControllerError::TaskFailed { ref reason, .. })
                if reason == "device unreachable"
        ));
        assert_eq!(run.controller().call_count("download_file"), 0);
    }

    #[tokio::test]
    async fn test_rejected_credentials_abort_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut run, _, _) = remediation(fleet().rejecting_credentials(), tmp.path(), &[]);

        let err = run.run().await.unwrap_err();

        assert!(matches!(
            err,
            Error::Controller(ControllerError::AuthenticationFailed { .. })
        ));
        assert_eq!(run.controller().calls(), vec!["authenticate"]);
    }

    #[tokio::test]
    async fn test_stale_bundle_does_not_affect_explicit_path() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("Export_Configs_old.zip"), b"stale").unwrap();
        let (mut run, _, _) = remediation(fleet(), tmp.path(), &[true]);

        let outcome = run.run().await.unwrap();
        assert_eq!(outcome.exit_code(), 0);

        let err = ArchiveExtractor::new(tmp.path().join("scan"))
            .extract(
                &BundleLocator::export_in(tmp.path()),
                &SecretString::from("x".to_string()),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Archive(ArchiveError::Ambiguous { count: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_previous_extraction_does_not_leak_into_validation() {
        let tmp = tempfile::tempdir().unwrap();
        // Sorts ahead of the fresh sw-b file and would flag 10.0.0.2.
        let stale = tmp.path().join("configfiles/10.0.0.2");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(
            stale.join("a_RUNNINGCONFIG.cfg"),
            "snmp-server host 10.0.0.9 community old\n",
        )
        .unwrap();
        let (mut run, _, _) = remediation(fleet(), tmp.path(), &[false]);

        run.run().await.unwrap();

        let created = run.controller().created_templates();
        assert!(!created[0].template_content.contains("'10.0.0.2'"));
        assert!(!stale.join("a_RUNNINGCONFIG.cfg").exists());
    }

    #[test]
    fn test_exit_codes() {
        let failed = RunOutcome::Deployed {
            template_id: "t".to_string(),
            outcome: DeploymentOutcome::Failed(FakeController::deployment("FAILURE")),
        };
        assert_eq!(failed.exit_code(), 1);
        assert_eq!(RunOutcome::NoDevices.exit_code(), 0);
    }
}
