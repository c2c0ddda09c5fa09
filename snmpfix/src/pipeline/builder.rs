//! Builder for remediation runs.

use tokio_util::sync::CancellationToken;

use super::{AutoConfirm, Confirmation, Remediation};
use crate::config::RemediationConfig;
use crate::controller::Controller;
use crate::error::{ConfigError, Result};
use crate::poller::{PollPolicy, Poller};
use crate::reporter::{LogReporter, Reporter};

/// Builder for constructing a [`Remediation`].
///
/// # Example
///
/// ```rust,no_run
/// use snmpfix::{AutoConfirm, ConfigFile, HttpController, Remediation};
///
/// # async fn example() -> Result<(), snmpfix::Error> {
/// let file = ConfigFile::load("snmpfix.toml")?;
/// let controller = HttpController::new(file.controller)?;
///
/// let mut run = Remediation::builder(controller)
///     .config(file.remediation)
///     .confirmation(AutoConfirm::yes())
///     .build()?;
///
/// let outcome = run.run().await?;
/// std::process::exit(outcome.exit_code());
/// # }
/// ```
pub struct RemediationBuilder<C> {
    controller: C,
    config: Option<RemediationConfig>,
    confirmation: Box<dyn Confirmation>,
    reporter: Box<dyn Reporter>,
    poll_policy: Option<PollPolicy>,
    cancel: Option<CancellationToken>,
}

impl<C: Controller> RemediationBuilder<C> {
    /// Create a builder over `controller`.
    ///
    /// Without an explicit confirmation gate every prompt is answered "no",
    /// so nothing is deployed.
    pub fn new(controller: C) -> Self {
        Self {
            controller,
            config: None,
            confirmation: Box::new(AutoConfirm::no()),
            reporter: Box::new(LogReporter),
            poll_policy: None,
            cancel: None,
        }
    }

    /// Set the run configuration (required).
    pub fn config(mut self, config: RemediationConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the operator confirmation gate.
    pub fn confirmation(mut self, confirmation: impl Confirmation + 'static) -> Self {
        self.confirmation = Box::new(confirmation);
        self
    }

    /// Set the progress sink (default: [`LogReporter`]).
    pub fn reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// Override the poll policy from the configuration.
    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = Some(policy);
        self
    }

    /// Share a cancellation token with the caller, e.g. for Ctrl-C handling.
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Validate the configuration and assemble the run.
    ///
    /// Does not contact the controller.
    pub fn build(self) -> Result<Remediation<C>> {
        let config = self.config.ok_or_else(|| ConfigError::Invalid {
            message: "Remediation config is required".to_string(),
        })?;
        config.validate()?;

        let policy = self
            .poll_policy
            .unwrap_or_else(|| config.polling.policy());
        let mut poller = Poller::new(policy);
        if let Some(cancel) = self.cancel {
            poller = poller.with_cancellation(cancel);
        }

        Ok(Remediation {
            controller: self.controller,
            config,
            poller,
            confirmation: self.confirmation,
            reporter: self.reporter,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::Error;
    use crate::compliance::ComplianceRule;
    use crate::config::{DeviceFilter, PollingConfig, TemplateConfig};
    use crate::controller::fake::FakeController;

    fn config() -> RemediationConfig {
        RemediationConfig {
            compliance: ComplianceRule::snmp_host("10.0.0.2", "public"),
            template: TemplateConfig {
                project: "Remediation".to_string(),
                name: "snmp-fix".to_string(),
                directive: "snmp-server host 10.0.0.2 version 2c public".to_string(),
                software_type: "IOS-XE".to_string(),
                commit_comment: "Commit via API".to_string(),
            },
            filter: DeviceFilter::default(),
            polling: PollingConfig {
                interval_secs: 7,
                deadline_secs: 0,
            },
            work_dir: ".".into(),
        }
    }

    #[test]
    fn test_config_required() {
        let err = RemediationBuilder::new(FakeController::default())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut cfg = config();
        cfg.template.directive = String::new();
        let err = RemediationBuilder::new(FakeController::default())
            .config(cfg)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_policy_from_config_unless_overridden() {
        let run = RemediationBuilder::new(FakeController::default())
            .config(config())
            .build()
            .unwrap();
        assert_eq!(run.poller.policy().interval(), Duration::from_secs(7));
        assert_eq!(run.poller.policy().deadline(), None);

        let run = RemediationBuilder::new(FakeController::default())
            .config(config())
            .poll_policy(PollPolicy::new(Duration::from_millis(10)))
            .build()
            .unwrap();
        assert_eq!(run.poller.policy().interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_shared_cancellation_token() {
        let token = CancellationToken::new();
        let run = RemediationBuilder::new(FakeController::default())
            .config(config())
            .cancellation(token.clone())
            .build()
            .unwrap();

        token.cancel();
        assert!(run.cancellation_token().is_cancelled());
    }
}
