//! Run configuration.
//!
//! One immutable [`RemediationConfig`] is built per run and handed to each
//! component. Controller credentials live in a separate [`ControllerConfig`]
//! because they are consumed by the controller implementation, not by the
//! pipeline. Both can be loaded from a single TOML file:
//!
//! ```toml
//! work_dir = "/var/tmp/snmpfix"
//!
//! [controller]
//! url = "https://dnac.example.com"
//! username = "admin"
//! password = "secret"
//! verify_tls = false
//!
//! [compliance]
//! endpoint = "10.0.0.2"
//! group = "public"
//!
//! [template]
//! project = "Remediation"
//! name = "snmp-host-fix"
//! directive = "snmp-server host 10.0.0.2 version 2c public"
//!
//! [filter]
//! family = "Switches and Hubs"
//! locations = ["Global/US/Building 1"]
//!
//! [polling]
//! interval_secs = 3
//! deadline_secs = 1800
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::compliance::ComplianceRule;
use crate::error::{ConfigError, Result};
use crate::poller::PollPolicy;

/// Controller endpoint and credentials.
#[derive(Debug, Deserialize)]
pub struct ControllerConfig {
    /// Base URL, e.g. `https://dnac.example.com`.
    pub url: String,

    /// Username for token authentication.
    pub username: String,

    /// Password for token authentication.
    #[serde(deserialize_with = "secret_string")]
    pub password: SecretString,

    /// Verify the controller's TLS certificate.
    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl ControllerConfig {
    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Attribute filter applied when enumerating devices. Unset fields match all.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DeviceFilter {
    pub hostname: Option<String>,
    pub management_ip_address: Option<String>,
    pub family: Option<String>,
    pub series: Option<String>,
    pub platform_id: Option<String>,

    /// Location allow-list. Empty means every location.
    #[serde(default)]
    pub locations: Vec<String>,
}

impl DeviceFilter {
    /// Query parameters for the set attributes, in a fixed order.
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("hostname", &self.hostname),
            ("managementIpAddress", &self.management_ip_address),
            ("family", &self.family),
            ("series", &self.series),
            ("platformId", &self.platform_id),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect()
    }

    /// Whether device details must be fetched to apply the location filter.
    pub fn filters_location(&self) -> bool {
        !self.locations.is_empty()
    }

    /// Check a device location against the allow-list.
    pub fn allows_location(&self, location: Option<&str>) -> bool {
        if self.locations.is_empty() {
            return true;
        }
        location.is_some_and(|loc| self.locations.iter().any(|l| l == loc))
    }
}

/// Naming and content of the remediation template.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    /// Template project the template is created under.
    pub project: String,

    /// Template name.
    pub name: String,

    /// Corrected configuration line applied to every targeted device.
    pub directive: String,

    /// Software type recorded on the template.
    #[serde(default = "default_software_type")]
    pub software_type: String,

    /// Comment attached to the committed template version.
    #[serde(default = "default_commit_comment")]
    pub commit_comment: String,
}

/// Poll cadence as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Zero disables the deadline.
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            deadline_secs: default_deadline(),
        }
    }
}

impl PollingConfig {
    /// Convert to the policy used by the poll loops.
    pub fn policy(&self) -> PollPolicy {
        let policy = PollPolicy::new(Duration::from_secs(self.interval_secs));
        match self.deadline_secs {
            0 => policy.without_deadline(),
            secs => policy.with_deadline(Duration::from_secs(secs)),
        }
    }
}

/// Everything the pipeline needs besides the controller itself.
#[derive(Debug, Clone, Deserialize)]
pub struct RemediationConfig {
    /// Which lines to inspect and what a compliant line contains.
    pub compliance: ComplianceRule,

    /// Template naming and corrective directive.
    pub template: TemplateConfig,

    /// Device selection.
    #[serde(default)]
    pub filter: DeviceFilter,

    /// Poll cadence for export, template and deployment tasks.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Directory receiving the downloaded bundle and its extraction.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

impl RemediationConfig {
    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("compliance.keyword", &self.compliance.keyword),
            ("compliance.endpoint", &self.compliance.endpoint),
            ("compliance.group", &self.compliance.group),
            ("compliance.running_config_suffix", &self.compliance.running_config_suffix),
            ("template.project", &self.template.project),
            ("template.name", &self.template.name),
            ("template.directive", &self.template.directive),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(invalid(format!("{field} must not be empty")));
            }
        }

        if self.template.directive.contains('\n') {
            return Err(invalid("template.directive must be a single line"));
        }

        if self.polling.interval_secs == 0 {
            return Err(invalid("polling.interval_secs must be at least 1"));
        }

        Ok(())
    }

    /// Where the export bundle is extracted.
    pub fn extract_dir(&self) -> PathBuf {
        self.work_dir.join("configfiles")
    }
}

/// Layout of a config file: controller section plus the run configuration.
#[derive(Debug, Deserialize)]
pub struct ConfigFile {
    pub controller: ControllerConfig,

    #[serde(flatten)]
    pub remediation: RemediationConfig,
}

impl ConfigFile {
    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text).map_err(ConfigError::from)?;
        if file.controller.url.trim().is_empty() {
            return Err(invalid("controller.url must not be empty"));
        }
        file.remediation.validate()?;
        Ok(file)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

fn invalid(message: impl Into<String>) -> crate::Error {
    ConfigError::Invalid {
        message: message.into(),
    }
    .into()
}

fn secret_string<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

fn default_software_type() -> String {
    "IOS-XE".to_string()
}

fn default_commit_comment() -> String {
    "Commit via API".to_string()
}

fn default_interval() -> u64 {
    3
}

fn default_deadline() -> u64 {
    30 * 60
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;
    use crate::Error;

    const SAMPLE: &str = r#"
        work_dir = "/tmp/run"

        [controller]
        url = "https://dnac.example.com"
        username = "admin"
        password = "hunter2"

        [compliance]
        endpoint = "10.0.0.2"
        group = "public"

        [template]
        project = "Remediation"
        name = "snmp-host-fix"
        directive = "snmp-server host 10.0.0.2 version 2c public"

        [filter]
        family = "Switches and Hubs"
        locations = ["Global/Site A"]
    "#;

    #[test]
    fn test_load_sample_with_defaults() {
        let file = ConfigFile::from_toml_str(SAMPLE).unwrap();

        assert_eq!(file.controller.password.expose_secret(), "hunter2");
        assert!(file.controller.verify_tls);
        assert_eq!(file.controller.timeout(), Duration::from_secs(30));

        let cfg = file.remediation;
        assert_eq!(cfg.compliance.keyword, "snmp-server host");
        assert_eq!(cfg.compliance.running_config_suffix, "RUNNINGCONFIG.cfg");
        assert_eq!(cfg.template.software_type, "IOS-XE");
        assert_eq!(cfg.template.commit_comment, "Commit via API");
        assert_eq!(cfg.polling.interval_secs, 3);
        assert_eq!(cfg.extract_dir(), PathBuf::from("/tmp/run/configfiles"));
    }

    #[test]
    fn test_password_not_in_debug() {
        let file = ConfigFile::from_toml_str(SAMPLE).unwrap();
        assert!(!format!("{:?}", file.controller).contains("hunter2"));
    }

    #[test]
    fn test_empty_directive_rejected() {
        let text = SAMPLE.replace(
            "directive = \"snmp-server host 10.0.0.2 version 2c public\"",
            "directive = \"  \"",
        );
        let err = ConfigFile::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_multiline_directive_rejected() {
        let text = SAMPLE.replace(
            "directive = \"snmp-server host 10.0.0.2 version 2c public\"",
            "directive = \"line one\\nline two\"",
        );
        assert!(ConfigFile::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_missing_section_is_parse_error() {
        let err = ConfigFile::from_toml_str("[controller]\nurl = \"x\"").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Parse(_))));
    }

    #[test]
    fn test_filter_query_pairs_skip_unset() {
        let filter = DeviceFilter {
            family: Some("Switches and Hubs".into()),
            platform_id: Some("C9300-48U".into()),
            ..Default::default()
        };
        assert_eq!(
            filter.query_pairs(),
            vec![("family", "Switches and Hubs"), ("platformId", "C9300-48U")]
        );
    }

    #[test]
    fn test_location_allow_list() {
        let open = DeviceFilter::default();
        assert!(open.allows_location(None));

        let filter = DeviceFilter {
            locations: vec!["Global/Site A".into()],
            ..Default::default()
        };
        assert!(filter.filters_location());
        assert!(filter.allows_location(Some("Global/Site A")));
        assert!(!filter.allows_location(Some("Global/Site B")));
        assert!(!filter.allows_location(None));
    }

    #[test]
    fn test_zero_deadline_disables_it() {
        let polling = PollingConfig {
            interval_secs: 5,
            deadline_secs: 0,
        };
        let policy = polling.policy();
        assert_eq!(policy.interval(), Duration::from_secs(5));
        assert_eq!(policy.deadline(), None);
    }
}
