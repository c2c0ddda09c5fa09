//! Line-level running-config compliance checks.
//!
//! Matching is plain substring containment, not a config parser: a line is
//! selected when it contains the statement keyword, and a selected line is
//! compliant when it contains both the expected endpoint and the expected
//! group. Any config dialect works as long as the statements are single-line.

use std::borrow::Cow;
use std::fs;
use std::path::PathBuf;

use log::{debug, info, warn};
use memchr::memmem::Finder;
use serde::Deserialize;

use crate::archive::ExtractedRoot;
use crate::error::{ComplianceError, Result};

/// What to look for in a running configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ComplianceRule {
    /// Statement keyword selecting the lines to check.
    #[serde(default = "default_keyword")]
    pub keyword: String,

    /// Endpoint identity every selected line must mention (SNMP host).
    pub endpoint: String,

    /// Group identity every selected line must mention (SNMP community).
    pub group: String,

    /// File-name suffix of the running-config file in a device directory.
    #[serde(default = "default_suffix")]
    pub running_config_suffix: String,
}

impl ComplianceRule {
    /// SNMP host rule with the default keyword and file suffix.
    pub fn snmp_host(endpoint: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            keyword: default_keyword(),
            endpoint: endpoint.into(),
            group: group.into(),
            running_config_suffix: default_suffix(),
        }
    }
}

fn default_keyword() -> String {
    "snmp-server host".to_string()
}

fn default_suffix() -> String {
    "RUNNINGCONFIG.cfg".to_string()
}

/// Result of checking one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComplianceOutcome {
    /// Every selected line contains both expected values.
    Compliant { checked: usize },

    /// At least one selected line is missing an expected value.
    /// Offending lines are kept verbatim (trimmed) for negation.
    NonCompliant { lines: Vec<String>, checked: usize },

    /// No line contains the statement keyword.
    NoMatchingConfig,
}

impl ComplianceOutcome {
    /// Lines that must be removed; empty unless non-compliant.
    pub fn non_compliant_lines(&self) -> &[String] {
        match self {
            Self::NonCompliant { lines, .. } => lines,
            _ => &[],
        }
    }

    pub fn needs_remediation(&self) -> bool {
        !self.non_compliant_lines().is_empty()
    }
}

/// Classifies running-config lines against a [`ComplianceRule`].
pub struct ConfigValidator {
    rule: ComplianceRule,
    keyword: Finder<'static>,
    endpoint: Finder<'static>,
    group: Finder<'static>,
}

impl ConfigValidator {
    pub fn new(rule: ComplianceRule) -> Self {
        let keyword = Finder::new(rule.keyword.as_bytes()).into_owned();
        let endpoint = Finder::new(rule.endpoint.as_bytes()).into_owned();
        let group = Finder::new(rule.group.as_bytes()).into_owned();
        Self {
            rule,
            keyword,
            endpoint,
            group,
        }
    }

    pub fn rule(&self) -> &ComplianceRule {
        &self.rule
    }

    /// Whether a line is one of the statements being checked.
    pub fn selects(&self, line: &str) -> bool {
        self.keyword.find(line.as_bytes()).is_some()
    }

    /// Whether a selected line carries both expected values.
    pub fn is_compliant(&self, line: &str) -> bool {
        let bytes = line.as_bytes();
        self.endpoint.find(bytes).is_some() && self.group.find(bytes).is_some()
    }

    /// Classify a whole running configuration.
    pub fn check_text(&self, address: &str, config: &str) -> ComplianceOutcome {
        let mut checked = 0;
        let mut lines = Vec::new();

        for line in config.lines().map(str::trim).filter(|l| self.selects(l)) {
            checked += 1;
            if self.is_compliant(line) {
                info!("{}: config valid: {}", address, line);
            } else {
                warn!("{}: config invalid: {}", address, line);
                lines.push(line.to_string());
            }
        }

        if checked == 0 {
            warn!("{}: no matching config found for device", address);
            ComplianceOutcome::NoMatchingConfig
        } else if lines.is_empty() {
            ComplianceOutcome::Compliant { checked }
        } else {
            ComplianceOutcome::NonCompliant { lines, checked }
        }
    }

    /// Locate the device's running config under `root/address/` and check it.
    pub fn validate(&self, address: &str, root: &ExtractedRoot) -> Result<ComplianceOutcome> {
        info!("Reading config for device at {}", address);
        let path = self.running_config_path(address, root)?;
        debug!("{}: using {}", address, path.display());
        let raw = fs::read(&path).map_err(ComplianceError::Io)?;
        let config = String::from_utf8_lossy(&raw);
        if let Cow::Owned(_) = config {
            warn!(
                "{}: {} is not valid UTF-8; invalid bytes replaced, affected lines are not negated verbatim",
                address,
                path.display()
            );
        }
        Ok(self.check_text(address, &config))
    }

    /// First file (by name) in the device directory ending in the suffix.
    fn running_config_path(&self, address: &str, root: &ExtractedRoot) -> Result<PathBuf> {
        let dir = root.device_dir(address);
        if !dir.is_dir() {
            return Err(ComplianceError::MissingDevice {
                address: address.to_string(),
                path: dir,
            }
            .into());
        }

        let mut candidates = Vec::new();
        for entry in fs::read_dir(&dir).map_err(ComplianceError::Io)? {
            let entry = entry.map_err(ComplianceError::Io)?;
            let name = entry.file_name();
            if name
                .to_string_lossy()
                .ends_with(self.rule.running_config_suffix.as_str())
            {
                candidates.push(entry.path());
            }
        }
        candidates.sort();

        candidates.into_iter().next().ok_or_else(|| {
            ComplianceError::MissingRunningConfig {
                address: address.to_string(),
                suffix: self.rule.running_config_suffix.clone(),
            }
            .into()
        })
    }
}
