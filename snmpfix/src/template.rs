//! Remediation template synthesis.
//!
//! The template is a Velocity script evaluated by the controller once per
//! target device with `$device_ip` bound to that device's address. Each
//! non-compliant device gets a guarded block negating its offending lines;
//! the corrected line follows once, unguarded, so every target receives it:
//!
//! ```text
//! #if($device_ip == '10.0.0.1')
//! no snmp-server host 10.0.0.1 community wrongcomm
//! #end
//!
//! snmp-server host 10.0.0.2 version 2c public
//! ```
//!
//! Offending lines containing `#` or `$` are wrapped in `#[[ ]]#`.

use std::fmt;

use log::warn;

use crate::inventory::Inventory;

/// Variable the controller binds to each target's management address.
pub const DEVICE_VARIABLE: &str = "device_ip";

/// Synthesized template text plus the devices it guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationTemplate {
    content: String,
    guarded: Vec<String>,
}

impl RemediationTemplate {
    /// Template text, newline-joined.
    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn into_string(self) -> String {
        self.content
    }

    /// Addresses that received a guard block, in emission order.
    pub fn guarded_devices(&self) -> &[String] {
        &self.guarded
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.content.lines()
    }
}

impl fmt::Display for RemediationTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

fn guard_open(address: &str) -> String {
    format!("#if(${} == '{}')", DEVICE_VARIABLE, address)
}

const GUARD_CLOSE: &str = "#end";

/// Removal directive for one offending line.
///
/// Lines holding Velocity syntax (`#`, `$`) go inside an unparsed block so
/// the controller passes them through verbatim.
fn negation(address: &str, line: &str) -> String {
    if !line.contains(['#', '$']) {
        return format!("no {line}");
    }
    if line.contains("]]#") {
        warn!(
            "{}: '{}' cannot be quoted for the template engine and may be altered",
            address, line
        );
    }
    format!("#[[no {line}]]#")
}

/// Build the remediation template for the whole inventory.
///
/// Devices are visited in discovery order, so the same inventory and
/// directive always produce byte-identical text. Devices without
/// non-compliant lines contribute nothing.
pub fn synthesize(inventory: &Inventory, directive: &str) -> RemediationTemplate {
    let mut lines: Vec<String> = Vec::new();
    let mut guarded = Vec::new();

    for device in inventory.non_compliant() {
        lines.push(guard_open(&device.address));
        lines.extend(
            device
                .non_compliant_lines()
                .iter()
                .map(|line| negation(&device.address, line)),
        );
        lines.push(GUARD_CLOSE.to_string());
        lines.push(String::new());
        guarded.push(device.address.clone());
    }

    lines.push(directive.to_string());

    RemediationTemplate {
        content: lines.join("\n"),
        guarded,
    }
}
