//! Devices targeted by one run, keyed by management address.

use indexmap::IndexMap;
use log::warn;

use crate::compliance::ComplianceOutcome;
use crate::controller::{DeploymentTarget, DeviceSummary, DeviceType};

/// One targeted device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Management address; the key of the inventory.
    pub address: String,

    /// Controller-assigned id.
    pub id: String,

    pub family: Option<String>,

    pub series: Option<String>,

    compliance: Option<ComplianceOutcome>,
}

impl DeviceRecord {
    pub fn new(address: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            id: id.into(),
            family: None,
            series: None,
            compliance: None,
        }
    }

    /// Set the product classification.
    pub fn with_product(mut self, family: impl Into<String>, series: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self.series = Some(series.into());
        self
    }

    /// Build a record from an inventory listing entry. Devices without a
    /// management address cannot be targeted and yield `None`.
    pub fn from_summary(summary: &DeviceSummary) -> Option<Self> {
        let address = summary.management_ip_address.clone()?;
        Some(Self {
            address,
            id: summary.id.clone(),
            family: summary.family.clone(),
            series: summary.series.clone(),
            compliance: None,
        })
    }

    /// Compliance outcome, once validated.
    pub fn compliance(&self) -> Option<&ComplianceOutcome> {
        self.compliance.as_ref()
    }

    /// Lines to remove from this device; empty when none were found.
    pub fn non_compliant_lines(&self) -> &[String] {
        self.compliance
            .as_ref()
            .map(ComplianceOutcome::non_compliant_lines)
            .unwrap_or(&[])
    }

    pub fn device_type(&self) -> Option<DeviceType> {
        Some(DeviceType {
            product_family: self.family.clone()?,
            product_series: self.series.clone()?,
        })
    }
}

/// Targeted devices in discovery order, unique by management address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    devices: IndexMap<String, DeviceRecord>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device. A second record for an address already present is
    /// ignored and `false` is returned.
    pub fn insert(&mut self, record: DeviceRecord) -> bool {
        if self.devices.contains_key(&record.address) {
            warn!(
                "Duplicate management address {} (id {}), keeping first",
                record.address, record.id
            );
            return false;
        }
        self.devices.insert(record.address.clone(), record);
        true
    }

    /// Attach a compliance outcome to a device. Returns `false` for an
    /// unknown address.
    pub fn record_compliance(&mut self, address: &str, outcome: ComplianceOutcome) -> bool {
        match self.devices.get_mut(address) {
            Some(device) => {
                if device.compliance.is_some() {
                    warn!("{}: compliance already recorded, replacing", address);
                }
                device.compliance = Some(outcome);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, address: &str) -> Option<&DeviceRecord> {
        self.devices.get(address)
    }

    /// Devices in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    /// Management addresses in discovery order.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Controller ids of all devices, for the export request.
    pub fn device_ids(&self) -> Vec<String> {
        self.iter().map(|d| d.id.clone()).collect()
    }

    /// Distinct product classifications, first-seen order.
    pub fn device_types(&self) -> Vec<DeviceType> {
        let mut types: Vec<DeviceType> = Vec::new();
        for device_type in self.iter().filter_map(DeviceRecord::device_type) {
            if !types.contains(&device_type) {
                types.push(device_type);
            }
        }
        types
    }

    /// One deployment target per device, binding its own address.
    pub fn deployment_targets(&self) -> Vec<DeploymentTarget> {
        self.addresses()
            .map(DeploymentTarget::by_management_ip)
            .collect()
    }

    /// Devices that need a remediation block.
    pub fn non_compliant(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.iter().filter(|d| !d.non_compliant_lines().is_empty())
    }
}

impl FromIterator<DeviceRecord> for Inventory {
    fn from_iter<I: IntoIterator<Item = DeviceRecord>>(iter: I) -> Self {
        let mut inventory = Inventory::new();
        for record in iter {
            inventory.insert(record);
        }
        inventory
    }
}
