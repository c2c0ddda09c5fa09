//! # snmpfix
//!
//! SNMP configuration drift audit and remediation through a central network
//! controller.
//!
//! snmpfix pulls the running configuration of every targeted device through
//! the controller's bulk export, checks each device's SNMP host statements
//! against the expected endpoint and community, and deploys a single
//! per-device conditional template that removes the offending lines and
//! applies the corrected one.
//!
//! ## Features
//!
//! - Async controller access via reqwest behind a [`Controller`] trait
//! - Bounded, cancellable polling of export, template and deployment tasks
//! - Encrypted bundle extraction with a per-run passphrase
//! - Deterministic template synthesis in device discovery order
//! - Operator confirmation before anything is pushed to devices
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snmpfix::{AutoConfirm, ConfigFile, HttpController, Remediation};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), snmpfix::Error> {
//!     let file = ConfigFile::load("snmpfix.toml")?;
//!     let controller = HttpController::new(file.controller)?;
//!
//!     let mut run = Remediation::builder(controller)
//!         .config(file.remediation)
//!         .confirmation(AutoConfirm::no())
//!         .build()?;
//!
//!     let outcome = run.run().await?;
//!     println!("exit code {}", outcome.exit_code());
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod compliance;
pub mod config;
pub mod controller;
pub mod deploy;
pub mod error;
pub mod inventory;
pub mod pipeline;
pub mod poller;
pub mod reporter;
pub mod template;

// Re-export main types for convenience
pub use archive::{ArchiveExtractor, BundleLocator, ExtractedRoot};
pub use compliance::{ComplianceOutcome, ComplianceRule, ConfigValidator};
pub use config::{ConfigFile, ControllerConfig, DeviceFilter, RemediationConfig};
pub use controller::{Controller, HttpController};
pub use deploy::{DeploymentOutcome, DeploymentTracker};
pub use error::Error;
pub use inventory::{DeviceRecord, Inventory};
pub use pipeline::{
    AutoConfirm, Confirmation, DeclineStage, Remediation, RemediationBuilder, RunOutcome,
};
pub use poller::{PollPolicy, Poller};
pub use reporter::{LogReporter, Reporter};
pub use template::{RemediationTemplate, synthesize};
