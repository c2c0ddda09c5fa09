//! Error types for snmpfix.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for snmpfix operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Controller API errors
    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),

    /// Configuration bundle errors
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Running-config inspection errors
    #[error("Compliance error: {0}")]
    Compliance(#[from] ComplianceError),

    /// Poll loop errors
    #[error("Poll error: {0}")]
    Poll(#[from] PollError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Controller-facing errors (session, transport, API responses).
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Controller could not be reached
    #[error("Failed to connect to controller at {url}: {source}")]
    Connectivity {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Credentials were rejected
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// An API call was made before `authenticate()`
    #[error("Not authenticated - call authenticate() first")]
    NotAuthenticated,

    /// Transport failure on an established session
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status from the controller
    #[error("{method} {path} returned {status}: {body}")]
    Api {
        method: &'static str,
        path: String,
        status: u16,
        body: String,
    },

    /// Response body did not have the expected shape
    #[error("Unexpected response from {path}: {message}")]
    UnexpectedResponse { path: String, message: String },

    /// A template with this name already exists in the project
    #[error("Template '{name}' already exists")]
    TemplateConflict { name: String },

    /// Template project does not exist
    #[error("Template project '{name}' not found")]
    ProjectNotFound { name: String },

    /// Template could not be found inside its project
    #[error("Template '{name}' not found in project '{project}'")]
    TemplateNotFound { name: String, project: String },

    /// An asynchronous controller task finished with an error flag
    #[error("Task {task_id} failed: {reason}")]
    TaskFailed { task_id: String, reason: String },

    /// Local I/O while saving a downloaded file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Bundle location and extraction errors.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// No bundle matched the marker
    #[error("No bundle containing '{marker}' found in {}", dir.display())]
    NotFound { dir: PathBuf, marker: String },

    /// More than one bundle matched the marker
    #[error("{count} bundles containing '{marker}' found in {}; remove stale exports", dir.display())]
    Ambiguous {
        dir: PathBuf,
        marker: String,
        count: usize,
    },

    /// Wrong passphrase
    #[error("Failed to decrypt {}: invalid passphrase", path.display())]
    Decrypt { path: PathBuf },

    /// Archive is not a readable zip file
    #[error("Corrupt archive {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// Entry would extract outside the destination
    #[error("Unsafe entry name in archive: '{name}'")]
    UnsafeEntry { name: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Running-config lookup errors.
#[derive(Error, Debug)]
pub enum ComplianceError {
    /// No directory for the device in the extracted bundle
    #[error("No configuration directory for device {address} at {}", path.display())]
    MissingDevice { address: String, path: PathBuf },

    /// Device directory holds no running-config file
    #[error("No file ending in '{suffix}' for device {address}")]
    MissingRunningConfig { address: String, suffix: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Poll loop errors.
#[derive(Error, Debug)]
pub enum PollError {
    /// Deadline elapsed before a terminal status was seen
    #[error("{what} did not finish within {deadline:?} ({attempts} polls)")]
    Timeout {
        what: String,
        deadline: Duration,
        attempts: u32,
    },

    /// The cancellation token fired
    #[error("{what} polling cancelled")]
    Cancelled { what: String },
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// TOML could not be parsed
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is missing or out of range
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    /// Config file could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type alias using snmpfix's Error.
pub type Result<T> = std::result::Result<T, Error>;
