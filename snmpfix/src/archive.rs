//! Encrypted configuration bundle handling.
//!
//! The controller exports running configurations as an AES-encrypted zip
//! with one directory per device management address. This module generates
//! the per-run passphrase, locates the downloaded bundle and unpacks it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rand::Rng;
use rand::distributions::Alphanumeric;
use secrecy::{ExposeSecret, SecretString};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{ArchiveError, Result};

/// Substring identifying controller config exports by file name.
pub const EXPORT_MARKER: &str = "Export_Configs";

const PASSPHRASE_LEN: usize = 16;

/// Appended to satisfy the export's password complexity policy.
const PASSPHRASE_SUFFIX: char = '!';

/// Generate a one-run archive passphrase: 16 random alphanumerics plus `!`.
pub fn generate_passphrase() -> SecretString {
    let mut passphrase: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSPHRASE_LEN)
        .map(char::from)
        .collect();
    passphrase.push(PASSPHRASE_SUFFIX);
    SecretString::from(passphrase)
}

/// Where to find the bundle to extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleLocator {
    /// Exact path, as returned by the download step.
    Path(PathBuf),

    /// The single file in `dir` whose name contains `marker`.
    Marker { dir: PathBuf, marker: String },
}

impl BundleLocator {
    /// Scan `dir` for the default export marker.
    pub fn export_in(dir: impl Into<PathBuf>) -> Self {
        Self::Marker {
            dir: dir.into(),
            marker: EXPORT_MARKER.to_string(),
        }
    }

    /// Resolve to exactly one file.
    ///
    /// Marker scans fail on zero matches and on more than one match.
    pub fn resolve(&self) -> Result<PathBuf> {
        match self {
            Self::Path(path) => Ok(path.clone()),
            Self::Marker { dir, marker } => {
                let mut matches = Vec::new();
                for entry in fs::read_dir(dir).map_err(ArchiveError::Io)? {
                    let entry = entry.map_err(ArchiveError::Io)?;
                    let is_file = entry.file_type().map_err(ArchiveError::Io)?.is_file();
                    if is_file && entry.file_name().to_string_lossy().contains(marker.as_str()) {
                        matches.push(entry.path());
                    }
                }

                match matches.len() {
                    0 => Err(ArchiveError::NotFound {
                        dir: dir.clone(),
                        marker: marker.clone(),
                    }
                    .into()),
                    1 => Ok(matches.remove(0)),
                    count => Err(ArchiveError::Ambiguous {
                        dir: dir.clone(),
                        marker: marker.clone(),
                        count,
                    }
                    .into()),
                }
            }
        }
    }
}

/// Directory tree produced by extraction: one subdirectory per device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRoot {
    path: PathBuf,
}

impl ExtractedRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding one device's exported files.
    pub fn device_dir(&self, address: &str) -> PathBuf {
        self.path.join(address)
    }

    /// Device directories present in the tree, sorted by name.
    pub fn devices(&self) -> Result<Vec<String>> {
        let mut devices = Vec::new();
        for entry in fs::read_dir(&self.path).map_err(ArchiveError::Io)? {
            let entry = entry.map_err(ArchiveError::Io)?;
            if entry.file_type().map_err(ArchiveError::Io)?.is_dir() {
                devices.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        devices.sort();
        Ok(devices)
    }
}

/// Decrypts and unpacks export bundles into a destination directory.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    dest: PathBuf,
    replace: bool,
}

impl ArchiveExtractor {
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self {
            dest: dest.into(),
            replace: false,
        }
    }

    /// Remove the destination directory before unpacking, so no file from
    /// an earlier extraction survives.
    pub fn replacing(mut self) -> Self {
        self.replace = true;
        self
    }

    /// Locate, decrypt and unpack the bundle.
    ///
    /// A wrong passphrase or a damaged archive fails the whole extraction.
    /// Unless [`replacing`](Self::replacing) is set, files from a previous
    /// extraction into the same destination are overwritten but not removed.
    pub fn extract(&self, locator: &BundleLocator, passphrase: &SecretString) -> Result<ExtractedRoot> {
        let path = locator.resolve()?;
        info!("Unzipping config files from {}", path.display());

        let file = fs::File::open(&path).map_err(ArchiveError::Io)?;
        let mut archive = ZipArchive::new(file).map_err(|source| ArchiveError::Corrupt {
            path: path.clone(),
            source,
        })?;

        if self.replace && self.dest.exists() {
            debug!("Clearing previous extraction in {}", self.dest.display());
            fs::remove_dir_all(&self.dest).map_err(ArchiveError::Io)?;
        }
        fs::create_dir_all(&self.dest).map_err(ArchiveError::Io)?;
        let password = passphrase.expose_secret().as_bytes();

        for index in 0..archive.len() {
            let mut entry = archive
                .by_index_decrypt(index, password)
                .map_err(|e| match e {
                    ZipError::InvalidPassword => ArchiveError::Decrypt { path: path.clone() },
                    source => ArchiveError::Corrupt {
                        path: path.clone(),
                        source,
                    },
                })?;

            let relative = entry.enclosed_name().ok_or_else(|| ArchiveError::UnsafeEntry {
                name: entry.name().to_string(),
            })?;
            let target = self.dest.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&target).map_err(ArchiveError::Io)?;
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(ArchiveError::Io)?;
            }
            let mut out = fs::File::create(&target).map_err(ArchiveError::Io)?;
            // AES entries authenticate on read; a bad key that slipped past the
            // verifier fails here.
            io::copy(&mut entry, &mut out).map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData => ArchiveError::Decrypt { path: path.clone() },
                _ => ArchiveError::Io(e),
            })?;
            debug!("extracted {}", target.display());
        }

        info!("Unzip complete: {} entries", archive.len());
        Ok(ExtractedRoot::new(&self.dest))
    }
}
