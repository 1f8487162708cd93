//! Canonical configuration export.
//!
//! Produces the serialized form used both for backup and for content
//! hashing. The output must be deterministic for a given configuration:
//! struct fields serialize in declaration order and `serde_json` maps keep
//! sorted keys, so equal configurations always hash equal.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::spawn::Profile;

#[derive(Debug, Clone, Error)]
#[error("configuration export failed: {message}")]
pub struct ExportError {
    pub message: String,
}

impl ExportError {
    pub fn new(message: impl Into<String>) -> Self {
        ExportError {
            message: message.into(),
        }
    }
}

pub trait ConfigExporter: Send + Sync {
    /// Serialize the full local configuration to canonical JSON.
    fn export_configuration(&self) -> Result<String, ExportError>;
}

/// Exports a shared in-memory [`Profile`].
pub struct ProfileExporter {
    profile: Arc<Mutex<Profile>>,
}

impl ProfileExporter {
    pub fn new(profile: Arc<Mutex<Profile>>) -> Self {
        ProfileExporter { profile }
    }
}

impl ConfigExporter for ProfileExporter {
    fn export_configuration(&self) -> Result<String, ExportError> {
        let profile = self.profile.lock().unwrap();
        serde_json::to_string(&*profile).map_err(|err| ExportError::new(err.to_string()))
    }
}
