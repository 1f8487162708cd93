//! Local-vs-remote configuration sync status.
//!
//! The monitor answers one question: does the remote automation host hold
//! the same configuration the user is editing locally? It hashes the
//! canonical export, compares against the hash the host publishes as a
//! global variable, and broadcasts status records to subscribers. Checks
//! are guarded against overlap, reclaimed after a safety timeout, and
//! notifications of an unchanged status are throttled.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;
use time::OffsetDateTime;

use crate::export::ConfigExporter;
use crate::host::{ConnectionState, HostError, RemoteHost};
use crate::storage::Storage;

/// Storage key for the persisted status record.
pub const SYNC_STATUS_STORAGE_KEY: &str = "spawnstudio.syncStatus";

/// Host global variable that carries the hash of the configuration the
/// host is currently running.
pub const REMOTE_HASH_GLOBAL: &str = "spawnstudio_config_hash";

/// Host action that replaces the remote configuration with a pushed one.
pub const PUSH_CONFIG_ACTION: &str = "spawnstudio_apply_config";

/// A check older than this is considered stuck and its guard reclaimed.
pub const CHECK_SAFETY_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimum interval between notifications that repeat an unchanged status.
pub const NOTIFY_THROTTLE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SyncStatus {
    Synced,
    OutOfSync,
    Unknown,
    Error,
    Offline,
}

/// Fixed taxonomy of sync failures. Classification is by message
/// inspection because the host reports failures as bare strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncErrorKind {
    ConnectionFailed,
    Timeout,
    ApiError,
    ValidationError,
    PermissionDenied,
    ConfigExportFailed,
    ConfigImportFailed,
    UnknownError,
}

impl SyncErrorKind {
    /// Transient failures are worth an automatic retry; the rest need the
    /// user to change something first.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            SyncErrorKind::ConnectionFailed | SyncErrorKind::Timeout | SyncErrorKind::ApiError
        )
    }

    /// Best-effort classification of a host-reported failure message.
    pub fn classify(message: &str) -> SyncErrorKind {
        let lower = message.to_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            SyncErrorKind::Timeout
        } else if lower.contains("connect") || lower.contains("network") || lower.contains("refused")
        {
            SyncErrorKind::ConnectionFailed
        } else if lower.contains("permission")
            || lower.contains("unauthorized")
            || lower.contains("forbidden")
        {
            SyncErrorKind::PermissionDenied
        } else if lower.contains("invalid") || lower.contains("validation") {
            SyncErrorKind::ValidationError
        } else if lower.contains("export") {
            SyncErrorKind::ConfigExportFailed
        } else if lower.contains("import") {
            SyncErrorKind::ConfigImportFailed
        } else if lower.contains("api") {
            SyncErrorKind::ApiError
        } else {
            SyncErrorKind::UnknownError
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct SyncError {
    pub kind: SyncErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl SyncError {
    pub fn new(kind: SyncErrorKind, message: impl Into<String>) -> Self {
        SyncError {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
        }
    }

    fn from_host(err: &HostError) -> Self {
        SyncError::new(SyncErrorKind::classify(&err.message), err.message.clone())
    }
}

/// The persisted and broadcast status record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusInfo {
    pub status: SyncStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_checked: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SyncError>,
}

impl SyncStatusInfo {
    fn unknown() -> Self {
        SyncStatusInfo {
            status: SyncStatus::Unknown,
            last_checked: None,
            local_hash: None,
            remote_hash: None,
            error: None,
        }
    }
}

/// A concurrent check was rejected by the reentrancy guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a sync status check is already in progress")]
pub struct CheckInProgress;

/// Content hash of a canonical configuration export.
pub fn hash_config(config: &str) -> String {
    data_encoding::BASE64.encode(blake3::hash(config.as_bytes()).as_bytes())
}

pub struct SyncStatusMonitor {
    storage: Arc<dyn Storage>,
    host: Arc<dyn RemoteHost>,
    exporter: Arc<dyn ConfigExporter>,
    checking: bool,
    check_started: Option<Instant>,
    info: SyncStatusInfo,
    subscribers: Vec<Sender<SyncStatusInfo>>,
    last_notified: Option<(SyncStatus, Option<String>, Instant)>,
}

impl SyncStatusMonitor {
    /// Restore the persisted status record when one exists and parses;
    /// a malformed record is discarded and the monitor starts unknown.
    pub fn new(
        storage: Arc<dyn Storage>,
        host: Arc<dyn RemoteHost>,
        exporter: Arc<dyn ConfigExporter>,
    ) -> Self {
        let info = match storage.get_item(SYNC_STATUS_STORAGE_KEY) {
            Some(raw) => match serde_json::from_str::<SyncStatusInfo>(&raw) {
                Ok(info) => info,
                Err(err) => {
                    log::warn!("discarding malformed persisted sync status: {err}");
                    storage.remove_item(SYNC_STATUS_STORAGE_KEY);
                    SyncStatusInfo::unknown()
                }
            },
            None => SyncStatusInfo::unknown(),
        };

        SyncStatusMonitor {
            storage,
            host,
            exporter,
            checking: false,
            check_started: None,
            info,
            subscribers: Vec::new(),
            last_notified: None,
        }
    }

    pub fn status(&self) -> &SyncStatusInfo {
        &self.info
    }

    /// Receive a status record on every (non-throttled) change.
    pub fn subscribe(&mut self) -> Receiver<SyncStatusInfo> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.subscribers.push(sender);
        receiver
    }

    /// Compare the local configuration hash against the one the host
    /// publishes. Rejects overlap; a check stuck past
    /// [`CHECK_SAFETY_TIMEOUT`] is reclaimed instead of blocking forever.
    pub fn check(&mut self, now: Instant) -> Result<SyncStatusInfo, CheckInProgress> {
        if self.checking {
            let stuck = self
                .check_started
                .map(|started| now.duration_since(started) >= CHECK_SAFETY_TIMEOUT)
                .unwrap_or(true);
            if !stuck {
                log::debug!("sync check rejected: one already in progress");
                return Err(CheckInProgress);
            }
            log::warn!("reclaiming sync check stuck past safety timeout");
        }
        self.checking = true;
        self.check_started = Some(now);

        // The previous verdict is stale the moment a check starts. Hashes
        // are retained for display; only the verdict is invalidated.
        self.info.status = SyncStatus::Unknown;
        self.info.error = None;
        self.persist();

        let info = self.run_check();
        self.checking = false;
        self.check_started = None;
        self.info = info.clone();
        self.persist();
        self.notify(now);
        Ok(info)
    }

    fn run_check(&self) -> SyncStatusInfo {
        let mut info = self.info.clone();
        info.last_checked = Some(OffsetDateTime::now_utc());

        if self.host.connection_state() != ConnectionState::Connected {
            log::debug!("sync check: host not connected");
            info.status = SyncStatus::Offline;
            return info;
        }

        let config = match self.exporter.export_configuration() {
            Ok(config) => config,
            Err(err) => {
                log::warn!("sync check: export failed: {err}");
                info.status = SyncStatus::Error;
                info.error = Some(SyncError::new(
                    SyncErrorKind::ConfigExportFailed,
                    err.message,
                ));
                return info;
            }
        };
        let local_hash = hash_config(&config);
        info.local_hash = Some(local_hash.clone());

        match self.host.get_global(REMOTE_HASH_GLOBAL) {
            Err(err) => {
                log::warn!("sync check: reading remote hash failed: {err}");
                info.status = SyncStatus::Error;
                info.error = Some(SyncError::from_host(&err));
            }
            Ok(None) => {
                log::debug!("sync check: host does not publish a config hash");
                info.status = SyncStatus::Unknown;
                info.remote_hash = None;
            }
            Ok(Some(value)) => match value.as_str() {
                None => {
                    log::warn!("sync check: remote hash global is not a string");
                    info.status = SyncStatus::Unknown;
                    info.remote_hash = None;
                }
                Some(remote_hash) => {
                    info.remote_hash = Some(remote_hash.to_owned());
                    info.status = if remote_hash == local_hash {
                        SyncStatus::Synced
                    } else {
                        SyncStatus::OutOfSync
                    };
                    log::debug!("sync check: {}", info.status);
                }
            },
        }
        info
    }

    /// Push the local configuration to the host and, on acknowledgement,
    /// mark the pair synced optimistically (the next check re-verifies).
    pub fn push(&mut self, now: Instant) -> Result<SyncStatusInfo, SyncError> {
        let result = self.run_push();
        match result {
            Ok(info) => {
                self.info = info.clone();
                self.persist();
                self.notify(now);
                Ok(info)
            }
            Err(error) => {
                self.info.status = SyncStatus::Error;
                self.info.error = Some(error.clone());
                self.persist();
                self.notify(now);
                Err(error)
            }
        }
    }

    fn run_push(&self) -> Result<SyncStatusInfo, SyncError> {
        let config = self
            .exporter
            .export_configuration()
            .map_err(|err| SyncError::new(SyncErrorKind::ConfigExportFailed, err.message))?;
        let local_hash = hash_config(&config);

        let accepted = self
            .host
            .do_action(
                PUSH_CONFIG_ACTION,
                serde_json::json!({ "config": config, "hash": local_hash }),
            )
            .map_err(|err| SyncError::from_host(&err))?;
        if !accepted {
            return Err(SyncError::new(
                SyncErrorKind::ApiError,
                "host rejected the configuration push",
            ));
        }

        log::info!("configuration pushed to host");
        Ok(SyncStatusInfo {
            status: SyncStatus::Synced,
            last_checked: Some(OffsetDateTime::now_utc()),
            local_hash: Some(local_hash.clone()),
            remote_hash: Some(local_hash),
            error: None,
        })
    }

    /// Deliver the current record to subscribers. Error and offline
    /// records that repeat the previous one verbatim are throttled to one
    /// per [`NOTIFY_THROTTLE`]; any status or message change goes out
    /// immediately.
    fn notify(&mut self, now: Instant) {
        let message = self.info.error.as_ref().map(|error| error.message.clone());
        if matches!(self.info.status, SyncStatus::Error | SyncStatus::Offline) {
            if let Some((status, last_message, at)) = &self.last_notified {
                if *status == self.info.status
                    && *last_message == message
                    && now.duration_since(*at) < NOTIFY_THROTTLE
                {
                    log::trace!("sync notification throttled ({status})");
                    return;
                }
            }
        }
        self.last_notified = Some((self.info.status, message, now));
        self.subscribers
            .retain(|sender| sender.send(self.info.clone()).is_ok());
    }

    fn persist(&self) {
        match serde_json::to_string(&self.info) {
            Ok(raw) => self.storage.set_item(SYNC_STATUS_STORAGE_KEY, &raw),
            Err(err) => log::warn!("failed to serialize sync status: {err}"),
        }
    }
}
