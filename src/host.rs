//! Remote automation host collaborator.
//!
//! The host is an external RPC peer: the engine reads its connection state,
//! fetches named global variables, and invokes actions on it. Everything
//! else about the host is opaque, including why a call failed — failures
//! surface as message strings which the sync layer classifies.

use serde_json::Value;
use thiserror::Error;

/// Connection state as reported by the host's own callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Connecting,
    Disconnected,
    Error,
}

/// An RPC call against the host failed. The message carries whatever the
/// host transport reported.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HostError {
    pub message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        HostError {
            message: message.into(),
        }
    }
}

pub trait RemoteHost: Send + Sync {
    fn connection_state(&self) -> ConnectionState;

    /// Read a named global variable. `Ok(None)` means the variable is not
    /// defined on the host, which is distinct from a transport failure.
    fn get_global(&self, name: &str) -> Result<Option<Value>, HostError>;

    /// Invoke a named action. `Ok(false)` means the host executed the call
    /// and reported failure.
    fn do_action(&self, action: &str, args: Value) -> Result<bool, HostError>;
}
