//! Target resolution strategies
//!
//! The single-target and admin endpoints share one session state machine and
//! differ only in how a request finds its device:
//!
//! - [`ResolveOnce`]: the device is bound once by `AUTH` and every later
//!   request must name that device (or none)
//! - [`ResolvePerMessage`]: nothing is bound; each request names its own
//!   device, looked up through the shared [`RegistryCache`]

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use adbgate_proto::DeviceStatus;

use crate::backend::{DeviceRegistry, TargetHandle};
use crate::error::ProtocolError;
use crate::registry_cache::RegistryCache;

/// Authentication state of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Single-target session before a successful `AUTH`
    Unauthenticated,
    /// Single-target session bound to a device serial
    Authenticated(String),
    /// Admin session; never binds
    Multiplexed,
}

impl SessionState {
    /// Whether a device is bound
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    /// Bound serial, if any
    pub fn serial(&self) -> Option<String> {
        match self {
            SessionState::Authenticated(serial) => Some(serial.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unauthenticated => f.write_str("unauthenticated"),
            SessionState::Authenticated(serial) => write!(f, "authenticated({})", serial),
            SessionState::Multiplexed => f.write_str("multiplexed"),
        }
    }
}

/// A device a request has been routed to
#[derive(Clone)]
pub struct ResolvedTarget {
    /// Device serial
    pub serial: String,
    /// Execution handle
    pub handle: TargetHandle,
}

impl fmt::Debug for ResolvedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedTarget")
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

/// How a session maps requests to devices
#[async_trait]
pub trait TargetResolution: Send + Sync {
    /// Current authentication state
    fn state(&self) -> SessionState;

    /// Whether requests must pass through `AUTH` before anything else
    fn requires_auth(&self) -> bool;

    /// Bind the session to `serial`
    ///
    /// Returns the bound serial. On failure the state is unchanged.
    async fn authenticate(&mut self, serial: Option<&str>) -> Result<String, ProtocolError>;

    /// Find the device a request should run against
    async fn resolve(&self, serial: Option<&str>) -> Result<ResolvedTarget, ProtocolError>;

    /// Every known device with its online state
    async fn enumerate(&self) -> Result<Vec<DeviceStatus>, ProtocolError>;
}

/// Single-target strategy: resolve once at `AUTH`
pub struct ResolveOnce {
    registry: Arc<dyn DeviceRegistry>,
    bound: Option<ResolvedTarget>,
}

impl ResolveOnce {
    /// Create an unauthenticated strategy over `registry`
    pub fn new(registry: Arc<dyn DeviceRegistry>) -> Self {
        Self {
            registry,
            bound: None,
        }
    }
}

#[async_trait]
impl TargetResolution for ResolveOnce {
    fn state(&self) -> SessionState {
        match &self.bound {
            Some(target) => SessionState::Authenticated(target.serial.clone()),
            None => SessionState::Unauthenticated,
        }
    }

    fn requires_auth(&self) -> bool {
        true
    }

    async fn authenticate(&mut self, serial: Option<&str>) -> Result<String, ProtocolError> {
        if self.bound.is_some() {
            return Err(ProtocolError::AlreadyAuthenticated);
        }
        let serial = serial.ok_or(ProtocolError::AuthDeviceNotFound)?;
        let handle = self
            .registry
            .resolve(serial)
            .await
            .ok_or(ProtocolError::AuthDeviceNotFound)?;

        self.bound = Some(ResolvedTarget {
            serial: serial.to_string(),
            handle,
        });
        Ok(serial.to_string())
    }

    async fn resolve(&self, serial: Option<&str>) -> Result<ResolvedTarget, ProtocolError> {
        let bound = self.bound.as_ref().ok_or(ProtocolError::Unauthenticated)?;
        match serial {
            Some(requested) if requested != bound.serial => Err(ProtocolError::TargetMismatch {
                bound: bound.serial.clone(),
                requested: requested.to_string(),
            }),
            _ => Ok(bound.clone()),
        }
    }

    async fn enumerate(&self) -> Result<Vec<DeviceStatus>, ProtocolError> {
        Err(ProtocolError::UnknownKind)
    }
}

/// Admin strategy: resolve every request through the registry cache
pub struct ResolvePerMessage {
    cache: RegistryCache,
}

impl ResolvePerMessage {
    /// Create a strategy reading from `cache`
    pub fn new(cache: RegistryCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl TargetResolution for ResolvePerMessage {
    fn state(&self) -> SessionState {
        SessionState::Multiplexed
    }

    fn requires_auth(&self) -> bool {
        false
    }

    async fn authenticate(&mut self, _serial: Option<&str>) -> Result<String, ProtocolError> {
        Err(ProtocolError::UnknownKind)
    }

    async fn resolve(&self, serial: Option<&str>) -> Result<ResolvedTarget, ProtocolError> {
        let serial = serial.ok_or(ProtocolError::DeviceNotFound)?;
        let handle = self
            .cache
            .get_or_refresh(serial)
            .await
            .ok_or(ProtocolError::DeviceNotFound)?;
        Ok(ResolvedTarget {
            serial: serial.to_string(),
            handle,
        })
    }

    async fn enumerate(&self) -> Result<Vec<DeviceStatus>, ProtocolError> {
        Ok(self.cache.statuses().await)
    }
}
