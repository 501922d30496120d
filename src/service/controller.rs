//! Session control operations
//!
//! The transport layer maps a request onto these calls and reports the
//! returned [`ControlStatus`] with its status code.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::registry::SessionRegistry;
use super::session::{ResponseLoggerService, SessionConfig, SessionId, SessionInfo, SessionState};
use crate::dispatcher::CorrelationId;
use crate::error::{Error, Result};
use crate::preference::Preferences;

/// Parameters of a session start request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    /// Address of the client whose activity is monitored
    pub monitored_addr: Option<String>,
    /// Preferences blob
    pub preferences: Option<String>,
}

impl StartRequest {
    pub fn new(monitored_addr: impl Into<String>, preferences: impl Into<String>) -> Self {
        Self {
            monitored_addr: Some(monitored_addr.into()),
            preferences: Some(preferences.into()),
        }
    }
}

/// Outcome of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlStatus {
    Stopped,
    NotFound,
    /// The session had already stopped.
    Conflict,
    /// The consuming loop did not finish in time; state must be rechecked.
    Timeout,
    /// Any other failure while stopping.
    Failed,
}

impl ControlStatus {
    /// Status reported for the outcome of a stop operation.
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => ControlStatus::Stopped,
            Err(Error::SessionNotFound(_)) => ControlStatus::NotFound,
            Err(Error::SessionAlreadyStopped { .. }) => ControlStatus::Conflict,
            Err(Error::StopTimeout { .. }) => ControlStatus::Timeout,
            Err(_) => ControlStatus::Failed,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ControlStatus::Stopped => 200,
            ControlStatus::NotFound => 404,
            ControlStatus::Conflict => 409,
            ControlStatus::Timeout => 408,
            ControlStatus::Failed => 500,
        }
    }
}

fn already_stopped(session: &ResponseLoggerService) -> Error {
    Error::SessionAlreadyStopped {
        id: session.id().as_u64(),
        state: session.state().to_string(),
    }
}

/// Starts and stops sessions on behalf of remote observers.
#[derive(Debug, Clone)]
pub struct SessionController {
    registry: Arc<SessionRegistry>,
    config: SessionConfig,
}

impl SessionController {
    pub fn new(registry: Arc<SessionRegistry>, config: SessionConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Validate the request, create a session bound to `sink`, register it
    /// and start its consuming loop.
    pub fn start(
        &self,
        request: StartRequest,
        sink: Box<dyn Write + Send>,
    ) -> Result<Arc<ResponseLoggerService>> {
        let monitored_addr = request
            .monitored_addr
            .filter(|a| !a.trim().is_empty())
            .ok_or(Error::MissingParameter("monitoredAddr"))?;
        let blob = request
            .preferences
            .filter(|p| !p.trim().is_empty())
            .ok_or(Error::MissingParameter("preferences"))?;
        let preferences = Preferences::from_json(&blob)?;

        let pruned = self.registry.prune();
        let session = ResponseLoggerService::new(
            CorrelationId::new(monitored_addr),
            Arc::new(preferences),
            self.config.clone(),
            sink,
        )?;
        self.registry.register(Arc::clone(&session));

        if let Err(e) = session.spawn() {
            self.registry.remove(session.id());
            session.stop();
            return Err(e);
        }

        info!(
            session_id = %session.id(),
            monitored_addr = %session.monitored_addr(),
            preferences = session.preferences().len(),
            pruned,
            "Monitoring session started"
        );
        Ok(session)
    }

    /// Stop a session without waiting for its loop.
    pub fn try_stop(&self, id: SessionId) -> Result<()> {
        let session = self.live_session(id)?;
        if !session.stop() {
            return Err(already_stopped(&session));
        }
        Ok(())
    }

    /// Stop a session and wait up to `timeout` for its loop to finish.
    pub fn try_stop_and_wait(&self, id: SessionId, timeout: Duration) -> Result<SessionState> {
        let session = self.live_session(id)?;
        session.stop_and_wait(timeout)
    }

    pub fn stop(&self, id: SessionId) -> ControlStatus {
        ControlStatus::from_result(&self.try_stop(id))
    }

    pub fn stop_and_wait(&self, id: SessionId, timeout: Duration) -> ControlStatus {
        let result = self.try_stop_and_wait(id, timeout);
        let status = ControlStatus::from_result(&result);
        if let (Err(e), ControlStatus::Timeout | ControlStatus::Failed) = (&result, status) {
            warn!(session_id = %id, error = %e, "Stop did not complete");
        }
        status
    }

    fn live_session(&self, id: SessionId) -> Result<Arc<ResponseLoggerService>> {
        let session = self
            .registry
            .get(id)
            .ok_or(Error::SessionNotFound(id.as_u64()))?;
        if !session.is_alive() {
            return Err(already_stopped(&session));
        }
        Ok(session)
    }

    pub fn status(&self, id: SessionId) -> Option<SessionInfo> {
        self.registry.get(id).map(|s| s.info())
    }

    /// Stop every live session, waiting up to `timeout` for each.
    pub fn shutdown(&self, timeout: Duration) -> usize {
        self.registry
            .sessions()
            .into_iter()
            .filter(|s| s.is_alive())
            .filter(|s| self.stop_and_wait(s.id(), timeout) == ControlStatus::Stopped)
            .count()
    }
}
