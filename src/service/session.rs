//! Streaming session
//!
//! One [`ResponseLoggerService`] per monitoring session. Producers call
//! [`ResponseLoggerService::log`] from any thread; a single consuming loop
//! ([`ResponseLoggerService::run`]) drains the queue in FIFO order into the
//! session's [`EntryWriter`].
//!
//! ```text
//! Starting ──run──▶ Alive ──idle > max_idle──▶ IdleStopped
//!     │               ├──queue full on log──▶ OverflowStopped
//!     └──────stop─────┴──stop───────────────▶ ExplicitStopped
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::metrics::{MetricsSnapshot, SessionMetrics};
use crate::dispatcher::CorrelationId;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::preference::Preferences;
use crate::protocol::EntryWriter;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Identity and configuration
// =============================================================================

/// Process-unique session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Queue and timeout ceilings of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Queued entries at which the session is force-stopped
    pub max_queue_size: usize,
    /// Longest single wait of the consuming loop on an empty queue
    pub max_wait: Duration,
    /// Accumulated idle time after which the session stops
    pub max_idle: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 2000,
            max_wait: Duration::from_secs(30 * 60),
            max_idle: Duration::from_secs(30 * 60),
        }
    }
}

impl SessionConfig {
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    pub fn with_max_idle(mut self, idle: Duration) -> Self {
        self.max_idle = idle;
        self
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Starting,
    Alive,
    IdleStopped,
    OverflowStopped,
    ExplicitStopped,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::IdleStopped | SessionState::OverflowStopped | SessionState::ExplicitStopped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Starting => "Starting",
            SessionState::Alive => "Alive",
            SessionState::IdleStopped => "IdleStopped",
            SessionState::OverflowStopped => "OverflowStopped",
            SessionState::ExplicitStopped => "ExplicitStopped",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry paired with the correlation id it was dispatched under.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferEntryHolder {
    correlation: CorrelationId,
    entry: Entry,
}

impl TransferEntryHolder {
    pub fn new(correlation: CorrelationId, entry: Entry) -> Self {
        Self { correlation, entry }
    }

    pub fn correlation(&self) -> &CorrelationId {
        &self.correlation
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn into_parts(self) -> (CorrelationId, Entry) {
        (self.correlation, self.entry)
    }
}

/// What happened to an entry handed to [`ResponseLoggerService::log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    /// Queued for the consuming loop.
    Queued,
    /// The queue was full; the session is now `OverflowStopped`.
    Overflow,
    /// The session was already stopped.
    Dropped(SessionState),
}

/// Serializable view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub monitored_addr: CorrelationId,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub queue_len: usize,
    pub metrics: MetricsSnapshot,
}

// =============================================================================
// Session
// =============================================================================

struct Inner {
    queue: VecDeque<TransferEntryHolder>,
    idle: Duration,
    state: SessionState,
    loop_started: bool,
    loop_running: bool,
}

/// Bounded producer/consumer pipe from dispatchers to one output stream.
pub struct ResponseLoggerService {
    id: SessionId,
    monitored_addr: CorrelationId,
    preferences: Arc<Preferences>,
    config: SessionConfig,
    created_at: DateTime<Utc>,
    inner: Mutex<Inner>,
    signal: Condvar,
    writer: Mutex<Option<EntryWriter>>,
    metrics: SessionMetrics,
}

impl ResponseLoggerService {
    /// Create a session and bind its output stream.
    ///
    /// The start record is written immediately; the session stays `Starting`
    /// until its consuming loop runs.
    pub fn new(
        monitored_addr: CorrelationId,
        preferences: Arc<Preferences>,
        config: SessionConfig,
        sink: Box<dyn Write + Send>,
    ) -> Result<Arc<Self>> {
        if config.max_queue_size == 0 {
            return Err(Error::Config("max_queue_size must be at least 1".to_string()));
        }
        if config.max_wait.is_zero() {
            return Err(Error::Config("max_wait must be non-zero".to_string()));
        }

        let id = SessionId::next();
        let writer = EntryWriter::bind(sink, id.as_u64(), monitored_addr.as_str())?;

        debug!(session_id = %id, monitored_addr = %monitored_addr, "Session created");

        Ok(Arc::new(Self {
            id,
            monitored_addr,
            preferences,
            config,
            created_at: Utc::now(),
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                idle: Duration::ZERO,
                state: SessionState::Starting,
                loop_started: false,
                loop_running: false,
            }),
            signal: Condvar::new(),
            writer: Mutex::new(Some(writer)),
            metrics: SessionMetrics::new(),
        }))
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn monitored_addr(&self) -> &CorrelationId {
        &self.monitored_addr
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_alive(&self) -> bool {
        !self.state().is_terminal()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Idle time accumulated since the last logged entry.
    pub fn idle(&self) -> Duration {
        self.inner.lock().idle
    }

    pub fn info(&self) -> SessionInfo {
        let (state, queue_len) = {
            let inner = self.inner.lock();
            (inner.state, inner.queue.len())
        };
        SessionInfo {
            id: self.id,
            monitored_addr: self.monitored_addr.clone(),
            state,
            created_at: self.created_at,
            queue_len,
            metrics: self.metrics.snapshot(),
        }
    }

    /// Queue an entry for the consuming loop.
    ///
    /// A full queue force-stops the session and sheds the entry rather than
    /// blocking the producer.
    pub fn log(&self, correlation: &CorrelationId, entry: Entry) -> LogOutcome {
        let detached = {
            let mut inner = self.inner.lock();

            if inner.state.is_terminal() {
                self.metrics.record_dropped(1);
                return LogOutcome::Dropped(inner.state);
            }

            if inner.queue.len() < self.config.max_queue_size {
                inner.queue.push_back(TransferEntryHolder::new(correlation.clone(), entry));
                inner.idle = Duration::ZERO;
                self.metrics.record_queued();
                self.signal.notify_all();
                return LogOutcome::Queued;
            }

            warn!(
                session_id = %self.id,
                queue_size = inner.queue.len(),
                max_queue_size = self.config.max_queue_size,
                "Session queue overflow, stopping session"
            );
            self.metrics.record_dropped(1);
            self.enter_terminal(&mut inner, SessionState::OverflowStopped)
        };

        if detached {
            self.close_writer(SessionState::OverflowStopped);
        }
        LogOutcome::Overflow
    }

    /// Stop the session. Returns `false` if it had already stopped.
    pub fn stop(&self) -> bool {
        let detached = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return false;
            }
            self.enter_terminal(&mut inner, SessionState::ExplicitStopped)
        };

        info!(session_id = %self.id, "Session stopped");
        if detached {
            self.close_writer(SessionState::ExplicitStopped);
        }
        true
    }

    /// Stop the session and wait for the consuming loop to finish.
    ///
    /// On timeout the loop may still be writing; the state must be rechecked.
    pub fn stop_and_wait(&self, timeout: Duration) -> Result<SessionState> {
        self.stop();

        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.loop_running || !inner.state.is_terminal() {
            if self.signal.wait_until(&mut inner, deadline).timed_out()
                && (inner.loop_running || !inner.state.is_terminal())
            {
                return Err(Error::StopTimeout {
                    id: self.id.as_u64(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }
        Ok(inner.state)
    }

    /// Run the consuming loop on the current thread until the session stops.
    ///
    /// Only the first call (or [`spawn`](Self::spawn)) runs the loop; later
    /// calls return immediately.
    pub fn run(&self) {
        if !self.claim_loop() {
            warn!(session_id = %self.id, "Session loop already started");
            return;
        }
        self.consume();
    }

    /// Spawn the consuming loop on a dedicated thread.
    pub fn spawn(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        if !self.claim_loop() {
            return Err(Error::Internal(format!(
                "session {} loop already started",
                self.id
            )));
        }

        let session = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("ctxlog-session-{}", self.id))
            .spawn(move || session.consume());

        match spawned {
            Ok(handle) => Ok(handle),
            Err(e) => {
                let terminal = {
                    let mut inner = self.inner.lock();
                    inner.loop_started = false;
                    inner.loop_running = false;
                    self.signal.notify_all();
                    inner.state.is_terminal()
                };
                if terminal {
                    self.close_writer(self.state());
                }
                Err(e.into())
            }
        }
    }

    /// Mark the loop as owned by the caller. `false` if already claimed.
    fn claim_loop(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.loop_started {
            return false;
        }
        inner.loop_started = true;
        inner.loop_running = true;
        if inner.state == SessionState::Starting {
            inner.state = SessionState::Alive;
        }
        true
    }

    fn consume(&self) {
        info!(session_id = %self.id, monitored_addr = %self.monitored_addr, "Session loop started");

        while let Some(batch) = self.next_batch() {
            self.write_batch(batch);
        }

        let state = self.state();
        self.close_writer(state);

        let mut inner = self.inner.lock();
        inner.loop_running = false;
        self.signal.notify_all();
        drop(inner);

        info!(
            session_id = %self.id,
            state = %state,
            written = self.metrics.written(),
            dropped = self.metrics.dropped(),
            "Session loop finished"
        );
    }

    /// Block until the queue has entries or the session stops.
    ///
    /// Entries accepted before a stop are still handed out; `None` once the
    /// session is terminal and the queue is empty.
    fn next_batch(&self) -> Option<Vec<TransferEntryHolder>> {
        let mut inner = self.inner.lock();
        while inner.queue.is_empty() && !inner.state.is_terminal() {
            let timed_out = self
                .signal
                .wait_for(&mut inner, self.config.max_wait)
                .timed_out();

            if timed_out && inner.queue.is_empty() && !inner.state.is_terminal() {
                inner.idle += self.config.max_wait;
                if inner.idle > self.config.max_idle {
                    info!(
                        session_id = %self.id,
                        idle_ms = inner.idle.as_millis() as u64,
                        "Session idle timeout"
                    );
                    inner.state = SessionState::IdleStopped;
                }
            }
        }

        if inner.queue.is_empty() {
            return None;
        }
        Some(inner.queue.drain(..).collect())
    }

    fn write_batch(&self, batch: Vec<TransferEntryHolder>) {
        let mut slot = self.writer.lock();
        let Some(writer) = slot.as_mut() else {
            self.metrics.record_dropped(batch.len() as u64);
            return;
        };

        for holder in &batch {
            match writer.write_entry(holder) {
                Ok(_) => self.metrics.record_written(),
                Err(e) => {
                    self.metrics.record_write_failure();
                    warn!(
                        session_id = %self.id,
                        entry_type = holder.entry().type_name(),
                        error = %e,
                        "Failed to write entry"
                    );
                }
            }
        }

        if let Err(e) = writer.flush() {
            warn!(session_id = %self.id, error = %e, "Failed to flush session stream");
        }
    }

    /// Set a terminal state and wake all waiters. Returns whether no loop
    /// will ever close the writer.
    fn enter_terminal(&self, inner: &mut Inner, state: SessionState) -> bool {
        inner.state = state;
        self.signal.notify_all();
        !inner.loop_started
    }

    /// Close the output stream. Only the first caller closes it.
    fn close_writer(&self, state: SessionState) {
        let Some(writer) = self.writer.lock().take() else {
            return;
        };
        if let Err(e) = writer.close(state.as_str()) {
            warn!(session_id = %self.id, error = %e, "Failed to close session stream");
        }
    }
}

impl fmt::Debug for ResponseLoggerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseLoggerService")
            .field("id", &self.id)
            .field("monitored_addr", &self.monitored_addr)
            .field("state", &self.state())
            .finish()
    }
}
