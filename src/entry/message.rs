//! Message and elapse time entries

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Start/stop timestamps of one logical call.
///
/// Single use: `start()` then `stop()`. The duration is always derived from
/// the two timestamps and clamps to zero if the wall clock stepped backwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElapseTimeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_time: Option<DateTime<Utc>>,
}

impl ElapseTimeEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an already started entry.
    pub fn started() -> Self {
        Self {
            start_time: Some(Utc::now()),
            end_time: None,
        }
    }

    /// Record the start time.
    pub fn start(&mut self) -> Result<()> {
        if self.end_time.is_some() {
            return Err(Error::ElapseTimeAlreadyStopped);
        }
        self.start_time = Some(Utc::now());
        Ok(())
    }

    /// Record the stop time. Fails if never started or already stopped.
    pub fn stop(&mut self) -> Result<()> {
        if self.start_time.is_none() {
            return Err(Error::ElapseTimeNotStarted);
        }
        if self.end_time.is_some() {
            return Err(Error::ElapseTimeAlreadyStopped);
        }
        self.end_time = Some(Utc::now());
        Ok(())
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn is_running(&self) -> bool {
        self.start_time.is_some() && self.end_time.is_none()
    }

    /// Duration between start and stop, if both were recorded.
    pub fn elapsed(&self) -> Option<Duration> {
        let (start, end) = (self.start_time?, self.end_time?);
        Some((end - start).to_std().unwrap_or(Duration::ZERO))
    }

    /// Elapsed time in milliseconds, zero while incomplete.
    pub fn elapsed_millis(&self) -> u64 {
        self.elapsed().map(|d| d.as_millis() as u64).unwrap_or(0)
    }

    /// Pretty rendering of the elapsed time, e.g. `12ms` or `1.250s`.
    pub fn pretty_elapsed(&self) -> String {
        match self.elapsed() {
            Some(d) if d.as_secs() > 0 => format!("{:.3}s", d.as_secs_f64()),
            Some(d) => format!("{}ms", d.as_millis()),
            None => "n/a".to_string(),
        }
    }
}

/// Free-text message with optional elapsed time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntry {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapse_time: Option<ElapseTimeEntry>,
}

impl MessageEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapse_time: None,
        }
    }

    pub fn with_elapse_time(message: impl Into<String>, elapse_time: ElapseTimeEntry) -> Self {
        Self {
            message: message.into(),
            elapse_time: Some(elapse_time),
        }
    }
}
