//! Typed events emitted by the build engine: log lines, progress updates,
//! and step timers.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Severity of a [`OciEvent::Log`] event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Fine-grained diagnostic detail.
    Trace,
    /// Diagnostic detail useful when investigating a failure.
    Debug,
    /// Normal operational messages.
    Info,
    /// A recoverable problem, such as a transport downgrade or lock
    /// contention.
    Warn,
    /// An unrecoverable problem for the emitting step.
    Error,
}

/// Lifecycle state carried by a [`OciEvent::Timer`] event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    /// The timed scope has started.
    Started,
    /// The timed scope has finished; `duration` on the event is populated.
    Stopped,
}

/// One of the three event kinds a build can emit, per the event bus design.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OciEvent {
    /// A log line at a given severity.
    Log {
        /// Severity of the message.
        level: LogLevel,
        /// Human-readable message text.
        message: String,
    },
    /// Bytes transferred against a named allocation (see
    /// [`crate::Allocation`]).
    Progress {
        /// Name of the allocation this progress applies to, e.g. a blob
        /// digest or "manifest".
        allocation: String,
        /// Bytes transferred since the last progress event for this
        /// allocation.
        units: u64,
    },
    /// Start/stop marker for a named, possibly nested, timed scope (e.g. a
    /// step graph node's execution).
    Timer {
        /// Name of the timed scope.
        scope: String,
        /// Whether this marks the start or the end of the scope.
        state: TimerState,
        /// Elapsed time in milliseconds; populated only when `state` is
        /// [`TimerState::Stopped`].
        duration_ms: Option<u64>,
    },
}

/// An [`OciEvent`] with dispatch metadata: a unique id and the time it was
/// constructed.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Event {
    /// Unique id for this event instance.
    pub id: Uuid,
    /// Wall-clock time the event was constructed.
    pub timestamp: DateTime<Utc>,
    /// The event payload.
    pub event: OciEvent,
}

impl Event {
    /// Wrap an [`OciEvent`] with a fresh id and the current time.
    #[must_use]
    pub fn new(event: OciEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }

    /// Build a log event.
    #[must_use]
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::new(OciEvent::Log {
            level,
            message: message.into(),
        })
    }

    /// Build a progress event.
    #[must_use]
    pub fn progress(allocation: impl Into<String>, units: u64) -> Self {
        Self::new(OciEvent::Progress {
            allocation: allocation.into(),
            units,
        })
    }

    /// Build a timer-started event.
    #[must_use]
    pub fn timer_started(scope: impl Into<String>) -> Self {
        Self::new(OciEvent::Timer {
            scope: scope.into(),
            state: TimerState::Started,
            duration_ms: None,
        })
    }

    /// Build a timer-stopped event.
    #[must_use]
    pub fn timer_stopped(scope: impl Into<String>, duration_ms: u64) -> Self {
        Self::new(OciEvent::Timer {
            scope: scope.into(),
            state: TimerState::Stopped,
            duration_ms: Some(duration_ms),
        })
    }
}
