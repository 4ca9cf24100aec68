//! Discovery and connection session state machines.
//!
//! # Discovery session lifecycle
//!
//! ```text
//!             ┌──► Finished   (provider reported completion)
//! Running ────┼──► TimedOut   (deadline elapsed; partial results kept)
//!             └──► Errored    (provider reported a failure)
//! ```
//!
//! Terminal states are final: once a session leaves `Running`, later
//! transitions are refused.  This mirrors the accumulator's seal and is what
//! lets the coordinator ignore a provider's late `Finished` after a timeout.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::device::Transport;
use crate::domain::scan::ScanKind;

/// Lifecycle of one discovery invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscoveryState {
    Running,
    Finished,
    TimedOut,
    Errored(String),
}

impl DiscoveryState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DiscoveryState::Running)
    }
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryState::Running => f.write_str("running"),
            DiscoveryState::Finished => f.write_str("finished"),
            DiscoveryState::TimedOut => f.write_str("timedOut"),
            DiscoveryState::Errored(reason) => write!(f, "errored({reason})"),
        }
    }
}

/// One discovery invocation, from start until its result is delivered.
#[derive(Debug, Clone)]
pub struct DiscoverySession {
    pub id: Uuid,
    pub transport: Transport,
    pub kind: ScanKind,
    pub started_at: Instant,
    pub deadline: Instant,
    state: DiscoveryState,
}

impl DiscoverySession {
    /// Starts a session now with the given timeout.
    pub fn start(kind: ScanKind, timeout: Duration) -> Self {
        Self::start_at(kind, Instant::now(), timeout)
    }

    pub fn start_at(kind: ScanKind, started_at: Instant, timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            transport: kind.transport(),
            kind,
            started_at,
            deadline: started_at + timeout,
            state: DiscoveryState::Running,
        }
    }

    pub fn state(&self) -> &DiscoveryState {
        &self.state
    }

    pub fn timeout(&self) -> Duration {
        self.deadline.saturating_duration_since(self.started_at)
    }

    /// Returns `false` (and changes nothing) if the session already ended.
    pub fn finish(&mut self) -> bool {
        self.transition(DiscoveryState::Finished)
    }

    pub fn time_out(&mut self) -> bool {
        self.transition(DiscoveryState::TimedOut)
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        self.transition(DiscoveryState::Errored(reason.into()))
    }

    fn transition(&mut self, next: DiscoveryState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = next;
        true
    }
}

/// State of the process-wide connection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}
