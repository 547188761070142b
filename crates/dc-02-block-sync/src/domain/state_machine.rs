//! # Sync State Machine
//!
//! Explicit transition table: `(state, event) -> state`. Pairs not in the
//! table leave the machine where it is.
//!
//! ```text
//!  start ──REQUEST──► init ──SUCCESS──► checkNetwork ──SUCCESS──► checkSync ◄──────────┐
//!                      │                  ▲      │                 │     │             │
//!                   FAILURE               └FAILURE┘            SYNCED  UNSYNCED         │
//!                      ▼                                           ▼     ▼             │
//!  clean ◄─REQUEST─ exit ◄──FAILURE── process ◄─NEWBLOCK─ idle   download ─DOWNLOADED─┤
//!    │                                   │ PROCESSED ──────►│     │  │  NOBLOCK ───────┤
//!    └─REQUEST─► start                   └─UNSYNCED──► download   │  FAILURE           │
//!                                                                 ▼                    │
//!                                             networkMissingBlock ──START──────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncState {
    Start,
    Init,
    CheckNetwork,
    CheckSync,
    Download,
    Idle,
    Process,
    NetworkMissingBlock,
    Exit,
    Clean,
}

impl SyncState {
    pub const ALL: [SyncState; 10] = [
        SyncState::Start,
        SyncState::Init,
        SyncState::CheckNetwork,
        SyncState::CheckSync,
        SyncState::Download,
        SyncState::Idle,
        SyncState::Process,
        SyncState::NetworkMissingBlock,
        SyncState::Exit,
        SyncState::Clean,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Start => "start",
            SyncState::Init => "init",
            SyncState::CheckNetwork => "checkNetwork",
            SyncState::CheckSync => "checkSync",
            SyncState::Download => "download",
            SyncState::Idle => "idle",
            SyncState::Process => "process",
            SyncState::NetworkMissingBlock => "networkMissingBlock",
            SyncState::Exit => "exit",
            SyncState::Clean => "clean",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncEvent {
    Request,
    Success,
    Failure,
    Synced,
    Unsynced,
    Downloaded,
    NoBlock,
    Start,
    NewBlock,
    Processed,
}

impl SyncEvent {
    pub const ALL: [SyncEvent; 10] = [
        SyncEvent::Request,
        SyncEvent::Success,
        SyncEvent::Failure,
        SyncEvent::Synced,
        SyncEvent::Unsynced,
        SyncEvent::Downloaded,
        SyncEvent::NoBlock,
        SyncEvent::Start,
        SyncEvent::NewBlock,
        SyncEvent::Processed,
    ];
}

/// The transition table. `None` for pairs it does not list.
pub const fn transition(state: SyncState, event: SyncEvent) -> Option<SyncState> {
    use SyncEvent as E;
    use SyncState as S;

    let next = match (state, event) {
        (S::Start, E::Request) => S::Init,

        (S::Init, E::Success) => S::CheckNetwork,
        (S::Init, E::Failure) => S::Exit,

        (S::CheckNetwork, E::Success) => S::CheckSync,
        (S::CheckNetwork, E::Failure) => S::CheckNetwork,

        (S::CheckSync, E::Synced) => S::Idle,
        (S::CheckSync, E::Unsynced) => S::Download,

        (S::Download, E::Downloaded) => S::CheckSync,
        (S::Download, E::NoBlock) => S::CheckSync,
        (S::Download, E::Failure) => S::NetworkMissingBlock,

        (S::Idle, E::Start) => S::CheckSync,
        (S::Idle, E::NewBlock) => S::Process,

        (S::Process, E::Processed) => S::Idle,
        (S::Process, E::Unsynced) => S::Download,
        (S::Process, E::Failure) => S::Exit,

        (S::NetworkMissingBlock, E::Start) => S::CheckSync,
        (S::NetworkMissingBlock, E::Failure) => S::Exit,

        (S::Exit, E::Request) => S::Clean,
        (S::Clean, E::Request) => S::Start,

        _ => return None,
    };
    Some(next)
}

/// Outcome of one [`SyncStateMachine::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SyncState,
    pub event: SyncEvent,
    pub to: SyncState,
    /// `false` when the pair was not in the table.
    pub defined: bool,
}

#[derive(Debug, Clone)]
pub struct SyncStateMachine {
    state: SyncState,
    transitions: u64,
}

impl Default for SyncStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncStateMachine {
    pub fn new() -> Self {
        Self {
            state: SyncState::Start,
            transitions: 0,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Defined transitions taken so far, self-loops included.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn dispatch(&mut self, event: SyncEvent) -> Transition {
        let from = self.state;
        match transition(from, event) {
            Some(to) => {
                self.state = to;
                self.transitions += 1;
                Transition {
                    from,
                    event,
                    to,
                    defined: true,
                }
            }
            None => Transition {
                from,
                event,
                to: from,
                defined: false,
            },
        }
    }
}
