//! # Peer guard
//!
//! Blacklist, whitelist, version compatibility and temporary suspensions.
//!
//! Policy (fixed cooldown window):
//! - critical offences suspend immediately for `ban_duration_secs`;
//! - other offences count towards `max_failures` within
//!   `failure_window_secs`; reaching it suspends for `ban_duration_secs`;
//! - a successful exchange clears the counter;
//! - whitelisted peers are never suspended, blacklisted peers always refused.
//!
//! Suspensions are bounded. A full table first drops lapsed entries, then
//! the one closest to lapsing; a fresh suspension always goes in.

use parking_lot::Mutex;
use semver::{Version, VersionReq};
use serde::Serialize;
use shared_types::BoundedFifoMap;
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

use super::config::P2pConfig;
use super::errors::ConfigError;

/// Misbehaviour a peer can be charged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Offence {
    Timeout,
    Refused,
    Malformed,
    InvalidNetwork,
    InvalidVersion,
    NoCommonBlocks,
    InvalidBlock,
    TooManyRequests,
    Blacklisted,
}

impl Offence {
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            Offence::Malformed | Offence::InvalidNetwork | Offence::InvalidBlock | Offence::Blacklisted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Offence::Timeout => "timeout",
            Offence::Refused => "refused",
            Offence::Malformed => "malformed",
            Offence::InvalidNetwork => "invalid-network",
            Offence::InvalidVersion => "invalid-version",
            Offence::NoCommonBlocks => "no-common-blocks",
            Offence::InvalidBlock => "invalid-block",
            Offence::TooManyRequests => "too-many-requests",
            Offence::Blacklisted => "blacklisted",
        }
    }
}

impl fmt::Display for Offence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Suspension {
    pub offence: Offence,
    pub since: u64,
    pub until: u64,
}

/// Result of charging a peer with an offence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Counted { failures: u32 },
    Suspended { until: u64 },
    Whitelisted,
}

#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    count: u32,
    window_start: u64,
}

struct GuardState {
    failures: BoundedFifoMap<IpAddr, FailureRecord>,
    suspensions: BoundedFifoMap<IpAddr, Suspension>,
}

pub struct PeerGuard {
    max_failures: u32,
    failure_window_secs: u64,
    ban_duration_secs: u64,
    whitelist: HashSet<IpAddr>,
    blacklist: HashSet<IpAddr>,
    accepted_versions: Vec<VersionReq>,
    state: Mutex<GuardState>,
}

impl fmt::Debug for PeerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerGuard")
            .field("max_failures", &self.max_failures)
            .field("ban_duration_secs", &self.ban_duration_secs)
            .field("whitelist", &self.whitelist.len())
            .field("blacklist", &self.blacklist.len())
            .finish()
    }
}

impl PeerGuard {
    pub fn new(config: &P2pConfig) -> Result<Self, ConfigError> {
        let accepted_versions = config
            .minimum_versions
            .iter()
            .map(|requirement| {
                VersionReq::parse(requirement).map_err(|e| ConfigError::InvalidVersionRequirement {
                    requirement: requirement.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Track a few times more addresses than we keep peers.
        let tracked = config.peer_capacity.saturating_mul(4).max(64);

        Ok(Self {
            max_failures: config.max_failures.max(1),
            failure_window_secs: config.failure_window_secs,
            ban_duration_secs: config.ban_duration_secs,
            whitelist: config.whitelist.iter().copied().collect(),
            blacklist: config.blacklist.iter().copied().collect(),
            accepted_versions,
            state: Mutex::new(GuardState {
                failures: BoundedFifoMap::new(tracked),
                suspensions: BoundedFifoMap::new(tracked),
            }),
        })
    }

    pub fn is_blacklisted(&self, ip: &IpAddr) -> bool {
        self.blacklist.contains(ip)
    }

    pub fn is_whitelisted(&self, ip: &IpAddr) -> bool {
        self.whitelist.contains(ip)
    }

    /// The version must parse as semver and satisfy one accepted range.
    pub fn is_valid_version(&self, version: &str) -> bool {
        let Ok(version) = Version::parse(version.trim_start_matches('v')) else {
            return false;
        };
        self.accepted_versions.is_empty()
            || self.accepted_versions.iter().any(|req| req.matches(&version))
    }

    /// Active suspension, if any. Lapsed suspensions are dropped here.
    pub fn suspension(&self, ip: &IpAddr, now: u64) -> Option<Suspension> {
        if self.is_blacklisted(ip) {
            return Some(Suspension {
                offence: Offence::Blacklisted,
                since: 0,
                until: u64::MAX,
            });
        }

        let mut state = self.state.lock();
        match state.suspensions.get(ip).copied() {
            Some(suspension) if suspension.until > now => Some(suspension),
            Some(_) => {
                state.suspensions.remove(ip);
                None
            }
            None => None,
        }
    }

    pub fn is_suspended(&self, ip: &IpAddr, now: u64) -> bool {
        self.suspension(ip, now).is_some()
    }

    pub fn record_failure(&self, ip: IpAddr, offence: Offence, now: u64) -> FailureOutcome {
        if self.is_whitelisted(&ip) {
            return FailureOutcome::Whitelisted;
        }
        if offence.is_critical() {
            return FailureOutcome::Suspended {
                until: self.suspend(ip, offence, now).until,
            };
        }

        let count = {
            let mut state = self.state.lock();
            let fresh = FailureRecord {
                count: 0,
                window_start: now,
            };
            let mut record = state.failures.get(&ip).copied().unwrap_or(fresh);
            if now.saturating_sub(record.window_start) >= self.failure_window_secs {
                record = fresh;
            }
            record.count += 1;
            state.failures.insert(ip, record);
            record.count
        };

        if count >= self.max_failures {
            FailureOutcome::Suspended {
                until: self.suspend(ip, offence, now).until,
            }
        } else {
            FailureOutcome::Counted { failures: count }
        }
    }

    /// Suspend for the fixed ban window and reset the failure counter.
    pub fn suspend(&self, ip: IpAddr, offence: Offence, now: u64) -> Suspension {
        let suspension = Suspension {
            offence,
            since: now,
            until: now.saturating_add(self.ban_duration_secs),
        };
        let mut state = self.state.lock();
        state.failures.remove(&ip);
        // Re-queue so a renewed ban is not the first to go.
        state.suspensions.remove(&ip);
        if state.suspensions.len() >= state.suspensions.capacity() {
            state.suspensions.retain(|_, active| active.until > now);
        }
        if state.suspensions.len() >= state.suspensions.capacity() {
            let soonest = state
                .suspensions
                .iter()
                .min_by_key(|(_, active)| active.until)
                .map(|(ip, _)| *ip);
            if let Some(soonest) = soonest {
                state.suspensions.remove(&soonest);
            }
        }
        state.suspensions.insert(ip, suspension);
        suspension
    }

    pub fn clear_failures(&self, ip: &IpAddr) {
        self.state.lock().failures.remove(ip);
    }

    pub fn failures(&self, ip: &IpAddr) -> u32 {
        self.state
            .lock()
            .failures
            .get(ip)
            .map_or(0, |record| record.count)
    }

    /// Drop lapsed suspensions and stale counters. Returns how many
    /// suspensions were lifted.
    pub fn gc_expired(&self, now: u64) -> usize {
        let window = self.failure_window_secs;
        let mut state = self.state.lock();
        let before = state.suspensions.len();
        state.suspensions.retain(|_, suspension| suspension.until > now);
        state
            .failures
            .retain(|_, record| now.saturating_sub(record.window_start) < window);
        before - state.suspensions.len()
    }

    pub fn suspended_count(&self) -> usize {
        self.state.lock().suspensions.len()
    }
}
