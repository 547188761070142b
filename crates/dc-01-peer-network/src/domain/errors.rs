//! # Peer network errors
//!
//! Expected conditions (timeouts, rejections, failed verification) are typed
//! values returned to the caller, never panics.

use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

use super::guard::Offence;
use crate::ports::ChainReadError;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid version requirement {requirement:?}: {reason}")]
    InvalidVersionRequirement { requirement: String, reason: String },
}

/// Coarse classification of a failed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    Refused,
    Malformed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Refused => "refused",
            ErrorKind::Malformed => "malformed",
        })
    }
}

/// A failed request/response exchange with a peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommunicationError {
    #[error("request to {peer} timed out")]
    Timeout { peer: IpAddr },

    #[error("peer {peer} refused the request: {reason}")]
    Refused { peer: IpAddr, reason: String },

    #[error("malformed reply from {peer}: {reason}")]
    Malformed { peer: IpAddr, reason: String },

    #[error("peer {peer} is on network {theirs:?}")]
    WrongNetwork { peer: IpAddr, theirs: String },

    #[error("peer {peer} runs incompatible version {version:?}")]
    IncompatibleVersion { peer: IpAddr, version: String },
}

impl CommunicationError {
    pub fn peer(&self) -> IpAddr {
        match self {
            CommunicationError::Timeout { peer }
            | CommunicationError::Refused { peer, .. }
            | CommunicationError::Malformed { peer, .. }
            | CommunicationError::WrongNetwork { peer, .. }
            | CommunicationError::IncompatibleVersion { peer, .. } => *peer,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CommunicationError::Timeout { .. } => ErrorKind::Timeout,
            CommunicationError::Refused { .. } => ErrorKind::Refused,
            CommunicationError::Malformed { .. }
            | CommunicationError::WrongNetwork { .. }
            | CommunicationError::IncompatibleVersion { .. } => ErrorKind::Malformed,
        }
    }

    /// Transport failures are retried once; protocol failures never are.
    pub fn is_transport(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::Refused)
    }

    pub fn offence(&self) -> Offence {
        match self {
            CommunicationError::Timeout { .. } => Offence::Timeout,
            CommunicationError::Refused { .. } => Offence::Refused,
            CommunicationError::Malformed { .. } => Offence::Malformed,
            CommunicationError::WrongNetwork { .. } => Offence::InvalidNetwork,
            CommunicationError::IncompatibleVersion { .. } => Offence::InvalidVersion,
        }
    }
}

/// Why a peer failed verification.
#[derive(Debug, Clone, Error)]
pub enum VerificationFailure {
    #[error(transparent)]
    Communication(#[from] CommunicationError),

    #[error("verification deadline exceeded")]
    DeadlineExceeded,

    #[error("no common block with the local chain")]
    NoCommonBlock,

    #[error("bogus common block reply: {0}")]
    BogusCommonBlock(String),

    #[error("peer block at height {height} is invalid: {reason}")]
    InvalidPeerBlock { height: u64, reason: String },

    #[error("peer returned no block at height {0}")]
    MissingPeerBlock(u64),

    #[error("local chain unavailable: {0}")]
    LocalChain(#[from] ChainReadError),
}

impl VerificationFailure {
    /// Offence to charge the peer with. Communication errors were already
    /// charged by the communicator and local chain errors are our own.
    pub fn offence(&self) -> Option<Offence> {
        match self {
            VerificationFailure::Communication(_) | VerificationFailure::LocalChain(_) => None,
            VerificationFailure::DeadlineExceeded => Some(Offence::Timeout),
            VerificationFailure::BogusCommonBlock(_) => Some(Offence::Malformed),
            VerificationFailure::NoCommonBlock => Some(Offence::NoCommonBlocks),
            VerificationFailure::InvalidPeerBlock { .. }
            | VerificationFailure::MissingPeerBlock(_) => Some(Offence::InvalidBlock),
        }
    }
}

/// Why a peer was not admitted.
#[derive(Debug, Clone, Error)]
pub enum PeerRejection {
    #[error("advertisements from {source_ip} exceed the rate limit")]
    RateLimited { source_ip: IpAddr },

    #[error("peer is this node")]
    SelfPeer,

    #[error("peer is blacklisted")]
    Blacklisted,

    #[error("peer is suspended until {until} ({offence})")]
    Suspended { offence: Offence, until: u64 },

    #[error("peer version {0:?} is not accepted")]
    InvalidVersion(String),

    #[error("peer failed verification recently; retry after {retry_at}")]
    CoolingDown { retry_at: u64 },

    #[error("verification failed: {0}")]
    VerificationFailed(#[from] VerificationFailure),
}

impl PeerRejection {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerRejection::RateLimited { .. } => "rate-limited",
            PeerRejection::SelfPeer => "self",
            PeerRejection::Blacklisted => "blacklisted",
            PeerRejection::Suspended { .. } => "suspended",
            PeerRejection::InvalidVersion(_) => "invalid-version",
            PeerRejection::CoolingDown { .. } => "cooling-down",
            PeerRejection::VerificationFailed(_) => "verification-failed",
        }
    }
}

/// Block download could not start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("no verified, non-forked peers to download from ({known} known)")]
    NoEligiblePeers { known: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const PEER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9));

    #[test]
    fn test_classification() {
        let timeout = CommunicationError::Timeout { peer: PEER };
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert!(timeout.is_transport());

        let wrong = CommunicationError::WrongNetwork {
            peer: PEER,
            theirs: "other".into(),
        };
        assert_eq!(wrong.kind(), ErrorKind::Malformed);
        assert!(!wrong.is_transport());
        assert_eq!(wrong.offence(), Offence::InvalidNetwork);
        assert_eq!(wrong.peer(), PEER);
    }

    #[test]
    fn test_verification_offences() {
        assert_eq!(
            VerificationFailure::NoCommonBlock.offence(),
            Some(Offence::NoCommonBlocks)
        );
        assert_eq!(
            VerificationFailure::Communication(CommunicationError::Timeout { peer: PEER })
                .offence(),
            None
        );
    }
}
