//! # Event Routing
//!
//! Subscribes to the subsystems' event channels and turns what they
//! publish into metrics and structured logs.
//!
//! ```text
//! dc-01 PeerEvent  (broadcast) ──┐
//! dc-02 BlockEvent (broadcast) ──┼──► EventRouter ──► prometheus + tracing
//! dc-02 SyncStatus (watch)     ──┘
//! ```
//!
//! A lagging receiver skips what it missed; the gauges are overwritten by
//! the next event anyway.

use std::sync::Arc;

use dc_01_peer_network::{PeerEvent, PeerNetworkContext};
use dc_02_block_sync::{BlockEvent, SyncState, SyncStatus};
use node_telemetry::metrics::{
    BLOCKS_ACCEPTED, BLOCKS_REJECTED, BLOCKS_REVERTED, CHAIN_HEIGHT, FORKS_DETECTED,
    NETWORK_HEIGHT, NETWORK_QUORUM, PEERS_ACCEPTED, PEERS_KNOWN, PEER_REJECTIONS,
    PEER_SUSPENSIONS, SYNC_TRANSITIONS,
};
use node_telemetry::{log_block_event, log_event, log_peer_event};
use tokio::sync::{broadcast, watch};
use tracing::warn;

use crate::container::SubsystemContainer;

const SUBSYSTEM: &str = "node";

pub struct EventRouter {
    network: Arc<PeerNetworkContext>,
    peers: broadcast::Receiver<PeerEvent>,
    blocks: broadcast::Receiver<BlockEvent>,
    status: watch::Receiver<SyncStatus>,
    last_state: Option<SyncState>,
}

impl EventRouter {
    /// Subscribe now so nothing published after construction is missed.
    pub fn new(container: &SubsystemContainer) -> Self {
        Self {
            network: container.network.clone(),
            peers: container.monitor.subscribe(),
            blocks: container.processor.subscribe(),
            status: container.sync.subscribe_status(),
            last_state: None,
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut peers_open = true;
        let mut blocks_open = true;
        let mut status_open = true;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                event = self.peers.recv(), if peers_open => match event {
                    Ok(event) => {
                        record_peer_event(&event);
                        PEERS_KNOWN.set(self.network.repository.count() as f64);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "[node] peer event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => peers_open = false,
                },
                event = self.blocks.recv(), if blocks_open => match event {
                    Ok(event) => record_block_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "[node] block event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => blocks_open = false,
                },
                changed = self.status.changed(), if status_open => match changed {
                    Ok(()) => {
                        let status = self.status.borrow_and_update().clone();
                        record_status(&status, self.last_state);
                        self.last_state = Some(status.state);
                    }
                    Err(_) => status_open = false,
                },
            }

            if *shutdown.borrow() || !(peers_open || blocks_open || status_open) {
                break;
            }
        }
        log_event!(debug, SUBSYSTEM, "[node] event routing stopped");
    }
}

pub fn record_peer_event(event: &PeerEvent) {
    match event {
        PeerEvent::Accepted { ip, height, forked } => {
            PEERS_ACCEPTED.inc();
            log_peer_event!(debug, "dc-01", "[dc-01] peer accepted", ip, height = *height, forked = *forked);
        }
        PeerEvent::Rejected { ip, reason } => {
            PEER_REJECTIONS.with_label_values(&[*reason]).inc();
            log_peer_event!(debug, "dc-01", "[dc-01] peer rejected", ip, reason = *reason);
        }
        PeerEvent::Suspended { ip, offence, until } => {
            PEER_SUSPENSIONS.with_label_values(&[offence.as_str()]).inc();
            log_peer_event!(info, "dc-01", "[dc-01] peer suspended", ip, offence = offence.as_str(), until = *until);
        }
        PeerEvent::Demoted { ip } => {
            log_peer_event!(debug, "dc-01", "[dc-01] peer demoted", ip);
        }
        PeerEvent::Removed { ip } => {
            log_peer_event!(debug, "dc-01", "[dc-01] peer removed", ip);
        }
    }
}

pub fn record_block_event(event: &BlockEvent) {
    match event {
        BlockEvent::Accepted { id, height } => {
            BLOCKS_ACCEPTED.inc();
            CHAIN_HEIGHT.set(*height as f64);
            log_block_event!(debug, "dc-02", "[dc-02] block accepted", *height, id);
        }
        BlockEvent::Rejected { id, height, reason } => {
            BLOCKS_REJECTED.with_label_values(&[reason.as_str()]).inc();
            log_block_event!(debug, "dc-02", "[dc-02] block rejected", *height, id, reason = reason.as_str());
        }
        BlockEvent::ForkDetected { id, height, reason } => {
            FORKS_DETECTED.with_label_values(&[reason.as_str()]).inc();
            log_block_event!(info, "dc-02", "[dc-02] fork detected", *height, id, reason = reason.as_str());
        }
        BlockEvent::FutureBlock { from, to } => {
            log_event!(debug, "dc-02", "[dc-02] blocks missing below a future block", from = *from, to = *to);
        }
        BlockEvent::Reverted { id, height } => {
            BLOCKS_REVERTED.inc();
            CHAIN_HEIGHT.set(height.saturating_sub(1) as f64);
            log_block_event!(info, "dc-02", "[dc-02] block reverted", *height, id);
        }
    }
}

pub fn record_status(status: &SyncStatus, previous: Option<SyncState>) {
    if is_transition(previous, status.state) {
        SYNC_TRANSITIONS.with_label_values(&[status.state.as_str()]).inc();
    }
    NETWORK_HEIGHT.set(status.network_height as f64);
    if let Some(quorum) = status.quorum {
        NETWORK_QUORUM.set(quorum);
    }
}

/// Status updates also fire for height and quorum changes.
fn is_transition(previous: Option<SyncState>, state: SyncState) -> bool {
    previous != Some(state)
}
