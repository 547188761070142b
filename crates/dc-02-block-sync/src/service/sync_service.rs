//! # Sync Service
//!
//! Drives the [`SyncStateMachine`]. Each state has one entry action that
//! runs to completion and yields the event to dispatch next:
//!
//! | state               | action                                                    |
//! |---------------------|-----------------------------------------------------------|
//! | start               | wait for [`SyncService::request`]                         |
//! | init                | load the tip, check genesis                               |
//! | checkNetwork        | refresh the network state, retry until reach and quorum   |
//! | checkSync           | compare the tip with the network height                   |
//! | download            | fetch and apply blocks above the tip                      |
//! | networkMissingBlock | fork health check, roll back when on a minority fork      |
//! | idle                | wait for a block, a request, or the wakeup timer          |
//! | process             | apply queued blocks, relay fresh ones                     |
//! | exit                | wait for a restart request                                |
//! | clean               | drop buffers and counters                                 |

use async_trait::async_trait;
use dc_01_peer_network::{
    BlockSink, BlockSubmission, ColdStartOptions, NetworkState, NetworkStatus, PeerNetworkApi,
    PeerNetworkContext,
};
use parking_lot::Mutex;
use shared_types::{Block, BlockHeader};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, error, info, warn};

use crate::domain::{
    AcceptOutcome, BlockSyncError, RejectReason, SyncConfig, SyncEvent, SyncState,
    SyncStateMachine, SyncStatus, Transition,
};
use crate::ports::{ForgerHooks, ForgingPermission};

use super::block_processor::BlockProcessor;

pub struct SyncService {
    config: SyncConfig,
    network: Arc<dyn PeerNetworkApi>,
    processor: Arc<BlockProcessor>,
    machine: Mutex<SyncStateMachine>,
    incoming: mpsc::Sender<Block>,
    inbox: Mutex<Option<mpsc::Receiver<Block>>>,
    requests: Notify,
    restart_requested: AtomicBool,
    status: watch::Sender<SyncStatus>,
    no_block_streak: AtomicU32,
    check_network_attempts: AtomicU32,
}

impl SyncService {
    pub fn new(
        config: SyncConfig,
        network: Arc<dyn PeerNetworkApi>,
        processor: Arc<BlockProcessor>,
    ) -> Self {
        let (incoming, inbox) = mpsc::channel(config.incoming_queue_capacity.max(1));
        let (status, _) = watch::channel(SyncStatus::initial(processor.network().now()));
        Self {
            config,
            network,
            processor,
            machine: Mutex::new(SyncStateMachine::new()),
            incoming,
            inbox: Mutex::new(Some(inbox)),
            requests: Notify::new(),
            restart_requested: AtomicBool::new(false),
            status,
            no_block_streak: AtomicU32::new(0),
            check_network_attempts: AtomicU32::new(0),
        }
    }

    pub fn processor(&self) -> &Arc<BlockProcessor> {
        &self.processor
    }

    pub fn state(&self) -> SyncState {
        self.machine.lock().state()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Ask the loop to (re)start. Wakes `start` and `exit`; while idle it
    /// only forces an early sync check.
    pub fn request(&self) {
        if matches!(
            self.state(),
            SyncState::Start | SyncState::Exit | SyncState::Clean
        ) {
            self.restart_requested.store(true, Ordering::SeqCst);
        }
        self.requests.notify_one();
    }

    /// Run the state machine until `shutdown` turns true. Only the first
    /// call runs; later calls return at once.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let Some(mut inbox) = self.inbox.lock().take() else {
            warn!("[dc-02] sync loop already running");
            return;
        };
        let mut pending: VecDeque<Block> = VecDeque::new();
        self.publish_status();
        info!("[dc-02] sync loop started");

        loop {
            let state = self.state();
            let event = tokio::select! {
                event = self.step(state, &mut inbox, &mut pending) => event,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        // The dropped step may have cut a block write short.
                        if let Err(e) = self.processor.recover_tip().await {
                            warn!("[dc-02] cannot re-read the tip on shutdown: {e}");
                        }
                        info!(state = %state, "[dc-02] sync loop stopped");
                        return;
                    }
                    continue;
                }
            };
            let step = self.machine.lock().dispatch(event);
            self.log_transition(&step);
            self.publish_status();
        }
    }

    async fn step(
        &self,
        state: SyncState,
        inbox: &mut mpsc::Receiver<Block>,
        pending: &mut VecDeque<Block>,
    ) -> SyncEvent {
        match state {
            SyncState::Start => self.wait_for_request(true).await,
            SyncState::Init => self.init().await,
            SyncState::CheckNetwork => self.check_network().await,
            SyncState::CheckSync => self.check_sync(),
            SyncState::Download => self.download().await,
            SyncState::NetworkMissingBlock => self.recover().await,
            SyncState::Idle => self.idle(inbox, pending).await,
            SyncState::Process => self.process(inbox, pending).await,
            SyncState::Exit => self.wait_for_request(false).await,
            SyncState::Clean => self.clean(inbox, pending).await,
        }
    }

    /// `consume` clears the request so the next wait blocks again.
    async fn wait_for_request(&self, consume: bool) -> SyncEvent {
        loop {
            let requested = if consume {
                self.restart_requested.swap(false, Ordering::SeqCst)
            } else {
                self.restart_requested.load(Ordering::SeqCst)
            };
            if requested {
                return SyncEvent::Request;
            }
            self.requests.notified().await;
        }
    }

    async fn init(&self) -> SyncEvent {
        match self.processor.load_tip(self.config.genesis_block_id).await {
            Ok(_) => SyncEvent::Success,
            Err(e) => {
                error!("[dc-02] cannot initialise the chain: {e}");
                SyncEvent::Failure
            }
        }
    }

    async fn check_network(&self) -> SyncEvent {
        let state = self.network.refresh_network_state().await;
        if self.network_ready(&state) {
            self.check_network_attempts.store(0, Ordering::SeqCst);
            return SyncEvent::Success;
        }

        let attempts = self.check_network_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(
            attempts,
            sampled = state.sampled_peers,
            reach = state.minimum_network_reach,
            quorum = state.quorum,
            consensus = state.network_consensus,
            "[dc-02] network not ready"
        );
        tokio::time::sleep(self.config.check_network_retry()).await;
        SyncEvent::Failure
    }

    fn network_ready(&self, state: &NetworkState) -> bool {
        if state.status == NetworkStatus::ColdStart || state.forging_allowed {
            return true;
        }
        if self.cold_start_ok() {
            return true;
        }
        let threshold = self.processor.network().config.quorum_threshold;
        state.has_minimum_reach()
            && (state.quorum >= threshold || state.network_consensus >= threshold)
    }

    fn cold_start_ok(&self) -> bool {
        self.network.is_cold_start_ok(ColdStartOptions {
            allow_single_node: self.config.allow_single_node,
        })
    }

    fn check_sync(&self) -> SyncEvent {
        let Some(tip) = self.processor.tip() else {
            return SyncEvent::Unsynced;
        };
        let ctx = self.processor.network();
        if ctx.config.network_start || self.network.eligible_peer_count() == 0 {
            return SyncEvent::Synced;
        }

        let tolerance = ctx.config.quorum_height_tolerance;
        let network_height = self.network.network_height();
        let modal_ahead = self
            .network
            .last_network_state()
            .and_then(|state| state.modal_height)
            .is_some_and(|modal| modal > tip.height + tolerance);
        let behind = modal_ahead || network_height > tip.height + tolerance;

        if !behind && (self.is_recent(ctx, &tip) || network_height <= tip.height) {
            SyncEvent::Synced
        } else {
            debug!(
                tip = tip.height,
                network_height, modal_ahead, "[dc-02] local chain is behind"
            );
            SyncEvent::Unsynced
        }
    }

    fn is_recent(&self, ctx: &PeerNetworkContext, tip: &BlockHeader) -> bool {
        let now = ctx.slots.epoch_time(ctx.now());
        now.saturating_sub(tip.timestamp) <= self.config.synced_block_times * ctx.slots.block_time
    }

    async fn download(&self) -> SyncEvent {
        let Some(tip) = self.processor.tip() else {
            return SyncEvent::Failure;
        };
        let blocks = match self.network.download_blocks(tip.height).await {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!(from = tip.height, "[dc-02] download failed: {e}");
                return SyncEvent::Failure;
            }
        };

        let Some(first) = blocks.first() else {
            let streak = self.no_block_streak.fetch_add(1, Ordering::SeqCst) + 1;
            if streak >= self.config.no_block_limit {
                self.no_block_streak.store(0, Ordering::SeqCst);
                warn!(streak, from = tip.height, "[dc-02] peers keep returning no blocks");
                return SyncEvent::Failure;
            }
            debug!(streak, from = tip.height, "[dc-02] no blocks above tip");
            return SyncEvent::NoBlock;
        };
        self.no_block_streak.store(0, Ordering::SeqCst);

        if first.header.previous_block_id != Some(tip.id) {
            warn!(
                tip = tip.height,
                first = first.height(),
                "[dc-02] downloaded blocks do not build on the tip"
            );
            return SyncEvent::Failure;
        }

        let received = blocks.len();
        let mut applied = 0usize;
        for block in blocks {
            let height = block.height();
            match self.processor.accept(block).await {
                Ok(AcceptOutcome::Accepted { unbuffered, .. }) => applied += 1 + unbuffered,
                Ok(AcceptOutcome::Rejected(reason)) => {
                    debug!(height, reason = %reason, "[dc-02] download batch stopped");
                    break;
                }
                Err(e) => {
                    error!(height, "[dc-02] cannot apply downloaded block: {e}");
                    return SyncEvent::Failure;
                }
            }
        }

        if applied == 0 {
            return SyncEvent::Failure;
        }
        info!(
            received,
            applied,
            tip = self.processor.tip_height(),
            "[dc-02] downloaded blocks applied"
        );
        SyncEvent::Downloaded
    }

    async fn recover(&self) -> SyncEvent {
        let health = self.network.check_network_health().await;
        if health.forked && health.blocks_to_rollback > 0 {
            warn!(
                common = ?health.common_height,
                rollback = health.blocks_to_rollback,
                "[dc-02] rolling back from a minority fork"
            );
            match self.processor.revert_blocks(health.blocks_to_rollback).await {
                Ok(reverted) => info!(
                    reverted = reverted.len(),
                    tip = self.processor.tip_height(),
                    "[dc-02] rollback finished"
                ),
                Err(e) => {
                    error!("[dc-02] rollback failed: {e}");
                    return SyncEvent::Failure;
                }
            }
        }
        SyncEvent::Start
    }

    async fn idle(&self, inbox: &mut mpsc::Receiver<Block>, pending: &mut VecDeque<Block>) -> SyncEvent {
        if !pending.is_empty() {
            return SyncEvent::NewBlock;
        }
        let wakeup = self
            .config
            .idle_wakeup(self.processor.network().slots.block_time);
        tokio::select! {
            Some(block) = inbox.recv() => {
                pending.push_back(block);
                SyncEvent::NewBlock
            }
            _ = self.requests.notified() => SyncEvent::Start,
            _ = tokio::time::sleep(wakeup) => SyncEvent::Start,
        }
    }

    async fn process(&self, inbox: &mut mpsc::Receiver<Block>, pending: &mut VecDeque<Block>) -> SyncEvent {
        while let Ok(block) = inbox.try_recv() {
            pending.push_back(block);
        }

        let ctx = self.processor.network();
        let current_slot = ctx.current_slot();
        let mut unsynced = false;
        while let Some(block) = pending.pop_front() {
            let fresh = ctx.slots.slot_number(block.timestamp()) == current_slot;
            match self.processor.accept(block.clone()).await {
                Ok(AcceptOutcome::Accepted { .. }) if fresh => {
                    let reached = self.network.broadcast_block(&block).await;
                    debug!(height = block.height(), reached, "[dc-02] relayed block");
                }
                Ok(AcceptOutcome::Accepted { .. }) => {}
                Ok(AcceptOutcome::Rejected(RejectReason::Future | RejectReason::ForkUnverified)) => {
                    unsynced = true;
                }
                Ok(AcceptOutcome::Rejected(_)) => {}
                Err(e) => {
                    error!(height = block.height(), "[dc-02] cannot apply block: {e}");
                    pending.clear();
                    return SyncEvent::Failure;
                }
            }
        }

        if unsynced {
            SyncEvent::Unsynced
        } else {
            SyncEvent::Processed
        }
    }

    async fn clean(&self, inbox: &mut mpsc::Receiver<Block>, pending: &mut VecDeque<Block>) -> SyncEvent {
        let mut dropped = pending.len();
        pending.clear();
        while inbox.try_recv().is_ok() {
            dropped += 1;
        }
        dropped += self.processor.clear_future_blocks().await;
        self.no_block_streak.store(0, Ordering::SeqCst);
        self.check_network_attempts.store(0, Ordering::SeqCst);
        info!(dropped, "[dc-02] sync state cleaned");
        SyncEvent::Request
    }

    fn log_transition(&self, step: &Transition) {
        if !step.defined {
            warn!(state = %step.from, event = ?step.event, "[dc-02] event ignored in this state");
        } else if step.from == step.to {
            debug!(state = %step.to, event = ?step.event, "[dc-02] sync state unchanged");
        } else {
            info!(from = %step.from, event = ?step.event, to = %step.to, "[dc-02] sync state changed");
        }
    }

    fn publish_status(&self) {
        let (state, transitions) = {
            let machine = self.machine.lock();
            (machine.state(), machine.transitions())
        };
        let ctx = self.processor.network();
        let now = ctx.now();
        let tip = self.processor.tip();
        let permission = self.permission(now, state);
        self.status.send_replace(SyncStatus {
            state,
            tip_height: tip.as_ref().map_or(0, |h| h.height),
            tip_id: tip.map(|h| h.id),
            network_height: self.network.network_height(),
            quorum: self.network.last_network_state().map(|s| s.quorum),
            forging_allowed: permission.can_forge,
            check_network_attempts: self.check_network_attempts.load(Ordering::SeqCst),
            transitions,
            last_transition: now,
        });
    }

    fn permission(&self, now: u64, state: SyncState) -> ForgingPermission {
        let slots = &self.processor.network().slots;
        let info = slots.forging_info(slots.epoch_time(now));
        let network_allowed = self
            .network
            .last_network_state()
            .is_some_and(|s| s.forging_allowed)
            || self.cold_start_ok();
        let synced = state == SyncState::Idle;
        ForgingPermission {
            network_allowed,
            slot_allowed: info.can_forge,
            synced,
            can_forge: network_allowed && info.can_forge && synced,
            info,
        }
    }
}

#[async_trait]
impl BlockSink for SyncService {
    async fn submit_block(&self, block: Block, source: Option<IpAddr>) -> BlockSubmission {
        let ctx = self.processor.network();
        if ctx.slots.slot_number(block.timestamp()) > ctx.current_slot() {
            debug!(height = block.height(), source = ?source, "[dc-02] block from a future slot dropped");
            return BlockSubmission::Discarded("block slot is in the future".into());
        }
        match self.incoming.try_send(block) {
            Ok(()) => {
                self.requests.notify_one();
                BlockSubmission::Queued
            }
            Err(TrySendError::Full(block)) => {
                warn!(height = block.height(), "[dc-02] incoming block queue full");
                BlockSubmission::Discarded("sync queue is full".into())
            }
            Err(TrySendError::Closed(_)) => BlockSubmission::Discarded("sync loop stopped".into()),
        }
    }
}

#[async_trait]
impl ForgerHooks for SyncService {
    fn network_state(&self) -> Option<NetworkState> {
        self.network.last_network_state()
    }

    fn forging_permission(&self, now: u64) -> ForgingPermission {
        self.permission(now, self.state())
    }

    async fn submit_forged_block(&self, block: Block) -> Result<AcceptOutcome, BlockSyncError> {
        let outcome = self.processor.accept(block.clone()).await?;
        if outcome.is_accepted() {
            let reached = self.network.broadcast_block(&block).await;
            info!(height = block.height(), id = %block.id(), reached, "[dc-02] forged block broadcast");
        }
        Ok(outcome)
    }

    fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryChainStore, MemoryTransactionPool};
    use dc_01_peer_network::test_utils::{
        build_chain, fork_chain, make_block, test_config, test_context_with, AcceptAllVerifier,
        FixedTimeSource, MockChain, SimulatedNetwork, SimulatedNode, TEST_DELEGATE, TEST_PORT,
    };
    use dc_01_peer_network::{NetworkMonitor, P2pConfig};
    use std::net::{Ipv4Addr, SocketAddr};
    use std::time::Duration;

    const LOCAL: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

    struct Fixture {
        service: Arc<SyncService>,
        store: Arc<MemoryChainStore>,
        nodes: Vec<Arc<SimulatedNode>>,
        shutdown: watch::Sender<bool>,
    }

    fn remote(n: u8) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, n)), TEST_PORT)
    }

    fn sync_config() -> SyncConfig {
        SyncConfig {
            check_network_retry_ms: 10,
            idle_wakeup_secs: Some(1),
            ..SyncConfig::default()
        }
    }

    /// Local node holding `local`, one simulated peer per entry of `remotes`.
    async fn fixture(local: Vec<Block>, remotes: Vec<Vec<Block>>, sync: SyncConfig) -> Fixture {
        let network = SimulatedNetwork::new();
        let mut nodes = Vec::new();
        let mut seeds = Vec::new();
        for (i, blocks) in remotes.into_iter().enumerate() {
            let node = SimulatedNode::new(Arc::new(MockChain::new(blocks)));
            let addr = remote(i as u8 + 2);
            network.register(addr, node.clone());
            nodes.push(node);
            seeds.push(addr);
        }

        let store = Arc::new(MemoryChainStore::with_blocks(local, vec![TEST_DELEGATE.into()]));
        let ctx = test_context_with(
            network.transport_for(LOCAL),
            store.clone(),
            Arc::new(FixedTimeSource::new(10_000)),
            P2pConfig {
                seeds,
                ..test_config()
            },
            Arc::new(AcceptAllVerifier),
        );
        let monitor = Arc::new(NetworkMonitor::new(ctx.clone()));
        monitor.start().await;

        let pool = Arc::new(MemoryTransactionPool::new(100));
        let processor = Arc::new(BlockProcessor::new(ctx, store.clone(), pool, &sync));
        let service = Arc::new(SyncService::new(sync, monitor, processor));

        let (shutdown, rx) = watch::channel(false);
        tokio::spawn(service.clone().run(rx));
        service.request();
        Fixture {
            service,
            store,
            nodes,
            shutdown,
        }
    }

    async fn wait_for(service: &SyncService, done: impl Fn(&SyncStatus) -> bool) -> SyncStatus {
        let mut rx = service.subscribe_status();
        let status = tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|s| done(s)))
            .await
            .expect("sync did not reach the expected status")
            .expect("status channel closed")
            .clone();
        status
    }

    #[tokio::test]
    async fn test_syncs_from_peers_then_idles() {
        let chain = build_chain(60, 1);
        let f = fixture(
            chain[..10].to_vec(),
            vec![chain.clone(), chain.clone(), chain.clone()],
            sync_config(),
        )
        .await;

        let status = wait_for(&f.service, |s| s.state == SyncState::Idle).await;
        assert_eq!(status.tip_height, 60);
        assert_eq!(status.network_height, 60);
        assert_eq!(f.store.height(), 60);
        assert!(status.transitions >= 6);
    }

    #[tokio::test]
    async fn test_check_network_retries_without_peers() {
        let f = fixture(build_chain(5, 1), vec![], sync_config()).await;

        let status = wait_for(&f.service, |s| s.check_network_attempts >= 3).await;
        assert_eq!(status.state, SyncState::CheckNetwork);
        assert!(!status.forging_allowed);
        assert!(!f.service.forging_permission(240).network_allowed);
    }

    #[tokio::test]
    async fn test_single_node_opt_in_reaches_idle() {
        let sync = SyncConfig {
            allow_single_node: true,
            ..sync_config()
        };
        let f = fixture(build_chain(5, 1), vec![], sync).await;

        let status = wait_for(&f.service, |s| s.state == SyncState::Idle).await;
        assert_eq!(status.tip_height, 5);
        // 240 is the start of slot 30.
        let permission = f.service.forging_permission(240);
        assert!(permission.network_allowed && permission.slot_allowed && permission.synced);
        assert!(permission.can_forge);
        assert!(!f.service.forging_permission(245).can_forge);
    }

    #[tokio::test]
    async fn test_init_failure_waits_in_exit_until_requested() {
        let sync = SyncConfig {
            allow_single_node: true,
            ..sync_config()
        };
        let store_chain = build_chain(5, 1);
        let f = {
            let network = SimulatedNetwork::new();
            let store = Arc::new(MemoryChainStore::with_blocks(
                store_chain,
                vec![TEST_DELEGATE.into()],
            ));
            store.set_offline(true);
            let ctx = test_context_with(
                network.transport_for(LOCAL),
                store.clone(),
                Arc::new(FixedTimeSource::new(10_000)),
                test_config(),
                Arc::new(AcceptAllVerifier),
            );
            let monitor = Arc::new(NetworkMonitor::new(ctx.clone()));
            let pool = Arc::new(MemoryTransactionPool::new(100));
            let processor = Arc::new(BlockProcessor::new(ctx, store.clone(), pool, &sync));
            let service = Arc::new(SyncService::new(sync, monitor, processor));
            let (shutdown, rx) = watch::channel(false);
            tokio::spawn(service.clone().run(rx));
            service.request();
            Fixture {
                service,
                store,
                nodes: Vec::new(),
                shutdown,
            }
        };

        wait_for(&f.service, |s| s.state == SyncState::Exit).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.service.state(), SyncState::Exit);

        f.store.set_offline(false);
        f.service.request();
        let status = wait_for(&f.service, |s| s.state == SyncState::Idle).await;
        assert_eq!(status.tip_height, 5);
    }

    #[tokio::test]
    async fn test_block_pushed_while_idle_is_applied() {
        let sync = SyncConfig {
            allow_single_node: true,
            ..sync_config()
        };
        let chain = build_chain(6, 1);
        let f = fixture(chain[..5].to_vec(), vec![], sync).await;
        wait_for(&f.service, |s| s.state == SyncState::Idle).await;

        let submitted = f.service.submit_block(chain[5].clone(), Some(LOCAL)).await;
        assert_eq!(submitted, BlockSubmission::Queued);
        let status = wait_for(&f.service, |s| s.tip_height == 6 && s.state == SyncState::Idle).await;
        assert_eq!(status.tip_id, Some(chain[5].id()));

        // Slot 2000 is past the fixed clock's slot 1250.
        let ahead = make_block(2_000, 1, Some(chain[5].id()));
        assert!(matches!(
            f.service.submit_block(ahead, None).await,
            BlockSubmission::Discarded(_)
        ));
    }

    #[tokio::test]
    async fn test_future_block_while_idle_triggers_download() {
        let chain = build_chain(25, 1);
        let f = fixture(
            chain[..20].to_vec(),
            vec![chain[..20].to_vec(), chain[..20].to_vec()],
            sync_config(),
        )
        .await;
        wait_for(&f.service, |s| s.state == SyncState::Idle).await;

        for node in &f.nodes {
            for block in &chain[20..] {
                node.chain().push(block.clone());
            }
        }
        let submitted = f.service.submit_block(chain[24].clone(), None).await;
        assert_eq!(submitted, BlockSubmission::Queued);

        let status = wait_for(&f.service, |s| s.tip_height == 25 && s.state == SyncState::Idle).await;
        assert_eq!(status.tip_id, Some(chain[24].id()));
        assert_eq!(f.service.processor().future_block_count().await, 0);
    }

    #[tokio::test]
    async fn test_minority_fork_rolls_back_and_follows_network() {
        let base = build_chain(40, 1);
        let ours = fork_chain(&base, 40, 10, 9);
        let theirs = fork_chain(&base, 40, 15, 2);
        let f = fixture(ours, vec![theirs.clone(), theirs.clone()], sync_config()).await;

        let status = wait_for(&f.service, |s| s.tip_height == 55 && s.state == SyncState::Idle).await;
        assert_eq!(status.tip_id, Some(theirs[54].id()));
        assert_eq!(f.store.height(), 55);
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_loop() {
        let sync = SyncConfig {
            allow_single_node: true,
            ..sync_config()
        };
        let f = fixture(build_chain(3, 1), vec![], sync).await;
        wait_for(&f.service, |s| s.state == SyncState::Idle).await;

        f.shutdown.send_replace(true);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let chain = build_chain(4, 1);
        f.service.submit_block(chain[3].clone(), None).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.service.processor().tip_height(), 3);
    }

    #[tokio::test]
    async fn test_forged_block_is_applied_and_broadcast() {
        let chain = build_chain(21, 1);
        let f = fixture(
            chain[..20].to_vec(),
            vec![chain[..20].to_vec(), chain[..20].to_vec()],
            sync_config(),
        )
        .await;
        wait_for(&f.service, |s| s.state == SyncState::Idle).await;

        let outcome = f.service.submit_forged_block(chain[20].clone()).await.unwrap();
        assert!(outcome.is_accepted());
        assert_eq!(f.store.height(), 21);
        for node in &f.nodes {
            assert_eq!(node.posted_blocks(), vec![chain[20].clone()]);
        }

        let again = f.service.submit_forged_block(chain[20].clone()).await.unwrap();
        assert_eq!(again.rejection(), Some(RejectReason::AlreadyInChain));
    }
}
