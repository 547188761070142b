//! # Network monitor
//!
//! Owns the outward-facing peer loop: seeding, discovery, cleansing stale
//! peers, and the periodic network state refresh that decides whether the
//! node is behind and whether forging is allowed. Block download and
//! broadcast fan out over eligible peers from here as well.

use async_trait::async_trait;
use futures::stream::{self, FuturesUnordered, StreamExt};
use futures::future::join_all;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use shared_types::{Block, SerializedTransaction};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::communicator::PeerCommunicator;
use super::context::PeerNetworkContext;
use super::processor::{AcceptOptions, PeerProcessor};
use super::verifier::PeerVerifier;
use crate::domain::{
    DownloadError, NetworkHealth, NetworkState, Peer, PeerBroadcast, PeerEvent, ProbeResponse,
};
use crate::ports::{ColdStartOptions, PeerNetworkApi};

/// Peers verified concurrently during discovery and cleansing.
const VERIFY_CONCURRENCY: usize = 16;
/// Distinct peers tried for one download chunk.
const PEERS_PER_CHUNK: usize = 3;

pub struct NetworkMonitor {
    ctx: Arc<PeerNetworkContext>,
    communicator: Arc<PeerCommunicator>,
    processor: Arc<PeerProcessor>,
    last_state: RwLock<Option<NetworkState>>,
}

impl NetworkMonitor {
    pub fn new(ctx: Arc<PeerNetworkContext>) -> Self {
        let communicator = Arc::new(PeerCommunicator::new(ctx.clone()));
        let verifier = Arc::new(PeerVerifier::new(ctx.clone(), communicator.clone()));
        let processor = Arc::new(PeerProcessor::new(ctx.clone(), verifier));
        Self {
            ctx,
            communicator,
            processor,
            last_state: RwLock::new(None),
        }
    }

    pub fn context(&self) -> &Arc<PeerNetworkContext> {
        &self.ctx
    }

    pub fn communicator(&self) -> &Arc<PeerCommunicator> {
        &self.communicator
    }

    pub fn processor(&self) -> &Arc<PeerProcessor> {
        &self.processor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.ctx.subscribe()
    }

    /// Seed the repository, then discover through the seeds.
    pub async fn start(&self) {
        let seeded = self.populate_seed_peers().await;
        let discovered = self.discover_peers().await;
        info!(
            seeded,
            discovered,
            known = self.ctx.repository.count(),
            "[dc-01] peer network started"
        );
    }

    /// Verify every configured seed. Returns how many were accepted.
    pub async fn populate_seed_peers(&self) -> usize {
        let options = AcceptOptions {
            seed: true,
            ..Default::default()
        };
        let results = join_all(self.ctx.config.seeds.iter().map(|seed| {
            let peer = Peer::new(seed.ip(), seed.port());
            self.processor.validate_and_accept_peer(peer, options)
        }))
        .await;

        for (seed, result) in self.ctx.config.seeds.iter().zip(&results) {
            if let Err(rejection) = result {
                warn!(seed = %seed, "[dc-01] seed peer rejected: {rejection}");
            }
        }
        results.iter().filter(|result| result.is_ok()).count()
    }

    /// Ask a few eligible peers for their peer lists and submit the unknown
    /// ones for admission. Returns how many new peers were accepted.
    pub async fn discover_peers(&self) -> usize {
        let askers = self.sample(self.ctx.eligible_peers(), self.ctx.config.discovery_fanout);
        if askers.is_empty() {
            return 0;
        }

        let replies = join_all(askers.iter().map(|peer| async move {
            (peer.ip, self.communicator.get_peers(peer).await)
        }))
        .await;

        let mut seen = HashSet::new();
        let mut candidates: Vec<(IpAddr, PeerBroadcast)> = Vec::new();
        for (source, reply) in replies {
            let Ok(listed) = reply else { continue };
            for broadcast in listed {
                if self.ctx.repository.has(&broadcast.ip) || !seen.insert(broadcast.ip) {
                    continue;
                }
                candidates.push((source, broadcast));
            }
        }

        let results: Vec<_> = stream::iter(candidates)
            .map(|(source, broadcast)| {
                let options = AcceptOptions {
                    source: Some(source),
                    ..Default::default()
                };
                self.processor
                    .validate_and_accept_peer(Peer::from_broadcast(broadcast), options)
            })
            .buffer_unordered(VERIFY_CONCURRENCY)
            .collect()
            .await;
        let accepted = results.iter().filter(|result| result.is_ok()).count();

        if accepted > 0 {
            info!(accepted, "[dc-01] discovered new peers");
        }
        accepted
    }

    /// Re-verify stale peers (all when `force`) and drop those that fail.
    /// Returns how many were removed.
    pub async fn cleanse_peers(&self, force: bool) -> usize {
        let now = self.ctx.now();
        let ttl = self.ctx.config.verification_ttl_secs;
        let stale: Vec<Peer> = self
            .ctx
            .repository
            .list()
            .into_iter()
            .filter(|peer| force || !peer.is_eligible(now, ttl))
            .collect();

        let options = AcceptOptions {
            force: true,
            ..Default::default()
        };
        let failed: Vec<IpAddr> = stream::iter(stale)
            .map(|peer| async move {
                let ip = peer.ip;
                self.processor
                    .validate_and_accept_peer(peer, options)
                    .await
                    .err()
                    .map(|_| ip)
            })
            .buffer_unordered(VERIFY_CONCURRENCY)
            .filter_map(std::future::ready)
            .collect()
            .await;

        for ip in &failed {
            if self.ctx.repository.remove(ip).is_some() {
                self.ctx.publish(PeerEvent::Removed { ip: *ip });
            }
        }
        if !failed.is_empty() {
            debug!(removed = failed.len(), "[dc-01] cleansed peers");
        }
        failed.len()
    }

    /// Probe a sample of eligible peers under one deadline and recompute
    /// the network state. Slow probes are dropped, not awaited.
    pub async fn refresh(&self) -> NetworkState {
        let policy = self.ctx.quorum_policy();
        let local = match self.ctx.chain.last_block().await {
            Ok(local) => local,
            Err(e) => {
                warn!("[dc-01] cannot read local tip: {e}");
                return self.store(NetworkState::unknown(&policy));
            }
        };
        if self.ctx.config.network_start {
            return self.store(NetworkState::cold_start(&local, &policy));
        }

        let sample = self.sample(self.ctx.eligible_peers(), self.ctx.config.status_sample_size);
        let sampled = sample.len();
        let current_slot = self.ctx.current_slot();
        let deadline = Instant::now() + self.ctx.config.refresh_deadline();

        let mut probes: FuturesUnordered<_> = sample
            .into_iter()
            .map(|peer| async move {
                let status = self.communicator.get_status(&peer).await.ok()?;
                self.ctx.repository.update(&peer.ip, |stored| stored.state = status.state());
                Some(ProbeResponse {
                    ip: peer.ip,
                    height: status.height,
                    header: status.header,
                    current_slot: status.current_slot,
                    forging_allowed: status.forging_allowed,
                    forked: peer.is_forked(),
                })
            })
            .collect();

        let mut responses = Vec::with_capacity(sampled);
        loop {
            match tokio::time::timeout_at(deadline, probes.next()).await {
                Ok(Some(Some(response))) => responses.push(response),
                Ok(Some(None)) => {}
                Ok(None) => break,
                Err(_) => {
                    debug!(pending = probes.len(), "[dc-01] refresh deadline reached");
                    break;
                }
            }
        }
        drop(probes);

        let state = NetworkState::analyze(&local, current_slot, sampled, &responses, &policy);
        info!(
            height = state.node_height,
            sampled = state.sampled_peers,
            responded = state.responded_peers,
            quorum = state.quorum,
            modal_height = ?state.modal_height,
            forging_allowed = state.forging_allowed,
            "[dc-01] network state refreshed"
        );
        self.store(state)
    }

    /// Force-cleanse, then see whether most verified peers are forked away
    /// from us at a common height.
    pub async fn health(&self) -> NetworkHealth {
        self.cleanse_peers(true).await;
        let eligible = self.ctx.eligible_peers();
        if eligible.is_empty() {
            return NetworkHealth::default();
        }

        let forked_at: Vec<u64> = eligible
            .iter()
            .filter(|peer| peer.is_forked())
            .filter_map(|peer| peer.verification_result.as_ref())
            .map(|result| result.chain_validation.highest_common_height)
            .collect();
        if forked_at.len() * 2 < eligible.len() {
            return NetworkHealth::default();
        }

        let mut counts: HashMap<u64, usize> = HashMap::new();
        for height in &forked_at {
            *counts.entry(*height).or_default() += 1;
        }
        let Some((common, _)) = counts
            .into_iter()
            .max_by_key(|(height, count)| (*count, *height))
        else {
            return NetworkHealth::default();
        };

        let local_height = match self.ctx.chain.last_block().await {
            Ok(local) => local.height,
            Err(e) => {
                warn!("[dc-01] cannot read local tip: {e}");
                return NetworkHealth::default();
            }
        };
        let blocks_to_rollback = local_height
            .saturating_sub(common)
            .min(self.ctx.config.max_rollback);
        warn!(
            common,
            local_height,
            blocks_to_rollback,
            forked = forked_at.len(),
            eligible = eligible.len(),
            "[dc-01] local chain is forked from the network"
        );
        NetworkHealth {
            forked: true,
            common_height: Some(common),
            blocks_to_rollback,
        }
    }

    /// Download from non-forked eligible peers in parallel chunks, each
    /// chunk trying up to three peers. The result stops at the first gap.
    pub async fn download(&self, from_height: u64) -> Result<Vec<Block>, DownloadError> {
        let peers: Vec<Peer> = self
            .ctx
            .eligible_peers()
            .into_iter()
            .filter(|peer| !peer.is_forked())
            .collect();
        if peers.is_empty() {
            return Err(DownloadError::NoEligiblePeers {
                known: self.ctx.repository.count(),
            });
        }

        let chunk = self.ctx.config.max_download_blocks;
        let target = median_height(&peers);
        let chunks = if target > from_height {
            (target - from_height).div_ceil(chunk)
        } else {
            1
        };
        let chunks = chunks.clamp(1, self.ctx.config.max_parallel_downloads.max(1) as u64);

        let plans: Vec<(u64, Vec<Peer>)> = (0..chunks)
            .map(|i| {
                let start = from_height + i * chunk;
                (start, self.chunk_peers(&peers, start))
            })
            .collect();

        let results = join_all(
            plans
                .iter()
                .map(|(start, candidates)| self.download_chunk(*start, candidates)),
        )
        .await;

        let mut blocks = Vec::new();
        for result in results {
            let full = result.len() as u64 == chunk;
            blocks.extend(result);
            if !full {
                break;
            }
        }
        debug!(from_height, downloaded = blocks.len(), "[dc-01] blocks downloaded");
        Ok(blocks)
    }

    /// Post to a random subset of eligible peers. Returns how many accepted.
    pub async fn broadcast(&self, block: &Block) -> usize {
        let peers = self.sample(self.ctx.eligible_peers(), self.ctx.config.max_peers_broadcast);
        let results = join_all(peers.iter().map(|peer| self.communicator.post_block(peer, block))).await;
        let delivered = results.iter().filter(|result| result.is_ok()).count();
        debug!(height = block.height(), delivered, "[dc-01] block broadcast");
        delivered
    }

    pub async fn broadcast_txs(&self, transactions: &[SerializedTransaction]) -> usize {
        if transactions.is_empty() {
            return 0;
        }
        let peers = self.sample(self.ctx.eligible_peers(), self.ctx.config.max_peers_broadcast);
        let results = join_all(
            peers
                .iter()
                .map(|peer| self.communicator.post_transactions(peer, transactions)),
        )
        .await;
        results.iter().filter(|result| result.is_ok()).count()
    }

    /// Periodic maintenance until `shutdown` turns true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.ctx.config.refresh_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = self.ctx.now();
                    let lifted = self.ctx.guard.gc_expired(now);
                    self.ctx.rate_limiter.gc(now);
                    if lifted > 0 {
                        debug!(lifted, "[dc-01] suspensions lapsed");
                    }
                    self.cleanse_peers(false).await;
                    self.discover_peers().await;
                    self.refresh().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("[dc-01] network monitor stopped");
                        return;
                    }
                }
            }
        }
    }

    async fn download_chunk(&self, start: u64, candidates: &[Peer]) -> Vec<Block> {
        for peer in candidates {
            match self.communicator.get_blocks(peer, start).await {
                Ok(blocks) if !blocks.is_empty() => return blocks,
                Ok(_) => debug!(peer = %peer.ip, start, "[dc-01] peer has no blocks above"),
                Err(e) => debug!(peer = %peer.ip, start, "[dc-01] chunk download failed: {e}"),
            }
        }
        Vec::new()
    }

    /// Up to three random peers, preferring those that claim to be above
    /// `start`.
    fn chunk_peers(&self, peers: &[Peer], start: u64) -> Vec<Peer> {
        let (mut ahead, mut rest): (Vec<Peer>, Vec<Peer>) =
            peers.iter().cloned().partition(|peer| peer.state.height > start);
        let mut rng = rand::thread_rng();
        ahead.shuffle(&mut rng);
        rest.shuffle(&mut rng);
        ahead.into_iter().chain(rest).take(PEERS_PER_CHUNK).collect()
    }

    fn sample(&self, peers: Vec<Peer>, size: usize) -> Vec<Peer> {
        if peers.len() <= size {
            return peers;
        }
        let mut rng = rand::thread_rng();
        peers.choose_multiple(&mut rng, size).cloned().collect()
    }

    fn store(&self, state: NetworkState) -> NetworkState {
        *self.last_state.write() = Some(state.clone());
        state
    }
}

/// Upper median of reported heights, 0 for no peers.
fn median_height(peers: &[Peer]) -> u64 {
    let mut heights: Vec<u64> = peers.iter().map(|peer| peer.state.height).collect();
    if heights.is_empty() {
        return 0;
    }
    heights.sort_unstable();
    heights[heights.len() / 2]
}

#[async_trait]
impl PeerNetworkApi for NetworkMonitor {
    async fn refresh_network_state(&self) -> NetworkState {
        self.refresh().await
    }

    fn last_network_state(&self) -> Option<NetworkState> {
        self.last_state.read().clone()
    }

    fn network_height(&self) -> u64 {
        median_height(&self.ctx.eligible_peers())
    }

    fn is_cold_start_ok(&self, options: ColdStartOptions) -> bool {
        let config = &self.ctx.config;
        if config.network_start {
            return true;
        }
        (config.is_seed_mode() || options.allow_single_node) && self.eligible_peer_count() == 0
    }

    fn eligible_peer_count(&self) -> usize {
        self.ctx.eligible_peers().len()
    }

    async fn check_network_health(&self) -> NetworkHealth {
        self.health().await
    }

    async fn download_blocks(&self, from_height: u64) -> Result<Vec<Block>, DownloadError> {
        self.download(from_height).await
    }

    async fn broadcast_block(&self, block: &Block) -> usize {
        self.broadcast(block).await
    }

    async fn broadcast_transactions(&self, transactions: &[SerializedTransaction]) -> usize {
        self.broadcast_txs(transactions).await
    }
}
