//! # Peer processor
//!
//! Admission of a peer into the repository. Cheap checks come first (rate
//! limit, self, blacklist, suspension, version) so that bad or abusive
//! peers never cost a verification round.

use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

use super::context::PeerNetworkContext;
use super::verifier::PeerVerifier;
use crate::domain::{
    FailureOutcome, Peer, PeerEvent, PeerRejection, PeerVerificationResult, VerificationFailure,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptOptions {
    /// Configured seed: skips the version gate and the freshness shortcut.
    pub seed: bool,
    /// Address that advertised the peer, for rate limiting.
    pub source: Option<IpAddr>,
    /// Re-verify even if the peer is currently eligible.
    pub force: bool,
}

enum Admission {
    Verify,
    /// Verified recently enough; nothing to do.
    Fresh,
}

pub struct PeerProcessor {
    ctx: Arc<PeerNetworkContext>,
    verifier: Arc<PeerVerifier>,
}

impl PeerProcessor {
    pub fn new(ctx: Arc<PeerNetworkContext>, verifier: Arc<PeerVerifier>) -> Self {
        Self { ctx, verifier }
    }

    /// Verify `peer` and store it on success. Never panics on bad input; the
    /// rejection says why.
    pub async fn validate_and_accept_peer(&self, peer: Peer, options: AcceptOptions) -> Result<(), PeerRejection> {
        let ip = peer.ip;
        match self.precheck(&peer, options) {
            Ok(Admission::Verify) => {}
            Ok(Admission::Fresh) => return Ok(()),
            Err(rejection) => {
                self.ctx.publish(PeerEvent::Rejected {
                    ip,
                    reason: rejection.as_str(),
                });
                debug!(peer = %ip, reason = rejection.as_str(), "[dc-01] peer not admitted: {rejection}");
                return Err(rejection);
            }
        }

        match self.verifier.verify(&peer).await {
            Ok(verified) => {
                let now = self.ctx.now();
                let forked = verified.result.forked();
                let height = verified.status.height;

                let mut accepted = peer;
                if let Some(stored) = self.ctx.repository.get(&ip) {
                    accepted.latency_ms = stored.latency_ms.or(accepted.latency_ms);
                }
                accepted.version = verified.status.version.clone();
                accepted.state = verified.status.state();
                accepted.plugins = verified.status.plugins;
                accepted.last_pinged = Some(now);
                accepted.verification_result = Some(verified.result);

                if let Some(evicted) = self.ctx.repository.add(accepted) {
                    debug!(peer = %evicted.ip, "[dc-01] evicted oldest peer, repository full");
                }
                self.ctx.guard.clear_failures(&ip);
                self.ctx.publish(PeerEvent::Accepted { ip, height, forked });
                info!(peer = %ip, height, forked, "[dc-01] peer accepted");
                Ok(())
            }
            Err(failure) => {
                self.record_verification_failure(ip, &failure);
                let rejection = PeerRejection::VerificationFailed(failure);
                self.ctx.publish(PeerEvent::Rejected {
                    ip,
                    reason: rejection.as_str(),
                });
                debug!(peer = %ip, "[dc-01] {rejection}");
                Err(rejection)
            }
        }
    }

    fn precheck(&self, peer: &Peer, options: AcceptOptions) -> Result<Admission, PeerRejection> {
        let now = self.ctx.now();
        let config = &self.ctx.config;

        if let Some(source) = options.source {
            if !self.ctx.rate_limiter.check(source, now) {
                return Err(PeerRejection::RateLimited { source_ip: source });
            }
        }
        if config.is_myself(&peer.ip) {
            return Err(PeerRejection::SelfPeer);
        }
        if self.ctx.guard.is_blacklisted(&peer.ip) {
            return Err(PeerRejection::Blacklisted);
        }
        if let Some(suspension) = self.ctx.guard.suspension(&peer.ip, now) {
            return Err(PeerRejection::Suspended {
                offence: suspension.offence,
                until: suspension.until,
            });
        }
        // An unknown version is checked on the status reply instead.
        if !options.seed && !peer.version.is_empty() && !self.ctx.guard.is_valid_version(&peer.version) {
            return Err(PeerRejection::InvalidVersion(peer.version.clone()));
        }

        if options.force || options.seed {
            return Ok(Admission::Verify);
        }
        if let Some(stored) = self.ctx.repository.get(&peer.ip) {
            if stored.is_eligible(now, config.verification_ttl_secs) {
                return Ok(Admission::Fresh);
            }
            if stored.is_cooling_down(now, config.verification_cooldown_secs) {
                let failed_at = stored.verification_result.map_or(now, |result| result.timestamp);
                return Err(PeerRejection::CoolingDown {
                    retry_at: failed_at + config.verification_cooldown_secs,
                });
            }
        }
        Ok(Admission::Verify)
    }

    /// Charge the offence. A suspended peer leaves the repository; a stored
    /// peer that is not suspended is demoted until it re-verifies.
    fn record_verification_failure(&self, ip: IpAddr, failure: &VerificationFailure) {
        let now = self.ctx.now();
        let suspended = match failure.offence() {
            Some(offence) => match self.ctx.guard.record_failure(ip, offence, now) {
                FailureOutcome::Suspended { until } => {
                    self.ctx.publish(PeerEvent::Suspended { ip, offence, until });
                    true
                }
                _ => false,
            },
            None => self.ctx.guard.is_suspended(&ip, now),
        };

        if suspended {
            self.ctx.repository.remove(&ip);
            return;
        }
        let demoted = self.ctx.repository.update(&ip, |stored| {
            stored.verification_result = Some(PeerVerificationResult::failed(now));
        });
        if demoted {
            self.ctx.publish(PeerEvent::Demoted { ip });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Offence, P2pConfig};
    use crate::service::communicator::PeerCommunicator;
    use crate::test_utils::{
        build_chain, fork_chain, test_config, test_context_with, AcceptAllVerifier,
        FixedTimeSource, MockChain, SimulatedNetwork, SimulatedNode,
    };
    use shared_types::Block;
    use std::net::{Ipv4Addr, SocketAddr};

    const LOCAL: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    const REMOTE: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
    const ADVERTISER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3));

    struct Fixture {
        ctx: Arc<PeerNetworkContext>,
        processor: PeerProcessor,
        node: Arc<SimulatedNode>,
        time: Arc<FixedTimeSource>,
    }

    fn fixture_with(local: Vec<Block>, remote: Vec<Block>, config: P2pConfig) -> Fixture {
        let network = SimulatedNetwork::new();
        let node = SimulatedNode::new(Arc::new(MockChain::new(remote)));
        network.register(SocketAddr::new(REMOTE, 4002), node.clone());

        let time = Arc::new(FixedTimeSource::new(10_000));
        let ctx = test_context_with(
            network.transport_for(LOCAL),
            Arc::new(MockChain::new(local)),
            time.clone(),
            config,
            Arc::new(AcceptAllVerifier),
        );
        let communicator = Arc::new(PeerCommunicator::new(ctx.clone()));
        let verifier = Arc::new(PeerVerifier::new(ctx.clone(), communicator));
        let processor = PeerProcessor::new(ctx.clone(), verifier);
        Fixture { ctx, processor, node, time }
    }

    fn fixture(local: Vec<Block>, remote: Vec<Block>) -> Fixture {
        fixture_with(local, remote, test_config())
    }

    fn remote() -> Peer {
        Peer::new(REMOTE, 4002)
    }

    #[tokio::test]
    async fn test_admits_forked_peer_with_common_ancestor() {
        // Local chain at 60, peer at 100, common block at 50.
        let base = build_chain(60, 1);
        let theirs = fork_chain(&base, 50, 50, 2);
        let f = fixture(base, theirs);

        f.processor
            .validate_and_accept_peer(remote(), AcceptOptions::default())
            .await
            .unwrap();

        let stored = f.ctx.repository.get(&REMOTE).unwrap();
        let result = stored.verification_result.unwrap();
        assert!(result.verified);
        assert_eq!(result.chain_validation.highest_common_height, 50);
        assert_eq!(stored.state.height, 100);
        assert_eq!(stored.version, "1.0.0");
    }

    #[tokio::test]
    async fn test_rejects_self_and_blacklisted() {
        let chain = build_chain(5, 1);
        let config = P2pConfig {
            local_addresses: vec![REMOTE],
            ..test_config()
        };
        let f = fixture_with(chain.clone(), chain.clone(), config);
        let err = f
            .processor
            .validate_and_accept_peer(remote(), AcceptOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PeerRejection::SelfPeer));

        let config = P2pConfig {
            blacklist: vec![REMOTE],
            ..test_config()
        };
        let f = fixture_with(chain.clone(), chain, config);
        let err = f
            .processor
            .validate_and_accept_peer(remote(), AcceptOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PeerRejection::Blacklisted));
        assert!(!f.ctx.repository.has(&REMOTE));
    }

    #[tokio::test]
    async fn test_version_gate() {
        let chain = build_chain(5, 1);
        let config = P2pConfig {
            minimum_versions: vec![">=2.0.0".into()],
            ..test_config()
        };
        let f = fixture_with(chain.clone(), chain, config);

        let old = remote().with_version("1.9.9");
        let err = f
            .processor
            .validate_and_accept_peer(old, AcceptOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PeerRejection::InvalidVersion(_)));

        // Seeds skip the advertised version, but their reply headers still
        // carry 1.0.0.
        let err = f
            .processor
            .validate_and_accept_peer(remote().with_version("1.9.9"), AcceptOptions { seed: true, ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, PeerRejection::VerificationFailed(_)));
    }

    #[tokio::test]
    async fn test_failure_is_not_stored_and_counts() {
        let ours = fork_chain(&[], 0, 10, 1);
        let theirs = fork_chain(&[], 0, 10, 2);
        let f = fixture(ours, theirs);

        let err = f
            .processor
            .validate_and_accept_peer(remote(), AcceptOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PeerRejection::VerificationFailed(VerificationFailure::NoCommonBlock)
        ));
        assert!(!f.ctx.repository.has(&REMOTE));
        assert_eq!(f.ctx.guard.failures(&REMOTE), 1);
    }

    #[tokio::test]
    async fn test_repeated_failures_suspend() {
        let ours = fork_chain(&[], 0, 10, 1);
        let theirs = fork_chain(&[], 0, 10, 2);
        let f = fixture(ours, theirs);

        for _ in 0..3 {
            let _ = f
                .processor
                .validate_and_accept_peer(remote(), AcceptOptions::default())
                .await;
        }
        let err = f
            .processor
            .validate_and_accept_peer(remote(), AcceptOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PeerRejection::Suspended {
                offence: Offence::NoCommonBlocks,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_eligible_peer_not_reverified_unless_forced() {
        let chain = build_chain(20, 1);
        let f = fixture(chain.clone(), chain);
        f.processor
            .validate_and_accept_peer(remote(), AcceptOptions::default())
            .await
            .unwrap();
        let requests = f.node.requests();

        f.processor
            .validate_and_accept_peer(remote(), AcceptOptions::default())
            .await
            .unwrap();
        assert_eq!(f.node.requests(), requests);

        f.processor
            .validate_and_accept_peer(remote(), AcceptOptions { force: true, ..Default::default() })
            .await
            .unwrap();
        assert!(f.node.requests() > requests);
    }

    #[tokio::test]
    async fn test_demoted_peer_cools_down() {
        let chain = build_chain(20, 1);
        let f = fixture(chain.clone(), chain);
        f.processor
            .validate_and_accept_peer(remote(), AcceptOptions::default())
            .await
            .unwrap();

        f.node.set_offline(true);
        let _ = f
            .processor
            .validate_and_accept_peer(remote(), AcceptOptions { force: true, ..Default::default() })
            .await;
        let stored = f.ctx.repository.get(&REMOTE).unwrap();
        assert!(!stored.is_verified());

        f.time.advance(10);
        let err = f
            .processor
            .validate_and_accept_peer(remote(), AcceptOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PeerRejection::CoolingDown { .. }));

        f.node.set_offline(false);
        f.time.advance(f.ctx.config.verification_cooldown_secs);
        f.processor
            .validate_and_accept_peer(remote(), AcceptOptions::default())
            .await
            .unwrap();
        assert!(f.ctx.repository.get(&REMOTE).unwrap().is_verified());
    }

    #[tokio::test]
    async fn test_rate_limit_by_advertiser() {
        let chain = build_chain(5, 1);
        let config = P2pConfig {
            rate_limit_attempts: 2,
            ..test_config()
        };
        let f = fixture_with(chain.clone(), chain, config);
        let options = AcceptOptions {
            source: Some(ADVERTISER),
            force: true,
            ..Default::default()
        };

        assert!(f.processor.validate_and_accept_peer(remote(), options).await.is_ok());
        assert!(f.processor.validate_and_accept_peer(remote(), options).await.is_ok());
        let err = f
            .processor
            .validate_and_accept_peer(remote(), options)
            .await
            .unwrap_err();
        assert!(matches!(err, PeerRejection::RateLimited { source_ip } if source_ip == ADVERTISER));
    }

    #[tokio::test]
    async fn test_events_published() {
        let chain = build_chain(5, 1);
        let f = fixture(chain.clone(), chain);
        let mut events = f.ctx.subscribe();

        f.processor
            .validate_and_accept_peer(remote(), AcceptOptions::default())
            .await
            .unwrap();
        assert_eq!(
            events.try_recv().unwrap(),
            PeerEvent::Accepted {
                ip: REMOTE,
                height: 5,
                forked: false
            }
        );
    }
}
