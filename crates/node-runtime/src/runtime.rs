//! # Node Runtime
//!
//! Owns the subsystem container and every background task.
//!
//! ## Startup Sequence
//!
//! 1. Bind the peer listener (and the node API listener when enabled)
//! 2. Start event routing so no early event is missed
//! 3. Admit seed peers, then run the network monitor loop
//! 4. Run the sync loop and request its first cycle
//!
//! ## Shutdown Sequence
//!
//! One `watch` channel fans the stop signal out to every task. Tasks get
//! `shutdown_grace_secs` to return before they are aborted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dc_01_peer_network::PeerNetworkApi;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::container::{NodeConfig, SubsystemContainer};
use crate::handlers::{node_router, peer_router, NodeApiState};
use crate::wiring::EventRouter;

pub struct NodeRuntime {
    container: Arc<SubsystemContainer>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    p2p_address: Option<SocketAddr>,
    api_address: Option<SocketAddr>,
}

impl NodeRuntime {
    pub fn new(config: NodeConfig) -> Result<Self> {
        let container = SubsystemContainer::new(config).context("cannot build subsystems")?;
        Ok(Self::with_container(container))
    }

    pub fn with_container(container: SubsystemContainer) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            container: Arc::new(container),
            shutdown_tx,
            tasks: Vec::new(),
            p2p_address: None,
            api_address: None,
        }
    }

    pub fn container(&self) -> Arc<SubsystemContainer> {
        Arc::clone(&self.container)
    }

    /// Bound peer listener address, once started.
    pub fn p2p_address(&self) -> Option<SocketAddr> {
        self.p2p_address
    }

    pub fn api_address(&self) -> Option<SocketAddr> {
        self.api_address
    }

    pub async fn start(&mut self) -> Result<()> {
        let config = &self.container.config;
        info!(
            network = %config.node.network,
            nethash = %config.p2p.nethash,
            version = %config.p2p.version,
            "[node] starting delegate-chain node"
        );

        let listener = TcpListener::bind(config.p2p_address())
            .await
            .with_context(|| format!("cannot bind peer listener on {}", config.p2p_address()))?;
        let p2p_address = listener.local_addr()?;
        let peers = peer_router(self.container.responder.clone())
            .into_make_service_with_connect_info::<SocketAddr>();
        let stop = self.stopped();
        self.spawn("peer-api", async move {
            if let Err(e) = axum::serve(listener, peers).with_graceful_shutdown(stop).await {
                warn!("[node] peer listener failed: {e}");
            }
        });
        self.p2p_address = Some(p2p_address);
        info!(address = %p2p_address, "[node] peer api listening");

        if self.container.config.api.enabled {
            let address = self.container.config.api_address();
            let listener = TcpListener::bind(address)
                .await
                .with_context(|| format!("cannot bind node api listener on {address}"))?;
            let api_address = listener.local_addr()?;
            let router = node_router(NodeApiState {
                hooks: self.container.sync.clone(),
                network: self.container.network.clone(),
            });
            let stop = self.stopped();
            self.spawn("node-api", async move {
                if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(stop).await {
                    warn!("[node] node api listener failed: {e}");
                }
            });
            self.api_address = Some(api_address);
            info!(address = %api_address, "[node] node api listening");
        }

        let router = EventRouter::new(&self.container);
        let rx = self.shutdown_tx.subscribe();
        self.spawn("event-routing", router.run(rx));

        let monitor = self.container.monitor.clone();
        let rx = self.shutdown_tx.subscribe();
        self.spawn("network-monitor", async move {
            monitor.start().await;
            monitor.run(rx).await;
        });

        let sync = self.container.sync.clone();
        let rx = self.shutdown_tx.subscribe();
        self.spawn("block-sync", sync.run(rx));
        self.container.sync.request();

        info!(
            eligible_peers = self.container.monitor.eligible_peer_count(),
            "[node] node started"
        );
        Ok(())
    }

    /// Signal every task to stop and wait for them.
    pub async fn shutdown(mut self) {
        info!("[node] initiating graceful shutdown");
        if self.shutdown_tx.send(true).is_err() {
            warn!("[node] no task was listening for shutdown");
        }

        let grace = Duration::from_secs(self.container.config.node.shutdown_grace_secs);
        for (name, mut handle) in self.tasks.drain(..) {
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                warn!(task = name, "[node] task did not stop in time, aborting");
                handle.abort();
            }
        }
        info!("[node] shutdown complete");
    }

    fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.push((name, tokio::spawn(task)));
    }

    /// Resolves once shutdown was signalled.
    fn stopped(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown_tx.subscribe();
        async move {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dc_01_peer_network::domain::StatusReply;
    use dc_01_peer_network::test_utils::{FixedTimeSource, SimulatedNetwork};
    use dc_01_peer_network::{HttpTransport, PeerTransport, ProtocolHeaders, WireRequest};
    use dc_02_block_sync::SyncState;
    use std::net::{IpAddr, Ipv4Addr};

    const DELEGATE: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

    fn runtime() -> NodeRuntime {
        let mut config = NodeConfig::default();
        config.node.bind_address = IpAddr::V4(Ipv4Addr::LOCALHOST);
        config.node.shutdown_grace_secs = 2;
        config.p2p.port = 0;
        config.p2p.network_start = true;
        config.api.port = 0;
        config.sync.allow_single_node = true;
        config.chain.delegates = vec![DELEGATE.into()];

        let network = SimulatedNetwork::new();
        let container = SubsystemContainer::with_transport(
            config,
            network.transport_for(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            Arc::new(FixedTimeSource::new(1_000)),
        )
        .unwrap();
        NodeRuntime::with_container(container)
    }

    #[tokio::test]
    async fn test_start_serves_and_syncs() {
        let mut runtime = runtime();
        runtime.start().await.unwrap();
        let container = runtime.container();

        let mut status = container.sync.subscribe_status();
        tokio::time::timeout(Duration::from_secs(5), async {
            while status.borrow_and_update().state != SyncState::Idle {
                status.changed().await.unwrap();
            }
        })
        .await
        .expect("sync loop reaches idle");

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let headers = ProtocolHeaders::new(
            container.config.p2p.nethash.clone(),
            container.config.p2p.version.clone(),
            4002,
        );
        let reply = transport
            .send(runtime.p2p_address().unwrap(), &headers, &WireRequest::GetStatus)
            .await
            .unwrap();
        let status: StatusReply = serde_json::from_value(reply.body).unwrap();
        assert_eq!(status.height, 1);
        assert_eq!(status.header.id, container.genesis_id);

        let health = reqwest::get(format!("http://{}/health", runtime.api_address().unwrap()))
            .await
            .unwrap();
        assert_eq!(health.status().as_u16(), 200);

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_listeners() {
        let mut runtime = runtime();
        runtime.start().await.unwrap();
        let address = runtime.p2p_address().unwrap();
        runtime.shutdown().await;

        let refused = tokio::net::TcpStream::connect(address).await;
        assert!(refused.is_err());
    }
}
