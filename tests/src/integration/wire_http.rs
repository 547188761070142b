//! # Peer Protocol over HTTP
//!
//! One complete [`NodeRuntime`] on loopback, driven through the same
//! `HttpTransport` its peers would use.

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::fixtures::{Cluster, NOW};
    use dc_01_peer_network::domain::{BlocksReply, PeerListReply, StatusReply};
    use dc_01_peer_network::test_utils::FixedTimeSource;
    use dc_01_peer_network::{HttpTransport, PeerTransport, ProtocolHeaders, WireRequest};
    use dc_02_block_sync::{DatabaseService, SyncState};
    use node_runtime::{NodeRuntime, SubsystemContainer};

    async fn start_node(cluster: &Cluster, blocks: u64) -> (NodeRuntime, ProtocolHeaders) {
        let mut config = cluster.config(Vec::new());
        config.node.bind_address = IpAddr::V4(Ipv4Addr::LOCALHOST);
        config.p2p.port = 0;
        config.p2p.network_start = true;
        config.api.enabled = true;
        config.api.port = 0;

        let container = SubsystemContainer::with_transport(
            config,
            cluster.network.transport_for(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            Arc::new(FixedTimeSource::new(NOW)),
        )
        .unwrap();
        for block in cluster.chain(blocks).iter().skip(1) {
            container.store.save_block(block).await.unwrap();
        }
        let headers = ProtocolHeaders::new(
            container.config.p2p.nethash.clone(),
            container.config.p2p.version.clone(),
            4002,
        );

        let mut runtime = NodeRuntime::with_container(container);
        runtime.start().await.unwrap();
        let mut status = runtime.container().sync.subscribe_status();
        tokio::time::timeout(
            Duration::from_secs(10),
            status.wait_for(|s| s.state == SyncState::Idle),
        )
        .await
        .unwrap()
        .unwrap();
        (runtime, headers)
    }

    fn transport() -> HttpTransport {
        HttpTransport::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_node_serves_its_chain() {
        let cluster = Cluster::new();
        let (runtime, headers) = start_node(&cluster, 20).await;
        let target: SocketAddr = runtime.p2p_address().unwrap();

        let reply = transport().send(target, &headers, &WireRequest::GetStatus).await.unwrap();
        let status: StatusReply = serde_json::from_value(reply.body).unwrap();
        assert_eq!(status.height, 20);
        assert_eq!(status.header.generator_public_key, cluster.delegate());

        let reply = transport()
            .send(target, &headers, &WireRequest::GetBlocks { from_height: 15, limit: 50 })
            .await
            .unwrap();
        let blocks: BlocksReply = serde_json::from_value(reply.body).unwrap();
        let heights: Vec<u64> = blocks.blocks.iter().map(|b| b.height()).collect();
        assert_eq!(heights, vec![16, 17, 18, 19, 20]);

        let reply = transport().send(target, &headers, &WireRequest::GetPeers).await.unwrap();
        let peers: PeerListReply = serde_json::from_value(reply.body).unwrap();
        assert!(peers.success);

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_posted_block_is_applied() {
        let cluster = Cluster::new();
        let (runtime, headers) = start_node(&cluster, 20).await;
        let target = runtime.p2p_address().unwrap();

        let next = cluster.extend(&cluster.chain(20), 1, 1).pop().unwrap();
        let reply = transport()
            .send(target, &headers, &WireRequest::PostBlock { block: Box::new(next.clone()) })
            .await
            .unwrap();
        assert!(reply.is_success());

        let container = runtime.container();
        tokio::time::timeout(Duration::from_secs(10), async {
            while container.store.height() < 21 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(container.processor.tip().map(|h| h.id), Some(next.id()));

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_block_from_a_future_slot_is_discarded() {
        let cluster = Cluster::new();
        let (runtime, headers) = start_node(&cluster, 20).await;
        let target = runtime.p2p_address().unwrap();

        let chain = cluster.chain(20);
        // Slot 1300 is still 50 slots away.
        let early = node_runtime::adapters::forge_block(
            cluster.key(),
            &chain[19].header,
            1_300 * 8,
            Vec::new(),
        );
        let reply = transport()
            .send(target, &headers, &WireRequest::PostBlock { block: Box::new(early) })
            .await
            .unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["success"], false);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runtime.container().store.height(), 20);

        runtime.shutdown().await;
    }
}
