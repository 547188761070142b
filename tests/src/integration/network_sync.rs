//! # Catch-up and Propagation
//!
//! A fresh node downloads the cluster's chain; a forged block spreads to
//! every peer through `POST /v1/peer/blocks`.

#[cfg(test)]
mod tests {
    use crate::fixtures::{address, Cluster};
    use dc_02_block_sync::{ForgerHooks, SyncState};

    #[tokio::test]
    async fn test_fresh_node_catches_up_with_cluster() {
        let cluster = Cluster::new();
        let chain = cluster.chain(60);
        let seeds = vec![address(2), address(3), address(4)];

        let mut peers = Vec::new();
        for n in 2..=4 {
            peers.push(cluster.add(n, &chain, Vec::new()).await);
        }
        let fresh = cluster.add(1, &chain[..1], seeds).await;
        fresh.start();

        let status = fresh.wait_for_idle_at(60).await;
        assert_eq!(status.network_height, 60);
        assert_eq!(fresh.height(), 60);
        assert_eq!(fresh.tip_id(), Some(chain[59].id()));
        assert_eq!(fresh.container.network.eligible_peers().len(), 3);
    }

    #[tokio::test]
    async fn test_download_spans_several_chunks() {
        // test_config caps a download at 100 blocks.
        let cluster = Cluster::new();
        let chain = cluster.chain(250);
        let a = cluster.add(2, &chain, Vec::new()).await;
        let b = cluster.add(3, &chain, Vec::new()).await;
        let fresh = cluster.add(1, &chain[..1], vec![a.address, b.address]).await;
        fresh.start();

        fresh.wait_for_idle_at(250).await;
        assert_eq!(fresh.tip_id(), Some(chain[249].id()));
    }

    #[tokio::test]
    async fn test_forged_block_reaches_every_peer() {
        let cluster = Cluster::new();
        let chain = cluster.chain(20);
        let all = [address(1), address(2), address(3)];

        let mut nodes = Vec::new();
        for n in 1..=3u8 {
            let seeds = all.iter().copied().filter(|a| *a != address(n)).collect();
            nodes.push(cluster.add(n, &chain, seeds).await);
        }
        for node in &nodes {
            node.start();
        }
        for node in &nodes {
            node.wait_for_idle_at(20).await;
        }

        let block = node_runtime::adapters::forge_block(
            cluster.key(),
            &chain[19].header,
            chain[19].timestamp() + 8,
            vec!["00ff".into()],
        );
        let outcome = nodes[0]
            .container
            .sync
            .submit_forged_block(block.clone())
            .await
            .unwrap();
        assert!(outcome.is_accepted());

        for node in &nodes[1..] {
            node.wait_for_height(21).await;
            assert_eq!(node.tip_id(), Some(block.id()));
        }
        let status = nodes[1].wait_for(|s| s.state == SyncState::Idle).await;
        assert_eq!(status.tip_height, 21);
    }
}
