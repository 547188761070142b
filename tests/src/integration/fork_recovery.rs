//! # Fork Recovery
//!
//! A node on a minority branch rolls back to the common block and follows
//! the majority. Peers serving badly signed blocks never become eligible.

#[cfg(test)]
mod tests {
    use crate::fixtures::{address, Cluster};

    #[tokio::test]
    async fn test_minority_branch_rolls_back_to_majority() {
        let cluster = Cluster::new();
        let common = cluster.chain(30);
        let majority = cluster.extend(&common, 20, 1);
        // Two slots per block: same heights, different ids.
        let minority = cluster.extend(&common, 5, 2);
        assert_ne!(minority[34].id(), majority[34].id());

        let mut peers = Vec::new();
        for n in 2..=4 {
            peers.push(cluster.add(n, &majority, Vec::new()).await);
        }
        let local = cluster
            .add(1, &minority, vec![address(2), address(3), address(4)])
            .await;
        local.start();

        let status = local.wait_for_idle_at(50).await;
        assert_eq!(status.network_height, 50);
        assert_eq!(local.tip_id(), Some(majority[49].id()));
        // Nothing of the minority branch survives.
        assert_eq!(local.container.store.height(), 50);
    }

    #[tokio::test]
    async fn test_peer_with_forged_signatures_is_not_used() {
        let cluster = Cluster::new();
        let chain = cluster.chain(40);
        // Its own branch, with ids no honest peer serves.
        let mut tampered = cluster.extend(&chain[..4], 36, 2);
        for block in tampered.iter_mut().skip(4) {
            block.header.signature = hex::encode([0x11u8; 64]);
        }

        let a = cluster.add(2, &chain, Vec::new()).await;
        let b = cluster.add(3, &chain, Vec::new()).await;
        let liar = cluster.add(4, &tampered, Vec::new()).await;
        let local = cluster
            .add(1, &chain[..1], vec![a.address, b.address, liar.address])
            .await;
        local.start();

        local.wait_for_idle_at(40).await;
        assert_eq!(local.tip_id(), Some(chain[39].id()));

        let eligible: Vec<_> = local
            .container
            .network
            .eligible_peers()
            .iter()
            .map(|peer| peer.ip)
            .collect();
        assert!(eligible.contains(&a.ip()));
        assert!(eligible.contains(&b.ip()));
        assert!(!eligible.contains(&liar.ip()));
    }

    #[tokio::test]
    async fn test_resigned_copy_of_good_chain_is_not_used() {
        let cluster = Cluster::new();
        let chain = cluster.chain(40);
        // Same ids as the honest chain, so honest peers fill the verified
        // cache with them first; only the signatures differ.
        let mut resigned = chain.clone();
        for block in resigned.iter_mut().skip(1) {
            block.header.signature = hex::encode([0x11u8; 64]);
        }

        let a = cluster.add(2, &chain, Vec::new()).await;
        let b = cluster.add(3, &chain, Vec::new()).await;
        let liar = cluster.add(4, &resigned, Vec::new()).await;
        let local = cluster
            .add(1, &chain[..1], vec![a.address, b.address, liar.address])
            .await;
        local.start();

        local.wait_for_idle_at(40).await;
        assert_eq!(local.tip_id(), Some(chain[39].id()));
        let tip = local.container.processor.tip().unwrap();
        assert_eq!(tip.signature, chain[39].header.signature);

        let eligible: Vec<_> = local
            .container
            .network
            .eligible_peers()
            .iter()
            .map(|peer| peer.ip)
            .collect();
        assert!(!eligible.contains(&liar.ip()));
    }

    #[tokio::test]
    async fn test_pushed_block_from_other_branch_is_not_applied() {
        let cluster = Cluster::new();
        let chain = cluster.chain(20);
        let mut config = cluster.config(Vec::new());
        config.p2p.network_start = true;
        let local = cluster.add_with(1, &chain, config).await;
        local.start();
        local.wait_for_idle_at(20).await;

        // Competes with our block 20 on a different parent slot.
        let rival = cluster.extend(&chain[..19], 1, 3).pop().unwrap();
        let outcome = local
            .container
            .processor
            .accept(rival.clone())
            .await
            .unwrap();
        assert!(!outcome.is_accepted());
        assert_eq!(local.tip_id(), Some(chain[19].id()));
    }
}
