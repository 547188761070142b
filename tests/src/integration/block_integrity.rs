//! # Block Integrity
//!
//! A block is bound to its id by the header fields and the payload hash, and
//! to its generator by the signature. Changing either after forging must get
//! the block rejected, even when its id was verified before.

#[cfg(test)]
mod tests {
    use crate::fixtures::{Cluster, TestNode};
    use dc_02_block_sync::RejectReason;
    use ed25519_dalek::{Signer, SigningKey};
    use node_runtime::adapters::forge_block;
    use shared_types::Block;

    async fn single_node(cluster: &Cluster, chain: &[Block]) -> TestNode {
        let mut config = cluster.config(Vec::new());
        config.p2p.network_start = true;
        let local = cluster.add_with(1, chain, config).await;
        local.start();
        local.wait_for_idle_at(chain.len() as u64).await;
        local
    }

    fn next_block(cluster: &Cluster, chain: &[Block], transactions: Vec<String>) -> Block {
        let previous = &chain[chain.len() - 1].header;
        forge_block(cluster.key(), previous, previous.timestamp + 8, transactions)
    }

    #[tokio::test]
    async fn test_swapped_payload_is_rejected() {
        let cluster = Cluster::new();
        let chain = cluster.chain(20);
        let local = single_node(&cluster, &chain).await;

        let genuine = next_block(&cluster, &chain, vec!["aa".into(), "bb".into()]);
        let mut swapped = genuine.clone();
        swapped.transactions = vec!["cc".into(), "dd".into()];
        let mut reordered = genuine.clone();
        reordered.transactions.reverse();

        for candidate in [swapped, reordered] {
            let outcome = local.container.processor.accept(candidate).await.unwrap();
            assert_eq!(outcome.rejection(), Some(RejectReason::InvalidBlock));
        }
        assert_eq!(local.height(), 20);

        let outcome = local.container.processor.accept(genuine.clone()).await.unwrap();
        assert!(outcome.is_accepted());
        assert_eq!(local.tip_id(), Some(genuine.id()));
    }

    #[tokio::test]
    async fn test_cached_id_does_not_carry_a_tampered_block() {
        let cluster = Cluster::new();
        let chain = cluster.chain(20);
        let local = single_node(&cluster, &chain).await;
        let processor = &local.container.processor;

        let genuine = next_block(&cluster, &chain, vec!["aa".into()]);
        processor.network().verified_blocks.insert(&genuine.header);

        // Another key takes credit for the block.
        let intruder = SigningKey::from_bytes(&[9; 32]);
        let mut stolen = genuine.clone();
        stolen.header.generator_public_key = hex::encode(intruder.verifying_key().as_bytes());
        stolen.header.signature = hex::encode(intruder.sign(genuine.id().as_bytes()).to_bytes());

        // Same content and id, signed by the wrong key.
        let mut resigned = genuine.clone();
        resigned.header.signature = hex::encode(intruder.sign(genuine.id().as_bytes()).to_bytes());

        let mut stuffed = genuine.clone();
        stuffed.transactions = vec!["zz".into()];

        for candidate in [stolen, resigned, stuffed] {
            let outcome = processor.accept(candidate).await.unwrap();
            assert_eq!(outcome.rejection(), Some(RejectReason::InvalidBlock));
        }
        assert_eq!(local.height(), 20);

        assert!(processor.accept(genuine).await.unwrap().is_accepted());
        assert_eq!(local.height(), 21);
    }
}
