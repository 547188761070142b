//! Bounded in-memory transaction pool. Transactions stay opaque strings;
//! validation belongs to the external transaction library.

use async_trait::async_trait;
use dc_01_peer_network::TransactionSink;
use parking_lot::Mutex;
use shared_types::{BoundedFifoSet, SerializedTransaction};

use crate::ports::TransactionPool;

pub struct MemoryTransactionPool {
    pending: Mutex<BoundedFifoSet<SerializedTransaction>>,
}

impl MemoryTransactionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(BoundedFifoSet::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn contains(&self, transaction: &SerializedTransaction) -> bool {
        self.pending.lock().contains(transaction)
    }
}

#[async_trait]
impl TransactionPool for MemoryTransactionPool {
    async fn remove_confirmed(&self, transactions: &[SerializedTransaction]) {
        let mut pending = self.pending.lock();
        for tx in transactions {
            pending.remove(tx);
        }
    }

    async fn requeue(&self, transactions: Vec<SerializedTransaction>) {
        let mut pending = self.pending.lock();
        for tx in transactions {
            pending.insert(tx);
        }
    }

    async fn pooled(&self, limit: usize) -> Vec<SerializedTransaction> {
        self.pending.lock().iter().take(limit).cloned().collect()
    }
}

#[async_trait]
impl TransactionSink for MemoryTransactionPool {
    /// Returns how many were new to the pool.
    async fn submit_transactions(&self, transactions: Vec<SerializedTransaction>) -> usize {
        let mut pending = self.pending.lock();
        transactions
            .into_iter()
            .filter(|tx| !tx.is_empty())
            .filter(|tx| pending.insert(tx.clone()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_confirmed_transactions_leave_the_pool() {
        let pool = MemoryTransactionPool::new(10);
        let accepted = pool
            .submit_transactions(vec!["aa".into(), "bb".into(), "aa".into(), String::new()])
            .await;
        assert_eq!(accepted, 2);

        pool.remove_confirmed(&["aa".to_string()]).await;
        assert_eq!(pool.pooled(10).await, vec!["bb".to_string()]);

        pool.requeue(vec!["aa".into()]).await;
        assert!(pool.contains(&"aa".to_string()));
        assert_eq!(pool.len(), 2);
    }
}
