//! Per-address rate limiting of peer advertisements.
//!
//! Fixed window per remote address: at most `limit` attempts per
//! `window_secs`. Excess attempts are refused outright so the caller drops
//! them instead of queueing. Records live in a bounded map so a flood of
//! distinct addresses cannot grow memory without limit.

use parking_lot::Mutex;
use shared_types::BoundedFifoMap;
use std::net::IpAddr;

pub struct PeerRateLimiter {
    limit: u32,
    window_secs: u64,
    /// address -> (count, window_start)
    records: Mutex<BoundedFifoMap<IpAddr, (u32, u64)>>,
}

impl std::fmt::Debug for PeerRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerRateLimiter")
            .field("limit", &self.limit)
            .field("window_secs", &self.window_secs)
            .finish()
    }
}

impl PeerRateLimiter {
    pub fn new(limit: u32, window_secs: u64, tracked_addresses: usize) -> Self {
        Self {
            limit: limit.max(1),
            window_secs: window_secs.max(1),
            records: Mutex::new(BoundedFifoMap::new(tracked_addresses)),
        }
    }

    /// Count an attempt from `source`. Returns `false` when over the limit.
    pub fn check(&self, source: IpAddr, now: u64) -> bool {
        let mut records = self.records.lock();

        let (count, window_start) = records.get(&source).copied().unwrap_or((0, now));
        if now >= window_start + self.window_secs {
            records.insert(source, (1, now));
            return true;
        }
        if count >= self.limit {
            return false;
        }
        records.insert(source, (count + 1, window_start));
        true
    }

    /// Forget windows that have ended.
    pub fn gc(&self, now: u64) {
        let window = self.window_secs;
        self.records
            .lock()
            .retain(|_, (_, start)| now < *start + window);
    }

    pub fn tracked(&self) -> usize {
        self.records.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const A: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    const B: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

    #[test]
    fn test_limit_within_window() {
        let limiter = PeerRateLimiter::new(3, 60, 16);
        assert!(limiter.check(A, 0));
        assert!(limiter.check(A, 1));
        assert!(limiter.check(A, 2));
        assert!(!limiter.check(A, 3));
        // Other sources are independent.
        assert!(limiter.check(B, 3));
    }

    #[test]
    fn test_window_reset() {
        let limiter = PeerRateLimiter::new(1, 60, 16);
        assert!(limiter.check(A, 0));
        assert!(!limiter.check(A, 59));
        assert!(limiter.check(A, 60));
    }

    #[test]
    fn test_gc_drops_ended_windows() {
        let limiter = PeerRateLimiter::new(5, 10, 16);
        limiter.check(A, 0);
        limiter.check(B, 8);
        limiter.gc(12);
        assert_eq!(limiter.tracked(), 1);
    }
}
