//! N-ary search for the highest common block height.
//!
//! Two chains on the same network agree on a prefix `[1, c]` and diverge
//! above it. Each round probes `n` heights spread across the remaining
//! interval and narrows it to the gap above the highest matching probe, so
//! a peer is asked O(log_n(range)) questions instead of one per height.

use std::future::Future;

/// Answer to one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Highest of the probed heights at which both chains agree.
    Highest(u64),
    /// None of the probed heights are common.
    NoneCommon,
}

#[derive(Debug, Clone, Copy)]
pub struct NarySearch {
    n: u64,
}

impl Default for NarySearch {
    fn default() -> Self {
        Self::new(8)
    }
}

impl NarySearch {
    pub fn new(n: u64) -> Self {
        Self { n: n.max(2) }
    }

    /// Find the highest common height in `[low, high]`, or `None` if even
    /// `low` is not common. The probe must answer with one of the heights
    /// it was given; any other answer ends the search with `None`.
    pub async fn find<F, Fut, E>(&self, low: u64, high: u64, mut probe: F) -> Result<Option<u64>, E>
    where
        F: FnMut(Vec<u64>) -> Fut,
        Fut: Future<Output = Result<ProbeOutcome, E>>,
    {
        if high < low {
            return Ok(None);
        }
        let (mut low, mut high) = (low, high);

        while high - low > self.n + 1 {
            let points = self.probe_points(low, high);
            match probe(points.clone()).await? {
                ProbeOutcome::NoneCommon => {
                    high = points[0] - 1;
                }
                ProbeOutcome::Highest(found) => {
                    let Some(index) = points.iter().position(|h| *h == found) else {
                        return Ok(None);
                    };
                    low = found;
                    if let Some(next) = points.get(index + 1) {
                        high = next - 1;
                    }
                }
            }
        }

        match probe((low..=high).collect()).await? {
            ProbeOutcome::Highest(found) if (low..=high).contains(&found) => Ok(Some(found)),
            _ => Ok(None),
        }
    }

    /// `n` strictly increasing heights in `(low, high)`.
    fn probe_points(&self, low: u64, high: u64) -> Vec<u64> {
        let step = (high - low) / (self.n + 1);
        (1..=self.n).map(|i| low + step * i).collect()
    }
}
