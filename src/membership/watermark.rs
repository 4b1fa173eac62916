//! Watermark Buffer
//!
//! Aggregates noisy per-ring edge reports into a stable multi-node proposal.
//!
//! ## Mechanism
//! - **Watermarks**: an observed endpoint with at least L ring reports is
//!   "unstable"; one with at least H is "stable" and joins the pending
//!   proposal. L < H leaves a graceful period that absorbs racy reports.
//! - **Aggregation principle**: a proposal is emitted only when no endpoint
//!   sits in the unstable zone, so the emitted set reflects a settled
//!   coalition of observations rather than a transient spike.
//! - **One proposal per configuration**: after emitting, the buffer is sealed
//!   until the next configuration resets it.

use super::types::{Endpoint, Proposal};
use crate::transport::protocol::LinkUpdate;
use std::collections::{HashMap, HashSet};

/// Order-insensitive aggregator of `(observed, ring)` reports.
///
/// Only the protocol loop touches the buffer, so it carries no locking.
#[derive(Debug)]
pub struct WatermarkBuffer {
    k: usize,
    h: usize,
    l: usize,
    reports: HashMap<Endpoint, HashSet<u32>>,
    /// Endpoints whose report count is in [L, H).
    unstable: usize,
    /// Endpoints that crossed H, awaiting emission.
    pending: Vec<Endpoint>,
    sealed: bool,
}

impl WatermarkBuffer {
    pub fn new(k: usize, h: usize, l: usize) -> Self {
        assert!(l < h && h <= k, "watermarks must satisfy L < H <= K");
        Self {
            k,
            h,
            l,
            reports: HashMap::new(),
            unstable: 0,
            pending: Vec::new(),
            sealed: false,
        }
    }

    /// Folds one batch of link updates into the buffer. Returns a proposal
    /// when the batch leaves at least one stable endpoint and none unstable;
    /// flushes within the same batch are combined so that concurrent changes
    /// land in a single atomic proposal.
    pub fn aggregate(&mut self, updates: &[LinkUpdate]) -> Option<Proposal> {
        if self.sealed {
            return None;
        }

        let mut proposal: Vec<Endpoint> = Vec::new();
        for update in updates {
            proposal.extend(self.record(&update.link_dst, update.ring_number));
        }

        if proposal.is_empty() {
            return None;
        }
        self.sealed = true;
        proposal.sort();
        proposal.dedup();
        Some(proposal)
    }

    /// Records a single (observed, ring) report. Duplicate reports from the
    /// same ring are idempotent. Returns the pending set when this report
    /// empties the unstable zone.
    fn record(&mut self, observed: &Endpoint, ring: u32) -> Vec<Endpoint> {
        if ring as usize >= self.k {
            tracing::warn!("Dropping report for {} on out-of-range ring {}", observed, ring);
            return Vec::new();
        }

        let rings = self.reports.entry(observed.clone()).or_default();
        if !rings.insert(ring) {
            return Vec::new();
        }

        let count = rings.len();
        if count == self.l {
            self.unstable += 1;
        }
        if count == self.h {
            self.unstable -= 1;
            self.pending.push(observed.clone());
            if self.unstable == 0 {
                return std::mem::take(&mut self.pending);
            }
        }
        Vec::new()
    }

    /// Discards all state for the next configuration.
    pub fn clear(&mut self) {
        self.reports.clear();
        self.pending.clear();
        self.unstable = 0;
        self.sealed = false;
    }
}
