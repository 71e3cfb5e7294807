//! Sequence-number barrier: "has the server processed everything I sent?"

use tracing::debug;

/// What a `done` event did to the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Matched the pending sync.
    Resolved,
    /// A sync is pending but this `done` belongs to an older one.
    Stale { seq: u32, pending: u32 },
    /// Nothing was pending.
    Idle,
}

#[derive(Debug, Clone, Default)]
pub struct SyncBarrier {
    next: u32,
    pending: Option<u32>,
}

impl SyncBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(seq: u32) -> Self {
        Self {
            next: seq,
            pending: None,
        }
    }

    /// The sequence number the next sync will carry.
    pub fn peek(&self) -> u32 {
        self.next
    }

    /// Record `seq` as the pending sync. Call only once the request was sent.
    pub fn commit(&mut self, seq: u32) {
        self.pending = Some(seq);
        self.next = seq.wrapping_add(1);
    }

    pub fn pending(&self) -> Option<u32> {
        self.pending
    }

    pub fn complete(&mut self, seq: u32) -> SyncOutcome {
        match self.pending {
            Some(pending) if pending == seq => {
                self.pending = None;
                SyncOutcome::Resolved
            }
            Some(pending) => {
                debug!("ignoring done {} while waiting for {}", seq, pending);
                SyncOutcome::Stale { seq, pending }
            }
            None => {
                debug!("ignoring done {} with no sync pending", seq);
                SyncOutcome::Idle
            }
        }
    }

    pub fn reset(&mut self) {
        self.pending = None;
    }
}
