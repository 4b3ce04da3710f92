//! Per-file progress tracking for one batch.
//!
//! Transfers never touch the progress vector directly. Each one owns a
//! [`ProgressReporter`] bound to its own index and sends [`ProgressSignal`]s
//! to the orchestrator, which applies them to the [`ProgressAggregator`].
//! Slot writes are therefore index-disjoint by construction: the orchestrator
//! hands out exactly one reporter per position.

use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSignal {
    Began { index: usize },
    Tick { index: usize, percent: u8 },
}

/// Positional vector of completion percentages.
#[derive(Debug, Default)]
pub struct ProgressAggregator {
    slots: Vec<u8>,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroes the vector for a batch of `len` files.
    pub fn reset(&mut self, len: usize) {
        self.slots = vec![0; len];
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Writes `percent` into slot `index` and returns the merged snapshot.
    /// Returns `None` for an index outside the current batch.
    pub fn report(&mut self, index: usize, percent: u8) -> Option<Vec<u8>> {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = percent.min(100);
                Some(self.slots.clone())
            }
            None => {
                tracing::warn!(
                    "Progress for index {} ignored, batch has {} files",
                    index,
                    self.slots.len()
                );
                None
            }
        }
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.slots.clone()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Handle a single transfer uses to announce its start and byte progress.
#[derive(Debug)]
pub struct ProgressReporter {
    index: usize,
    tx: UnboundedSender<ProgressSignal>,
    last: Option<u8>,
}

impl ProgressReporter {
    pub fn new(index: usize, tx: UnboundedSender<ProgressSignal>) -> Self {
        Self {
            index,
            tx,
            last: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn begin(&self) {
        let _ = self.tx.send(ProgressSignal::Began { index: self.index });
    }

    /// Reports `sent` of `total` bytes. Nothing is reported when the total is
    /// unknown, and the percentage never goes backwards.
    pub fn advance(&mut self, sent: u64, total: u64) {
        let Some(percent) = percent_of(sent, total) else {
            return;
        };
        let percent = self.last.map_or(percent, |last| percent.max(last));
        self.last = Some(percent);
        let _ = self.tx.send(ProgressSignal::Tick {
            index: self.index,
            percent,
        });
    }

    /// Marks the transfer finished. Used for bodies that never yield a chunk.
    pub fn complete(&mut self) {
        if self.last == Some(100) {
            return;
        }
        self.last = Some(100);
        let _ = self.tx.send(ProgressSignal::Tick {
            index: self.index,
            percent: 100,
        });
    }
}

/// `round(sent * 100 / total)`, capped at 100.
pub fn percent_of(sent: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let sent = sent.min(total) as u128;
    let total = total as u128;
    let rounded = (sent * 200 + total) / (total * 2);
    Some(rounded.min(100) as u8)
}
