//! Bounded FIFO command queue between submission and tick execution.
//!
//! Commands wait here from the moment a batch arrives until the next
//! tick drains them, so mutations only ever land on tick boundaries.
//! Submission order is preserved exactly — command A enqueued before
//! command B is applied before B. Overflow is reported per command via
//! a `QueueFull` receipt; nothing is silently dropped.

use std::collections::VecDeque;
use stellwerk_core::{Command, CommandError, Receipt};

/// One queued command with its origin bookkeeping, so receipts can be
/// routed back to the submitting batch.
#[derive(Debug)]
pub struct QueuedCommand {
    /// The command to apply.
    pub command: Command,
    /// Identifier of the submitting batch, assigned by the caller.
    pub batch: usize,
    /// Index of this command within its batch.
    pub index: usize,
}

/// Bounded FIFO command queue.
pub struct CommandQueue {
    entries: VecDeque<QueuedCommand>,
    capacity: usize,
}

impl CommandQueue {
    /// A queue holding at most `capacity` commands.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "CommandQueue capacity must be at least 1");
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Enqueue a batch. Commands are accepted in order until the queue
    /// is full; the rest get `QueueFull` receipts, returned here.
    pub fn submit(&mut self, batch: usize, commands: Vec<Command>) -> Vec<Receipt> {
        let mut overflow = Vec::new();
        for (index, command) in commands.into_iter().enumerate() {
            if self.entries.len() >= self.capacity {
                overflow.push(Receipt::rejected(index, CommandError::QueueFull));
                continue;
            }
            self.entries.push_back(QueuedCommand {
                command,
                batch,
                index,
            });
        }
        overflow
    }

    /// Remove and return everything, in submission order.
    pub fn drain(&mut self) -> Vec<QueuedCommand> {
        self.entries.drain(..).collect()
    }

    /// Discard all pending commands (shutdown path).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of buffered commands.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of buffered commands.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
