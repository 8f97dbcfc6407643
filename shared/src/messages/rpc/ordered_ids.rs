use std::collections::VecDeque;

use crate::RpcSequence;

/// Out-of-order buffer kept sorted by sequence, smallest at the front
pub struct OrderedIds<P> {
    inner: VecDeque<(RpcSequence, P)>,
}

impl<P> Default for OrderedIds<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> OrderedIds<P> {
    pub fn new() -> Self {
        Self {
            inner: VecDeque::new(),
        }
    }

    /// Inserts in order. Returns false and drops `item` if the sequence is
    /// already buffered.
    pub fn push_back(&mut self, sequence: RpcSequence, item: P) -> bool {
        let mut current_index = self.inner.len();

        loop {
            if current_index == 0 {
                self.inner.push_front((sequence, item));
                return true;
            }

            current_index -= 1;

            let old_sequence = self.inner[current_index].0;
            if old_sequence == sequence {
                return false;
            }
            if old_sequence < sequence {
                self.inner.insert(current_index + 1, (sequence, item));
                return true;
            }
        }
    }

    pub fn peek_front(&self) -> Option<&(RpcSequence, P)> {
        self.inner.front()
    }

    pub fn pop_front(&mut self) -> Option<(RpcSequence, P)> {
        self.inner.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}
