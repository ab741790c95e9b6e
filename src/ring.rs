//! Fixed-capacity ring buffer of words.

use crate::Word;

/// Bounded FIFO storage for one channel.
///
/// Logical index `k` (for `k` in `[0, len)`) lives at storage index
/// `(head + k) % capacity`. Capacity is fixed at construction and is at
/// least 1; the bus rejects zero-capacity channels before a ring is ever
/// built.
pub(crate) struct Ring {
    buf: Box<[Word]>,
    head: usize,
    len: usize,
}

impl Ring {
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Ring {
            buf: vec![0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }

    /// Append one word at the tail. The caller checks fullness first.
    pub(crate) fn push(&mut self, word: Word) {
        debug_assert!(!self.is_full());
        let pos = (self.head + self.len) % self.buf.len();
        self.buf[pos] = word;
        self.len += 1;
    }

    /// Take the oldest word, if any.
    pub(crate) fn pop(&mut self) -> Option<Word> {
        if self.len == 0 {
            return None;
        }
        let word = self.buf[self.head];
        self.head = (self.head + 1) % self.buf.len();
        self.len -= 1;
        Some(word)
    }

    /// Append as many leading words of `words` as fit; returns how many.
    pub(crate) fn extend_from(&mut self, words: &[Word]) -> usize {
        let n = words.len().min(self.capacity() - self.len);
        for &word in &words[..n] {
            self.push(word);
        }
        n
    }

    /// Move up to `out.len()` words from the front into `out`; returns how
    /// many.
    pub(crate) fn drain_into(&mut self, out: &mut [Word]) -> usize {
        let n = out.len().min(self.len);
        for slot in &mut out[..n] {
            // pop cannot fail for the first `n` elements
            *slot = self.buf[self.head];
            self.head = (self.head + 1) % self.buf.len();
        }
        self.len -= n;
        n
    }

    /// Drop the storage. Used at close, after both wait queues are detached.
    pub(crate) fn release(&mut self) {
        self.buf = Box::new([]);
        self.head = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_pcg::Pcg32;
    use std::collections::VecDeque;

    fn new_rng() -> impl Rng {
        Pcg32::from_seed(0x5105_1CEB_A11A_57DE_5105_1CEB_A11A_57DEu128.to_le_bytes())
    }

    #[test]
    fn wraparound() {
        let mut ring = Ring::new(3);
        ring.push(1);
        ring.push(2);
        assert_eq!(ring.pop(), Some(1));
        ring.push(3);
        ring.push(4);
        assert!(ring.is_full());
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), Some(4));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn bulk_partial_transfer() {
        let mut ring = Ring::new(4);
        assert_eq!(ring.extend_from(&[1, 2, 3, 4, 5, 6]), 4);
        let mut out = [0; 2];
        assert_eq!(ring.drain_into(&mut out), 2);
        assert_eq!(out, [1, 2]);
        assert_eq!(ring.extend_from(&[7, 8, 9]), 2);
        let mut out = [0; 8];
        assert_eq!(ring.drain_into(&mut out), 4);
        assert_eq!(&out[..4], &[3, 4, 7, 8]);
        assert!(ring.is_empty());
    }

    // drive the ring and a VecDeque with the same random operations and
    // require identical observable behavior throughout
    #[test]
    fn deque_equivalence() {
        let mut rng = new_rng();
        for capacity in [1, 2, 3, 7, 64] {
            let mut ring = Ring::new(capacity);
            let mut model = VecDeque::new();
            for i in 0u32..10_000 {
                match rng.gen_range(0..4u8) {
                    0 => {
                        if model.len() < capacity {
                            ring.push(i);
                            model.push_back(i);
                        }
                    }
                    1 => {
                        assert_eq!(ring.pop(), model.pop_front());
                    }
                    2 => {
                        let words: Vec<Word> =
                            (0..rng.gen_range(0..6)).map(|k| i.wrapping_add(k)).collect();
                        let n = ring.extend_from(&words);
                        assert_eq!(n, words.len().min(capacity - model.len()));
                        model.extend(&words[..n]);
                    }
                    _ => {
                        let mut out = vec![0; rng.gen_range(0..6)];
                        let n = ring.drain_into(&mut out);
                        assert_eq!(n, out.len().min(model.len()));
                        for slot in &mut out[..n] {
                            assert_eq!(*slot, model.pop_front().unwrap());
                        }
                    }
                }
                assert_eq!(ring.len(), model.len());
                assert_eq!(ring.is_empty(), model.is_empty());
                assert_eq!(ring.is_full(), model.len() == capacity);
            }
        }
    }
}
