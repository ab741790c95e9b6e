//! Per-channel state: a word ring plus one wait queue per direction.

use crate::{
    error::WouldBlockError,
    ring::Ring,
    waiters::{WaiterNode, WaitQueue, WakerBatch},
    Word,
};
use std::{cell::RefCell, rc::Rc, task::Waker};

/// Direction of a parked operation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Dir {
    /// Blocked because the channel is full.
    Send,
    /// Blocked because the channel is empty.
    Recv,
}

/// State behind one open bus slot.
///
/// The non-blocking primitives return the opposite direction's front waker
/// on success instead of waking it directly; the caller invokes it once all
/// borrows are released.
pub(crate) struct Channel {
    ring: Ring,
    send_waiters: WaitQueue,
    recv_waiters: WaitQueue,
    closed: bool,
}

impl Channel {
    pub(crate) fn new(capacity: usize) -> Self {
        Channel {
            ring: Ring::new(capacity),
            send_waiters: WaitQueue::new(),
            recv_waiters: WaitQueue::new(),
            closed: false,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub(crate) fn len(&self) -> usize {
        self.ring.len()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    fn waiters(&self, dir: Dir) -> &WaitQueue {
        match dir {
            Dir::Send => &self.send_waiters,
            Dir::Recv => &self.recv_waiters,
        }
    }

    fn waiters_mut(&mut self, dir: Dir) -> &mut WaitQueue {
        match dir {
            Dir::Send => &mut self.send_waiters,
            Dir::Recv => &mut self.recv_waiters,
        }
    }

    pub(crate) fn try_send(&mut self, word: Word) -> Result<Option<Waker>, WouldBlockError> {
        if self.ring.is_full() {
            return Err(WouldBlockError);
        }
        self.ring.push(word);
        Ok(self.recv_waiters.wake_front())
    }

    pub(crate) fn try_recv(&mut self) -> Result<(Word, Option<Waker>), WouldBlockError> {
        match self.ring.pop() {
            Some(word) => Ok((word, self.send_waiters.wake_front())),
            None => Err(WouldBlockError),
        }
    }

    /// Copy in as many leading words as fit. Fails only when the channel is
    /// already full; a partial write is a success carrying its count.
    pub(crate) fn try_send_slice(
        &mut self,
        words: &[Word],
    ) -> Result<(usize, Option<Waker>), WouldBlockError> {
        if self.ring.is_full() {
            return Err(WouldBlockError);
        }
        let n = self.ring.extend_from(words);
        let waker = if n > 0 { self.recv_waiters.wake_front() } else { None };
        Ok((n, waker))
    }

    /// Drain up to `out.len()` words. Fails only when the channel is empty.
    pub(crate) fn try_recv_slice(
        &mut self,
        out: &mut [Word],
    ) -> Result<(usize, Option<Waker>), WouldBlockError> {
        if self.ring.is_empty() {
            return Err(WouldBlockError);
        }
        let n = self.ring.drain_into(out);
        let waker = if n > 0 { self.send_waiters.wake_front() } else { None };
        Ok((n, waker))
    }

    /// Park a waiter at the tail of `dir`'s queue.
    ///
    /// Callers only park right after the matching primitive refused to make
    /// progress, so the queue invariant (send-waiters park on a full channel,
    /// recv-waiters on an empty one) holds by construction.
    pub(crate) fn park(&mut self, dir: Dir, waker: &Waker) -> Rc<WaiterNode> {
        debug_assert!(!self.closed);
        debug_assert!(match dir {
            Dir::Send => self.ring.is_full(),
            Dir::Recv => self.ring.is_empty(),
        });
        self.waiters_mut(dir).enqueue(waker)
    }

    pub(crate) fn is_front(&self, dir: Dir, node: &Rc<WaiterNode>) -> bool {
        self.waiters(dir).is_front(node)
    }

    pub(crate) fn detach(&mut self, dir: Dir, node: &Rc<WaiterNode>) -> Option<Waker> {
        self.waiters_mut(dir).detach(node)
    }

    /// Take the front waker of `dir`'s queue when the channel still has slack
    /// in that direction. This is the fairness chain: an operation that left
    /// room (or data) behind passes the hint to its successor.
    pub(crate) fn chain_wake(&mut self, dir: Dir) -> Option<Waker> {
        let slack = match dir {
            Dir::Send => !self.ring.is_full(),
            Dir::Recv => !self.ring.is_empty(),
        };
        if slack {
            self.waiters_mut(dir).wake_front()
        } else {
            None
        }
    }

    /// Close this channel: detach every waiter from both queues, then release
    /// the ring storage. The bus has already emptied the slot, so nothing can
    /// park here afterwards. The caller wakes the returned batch after
    /// releasing its borrows; each woken waiter finds its node gone and
    /// reports the channel as closed.
    pub(crate) fn close(&mut self) -> WakerBatch {
        debug_assert!(!self.closed);
        let mut wakers = self.send_waiters.purge();
        wakers.extend(self.recv_waiters.purge());
        self.ring.release();
        self.closed = true;
        wakers
    }
}

/// Handle tying a parked operation to its wait-queue node.
///
/// Dropping the handle unlinks the node, so an abandoned future never leaves
/// a dangling waiter behind, and a wakeup it had already consumed is chained
/// to the next waiter in line.
pub(crate) struct Parked {
    pub(crate) chan: Rc<RefCell<Channel>>,
    pub(crate) node: Rc<WaiterNode>,
    pub(crate) dir: Dir,
}

impl Parked {
    pub(crate) fn is_gone(&self) -> bool {
        self.node.is_gone()
    }

    pub(crate) fn is_front(&self) -> bool {
        self.chan.borrow().is_front(self.dir, &self.node)
    }

    pub(crate) fn refresh(&self, waker: &Waker) {
        self.node.set_waker(waker);
    }
}

impl Drop for Parked {
    fn drop(&mut self) {
        if self.node.is_gone() {
            // already detached by a close-time purge
            return;
        }
        let chained = self.chan.borrow_mut().detach(self.dir, &self.node);
        if let Some(waker) = chained {
            waker.wake();
        }
    }
}
