//! The bus: a slot table mapping descriptors to channels.

use crate::{
    channel::{Channel, Dir, Parked},
    error::{set_last_error, ErrorKind, NoChannelError, TryError, WouldBlockError},
    ops::{BroadcastFut, RecvFut, RecvSliceFut, SendFut, SendSliceFut},
    waiters::WakerBatch,
    Word,
};
use std::{
    cell::RefCell,
    fmt::{self, Display, Formatter},
    rc::Rc,
    task::Waker,
};

/// Descriptor of one bus channel.
///
/// Descriptors are plain slot indices: [`Bus::open`] hands out the lowest
/// free index, and closing a channel frees its index for reuse. A descriptor
/// that does not name an open channel (never opened, already closed, or
/// forged with [`ChannelId::from_index`]) makes every operation fail with
/// [`NoChannelError`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ChannelId(usize);

impl ChannelId {
    /// Reinterpret a raw slot index as a descriptor.
    pub fn from_index(index: usize) -> Self {
        ChannelId(index)
    }

    /// The raw slot index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Cooperative in-process word bus.
///
/// A `Bus` is a cheap cloneable handle to shared single-threaded state; every
/// task participating in the bus holds its own clone. See the [crate docs]
/// for the operation catalogue and the suspension model.
///
/// [crate docs]: crate
#[derive(Clone, Default)]
pub struct Bus {
    state: Rc<RefCell<BusState>>,
}

#[derive(Default)]
struct BusState {
    /// slot index is the channel's descriptor; empty slots are reused
    /// lowest-first before the table grows
    slots: Vec<Option<Rc<RefCell<Channel>>>>,
}

impl Bus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Bus::default()
    }

    /// Open a channel of the given capacity and return its descriptor.
    ///
    /// The lowest empty slot is reused before the slot table grows, so an
    /// otherwise idle bus gives back the same descriptor after a close.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn open(&self, capacity: usize) -> ChannelId {
        assert!(capacity > 0, "channel capacity must be at least 1");
        let mut state = self.state.borrow_mut();
        let idx = match state.slots.iter().position(|slot| slot.is_none()) {
            Some(idx) => idx,
            None => {
                state.slots.push(None);
                state.slots.len() - 1
            }
        };
        state.slots[idx] = Some(Rc::new(RefCell::new(Channel::new(capacity))));
        set_last_error(ErrorKind::None);
        debug!(channel = idx, capacity, "opened channel");
        ChannelId(idx)
    }

    /// Close a channel, waking every task parked on it.
    ///
    /// Out-of-range descriptors and empty slots are ignored. Waiters parked
    /// on the channel are detached from its queues before its storage is
    /// released, then woken; each resumes with [`NoChannelError`].
    pub fn close(&self, id: ChannelId) {
        let chan = {
            let mut state = self.state.borrow_mut();
            state.slots.get_mut(id.0).and_then(Option::take)
        };
        let wakers = match chan {
            Some(chan) => chan.borrow_mut().close(),
            None => WakerBatch::new(),
        };
        set_last_error(ErrorKind::None);
        debug!(channel = id.0, woken = wakers.len(), "closed channel");
        for waker in wakers {
            waker.wake();
        }
    }

    /// Close every open channel.
    ///
    /// The slot table survives (descriptors restart from 0 on the next
    /// open); the channels' storage is released and all their waiters are
    /// woken, exactly as [`Bus::close`] does one at a time.
    pub fn shutdown(&self) {
        let chans: Vec<Rc<RefCell<Channel>>> = {
            let mut state = self.state.borrow_mut();
            state.slots.iter_mut().filter_map(Option::take).collect()
        };
        debug!(channels = chans.len(), "shutting down bus");
        let mut wakers = WakerBatch::new();
        for chan in chans {
            wakers.extend(chan.borrow_mut().close());
        }
        set_last_error(ErrorKind::None);
        for waker in wakers {
            waker.wake();
        }
    }

    /// Capacity of the channel behind `id`.
    pub fn capacity(&self, id: ChannelId) -> Result<usize, NoChannelError> {
        match self.channel(id) {
            Some(chan) => {
                set_last_error(ErrorKind::None);
                Ok(chan.borrow().capacity())
            }
            None => {
                set_last_error(ErrorKind::NoChannel);
                Err(NoChannelError)
            }
        }
    }

    /// Number of words currently queued in the channel behind `id`.
    pub fn len(&self, id: ChannelId) -> Result<usize, NoChannelError> {
        match self.channel(id) {
            Some(chan) => {
                set_last_error(ErrorKind::None);
                Ok(chan.borrow().len())
            }
            None => {
                set_last_error(ErrorKind::NoChannel);
                Err(NoChannelError)
            }
        }
    }

    /// Send one word without suspending.
    pub fn try_send(&self, id: ChannelId, word: Word) -> Result<(), TryError> {
        let Some(chan) = self.channel(id) else {
            return fail(NoChannelError);
        };
        let woken = match chan.borrow_mut().try_send(word) {
            Ok(woken) => woken,
            Err(e) => return fail(e),
        };
        set_last_error(ErrorKind::None);
        wake(woken);
        Ok(())
    }

    /// Receive one word without suspending.
    pub fn try_recv(&self, id: ChannelId) -> Result<Word, TryError> {
        let Some(chan) = self.channel(id) else {
            return fail(NoChannelError);
        };
        let (word, woken) = match chan.borrow_mut().try_recv() {
            Ok(pair) => pair,
            Err(e) => return fail(e),
        };
        set_last_error(ErrorKind::None);
        wake(woken);
        Ok(word)
    }

    /// Send the leading words of `words` without suspending; returns how many
    /// were written.
    ///
    /// Fails with a would-block error only when the channel is already full;
    /// otherwise as many words as fit are written and the count is returned.
    pub fn try_send_slice(&self, id: ChannelId, words: &[Word]) -> Result<usize, TryError> {
        let Some(chan) = self.channel(id) else {
            return fail(NoChannelError);
        };
        let (n, woken) = match chan.borrow_mut().try_send_slice(words) {
            Ok(pair) => pair,
            Err(e) => return fail(e),
        };
        set_last_error(ErrorKind::None);
        wake(woken);
        Ok(n)
    }

    /// Receive up to `out.len()` words without suspending; returns how many
    /// were read.
    ///
    /// Fails with a would-block error only when the channel is empty.
    pub fn try_recv_slice(&self, id: ChannelId, out: &mut [Word]) -> Result<usize, TryError> {
        let Some(chan) = self.channel(id) else {
            return fail(NoChannelError);
        };
        let (n, woken) = match chan.borrow_mut().try_recv_slice(out) {
            Ok(pair) => pair,
            Err(e) => return fail(e),
        };
        set_last_error(ErrorKind::None);
        wake(woken);
        Ok(n)
    }

    /// Deliver `word` to every open channel, or to none.
    ///
    /// Fails with [`NoChannelError`] when no channel is open and with a
    /// would-block error when any open channel is full; in both cases no
    /// channel is modified. On success every open channel gets `word`
    /// appended and its front receive-waiter woken.
    pub fn try_broadcast(&self, word: Word) -> Result<(), TryError> {
        let mut wakers = WakerBatch::new();
        {
            let state = self.state.borrow();
            let mut live = 0;
            for chan in state.slots.iter().flatten() {
                live += 1;
                if chan.borrow().is_full() {
                    return fail(WouldBlockError);
                }
            }
            if live == 0 {
                return fail(NoChannelError);
            }
            for chan in state.slots.iter().flatten() {
                // no channel is full and nothing can park in between, so
                // every append succeeds and the delivery is all-or-nothing
                match chan.borrow_mut().try_send(word) {
                    Ok(woken) => wakers.extend(woken),
                    Err(WouldBlockError) => unreachable!("channel filled during broadcast"),
                }
            }
        }
        set_last_error(ErrorKind::None);
        for waker in wakers {
            waker.wake();
        }
        Ok(())
    }

    /// Send one word, suspending while the channel is full.
    pub fn send(&self, id: ChannelId, word: Word) -> SendFut {
        SendFut::new(self.clone(), id, word)
    }

    /// Receive one word, suspending while the channel is empty.
    pub fn recv(&self, id: ChannelId) -> RecvFut {
        RecvFut::new(self.clone(), id)
    }

    /// Send the leading words of `words`, suspending while the channel is
    /// full; resolves to how many words were written.
    pub fn send_slice<'a>(&self, id: ChannelId, words: &'a [Word]) -> SendSliceFut<'a> {
        SendSliceFut::new(self.clone(), id, words)
    }

    /// Receive up to `out.len()` words, suspending while the channel is
    /// empty; resolves to how many words were read.
    pub fn recv_slice<'a>(&self, id: ChannelId, out: &'a mut [Word]) -> RecvSliceFut<'a> {
        RecvSliceFut::new(self.clone(), id, out)
    }

    /// Deliver `word` to every open channel, suspending while any open
    /// channel is full.
    ///
    /// The all-or-nothing attempt restarts from scratch on every resumption,
    /// so a partial broadcast is never observable. If the channel the caller
    /// was parked on closes, the caller retries against the remaining
    /// channels instead of failing.
    pub fn broadcast(&self, word: Word) -> BroadcastFut {
        BroadcastFut::new(self.clone(), word)
    }

    /// Look up the channel behind a descriptor.
    pub(crate) fn channel(&self, id: ChannelId) -> Option<Rc<RefCell<Channel>>> {
        self.state.borrow().slots.get(id.0).and_then(Clone::clone)
    }

    /// Park the caller on `dir`'s queue of the channel behind `id`. Returns
    /// `None` when the descriptor no longer names an open channel.
    pub(crate) fn park(&self, id: ChannelId, dir: Dir, waker: &Waker) -> Option<Parked> {
        let chan = self.channel(id)?;
        let node = chan.borrow_mut().park(dir, waker);
        trace!(channel = id.0, ?dir, "parked waiter");
        Some(Parked { chan, node, dir })
    }

    /// Park a blocked broadcast on the send queue of the first full channel.
    /// Returns `None` when no open channel is full any more.
    pub(crate) fn park_broadcast(&self, waker: &Waker) -> Option<Parked> {
        let chan = {
            let state = self.state.borrow();
            state
                .slots
                .iter()
                .flatten()
                .find(|chan| chan.borrow().is_full())
                .cloned()?
        };
        let node = chan.borrow_mut().park(Dir::Send, waker);
        trace!("parked broadcast on a full channel");
        Some(Parked { chan, node, dir: Dir::Send })
    }

    /// Pass the fairness hint along: wake the next waiter in `dir`'s queue if
    /// the channel still has slack in that direction.
    pub(crate) fn chain_wake(&self, id: ChannelId, dir: Dir) {
        let Some(chan) = self.channel(id) else { return };
        let woken = chan.borrow_mut().chain_wake(dir);
        wake(woken);
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let state = self.state.borrow();
        let open = state.slots.iter().flatten().count();
        f.debug_struct("Bus")
            .field("slots", &state.slots.len())
            .field("open", &open)
            .finish()
    }
}

/// record `e` in the last-error cell and return it as the `Err` of an entry
/// point
fn fail<T, E: Copy + Into<TryError>>(e: E) -> Result<T, TryError> {
    let e = e.into();
    set_last_error(e.into());
    Err(e)
}

fn wake(woken: Option<Waker>) {
    if let Some(waker) = woken {
        waker.wake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::last_error;

    #[test]
    fn descriptors_are_lowest_first_and_reused() {
        let bus = Bus::new();
        let a = bus.open(1);
        let b = bus.open(1);
        let c = bus.open(1);
        assert_eq!((a.index(), b.index(), c.index()), (0, 1, 2));

        bus.close(b);
        assert_eq!(bus.open(1).index(), 1);
        assert_eq!(bus.open(1).index(), 3);
    }

    #[test]
    fn open_close_open_returns_same_descriptor() {
        let bus = Bus::new();
        let id = bus.open(4);
        bus.close(id);
        assert_eq!(bus.open(4), id);
    }

    #[test]
    #[should_panic(expected = "capacity must be at least 1")]
    fn zero_capacity_is_rejected() {
        Bus::new().open(0);
    }

    #[test]
    fn scalar_try_ops() {
        let bus = Bus::new();
        let id = bus.open(2);
        bus.try_send(id, 10).unwrap();
        bus.try_send(id, 20).unwrap();
        assert_eq!(bus.try_send(id, 30), Err(TryError::WouldBlock(WouldBlockError)));
        assert_eq!(last_error(), ErrorKind::WouldBlock);

        assert_eq!(bus.try_recv(id).unwrap(), 10);
        assert_eq!(last_error(), ErrorKind::None);
        assert_eq!(bus.try_recv(id).unwrap(), 20);
        assert_eq!(bus.try_recv(id), Err(TryError::WouldBlock(WouldBlockError)));
    }

    #[test]
    fn bogus_descriptors_report_no_channel() {
        let bus = Bus::new();
        let bogus = ChannelId::from_index(17);
        assert_eq!(bus.try_send(bogus, 1), Err(TryError::NoChannel(NoChannelError)));
        assert_eq!(last_error(), ErrorKind::NoChannel);
        assert_eq!(bus.try_recv(bogus), Err(TryError::NoChannel(NoChannelError)));
        assert_eq!(bus.capacity(bogus), Err(NoChannelError));
        assert_eq!(last_error(), ErrorKind::NoChannel);

        let id = bus.open(1);
        bus.close(id);
        assert_eq!(last_error(), ErrorKind::None);
        assert_eq!(bus.try_send(id, 1), Err(TryError::NoChannel(NoChannelError)));
    }

    #[test]
    fn close_tolerates_invalid_descriptors() {
        let bus = Bus::new();
        bus.close(ChannelId::from_index(5));
        let id = bus.open(1);
        bus.close(id);
        bus.close(id);
        assert_eq!(last_error(), ErrorKind::None);
    }

    #[test]
    fn slice_try_ops() {
        let bus = Bus::new();
        let id = bus.open(3);
        assert_eq!(bus.try_send_slice(id, &[1, 2, 3, 4, 5]).unwrap(), 3);
        assert_eq!(
            bus.try_send_slice(id, &[6]),
            Err(TryError::WouldBlock(WouldBlockError))
        );

        let mut out = [0; 2];
        assert_eq!(bus.try_recv_slice(id, &mut out).unwrap(), 2);
        assert_eq!(out, [1, 2]);
        let mut out = [0; 5];
        assert_eq!(bus.try_recv_slice(id, &mut out).unwrap(), 1);
        assert_eq!(out[0], 3);
        assert_eq!(
            bus.try_recv_slice(id, &mut out),
            Err(TryError::WouldBlock(WouldBlockError))
        );
    }

    #[test]
    fn introspection() {
        let bus = Bus::new();
        let id = bus.open(4);
        assert_eq!(bus.capacity(id).unwrap(), 4);
        assert_eq!(bus.len(id).unwrap(), 0);
        bus.try_send(id, 1).unwrap();
        assert_eq!(bus.len(id).unwrap(), 1);
    }

    #[test]
    fn broadcast_requires_an_open_channel() {
        let bus = Bus::new();
        assert_eq!(bus.try_broadcast(9), Err(TryError::NoChannel(NoChannelError)));
        assert_eq!(last_error(), ErrorKind::NoChannel);

        // all-closed collapses to the same error as never-opened
        let id = bus.open(1);
        bus.close(id);
        assert_eq!(bus.try_broadcast(9), Err(TryError::NoChannel(NoChannelError)));
    }

    #[test]
    fn broadcast_is_all_or_nothing() {
        let bus = Bus::new();
        let a = bus.open(2);
        let b = bus.open(1);
        bus.try_send(b, 1).unwrap();

        assert_eq!(bus.try_broadcast(9), Err(TryError::WouldBlock(WouldBlockError)));
        assert_eq!(bus.len(a).unwrap(), 0);
        assert_eq!(bus.len(b).unwrap(), 1);

        bus.try_recv(b).unwrap();
        bus.try_broadcast(9).unwrap();
        assert_eq!(bus.len(a).unwrap(), 1);
        assert_eq!(bus.len(b).unwrap(), 1);
        assert_eq!(bus.try_recv(a).unwrap(), 9);
        assert_eq!(bus.try_recv(b).unwrap(), 9);
    }

    #[test]
    fn shutdown_closes_everything() {
        let bus = Bus::new();
        let a = bus.open(1);
        let b = bus.open(2);
        bus.try_send(a, 1).unwrap();
        bus.shutdown();
        assert_eq!(bus.try_recv(a), Err(TryError::NoChannel(NoChannelError)));
        assert_eq!(bus.try_recv(b), Err(TryError::NoChannel(NoChannelError)));
        // the bus itself is still usable
        assert_eq!(bus.open(1).index(), 0);
    }
}
