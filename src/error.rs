// channel error types and the thread-local last-error cell.

use std::cell::Cell;
use thiserror::Error;

/// Error for operating on a descriptor with no open channel behind it
///
/// Returned when the descriptor is out of range, its slot is empty, or the
/// channel was closed while the caller was parked on one of its wait queues.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("no such channel")]
pub struct NoChannelError;

/// Error for a non-blocking primitive finding the channel in the wrong state
///
/// Full for sends, empty for receives, any-channel-full for broadcast. The
/// blocking operations never surface this; they park instead.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("operation would block")]
pub struct WouldBlockError;

macro_rules! compound_from {
    ($compound:ident {$(
        $variant:ident($inner:ty),
    )*})=>{$(
        impl From<$inner> for $compound {
            fn from(inner: $inner) -> Self {
                Self::$variant(inner)
            }
        }
    )*};
}

/// Error for a non-blocking bus primitive
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TryError {
    /// The descriptor does not refer to an open channel
    #[error(transparent)]
    NoChannel(NoChannelError),
    /// The operation could not make progress without suspending
    #[error(transparent)]
    WouldBlock(WouldBlockError),
}

compound_from!(TryError {
    NoChannel(NoChannelError),
    WouldBlock(WouldBlockError),
});

/// Outcome kind of the most recent bus entry point, as recorded in the
/// thread-local error cell
///
/// Every entry point writes the cell before returning, including writing
/// [`ErrorKind::None`] on success. Read it with [`last_error`] before making
/// the next call.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// The last operation succeeded
    #[default]
    None,
    /// The last operation failed with [`NoChannelError`]
    NoChannel,
    /// The last operation failed with [`WouldBlockError`]
    WouldBlock,
}

impl From<NoChannelError> for ErrorKind {
    fn from(_: NoChannelError) -> Self {
        ErrorKind::NoChannel
    }
}

impl From<WouldBlockError> for ErrorKind {
    fn from(_: WouldBlockError) -> Self {
        ErrorKind::WouldBlock
    }
}

impl From<TryError> for ErrorKind {
    fn from(e: TryError) -> Self {
        match e {
            TryError::NoChannel(e) => e.into(),
            TryError::WouldBlock(e) => e.into(),
        }
    }
}

thread_local! {
    // the bus is single-threaded by construction, so a thread-local cell is
    // the exact analog of the classic process-wide errno
    static LAST_ERROR: Cell<ErrorKind> = const { Cell::new(ErrorKind::None) };
}

/// Read the outcome kind recorded by the most recent bus entry point.
pub fn last_error() -> ErrorKind {
    LAST_ERROR.with(Cell::get)
}

/// Overwrite the recorded outcome kind.
///
/// The next bus entry point overwrites it again before returning.
pub fn set_last_error(kind: ErrorKind) {
    LAST_ERROR.with(|cell| cell.set(kind));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_conversions() {
        assert_eq!(TryError::from(NoChannelError), TryError::NoChannel(NoChannelError));
        assert_eq!(TryError::from(WouldBlockError), TryError::WouldBlock(WouldBlockError));
        assert_eq!(ErrorKind::from(TryError::from(NoChannelError)), ErrorKind::NoChannel);
        assert_eq!(ErrorKind::from(TryError::from(WouldBlockError)), ErrorKind::WouldBlock);
    }

    #[test]
    fn last_error_round_trip() {
        set_last_error(ErrorKind::WouldBlock);
        assert_eq!(last_error(), ErrorKind::WouldBlock);
        set_last_error(ErrorKind::None);
        assert_eq!(last_error(), ErrorKind::None);
    }
}
