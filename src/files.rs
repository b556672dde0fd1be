//! File-event registry.
//!
//! Maps a `(descriptor, direction)` pair to a registered callback. The map
//! key is an explicit composite type rather than an encoding trick, so a
//! descriptor may carry independent Readable and Writable registrations
//! without collision. The registry only tracks bookkeeping; syncing interest
//! with the OS multiplexer is the reactor's job.

use crate::reactor::EventLoop;
use mio::Interest;
use std::collections::HashMap;
use std::os::fd::RawFd;

/// Which kind of readiness a registration is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Readable,
    Writable,
}

impl Direction {
    pub(crate) fn interest(self) -> Interest {
        match self {
            Direction::Readable => Interest::READABLE,
            Direction::Writable => Interest::WRITABLE,
        }
    }
}

/// Callback invoked when a descriptor becomes ready. State travels inside
/// the closure's captures; there is no separate user-data pointer.
pub type FileProc = Box<dyn FnMut(&mut EventLoop, RawFd)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FdKey {
    fd: RawFd,
    direction: Direction,
}

/// A single registration. The key lives in the map; the value is just the
/// callback to fire.
pub(crate) struct FileEvent {
    pub(crate) callback: FileProc,
}

/// Registry of active file-event registrations, keyed by
/// `(descriptor, direction)`.
#[derive(Default)]
pub(crate) struct FileTable {
    entries: HashMap<FdKey, FileEvent>,
}

impl FileTable {
    /// Install a callback for `(fd, direction)`, replacing any previous
    /// entry for that exact key. Last registration wins.
    pub(crate) fn insert(&mut self, fd: RawFd, direction: Direction, callback: FileProc) {
        self.entries.insert(FdKey { fd, direction }, FileEvent { callback });
    }

    /// Remove and return the entry for `(fd, direction)`, if any.
    pub(crate) fn remove(&mut self, fd: RawFd, direction: Direction) -> Option<FileEvent> {
        self.entries.remove(&FdKey { fd, direction })
    }

    pub(crate) fn contains(&self, fd: RawFd, direction: Direction) -> bool {
        self.entries.contains_key(&FdKey { fd, direction })
    }

    /// Combined OS interest for a descriptor across both directions, or
    /// `None` when the descriptor has no registrations left.
    pub(crate) fn interest_of(&self, fd: RawFd) -> Option<Interest> {
        let readable = self.contains(fd, Direction::Readable);
        let writable = self.contains(fd, Direction::Writable);
        match (readable, writable) {
            (true, true) => Some(Interest::READABLE.add(Interest::WRITABLE)),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
