//! Readiness multiplexer.
//!
//! Thin wrapper over `mio::Poll` (epoll on Linux, kqueue on macOS) working
//! on raw descriptors. The descriptor doubles as the poll token, so a
//! readiness event maps straight back to the registry without a lookup
//! table. Descriptors are registered via `SourceFd` and are never owned or
//! closed here.

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// One ready descriptor as reported by the OS, with its direction flags.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Readiness {
    pub(crate) fd: RawFd,
    pub(crate) readable: bool,
    pub(crate) writable: bool,
}

pub(crate) struct Poller {
    poll: Poll,
    events: Events,
}

impl Poller {
    pub(crate) fn new(event_capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(event_capacity),
        })
    }

    /// First-time registration of a descriptor.
    pub(crate) fn add(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), Token(fd as usize), interest)
    }

    /// Replace the interest set of an already-registered descriptor.
    pub(crate) fn modify(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.poll
            .registry()
            .reregister(&mut SourceFd(&fd), Token(fd as usize), interest)
    }

    /// Drop a descriptor from the multiplexer entirely.
    pub(crate) fn remove(&self, fd: RawFd) -> io::Result<()> {
        self.poll.registry().deregister(&mut SourceFd(&fd))
    }

    /// Block for up to `timeout` and return every descriptor the OS reports
    /// ready. An error here is fatal to the caller; nothing is retried.
    pub(crate) fn wait(&mut self, timeout: Duration) -> io::Result<Vec<Readiness>> {
        self.poll.poll(&mut self.events, Some(timeout))?;

        let mut ready = Vec::with_capacity(self.events.iter().count());
        for event in self.events.iter() {
            ready.push(Readiness {
                fd: event.token().0 as RawFd,
                readable: event.is_readable(),
                writable: event.is_writable(),
            });
        }
        Ok(ready)
    }
}
