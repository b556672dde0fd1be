//! The event loop: registration API, waiter, dispatcher, driver.
//!
//! Readiness-based model: one thread blocks on the multiplexer for at most
//! as long as the nearest timer deadline allows, then dispatches whatever
//! came due. File events are single-shot at this layer: a registration is
//! consumed by its firing, and sustained interest means the callback
//! re-registers itself. Timers are either recurring or one-shot.
//!
//! Everything the loop owns is mutated on the one thread that drives it;
//! callbacks receive `&mut EventLoop` and may register or unregister other
//! events reentrantly. The loop is deliberately not `Send` — a multi-reactor
//! deployment runs one independent instance per thread.

use crate::clock;
use crate::config::LoopConfig;
use crate::files::{Direction, FileTable};
use crate::poller::Poller;
use crate::timers::{TimerId, TimerKind, TimerTable};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Everything one wait cycle collected, snapshotted before dispatch.
/// Mutations made by callbacks affect later cycles, not this batch.
struct Batch {
    due_timers: Vec<TimerId>,
    ready_files: Vec<(RawFd, Direction)>,
}

/// A single-threaded reactor multiplexing descriptor readiness and timers.
pub struct EventLoop {
    poller: Poller,
    files: FileTable,
    timers: TimerTable,
    stopping: bool,
    config: LoopConfig,
}

impl EventLoop {
    /// Create a loop with default tunables. Fails only if the OS
    /// multiplexer cannot be created.
    pub fn new() -> io::Result<Self> {
        Self::with_config(LoopConfig::default())
    }

    pub fn with_config(config: LoopConfig) -> io::Result<Self> {
        Ok(Self {
            poller: Poller::new(config.event_capacity)?,
            files: FileTable::default(),
            timers: TimerTable::new(),
            stopping: false,
            config,
        })
    }

    /// Register interest in `direction` readiness on `fd`.
    ///
    /// The loop does not take ownership of the descriptor and never closes
    /// it. A second registration on the same `(fd, direction)` replaces the
    /// first. The registration is consumed when it fires; re-register from
    /// the callback to keep listening.
    ///
    /// On multiplexer failure the error is returned and no callback is
    /// installed; the registry is left exactly as it was.
    pub fn register_file_event<F>(
        &mut self,
        fd: RawFd,
        direction: Direction,
        callback: F,
    ) -> io::Result<()>
    where
        F: FnMut(&mut EventLoop, RawFd) + 'static,
    {
        // First registration on this fd adds it to the multiplexer; any
        // further direction is an interest-set modification.
        let result = match self.files.interest_of(fd) {
            Some(existing) => self.poller.modify(fd, existing.add(direction.interest())),
            None => self.poller.add(fd, direction.interest()),
        };
        if let Err(e) = result {
            warn!(fd, ?direction, error = %e, "Failed to register descriptor with multiplexer");
            return Err(e);
        }

        self.files.insert(fd, direction, Box::new(callback));
        trace!(fd, ?direction, "Registered file event");
        Ok(())
    }

    /// Drop the registration for `(fd, direction)`. No-op if absent.
    ///
    /// Local state is authoritative: the entry is removed even if the
    /// multiplexer refuses the sync, which is only logged.
    pub fn unregister_file_event(&mut self, fd: RawFd, direction: Direction) {
        if self.files.remove(fd, direction).is_none() {
            return;
        }

        let result = match self.files.interest_of(fd) {
            Some(remaining) => self.poller.modify(fd, remaining),
            None => self.poller.remove(fd),
        };
        if let Err(e) = result {
            warn!(fd, ?direction, error = %e, "Failed to sync descriptor removal with multiplexer");
        }
        trace!(fd, ?direction, "Unregistered file event");
    }

    /// Register a timer due `interval` from now. Returns its id.
    ///
    /// A `Recurring` timer re-arms itself after each fire relative to the
    /// fire time; a `OneShot` timer is removed after its callback returns.
    pub fn register_timer<F>(&mut self, kind: TimerKind, interval: Duration, callback: F) -> TimerId
    where
        F: FnMut(&mut EventLoop, TimerId) + 'static,
    {
        let interval_ms = interval.as_millis() as i64;
        let id = self
            .timers
            .insert(kind, interval_ms, Box::new(callback), clock::now_ms());
        trace!(id, ?kind, interval_ms, "Registered timer");
        id
    }

    /// Drop a timer. Unknown ids are a no-op.
    pub fn unregister_timer(&mut self, id: TimerId) {
        if self.timers.remove(id) {
            trace!(id, "Unregistered timer");
        }
    }

    /// Whether `(fd, direction)` currently has an active registration.
    pub fn has_file_event(&self, fd: RawFd, direction: Direction) -> bool {
        self.files.contains(fd, direction)
    }

    pub fn file_event_count(&self) -> usize {
        self.files.len()
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Request a cooperative exit: `run` observes the flag at the top of
    /// its next iteration, never mid-wait or mid-dispatch.
    pub fn stop(&mut self) {
        self.stopping = true;
    }

    /// Drive the loop until `stop()` is called from a callback or the
    /// multiplexer wait fails. A wait failure is fatal and is returned
    /// without dispatching; it is the only error that unwinds to here.
    pub fn run(&mut self) -> io::Result<()> {
        self.stopping = false;
        debug!("Event loop running");
        while !self.stopping {
            match self.wait() {
                Ok(batch) => self.process(batch),
                Err(e) => {
                    error!(error = %e, "Multiplexer wait failed, stopping event loop");
                    self.stopping = true;
                    return Err(e);
                }
            }
        }
        debug!("Event loop stopped");
        Ok(())
    }

    /// One wait-then-dispatch cycle. Lets an embedder interleave the loop
    /// with its own scheduling instead of handing the thread to `run`.
    pub fn tick(&mut self) -> io::Result<()> {
        let batch = self.wait()?;
        self.process(batch);
        Ok(())
    }

    /// Block until the nearest deadline (bounded by the idle ceiling) and
    /// collect the batch of due timers and ready file events.
    fn wait(&mut self) -> io::Result<Batch> {
        let now = clock::now_ms();
        let mut timeout = self.timers.nearest_deadline(now, self.config.idle_ceiling_ms) - now;
        if timeout <= 0 {
            // A deadline already passed; poll with a small floor instead of
            // zero so overdue timers cannot degrade into a busy spin. The
            // floor itself is clamped positive: the tunables are plain
            // config fields, and a nonpositive value here would wrap the
            // u64 timeout below and block the loop for good.
            timeout = self.config.wait_floor_ms.max(1);
        }

        let ready = self.poller.wait(Duration::from_millis(timeout as u64))?;

        let mut ready_files = Vec::with_capacity(ready.len());
        for r in ready {
            // A descriptor ready in both directions only yields its readable
            // event this cycle; the writable side waits for a later poll.
            // Known asymmetry, kept on purpose.
            if r.readable {
                if self.files.contains(r.fd, Direction::Readable) {
                    ready_files.push((r.fd, Direction::Readable));
                }
            } else if r.writable {
                if self.files.contains(r.fd, Direction::Writable) {
                    ready_files.push((r.fd, Direction::Writable));
                }
            }
        }

        let now = clock::now_ms();
        Ok(Batch {
            due_timers: self.timers.due(now),
            ready_files,
        })
    }

    /// Dispatch a collected batch: timers first so I/O volume cannot starve
    /// them, then file events. Collection order within each category.
    fn process(&mut self, batch: Batch) {
        for id in batch.due_timers {
            // Gone if an earlier callback in this batch unregistered it.
            let Some(mut callback) = self.timers.begin_fire(id) else {
                continue;
            };
            callback(self, id);
            self.timers.finish_fire(id, callback, clock::now_ms());
        }

        for (fd, direction) in batch.ready_files {
            let Some(event) = self.files.remove(fd, direction) else {
                continue;
            };
            // Sync the multiplexer before invoking, so a callback that
            // re-registers the same key starts from a clean slate.
            let result = match self.files.interest_of(fd) {
                Some(remaining) => self.poller.modify(fd, remaining),
                None => self.poller.remove(fd),
            };
            if let Err(e) = result {
                warn!(fd, ?direction, error = %e, "Failed to sync fired descriptor with multiplexer");
            }

            let mut callback = event.callback;
            callback(self, fd);
        }
    }
}
