//! spindle: a single-threaded reactor.
//!
//! Multiplexes readiness notifications on file descriptors and fires timers
//! on a cooperative schedule — the dispatch core beneath a larger server.
//! Protocol parsing, connection acceptance, and business logic live in the
//! embedding application, which registers callbacks here.
//!
//! Model:
//! - File events are keyed by `(descriptor, direction)` and are single-shot:
//!   a firing consumes the registration, and the callback re-registers to
//!   keep listening. The loop never owns or closes descriptors.
//! - Timers are recurring or one-shot, identified by a never-reused id, and
//!   are dispatched before file events in every cycle.
//! - One thread drives everything; callbacks get `&mut EventLoop` and may
//!   register or unregister events reentrantly. Scale out by running one
//!   loop per thread, not by sharing one.
//!
//! ```no_run
//! use spindle::{Direction, EventLoop, TimerKind};
//! use std::time::Duration;
//!
//! let mut el = EventLoop::new()?;
//! el.register_timer(TimerKind::Recurring, Duration::from_secs(1), |_el, _id| {
//!     println!("tick");
//! });
//! el.run()?;
//! # Ok::<(), std::io::Error>(())
//! ```

mod clock;
pub mod config;
mod files;
mod poller;
mod reactor;
mod timers;

pub use clock::now_ms;
pub use config::LoopConfig;
pub use files::{Direction, FileProc};
pub use reactor::EventLoop;
pub use timers::{TimeProc, TimerId, TimerKind};
