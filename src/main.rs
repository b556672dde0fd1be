//! spindle-echo: a minimal echo server embedding the spindle reactor.
//!
//! Exercises the library the way a real daemon would:
//! - a listener descriptor with a Readable callback that accepts and
//!   re-arms itself (file events are single-shot),
//! - per-connection Readable callbacks that echo and re-arm,
//! - a recurring timer reporting connection counts,
//! - configuration via CLI arguments or TOML file.

use clap::Parser;
use serde::Deserialize;
use slab::Slab;
use spindle::{now_ms, Direction, EventLoop, LoopConfig, TimerKind};
use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the echo server
#[derive(Parser, Debug)]
#[command(name = "spindle-echo")]
#[command(version = "0.1.0")]
#[command(about = "An echo server built on the spindle reactor", long_about = None)]
struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:7777)
    #[arg(short = 'l', long)]
    listen: Option<String>,

    /// Interval between stats log lines in milliseconds
    #[arg(long)]
    stats_interval_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default, rename = "loop")]
    event_loop: LoopConfig,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_listen")]
    listen: String,
    #[serde(default = "default_stats_interval_ms")]
    stats_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            stats_interval_ms: default_stats_interval_ms(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:7777".to_string()
}

fn default_stats_interval_ms() -> u64 {
    10_000
}

type Connections = Rc<RefCell<Slab<TcpStream>>>;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliArgs::parse();

    let toml_config: TomlConfig = match cli.config {
        Some(ref path) => toml::from_str(&std::fs::read_to_string(path)?)?,
        None => TomlConfig::default(),
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let listen = cli.listen.unwrap_or(toml_config.server.listen);
    let stats_interval_ms = cli
        .stats_interval_ms
        .unwrap_or(toml_config.server.stats_interval_ms);

    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let listener = Rc::new(create_listener(addr)?);
    let conns: Connections = Rc::new(RefCell::new(Slab::new()));

    info!(addr = %addr, "Starting spindle-echo");

    let mut el = EventLoop::with_config(toml_config.event_loop)?;

    let stats_conns = conns.clone();
    let started_at = now_ms();
    el.register_timer(
        TimerKind::Recurring,
        Duration::from_millis(stats_interval_ms),
        move |_el, _id| {
            info!(
                connections = stats_conns.borrow().len(),
                uptime_ms = now_ms() - started_at,
                "Stats"
            );
        },
    );

    arm_listener(&mut el, listener, conns)?;
    el.run()?;
    Ok(())
}

/// Register the accept callback. File events are single-shot, so the
/// callback ends by arming the listener again.
fn arm_listener(el: &mut EventLoop, listener: Rc<TcpListener>, conns: Connections) -> io::Result<()> {
    let fd = listener.as_raw_fd();
    el.register_file_event(fd, Direction::Readable, move |el, _fd| {
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!(peer = %peer, error = %e, "Failed to set nonblocking, dropping");
                        continue;
                    }
                    let conn_fd = stream.as_raw_fd();
                    let conn_id = conns.borrow_mut().insert(stream);
                    debug!(conn_id, peer = %peer, "Accepted connection");
                    arm_conn(el, conn_fd, conn_id, conns.clone());
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!(error = %e, "Accept error");
                    break;
                }
            }
        }
        if let Err(e) = arm_listener(el, listener.clone(), conns.clone()) {
            error!(error = %e, "Failed to re-arm listener, stopping");
            el.stop();
        }
    })
}

/// Register the echo callback for one connection, re-arming after each fire
/// until the peer hangs up.
fn arm_conn(el: &mut EventLoop, fd: RawFd, conn_id: usize, conns: Connections) {
    let conns_cb = conns.clone();
    let result = el.register_file_event(fd, Direction::Readable, move |el, fd| {
        let closed = {
            let mut table = conns_cb.borrow_mut();
            let Some(stream) = table.get_mut(conn_id) else {
                return;
            };
            echo_once(stream, conn_id)
        };

        if closed {
            conns_cb.borrow_mut().remove(conn_id);
            debug!(conn_id, "Connection closed");
        } else {
            arm_conn(el, fd, conn_id, conns_cb.clone());
        }
    });
    if let Err(e) = result {
        warn!(conn_id, error = %e, "Failed to arm connection, dropping");
        conns.borrow_mut().remove(conn_id);
    }
}

/// One read-and-echo round. Returns true when the connection should close.
fn echo_once(stream: &mut TcpStream, conn_id: usize) -> bool {
    let mut buf = [0u8; 4096];
    match stream.read(&mut buf) {
        Ok(0) => true, // EOF
        Ok(n) => {
            // Best-effort echo; a short write drops the tail, which is fine
            // for a demo.
            if let Err(e) = stream.write(&buf[..n]) {
                if e.kind() != io::ErrorKind::WouldBlock {
                    debug!(conn_id, error = %e, "Write error");
                    return true;
                }
            }
            false
        }
        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => false,
        Err(e) => {
            debug!(conn_id, error = %e, "Read error");
            true
        }
    }
}

/// Create a nonblocking TCP listener with address and port reuse, so a
/// multi-reactor deployment can bind one listener per loop on the same
/// address and let the kernel balance accepts.
fn create_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}
