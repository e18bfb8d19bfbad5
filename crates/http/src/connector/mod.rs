//! Listening socket ownership and per-connection endpoint abstraction.
//!
//! [`Endpoint`] is the polymorphic byte duplex every [`crate::connection::HttpConnection`]
//! is built on top of: a plain TCP/Unix stream in production, an in-memory duplex
//! pair in tests (see `tokio::io::duplex`), or a boxed TLS-decorated stream.
//! [`Connector`] owns the listening socket, applies the socket knobs the teacher's
//! bare `TcpListener::bind` never exposed, runs the accept loop on a [`TokioReactor`]
//! it owns, and hands each accepted connection — wrapped as an `Endpoint` with its
//! first read already armed — to a [`ConnectionFactory`].

pub mod endpoint;

pub use endpoint::{AsyncReadWrite, Endpoint};

use std::io;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::config::ConnectorLimits;
use crate::reactor::{Reactor, TokioReactor};

/// Listening-socket knobs applied before the fd is handed to `tokio`.
///
/// `tokio::net::TcpListener::bind` does not expose `SO_REUSEPORT`, deferred
/// accept, or `TCP_CORK`, so the connector builds the socket with `socket2`
/// first and converts it with `TcpListener::from_std` — the same layering the
/// pack's TCP transport crates use.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Listen backlog passed to `listen(2)`.
    pub backlog: i32,
    /// Maximum number of connections accepted per reactor wakeup before yielding.
    pub accept_batch: usize,
    pub reuse_address: bool,
    pub reuse_port: bool,
    pub tcp_nodelay: bool,
    /// `TCP_CORK` (Linux) / `TCP_NOPUSH` equivalent; buffers small writes until uncorked.
    pub tcp_cork: bool,
    /// Idle timeout applied while waiting for the first byte on an accepted
    /// connection, before it is handed to the connection factory. Consumed by
    /// [`Connector::dispatch`]: set as the `Endpoint`'s read timeout and awaited
    /// via `Endpoint::want_read` before the factory ever sees the endpoint.
    pub accept_read_timeout: Option<Duration>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            backlog: 1024,
            accept_batch: 32,
            reuse_address: true,
            reuse_port: true,
            tcp_nodelay: true,
            tcp_cork: false,
            accept_read_timeout: None,
        }
    }
}

/// Owns a listening socket and drives the accept loop on its own [`TokioReactor`],
/// dispatching each accepted endpoint to a [`ConnectionFactory`].
pub struct Connector {
    listener: TcpListener,
    config: ConnectorConfig,
    reactor: TokioReactor,
    connection_permits: Option<Arc<Semaphore>>,
}

impl Connector {
    /// Binds `addr` with `config`'s knobs applied via `socket2` prior to conversion.
    /// Equivalent to [`Self::bind_with_limits`] with [`ConnectorLimits::default`]
    /// (no connection-count cap).
    pub fn bind(addr: SocketAddr, config: ConnectorConfig) -> io::Result<Self> {
        Self::bind_with_limits(addr, config, ConnectorLimits::default())
    }

    /// Binds `addr`, additionally capping simultaneously open connections per
    /// `limits.max_connections` (§6.3's "max-connections" knob). Connections
    /// accepted past the cap are closed immediately rather than queued.
    pub fn bind_with_limits(addr: SocketAddr, config: ConnectorConfig, limits: ConnectorLimits) -> io::Result<Self> {
        let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

        socket.set_reuse_address(config.reuse_address)?;
        #[cfg(unix)]
        socket.set_reuse_port(config.reuse_port)?;
        socket.set_nonblocking(true)?;
        socket.set_nodelay(config.tcp_nodelay)?;
        socket.bind(&addr.into())?;
        socket.listen(config.backlog)?;

        let listener = TcpListener::from_std(socket.into())?;
        let connection_permits = limits.max_connections.map(|n| Arc::new(Semaphore::new(n)));
        Ok(Self { listener, config, reactor: TokioReactor::new(), connection_permits })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The reactor driving this connector's accept loop and every `Endpoint` it
    /// hands out. Callers building connection-level timeouts (idle keep-alive,
    /// etc.) on top of the same worker thread can share this instance.
    pub fn reactor(&self) -> &TokioReactor {
        &self.reactor
    }

    /// Runs the accept loop until `shutdown` resolves, dispatching each accepted
    /// connection to `factory` as an [`Endpoint`] with its first read already
    /// armed. Retryable errors (`EAGAIN`/`EMFILE`/`ENFILE`) are logged and back
    /// off briefly rather than stopping the connector; any other error is fatal
    /// and ends the loop.
    pub async fn serve<F, Fut>(&self, factory: F, mut shutdown: impl std::future::Future<Output = ()> + Unpin) -> io::Result<()>
    where
        F: Fn(Endpoint, SocketAddr) -> Fut + Clone + 'static,
        Fut: std::future::Future<Output = ()> + 'static,
    {
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => return Ok(()),
                accepted = self.accept_batch() => {
                    match accepted {
                        Ok(streams) => {
                            for (stream, addr) in streams {
                                self.dispatch(stream, addr, factory.clone());
                            }
                        }
                        Err(e) if is_retryable(&e) => {
                            warn!(cause = %e, "retryable accept error, backing off");
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                        Err(e) => {
                            error!(cause = %e, "fatal accept error, stopping connector");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Wraps an accepted stream as an `Endpoint`, enforces the connection-count
    /// cap, then spawns (via the connector's own reactor, not a raw
    /// `tokio::task::spawn_local`) a task that arms the first read and invokes
    /// `factory`.
    fn dispatch<F, Fut>(&self, stream: TcpStream, addr: SocketAddr, factory: F)
    where
        F: Fn(Endpoint, SocketAddr) -> Fut + 'static,
        Fut: std::future::Future<Output = ()> + 'static,
    {
        apply_stream_knobs(&stream, &self.config);

        let permit = match &self.connection_permits {
            Some(semaphore) => match Arc::clone(semaphore).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    debug!(%addr, "max_connections reached, dropping accepted connection");
                    return;
                }
            },
            None => None,
        };

        let endpoint = Endpoint::tcp(stream, self.reactor.clone());
        endpoint.set_read_timeout(self.config.accept_read_timeout);

        self.reactor.execute(async move {
            let _permit = permit;
            if let Err(e) = endpoint.want_read().await {
                debug!(cause = %e, %addr, "accepted connection not readable before timeout, dropping");
                return;
            }
            factory(endpoint, addr).await;
        });
    }

    /// Accepts up to `accept_batch` ready connections without yielding between them,
    /// mirroring the source's multi-accept-per-wakeup knob.
    async fn accept_batch(&self) -> io::Result<Vec<(TcpStream, SocketAddr)>> {
        let mut out = Vec::with_capacity(self.config.accept_batch);
        let (stream, addr) = self.listener.accept().await?;
        out.push((stream, addr));
        // Drain any further connections already queued in the listen backlog without
        // awaiting, up to `accept_batch`: `now_or_never` resolves the accept future only
        // if it is immediately ready, which is exactly the "already in the backlog" case.
        while out.len() < self.config.accept_batch {
            match self.listener.accept().now_or_never() {
                Some(Ok((stream, addr))) => out.push((stream, addr)),
                Some(Err(e)) => {
                    warn!(cause = %e, "error while draining accept batch");
                    break;
                }
                None => break,
            }
        }
        Ok(out)
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector").field("config", &self.config).finish_non_exhaustive()
    }
}

fn apply_stream_knobs(stream: &TcpStream, config: &ConnectorConfig) {
    if let Err(e) = stream.set_nodelay(config.tcp_nodelay) {
        debug!(cause = %e, "failed to set TCP_NODELAY on accepted stream");
    }
    if config.tcp_cork {
        cork(stream.as_raw_fd(), true);
    }
}

/// Applies `TCP_CORK` directly via a raw `setsockopt`, since neither `tokio` nor
/// `socket2`'s `TcpStream` wrapper exposes it once the fd has been handed to tokio.
#[cfg(target_os = "linux")]
fn cork(fd: RawFd, enable: bool) {
    use std::os::raw::c_int;
    let value: c_int = if enable { 1 } else { 0 };
    // SAFETY: `fd` is a live socket owned by the accepted `TcpStream` this call is made
    // from (`apply_stream_knobs` borrows it, never closes it), `value` is a plain `c_int`
    // passed by reference with a matching `optlen`, and `setsockopt` only reads through
    // that pointer — no aliasing or lifetime hazard beyond the FFI call itself.
    unsafe {
        let ret = libc_setsockopt(fd, value);
        if ret != 0 {
            debug!(fd, "TCP_CORK setsockopt failed");
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn cork(_fd: RawFd, _enable: bool) {}

/// # Safety
///
/// `fd` must name an open socket for the duration of the call; `value` must be readable
/// for `size_of::<c_int>()` bytes (it is, being a local `c_int`). Caller-enforced: this
/// crate only ever calls it with a fd still owned by a live `TcpStream`.
#[cfg(target_os = "linux")]
unsafe fn libc_setsockopt(fd: RawFd, value: std::os::raw::c_int) -> std::os::raw::c_int {
    // TCP_CORK = 3 on Linux; avoided pulling in the `libc` crate for a single constant.
    const TCP_CORK: std::os::raw::c_int = 3;
    extern "C" {
        fn setsockopt(
            sockfd: std::os::raw::c_int,
            level: std::os::raw::c_int,
            optname: std::os::raw::c_int,
            optval: *const std::os::raw::c_void,
            optlen: u32,
        ) -> std::os::raw::c_int;
    }
    const IPPROTO_TCP: std::os::raw::c_int = 6;
    // SAFETY: `fd` is caller-guaranteed open (see function-level safety doc above);
    // `&value` points at a live, correctly-sized `c_int` for the whole call.
    unsafe {
        setsockopt(
            fd,
            IPPROTO_TCP,
            TCP_CORK,
            &value as *const _ as *const std::os::raw::c_void,
            std::mem::size_of::<std::os::raw::c_int>() as u32,
        )
    }
}

fn is_retryable(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc_errno::EAGAIN) | Some(libc_errno::EMFILE) | Some(libc_errno::ENFILE)
    ) || e.kind() == io::ErrorKind::WouldBlock
}

/// Minimal errno constants, avoided pulling in the `libc` crate for three values.
mod libc_errno {
    pub const EAGAIN: i32 = 11;
    pub const EMFILE: i32 = 24;
    pub const ENFILE: i32 = 23;
}

/// Configures TCP keepalive on an accepted stream; used by long-lived connections
/// (e.g. SSE, FastCGI) that would otherwise go undetected if the peer vanishes.
pub fn keepalive(stream: &TcpStream, idle: Duration) -> io::Result<()> {
    let sock_ref = socket2::SockRef::from(stream);
    sock_ref.set_tcp_keepalive(&TcpKeepalive::new().with_time(idle))
}
