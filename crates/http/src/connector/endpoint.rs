//! [`Endpoint`]: the polymorphic byte duplex every [`crate::connection::HttpConnection`]
//! is ultimately built on top of (§3/§4.2).
//!
//! An `Endpoint` wraps one of the transports named in §4.2 — a connected TCP socket,
//! an in-memory duplex pair (used by scenario tests), or (per the TLS-decorator variant)
//! a boxed `AsyncRead + AsyncWrite` standing in for a TLS-terminated stream, since
//! certificate management itself is an explicit non-goal — and exposes `fill`/`flush`/
//! `want_read`/`want_write`/`set_read_timeout`/`set_write_timeout`/`close`, all driven
//! through a [`TokioReactor`] rather than bare `tokio::time::timeout` wrapping, so that
//! `reader_count`/`writer_count` stay accurate for every in-flight wait. `Endpoint`
//! itself also implements `AsyncRead`/`AsyncWrite` by delegating straight to the inner
//! transport, so a [`Connector`](super::Connector) can split it with `tokio::io::split`
//! and hand the halves to `HttpConnection::with_config` exactly as it previously did
//! with a raw `TcpStream`'s split halves.

use std::cell::Cell;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, Interest, ReadBuf};
use tokio::net::TcpStream;

use crate::reactor::TokioReactor;

/// The concrete transport an [`Endpoint`] decorates.
enum EndpointIo {
    Tcp(TcpStream),
    Duplex(DuplexStream),
    /// TLS (or any other) decoration over an inner duplex. Boxed because the
    /// decorator is only known to implement `AsyncRead + AsyncWrite`, not any
    /// concrete type — exactly the "I/O decoration" seam §1 describes.
    Boxed(Pin<Box<dyn AsyncReadWrite>>),
}

/// Convenience supertrait so [`EndpointIo::Boxed`] only needs one trait object.
pub trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite + ?Sized> AsyncReadWrite for T {}

/// A connected, polymorphic transport with reactor-driven timeouts (§4.2).
pub struct Endpoint {
    io: EndpointIo,
    reactor: TokioReactor,
    raw_fd: Option<RawFd>,
    read_timeout: Cell<Option<Duration>>,
    write_timeout: Cell<Option<Duration>>,
}

impl Endpoint {
    /// Wraps a connected TCP stream, driven by `reactor`.
    pub fn tcp(stream: TcpStream, reactor: TokioReactor) -> Self {
        let raw_fd = Some(stream.as_raw_fd());
        Self { io: EndpointIo::Tcp(stream), reactor, raw_fd, read_timeout: Cell::new(None), write_timeout: Cell::new(None) }
    }

    /// Wraps an in-memory duplex pair (tests, or loopback plumbing). Has no fd to wait
    /// on, so `want_read`/`want_write` resolve immediately and timeouts are enforced
    /// with a plain `tokio::time::timeout` around the read/write call itself.
    pub fn duplex(stream: DuplexStream, reactor: TokioReactor) -> Self {
        Self { io: EndpointIo::Duplex(stream), reactor, raw_fd: None, read_timeout: Cell::new(None), write_timeout: Cell::new(None) }
    }

    /// Wraps an already-decorated transport (e.g. a completed TLS handshake).
    pub fn boxed(stream: Pin<Box<dyn AsyncReadWrite>>, reactor: TokioReactor) -> Self {
        Self { io: EndpointIo::Boxed(stream), reactor, raw_fd: None, read_timeout: Cell::new(None), write_timeout: Cell::new(None) }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) {
        self.read_timeout.set(timeout);
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) {
        self.write_timeout.set(timeout);
    }

    pub fn as_raw_fd(&self) -> Option<RawFd> {
        self.raw_fd
    }

    /// Waits until the endpoint is readable, bounded by the configured read timeout.
    /// Used by the connector to "arm the endpoint's first read" before handing it to
    /// a connection factory, and by callers that want readiness without consuming
    /// bytes.
    pub async fn want_read(&self) -> io::Result<()> {
        match self.raw_fd {
            Some(fd) => self.reactor.ready(fd, Interest::READABLE, self.read_timeout.get()).await,
            None => Ok(()),
        }
    }

    /// Symmetric to [`want_read`](Self::want_read) for write-readiness.
    pub async fn want_write(&self) -> io::Result<()> {
        match self.raw_fd {
            Some(fd) => self.reactor.ready(fd, Interest::WRITABLE, self.write_timeout.get()).await,
            None => Ok(()),
        }
    }

    /// Reads into `buf`, bounded by the configured read timeout. Loops on the
    /// fd-backed variant since a readiness notification doesn't guarantee the
    /// subsequent non-blocking read won't return `WouldBlock`.
    pub async fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use tokio::io::AsyncReadExt;
        match &mut self.io {
            EndpointIo::Tcp(stream) => loop {
                self.reactor.ready(stream.as_raw_fd(), Interest::READABLE, self.read_timeout.get()).await?;
                match stream.try_read(buf) {
                    Ok(n) => return Ok(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    Err(e) => return Err(e),
                }
            },
            EndpointIo::Duplex(stream) => match self.read_timeout.get() {
                Some(timeout) => tokio::time::timeout(timeout, stream.read(buf)).await.unwrap_or(Err(io::Error::from(io::ErrorKind::TimedOut))),
                None => stream.read(buf).await,
            },
            EndpointIo::Boxed(stream) => match self.read_timeout.get() {
                Some(timeout) => tokio::time::timeout(timeout, stream.read(buf)).await.unwrap_or(Err(io::Error::from(io::ErrorKind::TimedOut))),
                None => stream.read(buf).await,
            },
        }
    }

    /// Writes all of `buf`, bounded by the configured write timeout.
    pub async fn flush(&mut self, buf: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        match &mut self.io {
            EndpointIo::Tcp(stream) => {
                let mut written = 0;
                while written < buf.len() {
                    self.reactor.ready(stream.as_raw_fd(), Interest::WRITABLE, self.write_timeout.get()).await?;
                    match stream.try_write(&buf[written..]) {
                        Ok(n) => written += n,
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            }
            EndpointIo::Duplex(stream) => match self.write_timeout.get() {
                Some(timeout) => {
                    tokio::time::timeout(timeout, stream.write_all(buf)).await.unwrap_or(Err(io::Error::from(io::ErrorKind::TimedOut)))
                }
                None => stream.write_all(buf).await,
            },
            EndpointIo::Boxed(stream) => match self.write_timeout.get() {
                Some(timeout) => {
                    tokio::time::timeout(timeout, stream.write_all(buf)).await.unwrap_or(Err(io::Error::from(io::ErrorKind::TimedOut)))
                }
                None => stream.write_all(buf).await,
            },
        }
    }

    /// Shuts the write half down, signalling EOF to the peer.
    pub async fn close(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        match &mut self.io {
            EndpointIo::Tcp(stream) => stream.shutdown().await,
            EndpointIo::Duplex(stream) => stream.shutdown().await,
            EndpointIo::Boxed(stream) => stream.shutdown().await,
        }
    }

    /// Cancels any reactor registration pending against this endpoint's fd (a
    /// no-op for the fd-less `Duplex`/`Boxed` variants). Called when a connection
    /// is torn down externally (keep-alive cap, idle timeout) while a readiness
    /// wait might still be outstanding.
    pub fn cancel_pending(&self) {
        if let Some(fd) = self.raw_fd {
            self.reactor.cancel_fd(fd);
        }
    }

    /// A cheap, `Clone`able handle that can still [`cancel_pending`](Self::cancel_pending)
    /// this endpoint's fd after `self` has been consumed (e.g. by `tokio::io::split`
    /// on the way into `HttpConnection::with_config`). The connection-teardown path
    /// holds onto this instead of the `Endpoint` itself.
    pub fn cancel_handle(&self) -> EndpointCancelHandle {
        EndpointCancelHandle { raw_fd: self.raw_fd, reactor: self.reactor.clone() }
    }
}

/// See [`Endpoint::cancel_handle`].
#[derive(Clone)]
pub struct EndpointCancelHandle {
    raw_fd: Option<RawFd>,
    reactor: TokioReactor,
}

impl EndpointCancelHandle {
    /// Cancels any reactor registration still pending against the fd this handle
    /// was taken from.
    pub fn cancel_pending(&self) {
        if let Some(fd) = self.raw_fd {
            self.reactor.cancel_fd(fd);
        }
    }
}

impl AsyncRead for Endpoint {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match &mut this.io {
            EndpointIo::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            EndpointIo::Duplex(stream) => Pin::new(stream).poll_read(cx, buf),
            EndpointIo::Boxed(stream) => stream.as_mut().poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Endpoint {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match &mut this.io {
            EndpointIo::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            EndpointIo::Duplex(stream) => Pin::new(stream).poll_write(cx, buf),
            EndpointIo::Boxed(stream) => stream.as_mut().poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match &mut this.io {
            EndpointIo::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            EndpointIo::Duplex(stream) => Pin::new(stream).poll_flush(cx),
            EndpointIo::Boxed(stream) => stream.as_mut().poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match &mut this.io {
            EndpointIo::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            EndpointIo::Duplex(stream) => Pin::new(stream).poll_shutdown(cx),
            EndpointIo::Boxed(stream) => stream.as_mut().poll_shutdown(cx),
        }
    }
}
