//! Runtime configuration surface for a served HTTP endpoint (§6.3).
//!
//! The teacher repo carried these as scattered hardcoded constants (`MAX_HEADER_NUM`,
//! `MAX_HEADER_BYTES` in `codec::header::header_decoder`) and a single `ConnectorConfig`
//! covering socket knobs only. This module pulls every knob §6.3 names into one plain,
//! `Default`-able configuration tree, mirrored after the teacher's own `ConnectorConfig`
//! shape (plain struct, `Default` impl matching the old hardcoded values, no builder).

use std::path::PathBuf;
use std::time::Duration;

use crate::connector::ConnectorConfig;

/// Top-level configuration for a served endpoint: socket knobs, request limits,
/// timeouts, and (optionally) TLS decoration settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub connector: ConnectorConfig,
    pub limits: ConnectorLimits,
    pub request: RequestLimits,
    pub timeouts: Timeouts,
    pub tls: Option<TlsConfig>,
    /// Caps the number of requests served on one keep-alive connection before the
    /// channel forces `Connection: close` on the final response (§8 scenario 4).
    /// `None` means unbounded.
    pub max_keep_alive_requests: Option<u64>,
    /// `Server` header value stamped on every response unless already set by the
    /// handler. `None` suppresses the header entirely (cloaking).
    pub server_header: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            connector: ConnectorConfig::default(),
            limits: ConnectorLimits::default(),
            request: RequestLimits::default(),
            timeouts: Timeouts::default(),
            tls: None,
            max_keep_alive_requests: None,
            server_header: Some(concat!("micro-http/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

/// Connection-count and backlog ceilings applied at the connector level.
#[derive(Debug, Clone)]
pub struct ConnectorLimits {
    /// Maximum number of simultaneously open connections; further accepted fds are
    /// closed immediately rather than queued. `None` means unbounded.
    pub max_connections: Option<usize>,
}

impl Default for ConnectorLimits {
    fn default() -> Self {
        Self { max_connections: None }
    }
}

/// Per-request parsing limits, threaded into [`crate::codec::header::HeaderDecoder`].
#[derive(Debug, Clone)]
pub struct RequestLimits {
    /// Maximum number of headers accepted in one request (mapped to 431 on overflow).
    pub max_header_count: usize,
    /// Maximum byte size of the header section, request line included (mapped to
    /// 431, or 414 when the overflow is attributable to the request line/URI alone).
    pub max_header_bytes: usize,
    /// Maximum request body size in bytes; `None` means unbounded (mapped to 413
    /// when a `Content-Length` exceeds this before any bytes are read).
    pub max_body_bytes: Option<u64>,
}

impl Default for RequestLimits {
    fn default() -> Self {
        // Matches the teacher's previous hardcoded `MAX_HEADER_NUM`/`MAX_HEADER_BYTES`.
        Self { max_header_count: 64, max_header_bytes: 8 * 1024, max_body_bytes: None }
    }
}

/// Idle/read/write timeouts applied at the channel and connector level.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// How long the channel waits for the next request on an otherwise idle
    /// keep-alive connection before closing it.
    pub idle: Option<Duration>,
    /// Read timeout applied while a request is being received.
    pub read: Option<Duration>,
    /// Write timeout applied while a response is being sent.
    pub write: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { idle: Some(Duration::from_secs(75)), read: Some(Duration::from_secs(30)), write: Some(Duration::from_secs(30)) }
    }
}

/// TLS decoration settings (§1 Non-goals: certificate *management* is out of scope,
/// but the endpoint still needs somewhere to name the material an operator supplies).
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub trust_path: Option<PathBuf>,
    pub cipher_priorities: Option<String>,
}
