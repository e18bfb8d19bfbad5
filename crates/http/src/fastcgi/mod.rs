//! FastCGI transport: binary record framing and request-id multiplexing.
//!
//! Accepted as an alternate transport alongside HTTP/1 (§6.1), exercising the
//! same request/response plumbing: `PARAMS` records populate an `http::Request<()>`
//! the same way [`crate::protocol::RequestHeader`] does for HTTP/1, rather than
//! introducing a parallel request type. One connection multiplexes many
//! concurrent requests, each identified by a FastCGI request-id; `record.rs`
//! provides the wire codec and `params.rs` the CGI name/value decoder.

mod connection;
mod params;
mod record;

pub use connection::{FastCgiConnection, FastCgiHandler};
pub use params::{decode_params, NameValue};
pub use record::{Record, RecordDecoder, RecordEncoder, RecordType, FCGI_HEADER_LEN, FCGI_VERSION_1};

use std::collections::HashMap;

/// Multiplexes FastCGI request-ids onto independent channel slots within one connection.
///
/// A slot is created on `BEGIN_REQUEST` and removed on `END_REQUEST`/`ABORT_REQUEST`;
/// looking it up for any other record type before `BEGIN_REQUEST` has been seen is a
/// protocol error the caller should turn into a connection-level abort.
#[derive(Default)]
pub struct RequestTable<T> {
    slots: HashMap<u16, T>,
}

impl<T> RequestTable<T> {
    pub fn new() -> Self {
        Self { slots: HashMap::new() }
    }

    pub fn begin(&mut self, request_id: u16, value: T) -> Option<T> {
        self.slots.insert(request_id, value)
    }

    pub fn get_mut(&mut self, request_id: u16) -> Option<&mut T> {
        self.slots.get_mut(&request_id)
    }

    pub fn end(&mut self, request_id: u16) -> Option<T> {
        self.slots.remove(&request_id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// `BEGIN_REQUEST` body: requested role and connection-keep-alive flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Responder,
    Authorizer,
    Filter,
}

impl Role {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Role::Responder),
            2 => Some(Role::Authorizer),
            3 => Some(Role::Filter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BeginRequestBody {
    pub role: Role,
    /// `FCGI_KEEP_CONN`: when set, the web server keeps the transport connection open
    /// after `END_REQUEST` instead of closing it.
    pub keep_conn: bool,
}

impl BeginRequestBody {
    pub fn decode(body: &[u8]) -> Option<Self> {
        if body.len() < 8 {
            return None;
        }
        let role = Role::from_u16(u16::from_be_bytes([body[0], body[1]]))?;
        let keep_conn = body[2] & 0x1 != 0;
        Some(Self { role, keep_conn })
    }
}

/// Protocol status reported in `END_REQUEST`.
#[derive(Debug, Clone, Copy)]
pub enum ProtocolStatus {
    RequestComplete,
    CantMultiplexConnection,
    Overloaded,
    UnknownRole,
}

impl ProtocolStatus {
    fn as_u8(self) -> u8 {
        match self {
            ProtocolStatus::RequestComplete => 0,
            ProtocolStatus::CantMultiplexConnection => 1,
            ProtocolStatus::Overloaded => 2,
            ProtocolStatus::UnknownRole => 3,
        }
    }
}

/// Encodes an `END_REQUEST` body: app-level exit code plus protocol status.
pub fn encode_end_request(app_status: u32, protocol_status: ProtocolStatus) -> [u8; 8] {
    let mut body = [0u8; 8];
    body[0..4].copy_from_slice(&app_status.to_be_bytes());
    body[4] = protocol_status.as_u8();
    body
}
