//! Per-socket FastCGI connection: demultiplexes records by request-id and drives
//! one independent request/response cycle per id, the transport-level analogue of
//! [`crate::connection::HttpConnection`] (§4.8).
//!
//! Unlike the HTTP/1 connection, request bodies here are fully buffered rather than
//! streamed: FastCGI `STDIN` records terminate with an explicit empty record, so
//! buffering to an `http_body_util::Full<Bytes>` is the natural mapping and avoids
//! coupling this transport to [`crate::protocol::body::ReqBody`]'s HTTP/1-specific
//! internals. `PARAMS`/`STDIN` are assembled per request-id via [`super::RequestTable`]
//! until each stream's terminating empty record arrives, then dispatched as one unit.

use std::fmt::Display;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use http::{Request, Response};
use http_body::Body;
use http_body_util::{BodyExt, Full};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{error, warn};

use super::params::request_header_from_params;
use super::record::{Record, RecordDecoder, RecordEncoder, RecordType};
use super::{decode_params, encode_end_request, BeginRequestBody, ProtocolStatus, RequestTable};
use crate::protocol::HttpError;

/// Request handler contract for the FastCGI transport: takes the fully assembled
/// request and produces a response whose body is drained into `STDOUT` records.
#[async_trait]
pub trait FastCgiHandler: Send + Sync {
    type RespBody: Body<Data = Bytes> + Send;
    type Error: Into<Box<dyn std::error::Error + Send + Sync>>;

    async fn call(&self, req: Request<Full<Bytes>>) -> Result<Response<Self::RespBody>, Self::Error>;
}

/// Per-request-id assembly buffer: accumulates `PARAMS` then `STDIN` content until
/// each stream's terminating empty record is seen.
#[derive(Default)]
struct PendingRequest {
    keep_conn: bool,
    params_buf: BytesMut,
    params_done: bool,
    stdin_buf: BytesMut,
    stdin_done: bool,
}

impl PendingRequest {
    fn new(keep_conn: bool) -> Self {
        Self { keep_conn, ..Default::default() }
    }

    fn ready(&self) -> bool {
        self.params_done && self.stdin_done
    }
}

pub struct FastCgiConnection<R, W> {
    framed_read: FramedRead<R, RecordDecoder>,
    framed_write: FramedWrite<W, RecordEncoder>,
    pending: RequestTable<PendingRequest>,
    /// Set once a completed request's `BEGIN_REQUEST` did not carry `FCGI_KEEP_CONN`;
    /// `process` stops reading further records once this is true.
    close_after_current: bool,
}

impl<R, W> FastCgiConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RecordDecoder, 8 * 1024),
            framed_write: FramedWrite::new(writer, RecordEncoder),
            pending: RequestTable::new(),
            close_after_current: false,
        }
    }

    /// Processes records until the peer closes the connection or a fatal protocol
    /// error occurs. Each completed request (`PARAMS` + `STDIN` both terminated) is
    /// dispatched to `handler` and its response streamed back as `STDOUT` records
    /// followed by `END_REQUEST`.
    pub async fn process<H>(mut self, handler: &H) -> Result<(), HttpError>
    where
        H: FastCgiHandler,
    {
        loop {
            match self.framed_read.next().await {
                Some(Ok(record)) => {
                    if let Err(e) = self.handle_record(record, handler).await {
                        error!(cause = %e, "fastcgi connection error, closing");
                        return Err(e);
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            }

            if self.close_after_current {
                return Ok(());
            }
        }
    }

    async fn handle_record<H>(&mut self, record: Record, handler: &H) -> Result<(), HttpError>
    where
        H: FastCgiHandler,
    {
        match record.record_type {
            RecordType::BeginRequest => {
                let body = BeginRequestBody::decode(&record.content).ok_or_else(|| {
                    crate::protocol::ParseError::invalid_header("malformed BEGIN_REQUEST body")
                })?;
                self.pending.begin(record.request_id, PendingRequest::new(body.keep_conn));
                Ok(())
            }

            RecordType::Params => {
                let Some(pending) = self.pending.get_mut(record.request_id) else {
                    warn!(request_id = record.request_id, "PARAMS for unknown request-id");
                    return Ok(());
                };
                if record.content.is_empty() {
                    pending.params_done = true;
                } else {
                    pending.params_buf.extend_from_slice(&record.content);
                }
                self.dispatch_if_ready(record.request_id, handler).await
            }

            RecordType::Stdin => {
                let Some(pending) = self.pending.get_mut(record.request_id) else {
                    warn!(request_id = record.request_id, "STDIN for unknown request-id");
                    return Ok(());
                };
                if record.content.is_empty() {
                    pending.stdin_done = true;
                } else {
                    pending.stdin_buf.extend_from_slice(&record.content);
                }
                self.dispatch_if_ready(record.request_id, handler).await
            }

            RecordType::AbortRequest => {
                self.pending.end(record.request_id);
                self.send_end_request(record.request_id, 0, ProtocolStatus::RequestComplete).await
            }

            RecordType::GetValues | RecordType::Data | RecordType::UnknownType => Ok(()),

            RecordType::EndRequest | RecordType::Stdout | RecordType::Stderr | RecordType::GetValuesResult => {
                // These are server->application record types; receiving one from the peer
                // is a protocol violation we tolerate by ignoring rather than tearing down.
                warn!(record_type = ?record.record_type, "unexpected FastCGI record direction");
                Ok(())
            }
        }
    }

    async fn dispatch_if_ready<H>(&mut self, request_id: u16, handler: &H) -> Result<(), HttpError>
    where
        H: FastCgiHandler,
    {
        let ready = self.pending.get_mut(request_id).map(PendingRequest::ready).unwrap_or(false);
        if !ready {
            return Ok(());
        }

        let pending = self.pending.end(request_id).expect("checked ready above");
        if !pending.keep_conn {
            self.close_after_current = true;
        }

        let pairs = decode_params(&pending.params_buf).map_err(HttpError::from)?;
        let header = request_header_from_params(&pairs).map_err(HttpError::from)?;
        let body = Full::new(pending.stdin_buf.freeze());
        let request = header.body(body);

        let response = match handler.call(request).await {
            Ok(response) => response,
            Err(e) => {
                let boxed: Box<dyn std::error::Error + Send + Sync> = e.into();
                error!(cause = %boxed, "fastcgi handler error");
                let resp = Response::builder().status(http::StatusCode::INTERNAL_SERVER_ERROR).body(Full::new(Bytes::new())).unwrap();
                self.send_stdout_response(request_id, resp).await?;
                return self.send_end_request(request_id, 1, ProtocolStatus::RequestComplete).await;
            }
        };

        self.send_stdout_response(request_id, response).await?;
        self.send_end_request(request_id, 0, ProtocolStatus::RequestComplete).await
    }

    async fn send_stdout_response<B>(&mut self, request_id: u16, response: Response<B>) -> Result<(), HttpError>
    where
        B: Body<Data = Bytes>,
        B::Error: Display,
    {
        let (parts, body) = response.into_parts();

        let mut header_block = format!("Status: {}\r\n", parts.status.as_u16()).into_bytes();
        for (name, value) in parts.headers.iter() {
            header_block.extend_from_slice(name.as_str().as_bytes());
            header_block.extend_from_slice(b": ");
            header_block.extend_from_slice(value.as_bytes());
            header_block.extend_from_slice(b"\r\n");
        }
        header_block.extend_from_slice(b"\r\n");

        self.write_stdout_chunk(request_id, Bytes::from(header_block)).await?;

        let collected = body.collect().await.map_err(|e| crate::protocol::SendError::invalid_body(e.to_string()))?;
        let data = collected.to_bytes();
        if !data.is_empty() {
            self.write_stdout_chunk(request_id, data).await?;
        }

        // Terminating empty STDOUT record.
        self.framed_write
            .send(Record { record_type: RecordType::Stdout, request_id, content: Bytes::new() })
            .await
            .map_err(HttpError::from)
    }

    /// Splits `data` into chunks no larger than the FastCGI record content limit (65535 bytes).
    async fn write_stdout_chunk(&mut self, request_id: u16, data: Bytes) -> Result<(), HttpError> {
        const MAX_CONTENT: usize = u16::MAX as usize;
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + MAX_CONTENT).min(data.len());
            let chunk = data.slice(offset..end);
            self.framed_write
                .send(Record { record_type: RecordType::Stdout, request_id, content: chunk })
                .await
                .map_err(HttpError::from)?;
            offset = end;
        }
        Ok(())
    }

    async fn send_end_request(&mut self, request_id: u16, app_status: u32, status: ProtocolStatus) -> Result<(), HttpError> {
        let body = encode_end_request(app_status, status);
        self.framed_write
            .send(Record { record_type: RecordType::EndRequest, request_id, content: Bytes::copy_from_slice(&body) })
            .await
            .map_err(HttpError::from)
    }
}
