use std::error::Error;
use std::fmt::{Debug, Display};
use std::sync::Arc;

use bytes::Bytes;

use futures::{SinkExt, StreamExt};
use http::header::{self, EXPECT};
use http::response::Parts;
use http::{HeaderValue, Method, Response, StatusCode, Version};
use http_body::Body;
use http_body_util::{BodyExt, Empty};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::config::ServerConfig;
use crate::handler::Handler;
use crate::protocol::body::ReqBody;
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHeader, ResponseHead, SendError};

use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{error, info};

use super::date::{current_date_value, DateGenerator};

/// The channel's request/response lifecycle (§4.4).
///
/// Transitions are validated by [`transition`] rather than left as implicit booleans:
/// a connection only ever moves `Reading -> Handling -> Sending -> Done`, optionally
/// looping back to `Reading` on keep-alive, or falling into `Aborted` from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    Reading,
    Handling,
    Sending,
    Done,
    Aborted,
}

impl ChannelState {
    fn can_transition_to(self, next: ChannelState) -> bool {
        use ChannelState::*;
        matches!(
            (self, next),
            (Reading, Handling) | (Handling, Sending) | (Sending, Done) | (Done, Reading) | (Reading, Aborted) | (Handling, Aborted) | (Sending, Aborted)
        )
    }
}

fn transition(state: ChannelState, next: ChannelState) -> Result<ChannelState, HttpError> {
    if !state.can_transition_to(next) {
        error!(from = ?state, to = ?next, "illegal channel state transition");
        return Err(SendError::invalid_body(format!("illegal channel state transition {:?} -> {:?}", state, next)).into());
    }
    Ok(next)
}

/// An HTTP connection that manages request processing and response streaming
///
/// `HttpConnection` handles the full lifecycle of an HTTP connection, including:
/// - Reading and decoding requests
/// - Processing request headers and bodies
/// - Handling expect-continue mechanism
/// - Streaming responses back to clients
/// - Applying the header finalization policy (Date/Server, framing, keep-alive cap)
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
pub struct HttpConnection<R, W> {
    framed_read: Option<FramedRead<R, RequestDecoder>>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    config: ServerConfig,
    date: Option<Arc<DateGenerator>>,
    state: ChannelState,
    requests_served: u64,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin + Send + Debug,
    W: AsyncWrite + Unpin,
{
    /// Builds a connection with default configuration and no shared `Date` cache: the
    /// header value is computed fresh for every response. Suitable for tests and
    /// benchmarks that never enter a `tokio` runtime before calling this constructor.
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_config(reader, writer, ServerConfig::default(), None)
    }

    /// Builds a connection honoring `config`'s limits/timeouts/keep-alive cap, stamping
    /// every response's `Date` header from `date` when given (a connection-spanning,
    /// periodically-refreshed cache shared across every connection on a worker thread),
    /// or computed fresh per response otherwise.
    pub fn with_config(reader: R, writer: W, config: ServerConfig, date: Option<Arc<DateGenerator>>) -> Self {
        Self {
            framed_read: Some(FramedRead::with_capacity(reader, RequestDecoder::with_limits(config.request.clone()), 8 * 1024)),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            config,
            date,
            state: ChannelState::Reading,
            requests_served: 0,
        }
    }

    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
        H::RespBody: Body<Data = Bytes> + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        loop {
            let next = self.framed_read.as_mut().expect("framed_read present between requests").next().await;
            match next {
                Some(Ok(Message::Header((header, payload_size)))) => match self.handle_request(header, payload_size, &handler).await {
                    Ok(true) => continue,
                    Ok(false) => return Ok(()),
                    Err(e) => return Err(e),
                },

                Some(Ok(Message::Payload(_))) => {
                    error!("unexpected payload chunk while awaiting a request header");
                    self.force_abort();
                    let err = ParseError::invalid_body("need header while receiving body");
                    let _ = self.write_error_response(err.status_code()).await;
                    return Err(err.into());
                }

                Some(Err(e)) => {
                    error!("can't receive next request, cause {}", e);
                    self.force_abort();
                    let status = e.status_code();
                    let _ = self.write_error_response(status).await;
                    return Err(e.into());
                }

                None => {
                    info!("can't read more requests, connection closed by peer");
                    return Ok(());
                }
            }
        }
    }

    /// Handles one request/response exchange, returning whether the connection should
    /// keep reading more requests (`true`) or has been finalized for close (`false`).
    async fn handle_request<H>(&mut self, header: RequestHeader, payload_size: PayloadSize, handler: &Arc<H>) -> Result<bool, HttpError>
    where
        H: Handler,
        H::RespBody: Body<Data = Bytes> + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        self.state = transition(self.state, ChannelState::Handling)?;

        let method = header.method().clone();
        let request_version = header.version();
        let request_keep_alive = request_wants_keep_alive(request_version, header.headers());

        if wants_100_continue(header.headers()) {
            send_100_continue(self.framed_write.get_mut()).await.map_err(HttpError::from)?;
            info!("received Expect: 100-continue, sent 100 Continue");
        }

        let framed_read = self.framed_read.take().expect("framed_read present between requests");
        let (req_body, body_state) = ReqBody::create_req_body(framed_read, payload_size);
        let request = header.body(req_body);

        let response_result = handler.call(request).await;

        // The handler may not have read the whole body; drain whatever is left so the
        // next request can be parsed off the same underlying reader.
        let framed_read = body_state.finish().await?;
        self.framed_read = Some(framed_read);

        self.requests_served += 1;
        let cap_reached = self.config.max_keep_alive_requests.is_some_and(|max| self.requests_served >= max);
        let persist = request_keep_alive && !cap_reached;

        self.state = transition(self.state, ChannelState::Sending)?;
        let persist = self.send_response(response_result, &method, request_version, persist).await?;
        self.state = transition(self.state, ChannelState::Done)?;

        if persist {
            self.state = transition(self.state, ChannelState::Reading)?;
        }

        Ok(persist)
    }

    /// Maps a handler result to a response (500 on handler error) and writes it.
    async fn send_response<T, E>(&mut self, response_result: Result<Response<T>, E>, method: &Method, request_version: Version, persist: bool) -> Result<bool, HttpError>
    where
        T: Body + Unpin,
        T::Error: Display,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        match response_result {
            Ok(response) => self.write_response(response, method, request_version, persist).await,
            Err(e) => {
                error!("handler returned an error: {}", e.into());
                let response = build_error_response(StatusCode::INTERNAL_SERVER_ERROR, request_version);
                self.write_response(response, method, request_version, persist).await
            }
        }
    }

    /// Applies the §4.4 header finalization policy and streams the body, returning
    /// whether the connection should persist after this response.
    async fn write_response<T>(&mut self, response: Response<T>, method: &Method, request_version: Version, persist: bool) -> Result<bool, HttpError>
    where
        T: Body + Unpin,
        T::Error: Display,
    {
        let (parts, mut body) = response.into_parts();

        let body_payload_size = match body.size_hint().exact() {
            Some(0) => PayloadSize::Empty,
            Some(length) => PayloadSize::Length(length),
            None => PayloadSize::Chunked,
        };

        let date_value = match &self.date {
            Some(date) => date.header_value(),
            None => current_date_value(),
        };

        let (parts, payload_size, persist) = finalize_headers(parts, body_payload_size, request_version, persist, &self.config, date_value);

        let suppress_body = is_body_suppressed(parts.status, method);

        let head = ResponseHead::from_parts(parts, ());
        let header_message = Message::<_, T::Data>::Header((head, payload_size));

        if suppress_body || payload_size.is_empty() {
            self.framed_write.feed(header_message).await?;
            // send, not feed: the chunked/close-delimited Eof marker still needs
            // flushing even when no body frame precedes it.
            self.framed_write.send(Message::Payload(PayloadItem::<T::Data>::Eof)).await?;
            return Ok(persist);
        }

        self.framed_write.feed(header_message).await?;

        loop {
            match body.frame().await {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => {
                        self.framed_write.send(Message::Payload(PayloadItem::Chunk(data))).await?;
                    }
                    // Not a data frame; the only other kind `http_body::Frame` carries is
                    // trailers (spec: "this spec requires they be emitted verbatim after the
                    // terminating zero-length chunk").
                    Err(frame) => match frame.into_trailers() {
                        Ok(trailers) => {
                            self.framed_write.send(Message::Payload(PayloadItem::Trailer(trailers))).await?;
                        }
                        Err(_) => return Err(SendError::invalid_body("response body produced neither a data nor trailers frame").into()),
                    },
                },
                Some(Err(e)) => return Err(SendError::invalid_body(format!("resolve response body error: {e}")).into()),
                None => {
                    // send, not feed: this may be the only flush point if the body
                    // never produced a chunk.
                    self.framed_write.send(Message::Payload(PayloadItem::<T::Data>::Eof)).await?;
                    return Ok(persist);
                }
            }
        }
    }

    /// Best-effort error response for a connection being torn down before (or instead
    /// of) a request was ever fully parsed; the framing details of the offending
    /// request aren't trustworthy, so the response is sent as HTTP/1.1 with the
    /// connection forced closed regardless of the outcome.
    async fn write_error_response(&mut self, status: StatusCode) -> Result<(), HttpError> {
        let response = build_error_response(status, Version::HTTP_11);
        self.write_response(response, &Method::GET, Version::HTTP_11, false).await?;
        Ok(())
    }

    fn force_abort(&mut self) {
        self.state = transition(self.state, ChannelState::Aborted).unwrap_or(ChannelState::Aborted);
    }
}

/// Whether `headers` carries `Expect: 100-continue`.
fn wants_100_continue(headers: &http::HeaderMap) -> bool {
    headers.get(EXPECT).map(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue")).unwrap_or(false)
}

async fn send_100_continue<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<(), SendError> {
    writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::io)?;
    writer.flush().await.map_err(SendError::io)?;
    Ok(())
}

/// Whether `headers`' `Connection` header contains `token` as one of its
/// comma-separated values (case-insensitively).
fn connection_header_has(headers: &http::HeaderMap, token: &str) -> bool {
    headers
        .get(header::CONNECTION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(',').any(|part| part.trim().eq_ignore_ascii_case(token)))
        .unwrap_or(false)
}

/// Whether the request wants the connection kept alive, honoring both the
/// HTTP/1.1-keep-alive-by-default and HTTP/1.0-close-by-default rules, and an
/// explicit `Connection: close`/`Connection: keep-alive` override either way.
fn request_wants_keep_alive(version: Version, headers: &http::HeaderMap) -> bool {
    if connection_header_has(headers, "close") {
        return false;
    }
    match version {
        Version::HTTP_11 => true,
        Version::HTTP_10 => connection_header_has(headers, "keep-alive"),
        _ => false,
    }
}

fn is_body_suppressed(status: StatusCode, method: &Method) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED || method == Method::HEAD
}

/// Applies the §4.4 header finalization policy: Transfer-Encoding/close framing by
/// version, `Date`/`Server` stamping, and persistence accounting. Returns the
/// (possibly rewritten) parts, the payload size the body will actually be framed
/// with, and whether the connection should persist after this response.
fn finalize_headers(
    mut parts: Parts,
    body_payload_size: PayloadSize,
    request_version: Version,
    persist: bool,
    config: &ServerConfig,
    date_value: HeaderValue,
) -> (Parts, PayloadSize, bool) {
    // Responses always echo the request's negotiated version: handlers build
    // `Response`s without ever setting one explicitly.
    parts.version = request_version;

    let has_content_length = parts.headers.contains_key(header::CONTENT_LENGTH);
    let has_transfer_encoding = parts.headers.contains_key(header::TRANSFER_ENCODING);

    let payload_size = if has_content_length || has_transfer_encoding {
        body_payload_size
    } else {
        match body_payload_size {
            PayloadSize::Empty => PayloadSize::Empty,
            PayloadSize::Length(_) => body_payload_size,
            PayloadSize::Chunked | PayloadSize::CloseDelimited => {
                if parts.version == Version::HTTP_11 {
                    PayloadSize::Chunked
                } else {
                    // An HTTP/1.0 peer never understands chunked framing: fall back to
                    // close-delimiting, which also means this response can't persist.
                    PayloadSize::CloseDelimited
                }
            }
        }
    };

    let response_wants_close = parts.headers.get(header::CONNECTION).map(|v| v.as_bytes().eq_ignore_ascii_case(b"close")).unwrap_or(false);
    let persist = persist && !payload_size.is_close_delimited() && !response_wants_close;

    if let Some(server_header) = &config.server_header {
        if !parts.headers.contains_key(header::SERVER) {
            if let Ok(value) = HeaderValue::from_str(server_header) {
                parts.headers.insert(header::SERVER, value);
            }
        }
    }

    parts.headers.insert(header::DATE, date_value);

    if persist {
        if parts.version == Version::HTTP_10 {
            // HTTP/1.0 defaults to close; say so explicitly since that's what a
            // conforming HTTP/1.0 client looks for before reusing the connection.
            parts.headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        } else {
            parts.headers.remove(header::CONNECTION);
        }
    } else {
        parts.headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    }

    (parts, payload_size, persist)
}

/// End-to-end scenario tests (§8): each drives a real `HttpConnection` over a
/// `tokio::io::duplex` pair rather than a `MockIO` or a real socket, so the whole
/// read -> handle -> write cycle is exercised deterministically and without binding a
/// port.
#[cfg(test)]
mod scenario_tests {
    use super::*;
    use crate::handler::make_handler;
    use http::Request;
    use std::sync::Mutex as StdMutex;
    use tokio::io::AsyncReadExt;

    /// Writes `request_bytes` to one half of a duplex pair, drives `handler` over the
    /// other half with `HttpConnection::with_config`, then shuts down the client's
    /// write side (signalling EOF, so the connection loop can't stay blocked waiting
    /// for a request that never comes) and returns everything the connection wrote
    /// back before it finished.
    async fn drive<H>(handler: Arc<H>, config: ServerConfig, request_bytes: &[u8]) -> Vec<u8>
    where
        H: Handler + 'static,
        H::RespBody: Body<Data = Bytes> + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let connection = HttpConnection::with_config(server_read, server_write, config, None);
        let server_task = tokio::spawn(async move {
            let _ = connection.process(handler).await;
        });

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(request_bytes).await.unwrap();
        client_write.shutdown().await.unwrap();

        let mut response = Vec::new();
        client_read.read_to_end(&mut response).await.unwrap();
        server_task.await.unwrap();
        response
    }

    async fn get_hi(_req: Request<ReqBody>) -> Result<Response<String>, Box<dyn Error + Send + Sync>> {
        Ok(Response::builder().status(StatusCode::OK).header(header::CONTENT_TYPE, "text/plain").body("Hi".to_string()).unwrap())
    }

    #[tokio::test]
    async fn scenario_1_simple_get() {
        let handler = Arc::new(make_handler(get_hi));
        let request = b"GET /hi HTTP/1.1\r\nHost: x\r\n\r\n";
        let response = drive(handler, ServerConfig::default(), request).await;
        let response = String::from_utf8(response).unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        assert!(response.contains("Content-Length: 2\r\n"), "{response}");
        assert!(response.contains("Content-Type: text/plain\r\n"), "{response}");
        assert!(response.contains("Date: "), "{response}");
        assert!(response.ends_with("\r\n\r\nHi"), "{response}");
    }

    #[tokio::test]
    async fn scenario_2_chunked_request_decode() {
        let observed: Arc<StdMutex<Option<Bytes>>> = Arc::new(StdMutex::new(None));
        let captured = observed.clone();
        let handler = Arc::new(make_handler(move |req: Request<ReqBody>| {
            let captured = captured.clone();
            async move {
                let collected = req.into_body().collect().await.map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)?;
                *captured.lock().unwrap() = Some(collected.to_bytes());
                Ok::<_, Box<dyn Error + Send + Sync>>(Response::builder().status(StatusCode::OK).body(String::new()).unwrap())
            }
        }));

        let request = b"POST /u HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let _ = drive(handler, ServerConfig::default(), request).await;

        let body = observed.lock().unwrap().clone().expect("handler observed a body");
        assert_eq!(body, Bytes::from_static(b"hello world"));
    }

    async fn big_body_head(_req: Request<ReqBody>) -> Result<Response<Bytes>, Box<dyn Error + Send + Sync>> {
        Ok(Response::builder().status(StatusCode::OK).body(Bytes::from(vec![b'x'; 1024])).unwrap())
    }

    #[tokio::test]
    async fn scenario_3_head_has_no_body() {
        let handler = Arc::new(make_handler(big_body_head));
        let request = b"HEAD /hi HTTP/1.1\r\nHost: x\r\n\r\n";
        let response = drive(handler, ServerConfig::default(), request).await;
        let response = String::from_utf8(response).unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        assert!(response.contains("Content-Length: 1024\r\n"), "{response}");
        // Headers end right after the blank line; nothing of the 1024-byte body follows.
        let header_end = response.find("\r\n\r\n").expect("header terminator present") + 4;
        assert_eq!(&response[header_end..], "", "HEAD response carried body bytes: {response}");
    }

    #[tokio::test]
    async fn scenario_4_keep_alive_limit() {
        let handler = Arc::new(make_handler(get_hi));
        let mut config = ServerConfig::default();
        config.max_keep_alive_requests = Some(3);

        let one_request = "GET /hi HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n";
        let request = one_request.repeat(10);
        let response = drive(handler, config, request.as_bytes()).await;
        let response = String::from_utf8(response).unwrap();

        let responses: Vec<&str> = response.split("HTTP/1.1 200 OK\r\n").filter(|s| !s.is_empty()).collect();
        assert_eq!(responses.len(), 3, "expected exactly 3 responses before the cap forced close: {response}");
        assert_eq!(responses.iter().filter(|r| r.contains("Connection: close\r\n")).count(), 1, "{response}");
        assert_eq!(responses.iter().filter(|r| r.contains("Connection: keep-alive\r\n")).count(), 0, "{response}");
    }
}

fn build_error_response(status_code: StatusCode, version: Version) -> Response<Empty<Bytes>> {
    Response::builder().status(status_code).version(version).body(Empty::<Bytes>::new()).unwrap()
}
