//! Output compression wrapper (§4.5 "Output filter chain").
//!
//! Wraps a handler's response body in a compressing [`http_body::Body`] selected from the
//! request's `Accept-Encoding` header. Mirrors the channel's output-compression policy (§4.4):
//! when a `Content-Encoding` is applied, any pre-existing `Content-Length` is dropped (the body
//! becomes chunked/streamed) and `Accept-Encoding` is appended to `Vary`.
//!
//! (almost thanks and) copy from actix-http: <https://github.com/actix/actix-web/blob/master/actix-http/src/encoding/encoder.rs>

use crate::handler::RequestHandler;
use crate::wrapper::encoding::Writer;
use crate::wrapper::Wrapper;
use crate::{OptionReqBody, RequestContext, ResponseBody};
use async_trait::async_trait;
use bytes::{Buf, Bytes};
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use http::{HeaderValue, Response, StatusCode};
use http_body::{Body, Frame};
use http_body_util::combinators::UnsyncBoxBody;
use micro_http::protocol::{HttpError, SendError};
use pin_project_lite::pin_project;
use std::fmt::Debug;
use std::io;
use std::io::Write;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tracing::{error, trace};
use zstd::stream::write::Encoder as ZstdEncoder;

/// Content-coding applied to a response body.
pub(crate) enum Encoder {
    /// Gzip encoding.
    Gzip(GzEncoder<Writer>),
    /// Deflate encoding.
    Deflate(ZlibEncoder<Writer>),
    /// Zstd encoding.
    Zstd(ZstdEncoder<'static, Writer>),
    /// Brotli encoding.
    Br(Box<brotli::CompressorWriter<Writer>>),
}

impl Encoder {
    fn gzip() -> Self {
        Self::Gzip(GzEncoder::new(Writer::new(), Compression::best()))
    }

    fn deflate() -> Self {
        Self::Deflate(ZlibEncoder::new(Writer::new(), Compression::best()))
    }

    fn zstd() -> Self {
        // todo: remove the unwrap
        Self::Zstd(ZstdEncoder::new(Writer::new(), 6).unwrap())
    }

    fn br() -> Self {
        Self::Br(Box::new(brotli::CompressorWriter::new(
            Writer::new(),
            32 * 1024, // 32 KiB buffer
            3,         // BROTLI_PARAM_QUALITY
            22,        // BROTLI_PARAM_LGWIN
        )))
    }

    /// Selects an encoder from the `Accept-Encoding` header, preferring the strongest codec.
    fn select(accept_encodings: &str) -> Option<Self> {
        if accept_encodings.contains("zstd") {
            Some(Self::zstd())
        } else if accept_encodings.contains("br") {
            Some(Self::br())
        } else if accept_encodings.contains("gzip") {
            Some(Self::gzip())
        } else if accept_encodings.contains("deflate") {
            Some(Self::deflate())
        } else {
            None
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Encoder::Gzip(_) => "gzip",
            Encoder::Deflate(_) => "deflate",
            Encoder::Zstd(_) => "zstd",
            Encoder::Br(_) => "br",
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), io::Error> {
        match self {
            Self::Gzip(encoder) => match encoder.write_all(data) {
                Ok(_) => Ok(()),
                Err(err) => {
                    trace!("error in gzip encoding: {}", err);
                    Err(err)
                }
            },
            Self::Deflate(encoder) => match encoder.write_all(data) {
                Ok(_) => Ok(()),
                Err(err) => {
                    trace!("error in deflate encoding: {}", err);
                    Err(err)
                }
            },
            Self::Zstd(encoder) => match encoder.write_all(data) {
                Ok(_) => Ok(()),
                Err(err) => {
                    trace!("error in zstd encoding: {}", err);
                    Err(err)
                }
            },
            Self::Br(encoder) => match encoder.write_all(data) {
                Ok(_) => Ok(()),
                Err(err) => {
                    trace!("error in br encoding: {}", err);
                    Err(err)
                }
            },
        }
    }

    fn take(&mut self) -> Bytes {
        match self {
            Self::Gzip(encoder) => encoder.get_mut().take(),
            Self::Deflate(encoder) => encoder.get_mut().take(),
            Self::Zstd(encoder) => encoder.get_mut().take(),
            Self::Br(encoder) => encoder.get_mut().take(),
        }
    }

    fn finish(self) -> Result<Bytes, io::Error> {
        match self {
            Self::Gzip(encoder) => encoder.finish().map(|w| w.into_bytes()),
            Self::Deflate(encoder) => encoder.finish().map(|w| w.into_bytes()),
            Self::Zstd(encoder) => encoder.finish().map(|w| w.into_bytes()),
            Self::Br(mut encoder) => encoder.flush().map(|()| encoder.into_inner().into_bytes()),
        }
    }
}

pin_project! {
    /// Applies an [`Encoder`] to every frame pulled from the wrapped body, flushing on EOF.
    struct EncodedBody<B: Body> {
        #[pin]
        inner: B,
        encoder: Option<Encoder>,
        state: Option<bool>,
    }
}

impl<B: Body> EncodedBody<B> {
    fn new(b: B, encoder: Encoder) -> Self {
        Self { inner: b, encoder: Some(encoder), state: Some(true) }
    }
}

impl<B> Body for EncodedBody<B>
where
    B: Body + Unpin,
    B::Data: Buf + Debug,
    B::Error: ToString,
{
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        if this.state.is_none() {
            return Poll::Ready(None);
        }

        loop {
            return match ready!(this.inner.as_mut().poll_frame(cx)) {
                Some(Ok(frame)) => {
                    let data = match frame.into_data() {
                        Ok(data) => data,
                        Err(mut frame) => {
                            let debug_info = frame.trailers_mut();
                            error!("wanted data frame, received trailers: {:?}", debug_info);
                            return Poll::Ready(Some(
                                Err(SendError::invalid_body(format!("invalid body frame: {debug_info:?}")).into()),
                            ));
                        }
                    };

                    if let Err(e) = this.encoder.as_mut().unwrap().write(data.chunk()) {
                        return Poll::Ready(Some(Err(SendError::from(e).into())));
                    }
                    // unwrap is safe: only taken once, on the final None below
                    let bytes = this.encoder.as_mut().unwrap().take();
                    if bytes.is_empty() {
                        continue;
                    }
                    Poll::Ready(Some(Ok(Frame::data(bytes))))
                }
                Some(Err(e)) => Poll::Ready(Some(Err(SendError::invalid_body(e.to_string()).into()))),
                None => {
                    if this.state.is_some() {
                        this.state.take();

                        let bytes = match this.encoder.take().unwrap().finish() {
                            Ok(bytes) => bytes,
                            Err(e) => return Poll::Ready(Some(Err(SendError::from(e).into()))),
                        };
                        if bytes.is_empty() { Poll::Ready(None) } else { Poll::Ready(Some(Ok(Frame::data(bytes)))) }
                    } else {
                        Poll::Ready(None)
                    }
                }
            };
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }
}

/// Compresses a handler's response body per the request's `Accept-Encoding` header.
pub struct EncodeRequestHandler<H: RequestHandler> {
    handler: H,
}

/// Installs [`EncodeRequestHandler`] in front of a handler.
pub struct EncodeWrapper;

impl<H: RequestHandler> Wrapper<H> for EncodeWrapper {
    type Out = EncodeRequestHandler<H>;

    fn wrap(&self, handler: H) -> Self::Out {
        EncodeRequestHandler { handler }
    }
}

#[async_trait]
impl<H: RequestHandler> RequestHandler for EncodeRequestHandler<H> {
    async fn invoke<'server, 'req>(&self, req: &mut RequestContext<'server, 'req>, req_body: OptionReqBody) -> Response<ResponseBody> {
        let mut resp = self.handler.invoke(req, req_body).await;
        encode(req, &mut resp);
        resp
    }
}

/// Compresses `resp`'s body in place when the request accepts a codec we support.
fn encode(req: &RequestContext, resp: &mut Response<ResponseBody>) {
    let status_code = resp.status();
    if status_code == StatusCode::NO_CONTENT || status_code == StatusCode::SWITCHING_PROTOCOLS {
        return;
    }

    // response has already been encoded by the handler or an earlier wrapper
    if resp.headers().contains_key(http::header::CONTENT_ENCODING) {
        return;
    }

    let Some(possible_encodings) = req.headers().get(http::header::ACCEPT_ENCODING) else {
        return;
    };

    let Ok(accept_encodings) = possible_encodings.to_str() else {
        return;
    };

    let Some(encoder) = Encoder::select(accept_encodings) else {
        return;
    };

    let body = resp.body_mut();

    if body.is_empty() {
        return;
    }

    if let Some(upper) = body.size_hint().upper() {
        if upper <= 1024 {
            // too small to be worth compressing
            return;
        }
    }

    let encoder_name = encoder.name();
    let encoded_body = EncodedBody::new(body.take(), encoder);
    body.replace(ResponseBody::stream(UnsyncBoxBody::new(encoded_body)));

    // §4.4: Content-Encoding invalidates any known Content-Length; switch to chunked/close.
    resp.headers_mut().remove(http::header::CONTENT_LENGTH);
    resp.headers_mut().append(http::header::CONTENT_ENCODING, encoder_name.parse().unwrap());
    resp.headers_mut().append(http::header::VARY, HeaderValue::from_static("Accept-Encoding"));
}
