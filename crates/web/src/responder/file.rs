//! File-backed response bodies: the file-view response segment (§3 Data Model,
//! §4.5 `Source` variants).
//!
//! A [`FileView`] is a byte range of an open file. Turning it into a [`Response`]
//! streams that range a chunk at a time through [`FileBody`], the same
//! `http_body::Body` seam [`crate::body::ResponseBody`] exposes for any other
//! streamed body.
//!
//! This is the fallback read+write path the streaming pipeline allows when true
//! zero-copy transmit isn't available: `sendfile`/`splice` would need a raw-syscall
//! dependency this workspace doesn't otherwise pull in, so `FileBody` copies each
//! chunk through a buffer instead of handing the kernel a file descriptor directly.
//! Each [`FileView`] owns its file handle outright (opened fresh per view) rather
//! than sharing one descriptor's cursor across concurrent views.

use std::io::SeekFrom;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http::{HeaderValue, Response, StatusCode};
use http_body::{Body, Frame, SizeHint};
use mime_guess::MimeGuess;
use pin_project_lite::pin_project;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use crate::body::ResponseBody;
use crate::responder::Responder;
use crate::RequestContext;
use micro_http::protocol::{HttpError, ParseError};

const CHUNK_SIZE: usize = 64 * 1024;

/// A byte range of an open file: `(handle, offset, length)`.
///
/// Constructed already open so that turning it into a response is infallible at
/// the `Responder` seam (opening the file is the only fallible step, and it
/// happens up front via the async constructors).
pub struct FileView {
    file: File,
    offset: u64,
    length: u64,
    content_type: Option<HeaderValue>,
}

impl FileView {
    /// Opens the whole file as one view, guessing its content type from its extension.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        let length = file.metadata().await?.len();
        let content_type = guess_content_type(path);
        Ok(Self { file, offset: 0, length, content_type })
    }

    /// Opens a sub-range `[offset, offset + length)` of the file, e.g. to answer a
    /// `Range` request.
    pub async fn open_range(path: impl AsRef<Path>, offset: u64, length: u64) -> std::io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        let content_type = guess_content_type(path);
        Ok(Self { file, offset, length, content_type })
    }

    /// Wraps an already-open file handle directly, bypassing path/extension handling.
    pub fn from_file(file: File, offset: u64, length: u64) -> Self {
        Self { file, offset, length, content_type: None }
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

fn guess_content_type(path: &Path) -> Option<HeaderValue> {
    let guess: MimeGuess = mime_guess::from_path(path);
    let mime = guess.first()?;
    HeaderValue::from_str(mime.as_ref()).ok()
}

impl Responder for FileView {
    fn response_to(self, _req: &RequestContext) -> Response<ResponseBody> {
        let FileView { file, offset, length, content_type } = self;

        let mut builder = Response::builder().status(StatusCode::OK);
        let headers = builder.headers_mut().unwrap();
        headers.reserve(8);
        headers.insert(
            http::header::CONTENT_TYPE,
            content_type.unwrap_or_else(|| HeaderValue::from_static(mime::APPLICATION_OCTET_STREAM.as_ref())),
        );
        headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from(length));

        let body = FileBody::new(file, offset, length);
        builder.body(ResponseBody::stream(body)).unwrap()
    }
}

enum SeekState {
    /// Seeking hasn't been requested yet; the file's cursor is still at 0.
    NotStarted,
    /// `start_seek` has been called; waiting on `poll_complete`.
    InProgress,
    /// Cursor is positioned at `offset`; reads may proceed.
    Done,
}

pin_project! {
    /// Streams `length` bytes of `file` starting at `offset`, one chunk at a time.
    pub struct FileBody {
        #[pin]
        file: File,
        offset: u64,
        remaining: u64,
        seek: SeekState,
        buf: BytesMut,
    }
}

impl FileBody {
    fn new(file: File, offset: u64, length: u64) -> Self {
        let seek = if offset == 0 { SeekState::Done } else { SeekState::NotStarted };
        Self { file, offset, remaining: length, seek, buf: BytesMut::new() }
    }
}

impl Body for FileBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        loop {
            match this.seek {
                SeekState::NotStarted => {
                    if let Err(e) = this.file.as_mut().start_seek(SeekFrom::Start(*this.offset)) {
                        return Poll::Ready(Some(Err(ParseError::io(e).into())));
                    }
                    *this.seek = SeekState::InProgress;
                }
                SeekState::InProgress => match this.file.as_mut().poll_complete(cx) {
                    Poll::Ready(Ok(_)) => *this.seek = SeekState::Done,
                    Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(ParseError::io(e).into()))),
                    Poll::Pending => return Poll::Pending,
                },
                SeekState::Done => break,
            }
        }

        if *this.remaining == 0 {
            return Poll::Ready(None);
        }

        let want = CHUNK_SIZE.min(*this.remaining as usize);
        this.buf.resize(want, 0);
        let mut read_buf = ReadBuf::new(&mut this.buf[..]);

        match this.file.as_mut().poll_read(cx, &mut read_buf) {
            Poll::Ready(Ok(())) => {
                let n = read_buf.filled().len();
                if n == 0 {
                    *this.remaining = 0;
                    return Poll::Ready(None);
                }
                let chunk = Bytes::copy_from_slice(&read_buf.filled()[..n]);
                *this.remaining -= n as u64;
                Poll::Ready(Some(Ok(Frame::data(chunk))))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Some(Err(ParseError::io(e).into()))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.remaining == 0 && matches!(self.seek, SeekState::Done)
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::io::Write;

    async fn write_temp_file(contents: &[u8]) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("micro-web-file-view-test-{}", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn streams_whole_file() {
        let path = write_temp_file(b"hello file view").await;
        let view = FileView::open(&path).await.unwrap();
        assert_eq!(view.len(), 15);

        let body = FileBody::new(File::open(&path).await.unwrap(), view.offset, view.length);
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected.as_ref(), b"hello file view");

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn streams_a_sub_range() {
        let path = write_temp_file(b"0123456789").await;
        let file = File::open(&path).await.unwrap();
        let body = FileBody::new(file, 3, 4);

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected.as_ref(), b"3456");

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn guesses_content_type_from_extension() {
        let mut path = std::env::temp_dir();
        path.push(format!("micro-web-file-view-test-{}.html", std::process::id()));
        std::fs::write(&path, b"<html></html>").unwrap();

        let view = FileView::open(&path).await.unwrap();
        assert_eq!(view.content_type.as_ref().unwrap(), "text/html");

        std::fs::remove_file(&path).unwrap();
    }
}
