//! HTTP request body handling implementation.
//!
//! [`ReqBody`] implements `http_body::Body` directly over the same `FramedRead` the
//! request header was decoded from: a handler that calls `Request<ReqBody>::into_body`
//! and polls it streams chunks straight off the connection's reader, with no
//! intermediate channel or buffering stage. [`ReqBodyState`] is the half the channel
//! keeps: `finish()` drains whatever the handler left unread and hands the `FramedRead`
//! back so the next request on the same connection can be parsed off it.

mod req_body;

pub use req_body::ReqBody;
pub(crate) use req_body::ReqBodyState;

