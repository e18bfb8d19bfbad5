//! Decodes `PARAMS` record content (CGI name/value pairs) into header fields.
//!
//! Per §4.8, `PARAMS` populate the same `Request` type HTTP/1 parsing builds,
//! rather than a parallel CGI-parameter map: `SCRIPT_NAME`/`REQUEST_METHOD`/etc.
//! are mapped onto `http::request::Builder` the same way [`crate::protocol::RequestHeader`]
//! is built from `httparse::Request` in [`crate::protocol::request`].

use bytes::Buf;
use http::{HeaderName, HeaderValue, Method, Request, Version};

use crate::protocol::{ParseError, RequestHeader};

/// One decoded CGI name/value pair.
#[derive(Debug, Clone)]
pub struct NameValue {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

/// Decodes a full `PARAMS` stream (the concatenation of every `PARAMS` record's
/// content for one request-id, terminated by an empty `PARAMS` record) into
/// name/value pairs using FastCGI's short/long length encoding (1 byte if the
/// high bit is clear, else 4 bytes big-endian with the high bit masked off).
pub fn decode_params(mut buf: &[u8]) -> Result<Vec<NameValue>, ParseError> {
    let mut pairs = Vec::new();

    while buf.has_remaining() {
        let name_len = read_length(&mut buf)?;
        let value_len = read_length(&mut buf)?;

        if buf.remaining() < name_len + value_len {
            return Err(ParseError::invalid_header("truncated FastCGI PARAMS record"));
        }

        let name = buf[..name_len].to_vec();
        buf.advance(name_len);
        let value = buf[..value_len].to_vec();
        buf.advance(value_len);

        pairs.push(NameValue { name, value });
    }

    Ok(pairs)
}

fn read_length(buf: &mut &[u8]) -> Result<usize, ParseError> {
    if !buf.has_remaining() {
        return Err(ParseError::invalid_header("truncated FastCGI PARAMS length"));
    }
    let first = buf[0];
    if first & 0x80 == 0 {
        buf.advance(1);
        Ok(first as usize)
    } else {
        if buf.remaining() < 4 {
            return Err(ParseError::invalid_header("truncated FastCGI PARAMS long length"));
        }
        let b = [buf[0] & 0x7f, buf[1], buf[2], buf[3]];
        buf.advance(4);
        Ok(u32::from_be_bytes(b) as usize)
    }
}

/// Builds a [`RequestHeader`] from a decoded CGI parameter set: `REQUEST_METHOD`,
/// `SCRIPT_NAME`/`PATH_INFO`/`QUERY_STRING` (joined into the request URI), and
/// any `HTTP_*` parameter (standard CGI convention for forwarded HTTP headers).
pub fn request_header_from_params(pairs: &[NameValue]) -> Result<RequestHeader, ParseError> {
    let get = |key: &str| pairs.iter().find(|p| p.name.eq_ignore_ascii_case(key.as_bytes())).map(|p| p.value.as_slice());

    let method = get("REQUEST_METHOD").unwrap_or(b"GET");
    let method = Method::from_bytes(method).map_err(|_| ParseError::InvalidMethod)?;

    let path = get("SCRIPT_NAME").unwrap_or(b"/");
    let query = get("QUERY_STRING").unwrap_or(b"");
    let uri_bytes = if query.is_empty() {
        path.to_vec()
    } else {
        let mut v = path.to_vec();
        v.push(b'?');
        v.extend_from_slice(query);
        v
    };
    let uri = http::Uri::try_from(uri_bytes).map_err(|_| ParseError::InvalidUri)?;

    let mut builder = Request::builder().method(method).uri(uri).version(Version::HTTP_11);

    for pair in pairs {
        if let Some(name) = pair.name.strip_prefix(b"HTTP_") {
            let header_name = cgi_name_to_header_name(name);
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(&header_name), HeaderValue::from_bytes(&pair.value)) {
                builder = builder.header(name, value);
            }
        }
    }

    let request = builder.body(()).map_err(|e| ParseError::invalid_header(e.to_string()))?;
    Ok(RequestHeader::from(request))
}

/// `HTTP_ACCEPT_ENCODING` → `accept-encoding`: underscores become hyphens, case folds.
fn cgi_name_to_header_name(cgi_name: &[u8]) -> Vec<u8> {
    cgi_name.iter().map(|&b| if b == b'_' { b'-' } else { b.to_ascii_lowercase() }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_pair(name: &str, value: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(name.len() as u8);
        out.push(value.len() as u8);
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(value.as_bytes());
        out
    }

    #[test]
    fn decodes_short_length_pairs() {
        let mut buf = encode_pair("REQUEST_METHOD", "GET");
        buf.extend(encode_pair("SCRIPT_NAME", "/index.php"));

        let pairs = decode_params(&buf).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].name, b"REQUEST_METHOD");
        assert_eq!(pairs[0].value, b"GET");
        assert_eq!(pairs[1].value, b"/index.php");
    }

    #[test]
    fn builds_request_header_with_forwarded_http_headers() {
        let mut buf = encode_pair("REQUEST_METHOD", "POST");
        buf.extend(encode_pair("SCRIPT_NAME", "/submit"));
        buf.extend(encode_pair("QUERY_STRING", "a=1"));
        buf.extend(encode_pair("HTTP_ACCEPT_ENCODING", "gzip"));

        let pairs = decode_params(&buf).unwrap();
        let header = request_header_from_params(&pairs).unwrap();

        assert_eq!(header.method(), &Method::POST);
        assert_eq!(header.uri().path(), "/submit");
        assert_eq!(header.uri().query(), Some("a=1"));
        assert_eq!(header.headers().get(http::header::ACCEPT_ENCODING), Some(&HeaderValue::from_static("gzip")));
    }

    #[test]
    fn rejects_truncated_length_prefix() {
        let buf = [200u8]; // high bit set, but only 1 byte present (needs 4)
        assert!(read_length(&mut &buf[..]).is_err());
    }
}
