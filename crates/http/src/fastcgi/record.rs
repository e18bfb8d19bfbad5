//! FastCGI record framing: fixed 8-byte header + content + padding.
//!
//! Mirrors the `tokio_util::codec::{Decoder, Encoder}` pairing the HTTP/1 codec uses
//! in [`crate::codec`], so the same `Framed` machinery drives both transports.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::ParseError;

pub const FCGI_VERSION_1: u8 = 1;
pub const FCGI_HEADER_LEN: usize = 8;

/// Record type, per the FastCGI spec's `FCGI_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    BeginRequest,
    AbortRequest,
    EndRequest,
    Params,
    Stdin,
    Stdout,
    Stderr,
    Data,
    GetValues,
    GetValuesResult,
    UnknownType,
}

impl RecordType {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => RecordType::BeginRequest,
            2 => RecordType::AbortRequest,
            3 => RecordType::EndRequest,
            4 => RecordType::Params,
            5 => RecordType::Stdin,
            6 => RecordType::Stdout,
            7 => RecordType::Stderr,
            8 => RecordType::Data,
            9 => RecordType::GetValues,
            10 => RecordType::GetValuesResult,
            11 => RecordType::UnknownType,
            _ => return None,
        })
    }

    fn as_u8(self) -> u8 {
        match self {
            RecordType::BeginRequest => 1,
            RecordType::AbortRequest => 2,
            RecordType::EndRequest => 3,
            RecordType::Params => 4,
            RecordType::Stdin => 5,
            RecordType::Stdout => 6,
            RecordType::Stderr => 7,
            RecordType::Data => 8,
            RecordType::GetValues => 9,
            RecordType::GetValuesResult => 10,
            RecordType::UnknownType => 11,
        }
    }
}

/// One decoded FastCGI record: type, request-id, and content (padding stripped).
#[derive(Debug, Clone)]
pub struct Record {
    pub record_type: RecordType,
    pub request_id: u16,
    pub content: Bytes,
}

/// Stateless record decoder: each call either consumes one full record or
/// returns `Ok(None)` until more bytes arrive, same contract as the HTTP/1
/// header/body decoders in [`crate::codec`].
#[derive(Default)]
pub struct RecordDecoder;

impl Decoder for RecordDecoder {
    type Item = Record;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FCGI_HEADER_LEN {
            return Ok(None);
        }

        let version = src[0];
        if version != FCGI_VERSION_1 {
            return Err(ParseError::invalid_header(format!("unsupported FastCGI version {version}")));
        }

        let type_byte = src[1];
        let request_id = u16::from_be_bytes([src[2], src[3]]);
        let content_length = u16::from_be_bytes([src[4], src[5]]) as usize;
        let padding_length = src[6] as usize;

        let total_len = FCGI_HEADER_LEN + content_length + padding_length;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        let record_type = RecordType::from_u8(type_byte).ok_or_else(|| ParseError::invalid_header(format!("unknown FastCGI record type {type_byte}")))?;

        src.advance(FCGI_HEADER_LEN);
        let content = src.split_to(content_length).freeze();
        src.advance(padding_length);

        Ok(Some(Record { record_type, request_id, content }))
    }
}

/// Encodes a record with padding chosen to align total length to 8 bytes, matching
/// the convention (not a requirement) most FastCGI implementations use.
#[derive(Default)]
pub struct RecordEncoder;

impl Encoder<Record> for RecordEncoder {
    type Error = ParseError;

    fn encode(&mut self, record: Record, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let content_length = record.content.len();
        if content_length > u16::MAX as usize {
            return Err(ParseError::invalid_header("FastCGI record content exceeds 65535 bytes"));
        }
        let padding_length = (8 - (content_length % 8)) % 8;

        dst.reserve(FCGI_HEADER_LEN + content_length + padding_length);
        dst.put_u8(FCGI_VERSION_1);
        dst.put_u8(record.record_type.as_u8());
        dst.put_u16(record.request_id);
        dst.put_u16(content_length as u16);
        dst.put_u8(padding_length as u8);
        dst.put_u8(0); // reserved
        dst.extend_from_slice(&record.content);
        dst.put_bytes(0, padding_length);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_stdin_record() {
        let record = Record { record_type: RecordType::Stdin, request_id: 7, content: Bytes::from_static(b"hello") };

        let mut buf = BytesMut::new();
        RecordEncoder.encode(record, &mut buf).unwrap();

        let decoded = RecordDecoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.request_id, 7);
        assert_eq!(decoded.content, Bytes::from_static(b"hello"));
        assert!(buf.is_empty());
    }

    #[test]
    fn returns_none_on_partial_header() {
        let mut buf = BytesMut::from(&[1u8, 6, 0, 1][..]);
        assert!(RecordDecoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn returns_none_until_content_and_padding_arrive() {
        let record = Record { record_type: RecordType::Params, request_id: 1, content: Bytes::from_static(b"abc") };
        let mut full = BytesMut::new();
        RecordEncoder.encode(record, &mut full).unwrap();

        let mut partial = BytesMut::from(&full[..FCGI_HEADER_LEN + 1]);
        assert!(RecordDecoder.decode(&mut partial).unwrap().is_none());
    }
}
