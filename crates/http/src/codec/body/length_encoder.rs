use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    length: u64,
    done: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { length, done: length == 0 }
    }

    /// Returns whether the declared length has been fully written, or an `Eof` item has
    /// already been observed.
    pub fn is_finish(&self) -> bool {
        self.done
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.done {
            warn!("encode payload_item but no need to encode anymore");
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) => {
                let remaining = bytes.remaining() as u64;
                if remaining == 0 {
                    return Ok(());
                }
                dst.put(bytes);
                self.length = self.length.saturating_sub(remaining);
                if self.length == 0 {
                    self.done = true;
                }
                Ok(())
            }
            // A `Content-Length`-framed body has no wire slot for trailers; the length was
            // already committed to in the header, so there's nowhere left to write them.
            PayloadItem::Trailer(_) => Ok(()),
            PayloadItem::Eof => {
                self.done = true;
                Ok(())
            }
        }
    }
}
