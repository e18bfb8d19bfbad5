//! Cached `Date` header value, refreshed in the background (§4.4).
//!
//! Every response gets a `Date` header stamped unconditionally as part of the channel's
//! header finalization policy, independent of any handler-level date wrapper. Formatting
//! an RFC-1123 timestamp on every response would be wasteful, so the value is generated
//! once and refreshed periodically by a background task, mirroring the approach used for
//! the opt-in handler-level date wrapper.

use arc_swap::ArcSwap;
use http::HeaderValue;
use std::sync::Arc;
use std::time::Duration;

pub(super) fn current_date_value() -> HeaderValue {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    HeaderValue::from_bytes(buf.as_ref()).expect("faf_http_date always produces a valid header value")
}

/// Produces the current `Date` header value, refreshing it at most once every 700ms.
pub struct DateGenerator {
    current: Arc<ArcSwap<HeaderValue>>,
    handle: tokio::task::JoinHandle<()>,
}

impl DateGenerator {
    /// Starts the background refresh task and returns a generator backed by it.
    pub fn new() -> Self {
        let current = Arc::new(ArcSwap::new(Arc::new(current_date_value())));
        let current_arc = Arc::clone(&current);

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(700)).await;
                current_arc.store(Arc::new(current_date_value()));
            }
        });

        DateGenerator { current, handle }
    }

    /// Returns the most recently cached `Date` header value.
    pub fn header_value(&self) -> HeaderValue {
        self.current.load().as_ref().clone()
    }
}

impl Default for DateGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DateGenerator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
