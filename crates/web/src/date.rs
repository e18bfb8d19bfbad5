//! HTTP date header value management service (§4.7).
//!
//! Maintains and periodically refreshes the current RFC-1123 `Date` header value so it is not
//! re-formatted on every response; a background task regenerates it at most once per second, per
//! the channel's header-finalization policy.

use arc_swap::ArcSwap;
use std::str;
use std::sync::Arc;
use std::time::Duration;

/// A service that maintains and periodically updates the current HTTP date string.
pub struct DateService {
    current: Arc<ArcSwap<Vec<u8>>>,
    handle: tokio::task::JoinHandle<()>,
}

fn current_date_bytes() -> Vec<u8> {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    buf.as_ref().to_vec()
}

impl DateService {
    /// Creates a new `DateService` instance, starting a background task that refreshes the
    /// cached date string every 700ms.
    pub(crate) fn new() -> Self {
        let current = Arc::new(ArcSwap::new(Arc::new(current_date_bytes())));
        let current_arc = Arc::clone(&current);

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(700)).await;
                current_arc.store(Arc::new(current_date_bytes()));
            }
        });

        DateService { current, handle }
    }

    /// Provides access to the current HTTP date string through a callback function.
    pub(crate) fn with_http_date<F>(&self, mut f: F)
    where
        F: FnMut(&str),
    {
        let buf = self.current.load();
        let date = str::from_utf8(buf.as_slice()).expect("faf_http_date always produces ASCII");
        f(date)
    }
}

impl Drop for DateService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
