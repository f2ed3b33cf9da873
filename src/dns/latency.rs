//! DNS request/response latency
//!
//! Requests are remembered by (client IP, DNS id) together with their capture
//! timestamp. The matching response yields the latency. Capture timestamps
//! are nanoseconds from an arbitrary base shared by all packets, not wall
//! clock time.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use crate::dns::metrics::DNS_LATENCY;

/// Requests that see no response within this long are forgotten.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ExchangeKey {
    client: IpAddr,
    id: u16,
}

#[derive(Debug, Default)]
pub struct LatencyTracker {
    requests: HashMap<ExchangeKey, u64>,
}

impl LatencyTracker {
    pub fn new() -> LatencyTracker {
        LatencyTracker {
            requests: HashMap::new(),
        }
    }

    /// Notes a request from `client` captured at `timestamp`.
    pub fn request(&mut self, client: IpAddr, id: u16, timestamp: u64) {
        let key = ExchangeKey { client, id };
        if self.requests.contains_key(&key) {
            log::warn!("DNS-LATENCY: Already have outstanding DNS request with ID {:?}", key);
        } else {
            log::debug!("DNS-LATENCY: DNS request in hand with ID {:?}", key);
            self.requests.insert(key, timestamp);
        }

        self.expire(timestamp);
    }

    /// Pairs a response to `client` with its request, returning the latency
    /// when the request was seen.
    pub fn response(&mut self, client: IpAddr, id: u16, timestamp: u64) -> Option<Duration> {
        let key = ExchangeKey { client, id };
        let latency = match self.requests.remove(&key) {
            Some(requested) => {
                let latency = Duration::from_nanos(timestamp.saturating_sub(requested));
                log::debug!("DNS-LATENCY: {:?} for ID {:?}", latency, key);
                DNS_LATENCY.observe(latency.as_secs_f64());
                Some(latency)
            }
            None => {
                log::debug!("DNS-LATENCY: Missed DNS request for response with ID {:?}", key);
                None
            }
        };

        self.expire(timestamp);
        latency
    }

    fn expire(&mut self, now: u64) {
        let timeout = REQUEST_TIMEOUT.as_nanos() as u64;
        self.requests.retain(|key, requested| {
            let stale = now.saturating_sub(*requested) > timeout;
            if stale {
                log::warn!("DNS-LATENCY: Missed DNS response for request with ID {:?}", key);
            }
            !stale
        });
    }

    pub fn outstanding(&self) -> usize {
        self.requests.len()
    }
}
