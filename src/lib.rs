//! domainwatch
//!
//! Learns which IPs currently answer for which domain names by watching DNS
//! responses, and serves that to a network policy dataplane that programs
//! domain-based allow-lists.
//!
//! # Features
//!
//! * CNAME chains and wildcard domains (`*.example.com`)
//! * Per-mapping TTL expiry with a minimum lifetime
//! * Batched, revisioned handoff to the dataplane with per-packet callbacks
//! * Mappings persisted across restarts
//! * Prometheus counters for captured traffic
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use domainwatch::dns::config::StoreConfig;
//! use domainwatch::dns::protocol::{DecodeError, DecodedPacket, PacketDecoder};
//! use domainwatch::dns::store::DomainInfoStore;
//!
//! struct MyDecoder;
//!
//! impl PacketDecoder for MyDecoder {
//!     fn decode(&self, _payload: &[u8]) -> Result<DecodedPacket, DecodeError> {
//!         Err(DecodeError::NoTransport)
//!     }
//! }
//!
//! # async fn run() -> domainwatch::dns::errors::Result<()> {
//! let store = DomainInfoStore::new(StoreConfig::default(), Arc::new(MyDecoder));
//! let mut ready = store.updates_ready().expect("receiver taken once");
//! store.start()?;
//!
//! while ready.recv().await.is_some() {
//!     if store.handle_updates() {
//!         // program the dataplane, then:
//!         store.updates_applied();
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Domain mapping store and its supporting pieces
pub mod dns;
