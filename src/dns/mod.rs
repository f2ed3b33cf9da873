//! DNS-learned domain mappings
//!
//! This module turns snooped DNS responses into domain to IP mappings that a
//! policy dataplane can program:
//! * Learning A, AAAA and CNAME records from captured responses
//! * Following CNAME chains and wildcard patterns
//! * Expiring mappings by TTL
//! * Batching changes for the dataplane and releasing packet callbacks
//!
//! # Module Structure
//!
//! * `store` - The domain info store and its event loop
//! * `cache` - Mapping graph, result cache and change tracking
//! * `revision` - Revision cursors and callback release
//! * `persist` - Snapshot of mappings on disk
//! * `protocol` - Decoded DNS message model

/// Mapping graph with alias chains and change tracking
pub mod cache;

/// Store configuration
pub mod config;

/// Error types
pub mod errors;

/// Expiry timers and the clock
pub mod expiry;

/// DNS request/response latency measurement
pub mod latency;

/// Subscriber setup for log output
pub mod logging;

/// Prometheus metrics
pub mod metrics;

/// On-disk snapshot of mappings
pub mod persist;

/// Decoded DNS message definitions
pub mod protocol;

/// IP to name index
pub mod reverse;

/// Revision cursors for the dataplane handoff
pub mod revision;

/// The domain info store
pub mod store;

/// Wildcard domain patterns
pub mod wildcard;
