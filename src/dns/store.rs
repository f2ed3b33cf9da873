//! The domain info store
//!
//! `DomainInfoStore` learns domain to IP mappings from captured DNS responses
//! and hands changes to the dataplane in batches.
//!
//! # Event loop
//!
//! `start` spawns a single task that owns the receiving ends of the packet
//! queue, the expiry queue and the reset signal, and also ticks the save and
//! GC timers. It handles one event per iteration. Everything else runs on the
//! caller's task and synchronises on the store lock.
//!
//! # Dataplane handoff
//!
//! When learning changes anything the store sends on the "updates ready"
//! channel. That channel holds at most one notification, so a burst of
//! changes wakes the dataplane once. The dataplane then calls
//! `handle_updates`, which reports each changed name to the registered
//! handlers, programs whatever they asked for, and calls `updates_applied`.
//! Completion callbacks attached to captured packets are held back until the
//! changes their packet caused are live.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::dns::cache::MappingCache;
use crate::dns::config::{ConfigUpdate, StoreConfig};
use crate::dns::errors::{Result, StoreError};
use crate::dns::expiry::{Clock, ExpiryScheduler, ExpirySignal, SystemClock, TokioExpiryScheduler};
use crate::dns::latency::LatencyTracker;
use crate::dns::metrics::{
    GC_DELETED, INVALID_PACKETS_IN, MAPPINGS, NON_QUERY_PACKETS_IN, REQ_PACKETS_IN, RESP_PACKETS_IN,
};
use crate::dns::persist;
use crate::dns::protocol::{DecodeError, DecodedPacket, DnsPacket, OpCode, PacketDecoder};
use crate::dns::revision::{Callback, CallbackRunner, RevisionTracker};

/// Told about every changed name by `handle_updates`.
pub trait DomainChangeHandler: Send + Sync {
    /// Returns true if the change means the dataplane must be programmed.
    fn on_domain_change(&self, name: &str) -> bool;
}

/// A packet as handed over by the capture layer.
pub struct CapturedPacket {
    pub payload: Vec<u8>,
    /// Capture time in nanoseconds, used for latency measurement
    pub timestamp: Option<u64>,
    /// Run once the mappings learned from this packet are live in the dataplane
    pub callback: Option<Callback>,
}

impl CapturedPacket {
    pub fn new(payload: Vec<u8>) -> CapturedPacket {
        CapturedPacket {
            payload,
            timestamp: None,
            callback: None,
        }
    }
}

impl fmt::Debug for CapturedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedPacket")
            .field("len", &self.payload.len())
            .field("timestamp", &self.timestamp)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

struct StoreState {
    cache: MappingCache,
    revisions: RevisionTracker,
    latency: LatencyTracker,
    epoch: i64,
}

struct LoopChannels {
    packets: Receiver<CapturedPacket>,
    expiries: UnboundedReceiver<ExpirySignal>,
    reset: Receiver<()>,
}

struct Shared {
    config: StoreConfig,
    decoder: Arc<dyn PacketDecoder>,
    state: RwLock<StoreState>,
    handlers: RwLock<Vec<Arc<dyn DomainChangeHandler>>>,
    callbacks: CallbackRunner,
    updates_ready: Sender<()>,
    reset: Sender<()>,
}

pub struct DomainInfoStore {
    shared: Arc<Shared>,
    packets: Sender<CapturedPacket>,
    channels: Mutex<Option<LoopChannels>>,
    updates_ready: Mutex<Option<Receiver<()>>>,
}

impl DomainInfoStore {
    /// Creates a store with real timers. Must be called within a tokio
    /// runtime for expiry timers to be scheduled.
    pub fn new(config: StoreConfig, decoder: Arc<dyn PacketDecoder>) -> DomainInfoStore {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(TokioExpiryScheduler::new(expiry_tx));

        DomainInfoStore::build(config, decoder, scheduler, Arc::new(SystemClock), expiry_rx)
    }

    /// Creates a store whose timers and clock are supplied by the caller.
    pub fn with_shims(
        config: StoreConfig,
        decoder: Arc<dyn PacketDecoder>,
        scheduler: Arc<dyn ExpiryScheduler>,
        clock: Arc<dyn Clock>,
    ) -> DomainInfoStore {
        // Nothing feeds the expiry queue; expiries arrive through
        // `process_mapping_expiry` instead.
        let (_, expiry_rx) = mpsc::unbounded_channel();

        DomainInfoStore::build(config, decoder, scheduler, clock, expiry_rx)
    }

    fn build(
        config: StoreConfig,
        decoder: Arc<dyn PacketDecoder>,
        scheduler: Arc<dyn ExpiryScheduler>,
        clock: Arc<dyn Clock>,
        expiries: UnboundedReceiver<ExpirySignal>,
    ) -> DomainInfoStore {
        log::info!("Creating domain info store with config {:?}", config);

        let (packets_tx, packets_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (ready_tx, ready_rx) = mpsc::channel(1);
        let (reset_tx, reset_rx) = mpsc::channel(1);

        let mut cache = MappingCache::new(scheduler, clock);
        cache.set_extra_ttl(config.extra_ttl());

        let state = StoreState {
            cache,
            revisions: RevisionTracker::new(),
            latency: LatencyTracker::new(),
            epoch: config.epoch,
        };

        DomainInfoStore {
            shared: Arc::new(Shared {
                config,
                decoder,
                state: RwLock::new(state),
                handlers: RwLock::new(Vec::new()),
                callbacks: CallbackRunner::new(),
                updates_ready: ready_tx,
                reset: reset_tx,
            }),
            packets: packets_tx,
            channels: Mutex::new(Some(LoopChannels {
                packets: packets_rx,
                expiries,
                reset: reset_rx,
            })),
            updates_ready: Mutex::new(Some(ready_rx)),
        }
    }

    /// Where the capture layer submits packets. Sending waits while the queue
    /// is full.
    pub fn message_sender(&self) -> Sender<CapturedPacket> {
        self.packets.clone()
    }

    /// The receiving end of the "updates ready" notification. Can be taken once.
    pub fn updates_ready(&self) -> Option<Receiver<()>> {
        self.updates_ready.lock().take()
    }

    /// Restores persisted mappings and spawns the event loop onto the current
    /// tokio runtime.
    pub fn start(&self) -> Result<JoinHandle<()>> {
        log::info!("Starting domain info store");

        self.shared.config.validate()?;
        let channels = self.channels.lock().take().ok_or(StoreError::AlreadyStarted)?;

        if let Some(dir) = self.shared.config.cache_file.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    log::error!("Failed to create persistent file dir {}: {}", dir.display(), e);
                    e
                })?;
            }
        }

        if let Err(e) = self.shared.load_mappings() {
            log::warn!("Failed to read mappings from file: {}", e);
        }

        let shared = self.shared.clone();
        Ok(tokio::spawn(async move { shared.run(channels).await }))
    }

    /// Reacts to a configuration change. A new epoch flushes every mapping;
    /// a new extra TTL applies to mappings stored from now on.
    pub fn on_config_update(&self, update: ConfigUpdate) {
        let mut state = self.shared.state.write();

        if update.epoch != state.epoch {
            log::info!(
                "Update epoch ({}->{}) and send trigger to clear cache",
                state.epoch,
                update.epoch
            );
            state.epoch = update.epoch;
            match self.shared.reset.try_send(()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => log::debug!("Cache reset already pending"),
                Err(TrySendError::Closed(_)) => log::warn!("Event loop gone, cache not reset"),
            }
        }

        if update.extra_ttl != state.cache.extra_ttl() {
            log::info!("Extra TTL is now {:?}", update.extra_ttl);
            state.cache.set_extra_ttl(update.extra_ttl);
        }
    }

    pub fn register_handler(&self, handler: Arc<dyn DomainChangeHandler>) {
        self.shared.handlers.write().push(handler);
    }

    /// Passes every changed name to the handlers. Returns true if the
    /// dataplane needs programming, after which the caller must call
    /// `updates_applied`. When it returns false that has already been done.
    ///
    /// May be called several times before `updates_applied`.
    pub fn handle_updates(&self) -> bool {
        self.shared.handle_updates()
    }

    /// Called by the dataplane once everything reported by the last
    /// `handle_updates` is programmed. Releases the held callbacks.
    pub fn updates_applied(&self) {
        self.shared.updates_applied()
    }

    /// IPs that `domain`, or any name matching it if it is a wildcard,
    /// currently resolves to.
    pub fn get_domain_ips(&self, domain: &str) -> Vec<IpAddr> {
        self.shared.state.write().cache.get_domain_ips(domain)
    }

    /// A watched domain or wildcard that leads to `ip`, if any.
    pub fn get_watched_domain_for_ip(&self, ip: IpAddr) -> Option<String> {
        self.shared.state.read().cache.get_watched_domain_for_ip(&ip)
    }

    /// Classifies and learns from one captured packet, as the event loop does.
    pub fn process_payload(&self, packet: CapturedPacket) {
        self.shared.process_payload(packet)
    }

    /// Learns from the answer and additional sections of a DNS response.
    pub fn process_packet(&self, dns: &DnsPacket, callback: Option<Callback>) {
        self.shared.process_packet(dns, callback)
    }

    pub fn process_mapping_expiry(&self, name: &str, value: &str) {
        self.shared.process_mapping_expiry(name, value)
    }

    pub fn expire_all_mappings(&self) {
        self.shared.expire_all_mappings()
    }

    pub fn collect_garbage(&self) -> usize {
        self.shared.collect_garbage()
    }

    pub fn save_mappings(&self) -> Result<()> {
        self.shared.save_mappings()
    }

    /// Restores mappings from the cache file. Returns how many were restored.
    pub fn load_mappings(&self) -> Result<usize> {
        self.shared.load_mappings()
    }

    pub fn mapping_count(&self) -> usize {
        self.shared.state.read().cache.mapping_count()
    }

    pub fn name_count(&self) -> usize {
        self.shared.state.read().cache.name_count()
    }

    pub fn current_revision(&self) -> u64 {
        self.shared.state.read().revisions.current()
    }

    pub fn applied_revision(&self) -> u64 {
        self.shared.state.read().revisions.applied()
    }

    /// Revision at which `name` last gained a value.
    pub fn name_revision(&self, name: &str) -> Option<u64> {
        let state = self.shared.state.read();
        state.cache.get(&name.to_lowercase()).map(|entry| entry.revision)
    }

    pub fn epoch(&self) -> i64 {
        self.shared.state.read().epoch
    }

    pub fn changed_names(&self) -> BTreeSet<String> {
        self.shared.state.read().cache.changed_names().clone()
    }
}

impl Shared {
    async fn run(self: Arc<Self>, mut channels: LoopChannels) {
        let save_period = self.config.save_interval();
        let gc_period = self.config.gc_interval();
        let mut save_timer = interval_at(Instant::now() + save_period, save_period);
        let mut gc_timer = interval_at(Instant::now() + gc_period, gc_period);
        save_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        gc_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                packet = channels.packets.recv() => match packet {
                    Some(packet) => self.process_payload(packet),
                    None => {
                        log::info!("Packet queue closed, stopping domain info store");
                        break;
                    }
                },
                Some(expiry) = channels.expiries.recv() => {
                    self.process_mapping_expiry(&expiry.name, &expiry.value);
                }
                _ = save_timer.tick() => {
                    if let Err(e) = self.save_mappings() {
                        log::warn!("Failed to save mappings to file: {}", e);
                    }
                }
                _ = gc_timer.tick() => {
                    self.collect_garbage();
                }
                Some(()) = channels.reset.recv() => {
                    self.expire_all_mappings();
                }
            }
        }
    }

    fn process_payload(&self, packet: CapturedPacket) {
        let CapturedPacket {
            payload,
            timestamp,
            callback,
        } = packet;

        let decoded = match self.decoder.decode(&payload) {
            Ok(decoded) => decoded,
            Err(DecodeError::NoTransport) => {
                log::debug!("Ignoring packet with no transport layer");
                self.release(callback);
                return;
            }
            Err(DecodeError::UdpPing) => {
                log::debug!("Ignoring UDP ping packet");
                INVALID_PACKETS_IN.inc();
                self.release(callback);
                return;
            }
            Err(e) => {
                log::debug!("Failed to decode DNS packet: {}", e);
                INVALID_PACKETS_IN.inc();
                self.release(callback);
                return;
            }
        };

        if let (Some(src), Some(dst)) = (decoded.src, decoded.dst) {
            log::debug!("src {} dst {}", src, dst);
        }

        if decoded.dns.header.opcode != OpCode::Query {
            log::debug!("Ignoring non-Query DNS packet.");
            NON_QUERY_PACKETS_IN.inc();
            self.release(callback);
            return;
        }

        if self.config.measure_latency {
            match timestamp {
                Some(ts) if ts > 0 => self.process_for_latency(&decoded, ts),
                _ => log::debug!("No capture timestamp, skip latency measurement"),
            }
        }

        if decoded.dns.header.response {
            if decoded.dns.questions.is_empty() {
                log::debug!("Ignoring DNS packet with no questions; malformed packet?");
                INVALID_PACKETS_IN.inc();
                self.release(callback);
                return;
            }

            self.process_packet(&decoded.dns, callback);
            RESP_PACKETS_IN.inc();
        } else {
            REQ_PACKETS_IN.inc();
            self.release(callback);
        }
    }

    fn process_for_latency(&self, decoded: &DecodedPacket, timestamp: u64) {
        let id = decoded.dns.header.id;
        let mut state = self.state.write();

        if decoded.dns.header.response {
            if let Some(client) = decoded.dst {
                state.latency.response(client, id, timestamp);
            }
        } else if let Some(client) = decoded.src {
            state.latency.request(client, id, timestamp);
        }
    }

    fn process_packet(&self, dns: &DnsPacket, callback: Option<Callback>) {
        log::debug!(
            "DNS packet with {} answers {} additionals",
            dns.answers.len(),
            dns.resources.len()
        );

        let mut state = self.state.write();
        let revision = state.revisions.current();

        // The highest revision among the records decides when the callback
        // may run.
        let mut max_revision = 0;
        for rr in &dns.answers {
            max_revision = max_revision.max(state.cache.store_record(rr, "answer", revision));
        }
        for rr in &dns.resources {
            max_revision = max_revision.max(state.cache.store_record(rr, "additional", revision));
        }

        self.maybe_signal_updates_ready(&mut state, "mapping added");

        let callback = match callback {
            Some(callback) => callback,
            None => return,
        };

        if let Some(immediate) = state.revisions.file(max_revision, callback) {
            drop(state);
            self.callbacks.run(vec![immediate]);
        }
    }

    fn process_mapping_expiry(&self, name: &str, value: &str) {
        let mut state = self.state.write();
        state.cache.process_expiry(name, value);
        self.maybe_signal_updates_ready(&mut state, "mapping expired");
    }

    fn expire_all_mappings(&self) {
        let mut state = self.state.write();
        state.cache.expire_all();
        self.maybe_signal_updates_ready(&mut state, "epoch changed");
    }

    fn collect_garbage(&self) -> usize {
        let mut state = self.state.write();
        let deleted = state.cache.collect_garbage();
        MAPPINGS.set(state.cache.mapping_count() as i64);

        if deleted > 0 {
            log::debug!("Garbage collected {} names", deleted);
            GC_DELETED.inc_by(deleted as u64);
        }

        deleted
    }

    fn save_mappings(&self) -> Result<()> {
        let mappings = {
            let state = self.state.read();
            MAPPINGS.set(state.cache.mapping_count() as i64);
            state.cache.mappings()
        };

        persist::save(&self.config.cache_file, &mappings)
    }

    fn load_mappings(&self) -> Result<usize> {
        let now = self.state.read().cache.clock().now();

        let restored = match persist::load(&self.config.cache_file, now) {
            Ok(restored) => restored,
            Err(StoreError::Io(ref e)) if e.kind() == io::ErrorKind::NotFound => {
                log::info!(
                    "No mappings file {}, starting with an empty cache",
                    self.config.cache_file.display()
                );
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        let mut state = self.state.write();
        let revision = state.revisions.current();
        for mapping in &restored {
            state.cache.store_info(
                &mapping.name,
                &mapping.value,
                mapping.ttl,
                mapping.is_alias,
                revision,
            );
        }
        log::info!("Restored {} DNS mappings", restored.len());

        self.maybe_signal_updates_ready(&mut state, "mapping file loaded");

        Ok(restored.len())
    }

    fn handle_updates(&self) -> bool {
        let changed = {
            let mut state = self.state.write();
            state.revisions.begin_handling();
            state.cache.take_changed_names()
        };

        // Handlers call back into the store for IPs, so the lock must not be
        // held here.
        let handlers = self.handlers.read().clone();
        let mut sync_needed = false;
        for name in &changed {
            for handler in &handlers {
                if handler.on_domain_change(name) {
                    sync_needed = true;
                }
            }
        }

        let mut state = self.state.write();
        if sync_needed {
            state.revisions.request_sync();
        }

        if state.revisions.needs_sync() {
            return true;
        }

        let callbacks = state.revisions.mark_applied();
        drop(state);
        self.callbacks.run(callbacks);

        false
    }

    fn updates_applied(&self) {
        let callbacks = self.state.write().revisions.mark_applied();
        self.callbacks.run(callbacks);
    }

    /// Packets that teach the store nothing are released straight away.
    fn release(&self, callback: Option<Callback>) {
        if let Some(callback) = callback {
            self.callbacks.run(vec![callback]);
        }
    }

    fn maybe_signal_updates_ready(&self, state: &mut RwLockWriteGuard<'_, StoreState>, reason: &str) {
        if !state.cache.has_changes() {
            log::debug!("No changed names");
            return;
        }

        // Debug only. The lock is released while waiting so that the
        // dataplane can carry on, and retaken before signalling so that the
        // signal cannot be handled before it is sent.
        let delay: Duration = self.config.response_delay();
        if !delay.is_zero() {
            log::debug!(
                "Delaying DNS response for domains {:?} for {:?}",
                state.cache.changed_names(),
                delay
            );
            RwLockWriteGuard::unlocked(state, || blocking_sleep(delay));
        }

        match self.updates_ready.try_send(()) {
            Ok(()) => log::debug!("Sent update ready notification ({})", reason),
            Err(TrySendError::Full(_)) => log::debug!(
                "Update ready notification already pending, updates will be handled together ({})",
                reason
            ),
            Err(TrySendError::Closed(_)) => log::debug!("Nobody listening for updates ({})", reason),
        }
    }
}


/// Sleeps without stalling the other tasks of a multi-threaded runtime.
/// A current-thread runtime has nowhere to move them, so it just sleeps.
fn blocking_sleep(delay: Duration) {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(|| std::thread::sleep(delay)),
        _ => std::thread::sleep(delay),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::protocol::{DnsQuestion, DnsRecord, QueryType, TransientTtl};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoDecoder;

    impl PacketDecoder for NoDecoder {
        fn decode(&self, _payload: &[u8]) -> std::result::Result<DecodedPacket, DecodeError> {
            Err(DecodeError::Malformed("test".to_string()))
        }
    }

    struct CountingHandler {
        calls: AtomicUsize,
    }

    impl DomainChangeHandler for CountingHandler {
        fn on_domain_change(&self, _name: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn a_record(domain: &str, ip: &str) -> DnsPacket {
        DnsPacket::response(
            DnsQuestion::new(domain.to_string(), QueryType::A),
            vec![DnsRecord::A {
                domain: domain.to_string(),
                addr: ip.parse().unwrap(),
                ttl: TransientTtl(60),
            }
            .into()],
        )
    }

    fn test_store() -> DomainInfoStore {
        let config = StoreConfig {
            cache_file: std::env::temp_dir().join("domainwatch-store-unit/dns-cache.txt"),
            ..StoreConfig::default()
        };
        DomainInfoStore::new(config, Arc::new(NoDecoder))
    }

    #[tokio::test]
    async fn test_updates_ready_coalesces() {
        let store = test_store();
        let mut ready = store.updates_ready().unwrap();
        assert!(store.updates_ready().is_none());

        store.process_packet(&a_record("a.com", "10.0.0.1"), None);
        store.process_packet(&a_record("b.com", "10.0.0.2"), None);

        assert!(ready.try_recv().is_ok());
        assert!(ready.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handle_updates_advances_revision() {
        let store = test_store();
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        store.register_handler(handler.clone());

        store.process_packet(&a_record("a.com", "10.0.0.1"), None);
        assert_eq!(store.current_revision(), 1);

        assert!(store.handle_updates());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.current_revision(), 2);
        assert_eq!(store.applied_revision(), 0);

        store.updates_applied();
        assert_eq!(store.applied_revision(), 1);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let store = test_store();
        let handle = store.start().unwrap();
        assert!(matches!(store.start(), Err(StoreError::AlreadyStarted)));
        handle.abort();
    }

    #[tokio::test]
    async fn test_start_rejects_zero_intervals() {
        let mut config = StoreConfig::from_toml_str("gc_interval_secs = 0").unwrap();
        config.cache_file = std::env::temp_dir().join("domainwatch-store-unit/dns-cache.txt");
        let store = DomainInfoStore::new(config, Arc::new(NoDecoder));

        assert!(matches!(store.start(), Err(StoreError::InvalidConfig { .. })));
        // A rejected start leaves the loop channels in place.
        assert!(store.channels.lock().is_some());

        let store = DomainInfoStore::new(
            StoreConfig {
                save_interval_secs: 0,
                ..test_store().shared.config.clone()
            },
            Arc::new(NoDecoder),
        );
        assert!(matches!(store.start(), Err(StoreError::InvalidConfig { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_response_delay_leaves_runtime_running() {
        let config = StoreConfig {
            response_delay_ms: 600,
            ..test_store().shared.config.clone()
        };
        let store = Arc::new(DomainInfoStore::new(config, Arc::new(NoDecoder)));
        let mut ready = store.updates_ready().unwrap();

        let started = Instant::now();
        let learner = {
            let store = store.clone();
            tokio::spawn(async move { store.process_packet(&a_record("a.com", "10.0.0.1"), None) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The only worker is inside the delay; other tasks must still run.
        let other = tokio::spawn(async { 7 });
        let value = tokio::time::timeout(Duration::from_millis(300), other).await;
        assert_eq!(value.unwrap().unwrap(), 7);

        learner.await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(600));
        assert!(ready.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_epoch_change_requests_single_reset() {
        let store = test_store();
        store.on_config_update(ConfigUpdate {
            epoch: 1,
            extra_ttl: Duration::from_secs(0),
        });
        store.on_config_update(ConfigUpdate {
            epoch: 2,
            extra_ttl: Duration::from_secs(30),
        });
        assert_eq!(store.epoch(), 2);

        let mut channels = store.channels.lock().take().unwrap();
        assert!(channels.reset.try_recv().is_ok());
        assert!(channels.reset.try_recv().is_err());
    }
}
