//! Performance benchmarks for the domain info store

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use domainwatch::dns::config::StoreConfig;
use domainwatch::dns::expiry::{ExpiryScheduler, ExpirySignal, SystemClock, TimerHandle};
use domainwatch::dns::protocol::{
    DecodeError, DecodedPacket, DnsPacket, DnsQuestion, DnsRecord, PacketDecoder, QueryType,
    TransientTtl,
};
use domainwatch::dns::store::DomainInfoStore;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

struct NoTimers;

impl ExpiryScheduler for NoTimers {
    fn schedule(&self, _after: Duration, _signal: ExpirySignal) -> TimerHandle {
        TimerHandle::detached()
    }
}

struct NoDecoder;

impl PacketDecoder for NoDecoder {
    fn decode(&self, _payload: &[u8]) -> Result<DecodedPacket, DecodeError> {
        Err(DecodeError::NoTransport)
    }
}

fn create_store() -> DomainInfoStore {
    DomainInfoStore::with_shims(
        StoreConfig::default(),
        Arc::new(NoDecoder),
        Arc::new(NoTimers),
        Arc::new(SystemClock),
    )
}

fn create_a_response(domain: &str, i: u32) -> DnsPacket {
    DnsPacket::response(
        DnsQuestion::new(domain.to_string(), QueryType::A),
        vec![DnsRecord::A {
            domain: domain.to_string(),
            addr: Ipv4Addr::from(0x0a00_0000 + i),
            ttl: TransientTtl(300),
        }
        .into()],
    )
}

/// Builds `host0.com -> host1.com -> ... -> hostN.com -> 10.0.0.1`.
fn create_chain(store: &DomainInfoStore, length: usize) {
    for i in 0..length {
        let packet = DnsPacket::response(
            DnsQuestion::new(format!("host{}.com", i), QueryType::Cname),
            vec![DnsRecord::Cname {
                domain: format!("host{}.com", i),
                host: format!("host{}.com", i + 1),
                ttl: TransientTtl(300),
            }
            .into()],
        );
        store.process_packet(&packet, None);
    }
    store.process_packet(&create_a_response(&format!("host{}.com", length), 1), None);
}

fn benchmark_learning(c: &mut Criterion) {
    let mut group = c.benchmark_group("Learning");
    group.throughput(Throughput::Elements(1));

    group.bench_function("new_mapping", |b| {
        let store = create_store();
        let mut i = 0u32;
        b.iter(|| {
            i = i.wrapping_add(1);
            store.process_packet(black_box(&create_a_response(&format!("d{}.com", i % 10_000), i)), None);
        });
    });

    group.bench_function("refresh_mapping", |b| {
        let store = create_store();
        let packet = create_a_response("same.com", 1);
        store.process_packet(&packet, None);
        b.iter(|| store.process_packet(black_box(&packet), None));
    });

    group.finish();
}

fn benchmark_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("Resolution");

    for length in [1usize, 4, 16].iter() {
        group.bench_with_input(BenchmarkId::new("cached_chain", length), length, |b, &length| {
            let store = create_store();
            create_chain(&store, length);
            b.iter(|| black_box(store.get_domain_ips("host0.com")));
        });

        group.bench_with_input(BenchmarkId::new("uncached_chain", length), length, |b, &length| {
            let store = create_store();
            create_chain(&store, length);
            // Flush and relearn so every lookup walks the whole chain.
            b.iter(|| {
                store.expire_all_mappings();
                create_chain(&store, length);
                black_box(store.get_domain_ips("host0.com"))
            });
        });
    }

    group.bench_function("wildcard_1000_names", |b| {
        let store = create_store();
        for i in 0..1000 {
            store.process_packet(&create_a_response(&format!("svc{}.example.com", i), i), None);
        }
        b.iter(|| black_box(store.get_domain_ips("*.example.com")));
    });

    group.finish();
}

criterion_group!(benches, benchmark_learning, benchmark_resolution);
criterion_main!(benches);
