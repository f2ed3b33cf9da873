//! Domain Mapping Cache
//!
//! Holds everything learned from snooped DNS responses as a graph keyed by
//! lower-cased name. Each name maps to a set of values, where a value is
//! either a literal IP or another name (a CNAME alias). Every value expires
//! independently.
//!
//! # Change propagation
//!
//! Consumers ask for the IPs of a domain, or of a wildcard pattern. While
//! walking the alias chain for such a query, the queried domain is recorded in
//! the notify set of every name visited. When a name's values later change,
//! the name and everything in its notify set are reported as changed, so a
//! consumer watching `a.com` hears about a new IP for `c.com` when
//! `a.com -> b.com -> c.com`.
//!
//! # Structure
//!
//! Entries refer to each other by name only, so cycles in the alias graph
//! (which DNS allows, however broken) need no special ownership handling.
//! Names are removed by garbage collection once they have no values and are
//! no longer the alias target of a name that does.
//!
//! This type is not synchronised; `DomainInfoStore` wraps it in a lock.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::dns::expiry::{Clock, ExpiryScheduler, ExpirySignal, TimerHandle};
use crate::dns::metrics::RECORDS_IGNORED;
use crate::dns::protocol::{DnsRecord, RecordClass, ResourceRecord};
use crate::dns::reverse::{ip_key, ReverseIndex};
use crate::dns::wildcard::{is_wildcard, WildcardSet};

/// Mappings never live for less than this, however short the DNS TTL.
///
/// A client may connect the moment it sees the response, before the
/// dataplane has the IP. The first SYN is then dropped and TCP retries after
/// a second; the mapping has to survive long enough for that retry.
pub const MIN_TTL: Duration = Duration::from_secs(2);

/// One timed edge from a name to an IP or to another name.
#[derive(Debug)]
pub struct ValueEntry {
    pub expiry: DateTime<Utc>,
    pub timer: TimerHandle,
    pub is_alias: bool,
}

#[derive(Debug, Default)]
pub struct NameEntry {
    /// Keyed by IP string or by lower-cased alias target.
    pub values: BTreeMap<String, ValueEntry>,
    /// Queried domains and wildcards to report when this name changes.
    pub names_to_notify: BTreeSet<String>,
    /// Revision at which this entry last gained a value.
    pub revision: u64,
}

impl NameEntry {
    pub fn new() -> NameEntry {
        NameEntry::default()
    }
}

/// A single stored mapping, as exposed for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub name: String,
    pub value: String,
    pub expiry: DateTime<Utc>,
    pub is_alias: bool,
}

pub struct MappingCache {
    mappings: HashMap<String, NameEntry>,
    reverse: ReverseIndex,
    wildcards: WildcardSet,
    /// Resolved IPs per queried domain or wildcard. Only non-empty results are kept.
    results: HashMap<String, Vec<IpAddr>>,
    changed_names: BTreeSet<String>,
    gc_needed: bool,
    extra_ttl: Duration,
    scheduler: Arc<dyn ExpiryScheduler>,
    clock: Arc<dyn Clock>,
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl MappingCache {
    pub fn new(scheduler: Arc<dyn ExpiryScheduler>, clock: Arc<dyn Clock>) -> MappingCache {
        MappingCache {
            mappings: HashMap::new(),
            reverse: ReverseIndex::new(),
            wildcards: WildcardSet::new(),
            results: HashMap::new(),
            changed_names: BTreeSet::new(),
            gc_needed: false,
            extra_ttl: Duration::from_secs(0),
            scheduler,
            clock,
        }
    }

    pub fn extra_ttl(&self) -> Duration {
        self.extra_ttl
    }

    /// Applies to mappings stored from now on; existing expiries are left alone.
    pub fn set_extra_ttl(&mut self, extra_ttl: Duration) {
        self.extra_ttl = extra_ttl;
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Learns from one resource record, returning the revision of the entry it
    /// touched or 0 if the record was ignored.
    pub fn store_record(&mut self, rr: &ResourceRecord, section: &str, revision: u64) -> u64 {
        if rr.class != RecordClass::In {
            log::debug!("Ignore DNS response with class {:?}", rr.class);
            RECORDS_IGNORED.with_label_values(&["class"]).inc();
            return 0;
        }

        let name = rr.record.get_domain().to_lowercase();
        let ttl = Duration::from_secs(rr.record.get_ttl() as u64);

        match rr.record {
            DnsRecord::A { addr, .. } => {
                log::debug!("A: {} -> {} with TTL {:?} ({})", name, addr, ttl, section);
                self.store_info(&name, &addr.to_string(), ttl, false, revision)
            }
            DnsRecord::Aaaa { addr, .. } => {
                log::debug!("AAAA: {} -> {} with TTL {:?} ({})", name, addr, ttl, section);
                self.store_info(&name, &addr.to_string(), ttl, false, revision)
            }
            DnsRecord::Cname { ref host, .. } => {
                let cname = host.to_lowercase();
                log::debug!("CNAME: {} -> {} with TTL {:?} ({})", name, cname, ttl, section);
                self.store_info(&name, &cname, ttl, true, revision)
            }
            ref other => {
                log::debug!("Ignore DNS response with type {:?}", other.get_querytype());
                RECORDS_IGNORED.with_label_values(&["type"]).inc();
                0
            }
        }
    }

    /// Records `name -> value` for `ttl` (plus the extra TTL, and never below
    /// `MIN_TTL`).
    ///
    /// A new mapping is stamped with `revision`, which is returned. Seeing an
    /// existing mapping again only ever extends its expiry, and returns the
    /// revision the entry already had. `0.0.0.0` is never stored; 0 is
    /// returned for it.
    pub fn store_info(
        &mut self,
        name: &str,
        value: &str,
        ttl: Duration,
        is_alias: bool,
        revision: u64,
    ) -> u64 {
        if value == "0.0.0.0" {
            // Not routable, and IP set backends refuse it anyway.
            log::debug!("Ignoring zero IP ({} -> {} TTL {:?})", name, value, ttl);
            RECORDS_IGNORED.with_label_values(&["zero_ip"]).inc();
            return 0;
        }

        let ttl = std::cmp::max(ttl.saturating_add(self.extra_ttl), MIN_TTL);
        let expiry = expiry_after(self.clock.now(), ttl);

        let entry = self
            .mappings
            .entry(name.to_string())
            .or_insert_with(NameEntry::new);

        if let Some(existing) = entry.values.get_mut(value) {
            if expiry > existing.expiry {
                existing.timer.cancel();
                existing.timer = self.scheduler.schedule(
                    ttl,
                    ExpirySignal {
                        name: name.to_string(),
                        value: value.to_string(),
                    },
                );
                existing.expiry = expiry;
            }

            return entry.revision;
        }

        // Wildcards are only matched when a name gets its first value.
        if entry.values.is_empty() {
            for wildcard in self.wildcards.matching(name) {
                entry.names_to_notify.insert(wildcard);
            }
        }

        let timer = self.scheduler.schedule(
            ttl,
            ExpirySignal {
                name: name.to_string(),
                value: value.to_string(),
            },
        );
        entry.values.insert(
            value.to_string(),
            ValueEntry {
                expiry,
                timer,
                is_alias,
            },
        );
        entry.revision = revision;

        if is_alias {
            // The target needs an entry even without values of its own, so that
            // its notify set can carry this name's watchers down the chain.
            self.mappings
                .entry(value.to_string())
                .or_insert_with(NameEntry::new);
        } else {
            self.reverse.add(name, value);
        }

        self.compile_changed_names(name);

        revision
    }

    /// Resolves `domain` (or every known name matching a wildcard) to IPs,
    /// subscribing it to future changes of every name on the way.
    pub fn get_domain_ips(&mut self, domain: &str) -> Vec<IpAddr> {
        let domain = domain.to_lowercase();

        if let Some(ips) = self.results.get(&domain) {
            log::debug!("GetDomainIPs({}) -> {:?} (cached)", domain, ips);
            return ips.clone();
        }

        let mut ips = Vec::new();
        if is_wildcard(&domain) {
            let regex = self.wildcards.get_or_compile(&domain).clone();
            let mut names: Vec<String> = self
                .mappings
                .keys()
                .filter(|name| regex.is_match(name))
                .cloned()
                .collect();
            names.sort();

            for name in names {
                self.collect_ips(&domain, &name, &mut HashSet::new(), &mut ips);
            }
        } else {
            self.collect_ips(&domain, &domain, &mut HashSet::new(), &mut ips);
        }

        log::debug!("GetDomainIPs({}) -> {:?}", domain, ips);
        if !ips.is_empty() {
            self.results.insert(domain, ips.clone());
        }
        ips
    }

    fn collect_ips(
        &mut self,
        domain: &str,
        name: &str,
        visited: &mut HashSet<String>,
        ips: &mut Vec<IpAddr>,
    ) {
        if !visited.insert(name.to_string()) {
            log::warn!("{} has a CNAME loop back to itself", name);
            return;
        }

        let values: Vec<(String, bool)> = match self.mappings.get_mut(name) {
            Some(entry) => {
                entry.names_to_notify.insert(domain.to_string());
                entry
                    .values
                    .iter()
                    .map(|(value, data)| (value.clone(), data.is_alias))
                    .collect()
            }
            None => return,
        };

        for (value, is_alias) in values {
            if is_alias {
                self.collect_ips(domain, &value, visited, ips);
            } else {
                match value.parse() {
                    Ok(ip) => ips.push(ip),
                    Err(_) => log::warn!("Stored value {} for {} is not an IP", value, name),
                }
            }
        }
    }

    /// Returns one watched domain that currently resolves to `ip`, if any.
    ///
    /// "Watched" means something called `get_domain_ips` for it (or for a
    /// wildcard covering it).
    pub fn get_watched_domain_for_ip(&self, ip: &IpAddr) -> Option<String> {
        let names = self.reverse.names_for(&ip_key(ip))?;

        names
            .iter()
            .filter_map(|name| self.mappings.get(name))
            .find_map(|entry| entry.names_to_notify.iter().next().cloned())
    }

    /// Handles a fired timer. Returns true if the mapping was removed.
    pub fn process_expiry(&mut self, name: &str, value: &str) -> bool {
        let now = self.clock.now();

        let entry = match self.mappings.get_mut(name) {
            Some(entry) => entry,
            None => {
                log::debug!("Mapping already gone for {} -> {}", name, value);
                return false;
            }
        };

        match entry.values.get(value) {
            Some(data) if data.expiry < now => {
                log::debug!("Mapping expiry for {} -> {}", name, value);
            }
            Some(_) => {
                log::debug!("Too early mapping expiry for {} -> {}", name, value);
                return false;
            }
            None => {
                log::debug!("Mapping already gone for {} -> {}", name, value);
                return false;
            }
        }

        let removed = entry.values.remove(value);
        if let Some(data) = removed {
            if !data.is_alias {
                self.reverse.remove(name, value);
            }
        }

        self.gc_needed = true;
        self.compile_changed_names(name);
        true
    }

    /// Drops every value of every name, as if all had expired at once.
    pub fn expire_all(&mut self) {
        log::info!("Expire all mappings");

        let names: Vec<String> = self.mappings.keys().cloned().collect();
        for name in names {
            if let Some(entry) = self.mappings.get_mut(&name) {
                let values = std::mem::take(&mut entry.values);
                for (value, mut data) in values {
                    data.timer.cancel();
                    if !data.is_alias {
                        self.reverse.remove(&name, &value);
                    }
                }
            }
            self.compile_changed_names(&name);
        }

        self.gc_needed = true;
    }

    /// Deletes names that have no values and are not the alias target of a
    /// name that does. Does nothing unless an expiry or reset happened since
    /// the last collection. Returns the number of names deleted.
    pub fn collect_garbage(&mut self) -> usize {
        if !self.gc_needed {
            return 0;
        }

        let mut keep = HashSet::new();
        for (name, entry) in &self.mappings {
            // Policy may ask for this name at any moment.
            if !entry.values.is_empty() {
                keep.insert(name.clone());
            }

            // An alias target must stay even when empty: a new value for it has
            // to be reported to whoever watches the names pointing at it.
            for (target, data) in &entry.values {
                if data.is_alias {
                    if !self.mappings.contains_key(target) {
                        log::error!("Missing mapping for {}, which is a RHS value for {}", target, name);
                        panic!("Missing mapping for {}, which is a RHS value for {}", target, name);
                    }
                    keep.insert(target.clone());
                }
            }
        }

        let before = self.mappings.len();
        self.mappings.retain(|name, _| {
            let retain = keep.contains(name);
            if !retain {
                log::debug!("Delete useless mapping {}", name);
            }
            retain
        });

        self.gc_needed = false;
        before - self.mappings.len()
    }

    /// Marks `name`, and everyone watching it, as changed.
    fn compile_changed_names(&mut self, name: &str) {
        self.changed_names.insert(name.to_string());
        self.results.remove(name);

        if let Some(entry) = self.mappings.get(name) {
            for ancestor in &entry.names_to_notify {
                self.changed_names.insert(ancestor.clone());
                self.results.remove(ancestor);
            }
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.changed_names.is_empty()
    }

    pub fn changed_names(&self) -> &BTreeSet<String> {
        &self.changed_names
    }

    /// Hands over the changed names, leaving an empty set behind.
    pub fn take_changed_names(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.changed_names)
    }

    pub fn gc_needed(&self) -> bool {
        self.gc_needed
    }

    pub fn mappings(&self) -> Vec<Mapping> {
        let mut list = Vec::new();

        for (name, entry) in &self.mappings {
            for (value, data) in &entry.values {
                list.push(Mapping {
                    name: name.clone(),
                    value: value.clone(),
                    expiry: data.expiry,
                    is_alias: data.is_alias,
                });
            }
        }

        list
    }

    pub fn get(&self, name: &str) -> Option<&NameEntry> {
        self.mappings.get(name)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.mappings.contains_key(name)
    }

    pub fn name_count(&self) -> usize {
        self.mappings.len()
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.values().map(|entry| entry.values.len()).sum()
    }

    pub fn reverse_len(&self) -> usize {
        self.reverse.len()
    }
}
