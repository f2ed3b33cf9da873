//! IP to name index
//!
//! Tracks which names directly resolve to each literal IP. Ancestors reached
//! through aliases are found via each name's notify set instead, so only the
//! direct owner is recorded here.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;

/// Fixed-width IP key; IPv4 addresses are stored in their IPv6-mapped form.
pub type IpKey = [u8; 16];

pub fn ip_key(ip: &IpAddr) -> IpKey {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    }
}

/// Parses a stored value into an index key. Values that are not IPs yield `None`.
pub fn parse_ip_key(value: &str) -> Option<IpKey> {
    value.parse::<IpAddr>().ok().map(|ip| ip_key(&ip))
}

#[derive(Default)]
pub struct ReverseIndex {
    entries: HashMap<IpKey, BTreeSet<String>>,
}

impl ReverseIndex {
    pub fn new() -> ReverseIndex {
        ReverseIndex {
            entries: HashMap::new(),
        }
    }

    pub fn add(&mut self, name: &str, ip: &str) {
        let key = match parse_ip_key(ip) {
            Some(key) => key,
            None => return,
        };

        self.entries
            .entry(key)
            .or_insert_with(BTreeSet::new)
            .insert(name.to_string());
    }

    pub fn remove(&mut self, name: &str, ip: &str) {
        let key = match parse_ip_key(ip) {
            Some(key) => key,
            None => return,
        };

        match self.entries.get_mut(&key) {
            Some(names) => {
                names.remove(name);
                if names.is_empty() {
                    self.entries.remove(&key);
                }
            }
            None => log::warn!("IP mapping is not cached {}", ip),
        }
    }

    pub fn names_for(&self, key: &IpKey) -> Option<&BTreeSet<String>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
