//! Decoded DNS message model consumed by the domain store
//!
//! Wire-format parsing happens outside this crate. Whatever decodes captured
//! packets hands over a `DecodedPacket`, which carries the addressing of the
//! enclosing IP header (when known) and the DNS message itself.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde_derive::{Deserialize, Serialize};

/// `QueryType` represents the requested Record Type of a query
///
/// The specific type Unknown that an integer parameter in order to retain the
/// id of an unknown query. An integer can be converted to a querytype using the
/// `from_num` function, and back to an integer using the `to_num` method.
#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy, Serialize, Deserialize)]
pub enum QueryType {
    Unknown(u16),
    A,     // 1
    Ns,    // 2
    Cname, // 5
    Soa,   // 6
    Mx,    // 15
    Txt,   // 16
    Aaaa,  // 28
    Srv,   // 33
}

impl QueryType {
    pub fn to_num(&self) -> u16 {
        match *self {
            QueryType::Unknown(x) => x,
            QueryType::A => 1,
            QueryType::Ns => 2,
            QueryType::Cname => 5,
            QueryType::Soa => 6,
            QueryType::Mx => 15,
            QueryType::Txt => 16,
            QueryType::Aaaa => 28,
            QueryType::Srv => 33,
        }
    }

    pub fn from_num(num: u16) -> QueryType {
        match num {
            1 => QueryType::A,
            2 => QueryType::Ns,
            5 => QueryType::Cname,
            6 => QueryType::Soa,
            15 => QueryType::Mx,
            16 => QueryType::Txt,
            28 => QueryType::Aaaa,
            33 => QueryType::Srv,
            _ => QueryType::Unknown(num),
        }
    }
}

/// Record class. Only `In` records are learned from.
#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy, Serialize, Deserialize)]
pub enum RecordClass {
    In,
    Chaos,
    Hesiod,
    Any,
    Unknown(u16),
}

impl RecordClass {
    pub fn from_num(num: u16) -> RecordClass {
        match num {
            1 => RecordClass::In,
            3 => RecordClass::Chaos,
            4 => RecordClass::Hesiod,
            255 => RecordClass::Any,
            _ => RecordClass::Unknown(num),
        }
    }
}

impl Default for RecordClass {
    fn default() -> Self {
        RecordClass::In
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OpCode {
    Query,
    IQuery,
    Status,
    Notify,
    Update,
    Unknown(u8),
}

impl OpCode {
    pub fn from_num(num: u8) -> OpCode {
        match num {
            0 => OpCode::Query,
            1 => OpCode::IQuery,
            2 => OpCode::Status,
            4 => OpCode::Notify,
            5 => OpCode::Update,
            _ => OpCode::Unknown(num),
        }
    }
}

impl Default for OpCode {
    fn default() -> Self {
        OpCode::Query
    }
}

#[derive(Copy, Clone, Debug, Eq, Serialize, Deserialize)]
pub struct TransientTtl(pub u32);

impl PartialEq<TransientTtl> for TransientTtl {
    fn eq(&self, _: &TransientTtl) -> bool {
        true
    }
}

impl PartialOrd<TransientTtl> for TransientTtl {
    fn partial_cmp(&self, other: &TransientTtl) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TransientTtl {
    fn cmp(&self, _: &TransientTtl) -> Ordering {
        Ordering::Equal
    }
}

impl Hash for TransientTtl {
    fn hash<H>(&self, _: &mut H)
    where
        H: Hasher,
    {
        // purposely left empty
    }
}

/// `DnsRecord` is the primary representation of a DNS record
///
/// Only address and alias records feed the domain store; the remaining
/// variants exist so that decoders can pass whole sections through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DnsRecord {
    Unknown {
        domain: String,
        qtype: u16,
        data_len: u16,
        ttl: TransientTtl,
    }, // 0
    A {
        domain: String,
        addr: Ipv4Addr,
        ttl: TransientTtl,
    }, // 1
    Ns {
        domain: String,
        host: String,
        ttl: TransientTtl,
    }, // 2
    Cname {
        domain: String,
        host: String,
        ttl: TransientTtl,
    }, // 5
    Mx {
        domain: String,
        priority: u16,
        host: String,
        ttl: TransientTtl,
    }, // 15
    Txt {
        domain: String,
        data: String,
        ttl: TransientTtl,
    }, // 16
    Aaaa {
        domain: String,
        addr: Ipv6Addr,
        ttl: TransientTtl,
    }, // 28
}

impl DnsRecord {
    pub fn get_querytype(&self) -> QueryType {
        match *self {
            DnsRecord::A { .. } => QueryType::A,
            DnsRecord::Aaaa { .. } => QueryType::Aaaa,
            DnsRecord::Ns { .. } => QueryType::Ns,
            DnsRecord::Cname { .. } => QueryType::Cname,
            DnsRecord::Mx { .. } => QueryType::Mx,
            DnsRecord::Txt { .. } => QueryType::Txt,
            DnsRecord::Unknown { qtype, .. } => QueryType::Unknown(qtype),
        }
    }

    pub fn get_domain(&self) -> &str {
        match *self {
            DnsRecord::A { ref domain, .. }
            | DnsRecord::Aaaa { ref domain, .. }
            | DnsRecord::Ns { ref domain, .. }
            | DnsRecord::Cname { ref domain, .. }
            | DnsRecord::Mx { ref domain, .. }
            | DnsRecord::Txt { ref domain, .. }
            | DnsRecord::Unknown { ref domain, .. } => domain,
        }
    }

    pub fn get_ttl(&self) -> u32 {
        match *self {
            DnsRecord::A {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Aaaa {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Ns {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Cname {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Mx {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Txt {
                ttl: TransientTtl(ttl),
                ..
            }
            | DnsRecord::Unknown {
                ttl: TransientTtl(ttl),
                ..
            } => ttl,
        }
    }
}

/// A record together with the class it was received under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(default)]
    pub class: RecordClass,
    pub record: DnsRecord,
}

impl From<DnsRecord> for ResourceRecord {
    fn from(record: DnsRecord) -> Self {
        ResourceRecord {
            class: RecordClass::In,
            record,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsHeader {
    pub id: u16,
    pub response: bool,
    pub opcode: OpCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsQuestion {
    pub name: String,
    pub qtype: QueryType,
}

impl DnsQuestion {
    pub fn new(name: String, qtype: QueryType) -> DnsQuestion {
        DnsQuestion { name, qtype }
    }
}

/// A decoded DNS message
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsPacket {
    pub header: DnsHeader,
    #[serde(default)]
    pub questions: Vec<DnsQuestion>,
    #[serde(default)]
    pub answers: Vec<ResourceRecord>,
    /// The additional section
    #[serde(default)]
    pub resources: Vec<ResourceRecord>,
}

impl DnsPacket {
    pub fn new() -> DnsPacket {
        DnsPacket::default()
    }

    /// Builds a response to `question` carrying `answers`.
    pub fn response(question: DnsQuestion, answers: Vec<ResourceRecord>) -> DnsPacket {
        DnsPacket {
            header: DnsHeader {
                response: true,
                ..DnsHeader::default()
            },
            questions: vec![question],
            answers,
            resources: Vec::new(),
        }
    }
}

/// A DNS message plus the addressing of the IP header it arrived in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedPacket {
    pub src: Option<IpAddr>,
    pub dst: Option<IpAddr>,
    pub dns: DnsPacket,
}

impl From<DnsPacket> for DecodedPacket {
    fn from(dns: DnsPacket) -> Self {
        DecodedPacket {
            src: None,
            dst: None,
            dns,
        }
    }
}

/// Turns a captured payload into a `DecodedPacket`.
///
/// Implemented by the embedding agent; the domain store only consumes the
/// result.
pub trait PacketDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<DecodedPacket, DecodeError>;
}

/// Some connectivity checkers send UDP datagrams to DNS servers whose payload
/// starts with this rather than a DNS header.
pub const UDP_PING_PREFIX: &[u8] = b"UDP PING";

/// Decoders call this on the transport payload before parsing it as DNS.
pub fn is_udp_ping(transport_payload: &[u8]) -> bool {
    transport_payload.starts_with(UDP_PING_PREFIX)
}

/// Why a captured payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum DecodeError {
    #[display(fmt = "no transport layer")]
    NoTransport,
    #[display(fmt = "udp ping")]
    UdpPing,
    #[display(fmt = "malformed dns message: {}", _0)]
    Malformed(String),
}

impl std::error::Error for DecodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_type_numbers() {
        assert_eq!(QueryType::from_num(1), QueryType::A);
        assert_eq!(QueryType::from_num(28), QueryType::Aaaa);
        assert_eq!(QueryType::from_num(5).to_num(), 5);
        assert_eq!(QueryType::from_num(99), QueryType::Unknown(99));
    }

    #[test]
    fn test_record_class_numbers() {
        assert_eq!(RecordClass::from_num(1), RecordClass::In);
        assert_eq!(RecordClass::from_num(255), RecordClass::Any);
        assert_eq!(RecordClass::default(), RecordClass::In);
    }

    #[test]
    fn test_ttl_ignored_for_equality() {
        let a = DnsRecord::A {
            domain: "example.com".to_string(),
            addr: Ipv4Addr::new(10, 0, 0, 1),
            ttl: TransientTtl(30),
        };
        let b = DnsRecord::A {
            domain: "example.com".to_string(),
            addr: Ipv4Addr::new(10, 0, 0, 1),
            ttl: TransientTtl(3600),
        };
        assert_eq!(a, b);
        assert_eq!(a.get_ttl(), 30);
        assert_eq!(b.get_domain(), "example.com");
    }

    #[test]
    fn test_packet_json_shape() {
        let packet = DnsPacket::response(
            DnsQuestion::new("example.com".to_string(), QueryType::A),
            vec![DnsRecord::Cname {
                domain: "example.com".to_string(),
                host: "cdn.example.net".to_string(),
                ttl: TransientTtl(60),
            }
            .into()],
        );
        let json = serde_json::to_string(&packet).unwrap();
        let back: DnsPacket = serde_json::from_str(&json).unwrap();
        assert_eq!(packet, back);
        assert!(back.header.response);
        assert_eq!(back.answers[0].class, RecordClass::In);
    }

    #[test]
    fn test_header_fields() {
        let header = DnsHeader {
            id: 7,
            response: true,
            opcode: OpCode::Query,
        };
        let json = serde_json::to_value(&header).unwrap();
        let mut fields: Vec<&String> = json.as_object().unwrap().keys().collect();
        fields.sort();
        assert_eq!(fields, vec!["id", "opcode", "response"]);

        let back: DnsHeader =
            serde_json::from_str(r#"{"id":7,"response":true,"opcode":"Query"}"#).unwrap();
        assert_eq!(back, header);
    }

    #[test]
    fn test_udp_ping() {
        assert!(is_udp_ping(b"UDP PING 12345"));
        assert!(!is_udp_ping(b"UDP PIN"));
        assert!(!is_udp_ping(&[0x12, 0x34, 0x81, 0x80]));
    }
}
