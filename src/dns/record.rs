//! The logical record shape the Record Store holds.
//!
//! This is distinct from `crate::dns::protocol::DnsRecord`, which is a single
//! wire-level resource record. A `Record` here is a multi-value logical
//! entity — e.g. one `A` record can carry several address `values` — which
//! the Query Frontend expands into one `DnsRecord` per value at response
//! time (§4.6, P8).

use std::fmt;

use derive_more::{Display, Error, From};
use serde_derive::{Deserialize, Serialize};

use crate::dns::protocol::QueryType;

/// The enumerated record kinds this server stores and serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Txt,
    Ns,
    Srv,
    Ptr,
    Soa,
    Caa,
}

impl RecordType {
    pub fn as_query_type(self) -> QueryType {
        match self {
            RecordType::A => QueryType::A,
            RecordType::Aaaa => QueryType::Aaaa,
            RecordType::Cname => QueryType::Cname,
            RecordType::Mx => QueryType::Mx,
            RecordType::Txt => QueryType::Txt,
            RecordType::Ns => QueryType::Ns,
            RecordType::Srv => QueryType::Srv,
            RecordType::Ptr => QueryType::Ptr,
            RecordType::Soa => QueryType::Soa,
            RecordType::Caa => QueryType::Caa,
        }
    }

    pub fn from_query_type(qtype: QueryType) -> Option<RecordType> {
        match qtype {
            QueryType::A => Some(RecordType::A),
            QueryType::Aaaa => Some(RecordType::Aaaa),
            QueryType::Cname => Some(RecordType::Cname),
            QueryType::Mx => Some(RecordType::Mx),
            QueryType::Txt => Some(RecordType::Txt),
            QueryType::Ns => Some(RecordType::Ns),
            QueryType::Srv => Some(RecordType::Srv),
            QueryType::Ptr => Some(RecordType::Ptr),
            QueryType::Soa => Some(RecordType::Soa),
            QueryType::Caa => Some(RecordType::Caa),
            QueryType::Any | QueryType::Unknown(_) => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// `(name, type)` — the unit of identity inside the Record Store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub name: String,
    pub rtype: RecordType,
}

impl RecordKey {
    pub fn new(name: impl Into<String>, rtype: RecordType) -> RecordKey {
        RecordKey {
            name: normalize_name(&name.into()),
            rtype,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.rtype)
    }
}

/// A stored DNS record: `(name, type, ttl, values)` per §3. `values` is
/// non-empty and order-sensitive (Invariant 3; Open Question resolved in
/// SPEC_FULL.md §9 — no ingest-time reordering).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: RecordType,
    pub ttl: u32,
    pub value: Vec<String>,
}

impl Record {
    pub fn new(
        name: impl Into<String>,
        rtype: RecordType,
        ttl: u32,
        value: Vec<String>,
    ) -> Result<Record, RecordError> {
        if value.is_empty() {
            return Err(RecordError::InvalidValue);
        }

        let name = normalize_name(&name.into());
        if name.is_empty() || name == "." {
            return Err(RecordError::InvalidName);
        }

        Ok(Record {
            name,
            rtype,
            ttl,
            value,
        })
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            name: self.name.clone(),
            rtype: self.rtype,
        }
    }
}

/// Validation failures raised at the Record Store boundary (§7, taxonomy
/// "Validation").
#[derive(Debug, Display, From, Error, PartialEq, Eq, Clone)]
pub enum RecordError {
    InvalidName,
    InvalidTtl,
    InvalidValue,
    InvalidRecordType,
}

/// Appends a trailing dot if missing (Invariant 2). Names are lower-cased so
/// that key comparisons and wildcard matching are case-insensitive, matching
/// the donor's `read_qname` lower-casing convention.
pub fn normalize_name(name: &str) -> String {
    let lower = name.to_lowercase();
    if lower.ends_with('.') {
        lower
    } else {
        format!("{lower}.")
    }
}

/// The apex zone of a name: the last two labels joined, trailing-dot
/// terminated. Single-label names are their own zone (§4.6 "Zone
/// extraction").
pub fn apex_zone(name: &str) -> String {
    let trimmed = name.trim_end_matches('.');
    let labels: Vec<&str> = trimmed.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        normalize_name(trimmed)
    } else {
        let apex = labels[labels.len() - 2..].join(".");
        normalize_name(&apex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name_adds_trailing_dot() {
        assert_eq!(normalize_name("example.com"), "example.com.");
        assert_eq!(normalize_name("example.com."), "example.com.");
        assert_eq!(normalize_name("Example.COM"), "example.com.");
    }

    #[test]
    fn test_apex_zone_extraction() {
        assert_eq!(apex_zone("a.b.c.tld."), "c.tld.");
        assert_eq!(apex_zone("tld."), "tld.");
        assert_eq!(apex_zone("example.com."), "example.com.");
    }

    #[test]
    fn test_record_requires_nonempty_value() {
        assert!(Record::new("a.example.com.", RecordType::A, 300, vec![]).is_err());
    }
}
