//! Atlas DNS Server
//!
//! An authoritative DNS server for container-orchestration clusters: a
//! Record Store fed by a Declarative Synchronizer, a Resolution Backend
//! (direct lookup, CNAME chains, wildcard fallback, upstream forwarding)
//! with geolocation-aware answer ordering, and a Query Frontend serving
//! UDP and TCP.
//!
//! # Architecture
//!
//! * `dns::protocol`/`dns::buffer` - wire-format packet codec
//! * `dns::record`/`dns::store` - the logical record model and its
//!   thread-safe store
//! * `dns::backend` - resolution sequencing and answer shaping
//! * `dns::forwarder` - upstream DNS fallback
//! * `dns::geo` - geolocation-ordered multi-value answers
//! * `dns::sync` - two-way sync with an external declarative document
//! * `dns::acme` - the DNS-01 challenge surface for certificate issuance
//! * `dns::frontend` - the UDP/TCP query frontend
//! * `dns::context` - shared server state

/// DNS server implementation and protocol handling
pub mod dns;
