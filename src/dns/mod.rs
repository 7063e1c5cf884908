//! DNS server implementation.
//!
//! # Module structure
//!
//! * `protocol`/`buffer` - wire-format packet parsing and serialization
//! * `record` - the logical, multi-value record model and its key type
//! * `store` - the thread-safe Record Store
//! * `diff` - changeset computation between store state and a declarative
//!   snapshot
//! * `geo` - geolocation-ordered multi-value answers
//! * `forwarder` - upstream DNS fallback
//! * `backend` - resolution sequencing (direct, CNAME chain, wildcard,
//!   forwarding) and answer shaping
//! * `sync` - two-way synchronization with an external declarative document
//! * `acme` - the DNS-01 challenge surface for certificate issuance
//! * `context` - shared server state and statistics
//! * `frontend` - the UDP/TCP query frontend
//! * `errors` - sentinel error kinds crossed at component boundaries
//! * `cancellation` - the cancellation context threaded through every
//!   public operation
//! * `netutil` - TCP length-prefix framing

/// The DNS-01 challenge surface for certificate issuance.
pub mod acme;

/// The cancellation context threaded through every public operation.
pub mod cancellation;

/// Low-level buffer operations for DNS packet handling.
pub mod buffer;

/// Resolution sequencing: direct lookup, CNAME chains, wildcard fallback,
/// upstream forwarding.
pub mod backend;

/// Shared server state and statistics.
pub mod context;

/// Changeset computation between store state and a declarative snapshot.
pub mod diff;

/// Sentinel error kinds crossed at component boundaries.
pub mod errors;

/// The UDP/TCP query frontend.
pub mod frontend;

/// Upstream DNS fallback.
pub mod forwarder;

/// Geolocation-ordered multi-value answers.
pub mod geo;

/// Internal network utilities.
mod netutil;

/// DNS protocol definitions and packet structures.
pub mod protocol;

/// The logical, multi-value record model.
pub mod record;

/// The thread-safe Record Store.
pub mod store;

/// Two-way synchronization with an external declarative document.
pub mod sync;
