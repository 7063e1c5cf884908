//! Sentinel error kinds crossed at component boundaries (§6, §7).
//!
//! Mirrors the donor's dominant error-definition idiom (a flat
//! `derive_more::{Display, From, Error}` enum per module, see
//! `context.rs::ContextError`/`resolve.rs::ResolveError`) for enums that
//! only ever wrap other error types. Where a variant needs to carry a plain
//! data field (a `String` message, not a nested error), this follows the
//! donor's other idiom instead (`authority.rs::AuthorityError`: a hand
//! written `Display` impl), since `derive_more::Error` expects a single
//! tuple field to itself implement `std::error::Error`.

use derive_more::{Display, Error, From};

use crate::dns::record::RecordError;

/// Errors returned by the Record Store's public operations.
#[derive(Debug, Display, From, Error, PartialEq, Eq, Clone)]
pub enum StoreError {
    /// `Get`/`Update`/`Delete` against an absent key.
    RecordNotFound,
    /// `Create` against an already-present key.
    RecordAlreadyExists,
    /// A record failed its field invariants at the store boundary.
    Validation(RecordError),
    /// `PartialReload`/`HotReload` failed to apply atomically.
    ReloadFailed,
    /// The operation's cancellation context was cancelled before it
    /// completed (§4.1, §5).
    Cancelled,
}

/// Errors returned by the Resolution Backend.
#[derive(Debug, Display, From, Error, PartialEq, Eq)]
pub enum BackendError {
    NotFound,
    Internal(StoreError),
    /// The operation's cancellation context was cancelled before it
    /// completed (§4.1, §5).
    Cancelled,
}

/// Errors returned by the Forwarder when every configured upstream has been
/// exhausted without a usable answer (see §4.5 "If every server errors,
/// return NotFound").
#[derive(Debug, Display, From, Error, PartialEq, Eq, Clone)]
pub enum ForwarderError {
    NoUpstreamsConfigured,
    AllUpstreamsFailed,
    /// The operation's cancellation context was cancelled before it
    /// completed (§4.1, §5).
    Cancelled,
}

/// Transport-layer errors for a single upstream attempt. `Network` is
/// retriable across servers; `AuthoritativeNegative` is final per-query
/// (§4.5, P9).
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum UpstreamError {
    Network,
    Timeout,
    AuthoritativeNegative,
    Protocol(String),
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamError::Network => write!(f, "network error contacting upstream"),
            UpstreamError::Timeout => write!(f, "upstream query timed out"),
            UpstreamError::AuthoritativeNegative => write!(f, "upstream returned NXDOMAIN/SERVFAIL"),
            UpstreamError::Protocol(msg) => write!(f, "upstream protocol error: {msg}"),
        }
    }
}

impl std::error::Error for UpstreamError {}

/// Errors surfaced by a `DocumentSource` implementation (§4.3, §6).
#[derive(Debug)]
pub enum DocumentError {
    Parse(String),
    Write(String),
    WatchClosed,
    Io(std::io::Error),
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentError::Parse(msg) => write!(f, "document parse error: {msg}"),
            DocumentError::Write(msg) => write!(f, "document write error: {msg}"),
            DocumentError::WatchClosed => write!(f, "document watch channel closed"),
            DocumentError::Io(e) => write!(f, "document io error: {e}"),
        }
    }
}

impl std::error::Error for DocumentError {}

impl From<std::io::Error> for DocumentError {
    fn from(err: std::io::Error) -> Self {
        DocumentError::Io(err)
    }
}
