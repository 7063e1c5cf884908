//! `ServerContext` holds the state shared across the Query Frontend's
//! listener threads and the Declarative Synchronizer's tasks: the Record
//! Store, the Resolution Backend built on top of it, and the server's
//! network settings. Constructed by the (out-of-scope) process entry point
//! and threaded through everything else as an `Arc`.
//!
//! Grounded on the donor's `ServerContext` (`authority`/`cache`/`client`
//! fields, `ServerStatistics`, `dns_port`/`enable_udp`/`enable_tcp` flags) —
//! narrowed to the collaborators this design actually has and with the
//! donor's API-surface/SSL/zones-directory fields dropped, since the HTTP
//! control surface and TLS termination are out of scope.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::dns::backend::Backend;
use crate::dns::cancellation::CancellationContext;
use crate::dns::store::Store;

pub struct ServerStatistics {
    pub tcp_query_count: AtomicUsize,
    pub udp_query_count: AtomicUsize,
    pub formerr_count: AtomicUsize,
    pub nxdomain_count: AtomicUsize,
    pub servfail_count: AtomicUsize,
}

impl Default for ServerStatistics {
    fn default() -> ServerStatistics {
        ServerStatistics {
            tcp_query_count: AtomicUsize::new(0),
            udp_query_count: AtomicUsize::new(0),
            formerr_count: AtomicUsize::new(0),
            nxdomain_count: AtomicUsize::new(0),
            servfail_count: AtomicUsize::new(0),
        }
    }
}

impl ServerStatistics {
    pub fn get_tcp_query_count(&self) -> usize {
        self.tcp_query_count.load(Ordering::Acquire)
    }

    pub fn get_udp_query_count(&self) -> usize {
        self.udp_query_count.load(Ordering::Acquire)
    }
}

/// Shared state for a running server instance.
pub struct ServerContext {
    pub store: Arc<Store>,
    pub backend: Backend,
    pub dns_port: u16,
    pub enable_udp: bool,
    pub enable_tcp: bool,
    pub statistics: ServerStatistics,
    /// Checked by the Query Frontend before and during resolution, and
    /// handed to the Declarative Synchronizer's tasks (§4.1, §5).
    pub cancellation: CancellationContext,
}

impl ServerContext {
    pub fn new(
        store: Arc<Store>,
        backend: Backend,
        dns_port: u16,
        cancellation: CancellationContext,
    ) -> ServerContext {
        ServerContext {
            store,
            backend,
            dns_port,
            enable_udp: true,
            enable_tcp: true,
            statistics: ServerStatistics::default(),
            cancellation,
        }
    }
}
