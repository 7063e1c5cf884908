//! The Forwarder (§4.5 "Forwarder"): tries an ordered list of upstream
//! servers for a query the store and wildcard fallback could not answer.
//!
//! Grounded on the donor's `client.rs::DnsClient` trait (`send_query`) and
//! its `tests::DnsStubClient`, which drives resolver tests through a
//! closure instead of real sockets. `UpstreamClient` here plays the same
//! role, scoped to a single forwarding attempt rather than the donor's
//! fuller client (pending-query bookkeeping, TCP fallback, connection
//! pooling) since recursive resolution is out of scope.

use std::time::Duration;

use crate::dns::cancellation::CancellationContext;
use crate::dns::errors::{ForwarderError, UpstreamError};
use crate::dns::protocol::{DnsRecord, QueryType};
use crate::dns::record::Record;

/// A single upstream query attempt. Implementations own their own
/// transport (UDP socket, test stub, ...).
pub trait UpstreamClient: Send + Sync {
    fn query(
        &self,
        qname: &str,
        qtype: QueryType,
        server: (&str, u16),
        timeout: Duration,
    ) -> Result<Vec<DnsRecord>, UpstreamError>;
}

pub struct Forwarder {
    upstreams: Vec<(String, u16)>,
    timeout: Duration,
    client: Box<dyn UpstreamClient>,
}

impl Forwarder {
    pub fn new(
        upstreams: Vec<(String, u16)>,
        timeout: Duration,
        client: Box<dyn UpstreamClient>,
    ) -> Forwarder {
        Forwarder {
            upstreams,
            timeout,
            client,
        }
    }

    /// Tries each configured upstream in order. A network/timeout error
    /// moves on to the next server; an authoritative negative (NXDOMAIN or
    /// SERVFAIL) is final for this query (P9) and stops the loop without
    /// trying the rest. A successful answer is converted to the internal
    /// record shape, one `Record` per returned RR, and returned.
    pub fn forward(
        &self,
        qname: &str,
        qtype: QueryType,
        ctx: &CancellationContext,
    ) -> Result<Vec<Record>, ForwarderError> {
        if self.upstreams.is_empty() {
            return Err(ForwarderError::NoUpstreamsConfigured);
        }

        for (host, port) in &self.upstreams {
            ctx.check().map_err(|_| ForwarderError::Cancelled)?;
            match self
                .client
                .query(qname, qtype, (host.as_str(), *port), self.timeout)
            {
                Ok(rrs) => {
                    let records = rrs.iter().filter_map(wire_record_to_record).collect();
                    return Ok(records);
                }
                Err(UpstreamError::AuthoritativeNegative) => {
                    log::warn!("upstream {host}:{port} returned an authoritative negative for {qname}");
                    return Err(ForwarderError::AllUpstreamsFailed);
                }
                Err(e) => {
                    log::warn!("upstream {host}:{port} failed for {qname}: {e}");
                    continue;
                }
            }
        }

        Err(ForwarderError::AllUpstreamsFailed)
    }
}

/// Converts a single wire-level answer RR into a store-shaped `Record`
/// carrying exactly one value, using the same per-type textual value
/// conventions the Query Frontend parses back out (§4.6 "RR construction
/// per type").
fn wire_record_to_record(rr: &DnsRecord) -> Option<Record> {
    use crate::dns::record::RecordType;

    let (name, rtype, ttl, value) = match rr {
        DnsRecord::A { domain, addr, ttl } => {
            (domain.clone(), RecordType::A, ttl.0, addr.to_string())
        }
        DnsRecord::Aaaa { domain, addr, ttl } => {
            (domain.clone(), RecordType::Aaaa, ttl.0, addr.to_string())
        }
        DnsRecord::Cname { domain, host, ttl } => {
            (domain.clone(), RecordType::Cname, ttl.0, host.clone())
        }
        DnsRecord::Ns { domain, host, ttl } => (domain.clone(), RecordType::Ns, ttl.0, host.clone()),
        DnsRecord::Ptr { domain, host, ttl } => {
            (domain.clone(), RecordType::Ptr, ttl.0, host.clone())
        }
        DnsRecord::Txt { domain, data, ttl } => {
            (domain.clone(), RecordType::Txt, ttl.0, data.clone())
        }
        DnsRecord::Mx {
            domain,
            priority,
            host,
            ttl,
        } => (
            domain.clone(),
            RecordType::Mx,
            ttl.0,
            format!("{priority} {host}"),
        ),
        DnsRecord::Srv {
            domain,
            priority,
            weight,
            port,
            host,
            ttl,
        } => (
            domain.clone(),
            RecordType::Srv,
            ttl.0,
            format!("{priority} {weight} {port} {host}"),
        ),
        DnsRecord::Soa {
            domain,
            m_name,
            r_name,
            serial,
            refresh,
            retry,
            expire,
            minimum,
            ttl,
        } => (
            domain.clone(),
            RecordType::Soa,
            ttl.0,
            format!("{m_name} {r_name} {serial} {refresh} {retry} {expire} {minimum}"),
        ),
        DnsRecord::Caa {
            domain,
            value,
            ttl,
            ..
        } => (domain.clone(), RecordType::Caa, ttl.0, value.clone()),
        DnsRecord::Unknown { .. } => return None,
    };

    Record::new(name, rtype, ttl, vec![value]).ok()
}
