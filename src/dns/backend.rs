//! The Resolution Backend (§4.5): answers a query from the store (direct,
//! CNAME chain, wildcard, ANY aggregation), falling back to the Forwarder,
//! then applies the default-TTL rule and hands the result to the
//! Geolocation Sorter.
//!
//! Grounded on the donor's `resolve.rs::DnsResolver::resolve` sequencing
//! (authority lookup, then cache, then `perform`) and, specifically, its
//! `ForwardingDnsResolver` (not `RecursiveDnsResolver` — iterative root
//! resolution is out of scope here). Unlike the donor, there is exactly one
//! resolution strategy, so this is a concrete struct rather than a trait
//! with swappable implementations.

use std::sync::Arc;

use crate::dns::cancellation::CancellationContext;
use crate::dns::errors::BackendError;
use crate::dns::forwarder::Forwarder;
use crate::dns::geo::{Coordinates, GeoSorter};
use crate::dns::protocol::QueryType;
use crate::dns::record::{normalize_name, Record, RecordType};
use crate::dns::store::Store;

#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Applied to any returned record whose stored TTL is zero (§4.5 "Rule
    /// application").
    pub default_ttl: u32,
    pub cname_chain_enabled: bool,
    pub max_cname_depth: u32,
    pub forwarding_enabled: bool,
}

impl Default for BackendConfig {
    fn default() -> BackendConfig {
        BackendConfig {
            default_ttl: 300,
            cname_chain_enabled: true,
            max_cname_depth: 10,
            forwarding_enabled: false,
        }
    }
}

pub struct Backend {
    store: Arc<Store>,
    geo: GeoSorter,
    forwarder: Option<Forwarder>,
    config: BackendConfig,
}

impl Backend {
    pub fn new(
        store: Arc<Store>,
        geo: GeoSorter,
        forwarder: Option<Forwarder>,
        config: BackendConfig,
    ) -> Backend {
        Backend {
            store,
            geo,
            forwarder,
            config,
        }
    }

    /// `Resolve(query) -> records | NotFound | ServerError` (§4.5). Checks
    /// `ctx` before each resolution step so a cancelled query does not pay
    /// for a wildcard probe or an upstream round trip it will discard.
    pub fn resolve(
        &self,
        qname: &str,
        qtype: QueryType,
        client: Option<Coordinates>,
        ctx: &CancellationContext,
    ) -> Result<Vec<Record>, BackendError> {
        ctx.check().map_err(|_| BackendError::Cancelled)?;
        let name = normalize_name(qname);

        if qtype == QueryType::Any {
            return self.resolve_any(&name, client, ctx);
        }

        let rtype = match RecordType::from_query_type(qtype) {
            Some(rtype) => rtype,
            None => return Err(BackendError::NotFound),
        };

        if let Ok(record) = self.store.get(&name, rtype, ctx) {
            return Ok(self.finish(vec![record], client));
        }

        if self.config.cname_chain_enabled && rtype != RecordType::Cname {
            if let Some(chain) = self.resolve_cname_chain(&name, rtype, ctx)? {
                return Ok(self.finish(chain, client));
            }
        }

        ctx.check().map_err(|_| BackendError::Cancelled)?;
        if let Ok(record) = self.store.get_wildcard(&name, rtype, ctx) {
            return Ok(self.finish(vec![record], client));
        }

        if self.config.forwarding_enabled {
            if let Some(forwarder) = &self.forwarder {
                match forwarder.forward(&name, qtype, ctx) {
                    Ok(records) if !records.is_empty() => {
                        return Ok(self.finish(records, client));
                    }
                    _ => return Err(BackendError::NotFound),
                }
            }
        }

        Err(BackendError::NotFound)
    }

    fn resolve_any(
        &self,
        name: &str,
        client: Option<Coordinates>,
        ctx: &CancellationContext,
    ) -> Result<Vec<Record>, BackendError> {
        let records: Vec<Record> = self
            .store
            .list(ctx)
            .map_err(|_| BackendError::Cancelled)?
            .into_iter()
            .filter(|r| r.name == name)
            .collect();

        if records.is_empty() {
            return Err(BackendError::NotFound);
        }

        Ok(self.finish(records, client))
    }

    /// Walks the CNAME graph from `name` up to `max_cname_depth` hops,
    /// emitting one CNAME record per hop, then attempting to resolve the
    /// final target at `rtype` (§4.5 point 3). Returns `Ok(None)` when
    /// `name` has no CNAME at all (not a chain miss, just "try the next
    /// fallback"); returns `Err(NotFound)` when a chain was entered but
    /// never bottoms out, including exceeding the depth bound.
    fn resolve_cname_chain(
        &self,
        name: &str,
        rtype: RecordType,
        ctx: &CancellationContext,
    ) -> Result<Option<Vec<Record>>, BackendError> {
        let mut chain = Vec::new();
        let mut current = name.to_string();

        for _ in 0..self.config.max_cname_depth {
            ctx.check().map_err(|_| BackendError::Cancelled)?;
            let cname_record = match self.store.get(&current, RecordType::Cname, ctx) {
                Ok(r) => r,
                Err(_) => {
                    return if chain.is_empty() {
                        Ok(None)
                    } else {
                        Err(BackendError::NotFound)
                    };
                }
            };

            let target = normalize_name(&cname_record.value[0]);
            chain.push(cname_record);
            current = target;

            if let Ok(final_record) = self.store.get(&current, rtype, ctx) {
                chain.push(final_record);
                return Ok(Some(chain));
            }
        }

        Err(BackendError::NotFound)
    }

    /// Resolves a client's IP to coordinates via the Geolocation Sorter, for
    /// the Query Frontend to pass into `resolve`. A cheap local lookup with
    /// no suspension point, so it takes no cancellation context.
    pub fn client_coordinates(&self, ip: &str) -> Option<Coordinates> {
        self.geo.resolve_client(ip)
    }

    fn finish(&self, mut records: Vec<Record>, client: Option<Coordinates>) -> Vec<Record> {
        for record in records.iter_mut() {
            if record.ttl == 0 {
                record.ttl = self.config.default_ttl;
            }
        }
        self.geo.sort(&mut records, client);
        records
    }
}
