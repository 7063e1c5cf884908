//! The certificate subsystem's DNS-01 challenge contract (§6
//! "Collaborators"). The actual ACME protocol conversation (account keys,
//! order polling, certificate issuance, TLS termination) is an external
//! collaborator's concern and out of scope here; this module is only the
//! narrow surface that collaborator drives against the Record Store:
//! publish a challenge token as a TXT record, allowing concurrent
//! challenges on the same FQDN to coexist, and remove it wholesale once
//! the order is done.
//!
//! Grounded on `store.rs::Store::create_or_append`/`delete` (the
//! multi-challenge-coexistence and wholesale-cleanup semantics already
//! live there) and `record.rs::normalize_name` for FQDN handling.

use std::sync::Arc;

use crate::dns::cancellation::CancellationContext;
use crate::dns::errors::StoreError;
use crate::dns::record::{normalize_name, Record, RecordType};
use crate::dns::store::Store;

const CHALLENGE_TTL: u32 = 60;

/// The TXT record name a DNS-01 challenge for `domain` is published under.
/// A wildcard domain's challenge is normalized to the apex: the challenge
/// for `*.example.com.` is published at `_acme-challenge.example.com.`,
/// not `_acme-challenge.*.example.com.` (§6).
pub fn challenge_name(domain: &str) -> String {
    let normalized = normalize_name(domain);
    let trimmed = normalized.trim_end_matches('.');
    let base = trimmed.strip_prefix("*.").unwrap_or(trimmed);
    normalize_name(&format!("_acme-challenge.{base}"))
}

/// Publishes and retracts DNS-01 challenge tokens for one domain at a time.
/// Holds no certificate material and speaks no ACME protocol; it is the
/// thin edge the certificate-issuance collaborator drives.
pub struct AcmeDnsChallenge {
    store: Arc<Store>,
}

impl AcmeDnsChallenge {
    pub fn new(store: Arc<Store>) -> AcmeDnsChallenge {
        AcmeDnsChallenge { store }
    }

    /// Publishes `token` under the challenge name for `domain`. If a
    /// challenge is already published there (a second certificate order in
    /// flight for the same name), `token` is appended rather than
    /// replacing the existing value, so both orders validate (§6).
    pub fn publish(
        &self,
        domain: &str,
        token: &str,
        ctx: &CancellationContext,
    ) -> Result<(), StoreError> {
        let name = challenge_name(domain);
        let record = Record::new(name, RecordType::Txt, CHALLENGE_TTL, vec![token.to_string()])
            .map_err(StoreError::Validation)?;
        self.store.create_or_append(record, ctx)
    }

    /// Removes the challenge record for `domain` wholesale, regardless of
    /// how many tokens it currently carries.
    pub fn cleanup(&self, domain: &str, ctx: &CancellationContext) -> Result<(), StoreError> {
        let name = challenge_name(domain);
        self.store.delete(&name, RecordType::Txt, ctx)
    }
}
