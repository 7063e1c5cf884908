//! End-to-end scenarios exercising the full Query Frontend -> Resolution
//! Backend -> Record Store path, plus the declarative-document and ACME
//! collaborator surfaces layered on top of the store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use atlas::dns::acme::AcmeDnsChallenge;
use atlas::dns::backend::{Backend, BackendConfig};
use atlas::dns::cancellation::CancellationContext;
use atlas::dns::context::ServerContext;
use atlas::dns::errors::UpstreamError;
use atlas::dns::forwarder::{Forwarder, UpstreamClient};
use atlas::dns::frontend::execute_query;
use atlas::dns::geo::{Coordinates, GeoLookup, GeoSorter};
use atlas::dns::protocol::{DnsPacket, DnsQuestion, DnsRecord, QueryType, ResultCode, TransientTtl};
use atlas::dns::record::{Record, RecordType};
use atlas::dns::store::Store;

fn rec(name: &str, rtype: RecordType, ttl: u32, values: &[&str]) -> Record {
    Record::new(name, rtype, ttl, values.iter().map(|s| s.to_string()).collect()).unwrap()
}

fn ctx() -> CancellationContext {
    CancellationContext::none()
}

fn request_for(name: &str, qtype: QueryType) -> DnsPacket {
    let mut packet = DnsPacket::new();
    packet.header.id = 7;
    packet.header.recursion_desired = true;
    packet.questions.push(DnsQuestion::new(name.to_string(), qtype));
    packet
}

fn context_with(store: Arc<Store>, backend: Backend, port: u16) -> ServerContext {
    ServerContext::new(store, backend, port, ctx())
}

fn default_backend(store: Arc<Store>) -> Backend {
    Backend::new(store, GeoSorter::disabled(), None, BackendConfig::default())
}

#[test]
fn test_exact_a_lookup() {
    let store = Arc::new(Store::new());
    store
        .create(rec("example.com.", RecordType::A, 300, &["192.168.1.1"]), &ctx())
        .unwrap();
    let backend = default_backend(Arc::clone(&store));
    let context = context_with(store, backend, 0);

    let response = execute_query(&context, &request_for("example.com.", QueryType::A), None);

    assert_eq!(response.header.rescode, ResultCode::NOERROR);
    assert_eq!(response.answers.len(), 1);
    match &response.answers[0] {
        DnsRecord::A { addr, ttl, .. } => {
            assert_eq!(addr.to_string(), "192.168.1.1");
            assert_eq!(ttl.0, 300);
        }
        other => panic!("expected A record, got {other:?}"),
    }
}

#[test]
fn test_cname_chain_resolves_in_order() {
    let store = Arc::new(Store::new());
    store
        .create(rec("alias.ex.", RecordType::Cname, 300, &["www.ex."]), &ctx())
        .unwrap();
    store
        .create(rec("www.ex.", RecordType::Cname, 300, &["ex."]), &ctx())
        .unwrap();
    store
        .create(rec("ex.", RecordType::A, 300, &["1.2.3.4"]), &ctx())
        .unwrap();
    let backend = default_backend(Arc::clone(&store));
    let context = context_with(store, backend, 0);

    let response = execute_query(&context, &request_for("alias.ex.", QueryType::A), None);

    assert_eq!(response.header.rescode, ResultCode::NOERROR);
    assert_eq!(response.answers.len(), 3);
    match &response.answers[0] {
        DnsRecord::Cname { domain, host, .. } => {
            assert_eq!(domain, "alias.ex.");
            assert_eq!(host, "www.ex.");
        }
        other => panic!("expected Cname, got {other:?}"),
    }
    match &response.answers[1] {
        DnsRecord::Cname { domain, host, .. } => {
            assert_eq!(domain, "www.ex.");
            assert_eq!(host, "ex.");
        }
        other => panic!("expected Cname, got {other:?}"),
    }
    match &response.answers[2] {
        DnsRecord::A { domain, addr, .. } => {
            assert_eq!(domain, "ex.");
            assert_eq!(addr.to_string(), "1.2.3.4");
        }
        other => panic!("expected A, got {other:?}"),
    }
}

#[test]
fn test_nxdomain_carries_exactly_one_soa_in_authority() {
    let store = Arc::new(Store::new());
    store
        .create(
            rec(
                "ex.",
                RecordType::Soa,
                3600,
                &["ns1.ex. hostmaster.ex. 1 3600 600 86400 60"],
            ),
            &ctx(),
        )
        .unwrap();
    let backend = default_backend(Arc::clone(&store));
    let context = context_with(store, backend, 0);

    let response = execute_query(&context, &request_for("missing.ex.", QueryType::A), None);

    assert_eq!(response.header.rescode, ResultCode::NXDOMAIN);
    assert_eq!(response.authorities.len(), 1);
    assert!(matches!(response.authorities[0], DnsRecord::Soa { .. }));
}

#[test]
fn test_shared_challenge_fqdn_accumulates_separate_txt_rrs() {
    let store = Arc::new(Store::new());
    let acme = AcmeDnsChallenge::new(Arc::clone(&store));
    acme.publish("ex.", "t1", &ctx()).unwrap();
    acme.publish("ex.", "t2", &ctx()).unwrap();

    let backend = default_backend(Arc::clone(&store));
    let context = context_with(store, backend, 0);

    let response = execute_query(
        &context,
        &request_for("_acme-challenge.ex.", QueryType::Txt),
        None,
    );

    assert_eq!(response.answers.len(), 2);
    let values: Vec<&str> = response
        .answers
        .iter()
        .map(|rr| match rr {
            DnsRecord::Txt { data, .. } => data.as_str(),
            other => panic!("expected Txt, got {other:?}"),
        })
        .collect();
    assert_eq!(values, vec!["t1", "t2"]);
}

struct FixedLookup(std::collections::HashMap<String, Coordinates>);

impl GeoLookup for FixedLookup {
    fn lookup(&self, ip: &str) -> Option<Coordinates> {
        self.0.get(ip).copied()
    }
}

#[test]
fn test_geo_sorted_a_records_near_to_far() {
    let near = "10.0.0.1";
    let mid = "10.0.0.2";
    let far = "10.0.0.3";
    let mut db = std::collections::HashMap::new();
    db.insert(near.to_string(), Coordinates { latitude: 37.0, longitude: -122.0 });
    db.insert(mid.to_string(), Coordinates { latitude: 39.0, longitude: -120.0 });
    db.insert(far.to_string(), Coordinates { latitude: 40.7128, longitude: -74.0060 });

    let store = Arc::new(Store::new());
    store
        .create(rec("svc.ex.", RecordType::A, 300, &[far, mid, near]), &ctx())
        .unwrap();

    let geo = GeoSorter::new(Some(Box::new(FixedLookup(db))));
    let backend = Backend::new(Arc::clone(&store), geo, None, BackendConfig::default());

    // Drive the ordering through the same entry point the frontend uses,
    // passing the client's already-resolved coordinates (the frontend's own
    // job is only to look those up via `client_coordinates` before calling
    // `resolve`, which `test_noerror_with_multi_value_a_expansion` in
    // `frontend.rs` already covers).
    let ordered = backend
        .resolve(
            "svc.ex.",
            QueryType::A,
            Some(Coordinates { latitude: 37.7749, longitude: -122.4194 }),
            &ctx(),
        )
        .unwrap();
    assert_eq!(ordered[0].value, vec![near, mid, far]);
}

struct ScriptedClient {
    script: Mutex<Vec<Result<Vec<DnsRecord>, UpstreamError>>>,
}

impl UpstreamClient for ScriptedClient {
    fn query(
        &self,
        _qname: &str,
        _qtype: QueryType,
        _server: (&str, u16),
        _timeout: Duration,
    ) -> Result<Vec<DnsRecord>, UpstreamError> {
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            Err(UpstreamError::Network)
        } else {
            script.remove(0)
        }
    }
}

#[test]
fn test_upstream_failover_on_timeout_then_success() {
    let store = Arc::new(Store::new());
    let client = ScriptedClient {
        script: Mutex::new(vec![
            Err(UpstreamError::Timeout),
            Ok(vec![DnsRecord::A {
                domain: "missing.ex.".to_string(),
                addr: "1.1.1.1".parse().unwrap(),
                ttl: TransientTtl(60),
            }]),
        ]),
    };
    let forwarder = Forwarder::new(
        vec![("u1".to_string(), 53), ("u2".to_string(), 53)],
        Duration::from_millis(50),
        Box::new(client),
    );
    let mut config = BackendConfig::default();
    config.forwarding_enabled = true;
    let backend = Backend::new(Arc::clone(&store), GeoSorter::disabled(), Some(forwarder), config);
    let context = context_with(store, backend, 0);

    let response = execute_query(&context, &request_for("missing.ex.", QueryType::A), None);

    assert_eq!(response.header.rescode, ResultCode::NOERROR);
    assert_eq!(response.answers.len(), 1);
    match &response.answers[0] {
        DnsRecord::A { addr, .. } => assert_eq!(addr.to_string(), "1.1.1.1"),
        other => panic!("expected A, got {other:?}"),
    }
}

#[test]
fn test_upstream_failover_nxdomain_is_final_without_retrying_u1() {
    let store = Arc::new(Store::new());
    let client = ScriptedClient {
        script: Mutex::new(vec![
            Err(UpstreamError::Timeout),
            Err(UpstreamError::AuthoritativeNegative),
        ]),
    };
    let forwarder = Forwarder::new(
        vec![("u1".to_string(), 53), ("u2".to_string(), 53)],
        Duration::from_millis(50),
        Box::new(client),
    );
    let mut config = BackendConfig::default();
    config.forwarding_enabled = true;
    let backend = Backend::new(Arc::clone(&store), GeoSorter::disabled(), Some(forwarder), config);
    let context = context_with(store, backend, 0);

    let response = execute_query(&context, &request_for("missing.ex.", QueryType::A), None);

    assert_eq!(response.header.rescode, ResultCode::NXDOMAIN);
}
