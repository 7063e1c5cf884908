//! The Query Frontend (§4.6): accepts DNS queries on UDP and TCP with
//! identical semantics, validates and normalizes them, invokes the
//! Resolution Backend, and builds the wire-format response.
//!
//! Grounded on the donor's `server.rs`: `execute_query`/
//! `build_response_packet`/`validate_request` are kept in shape (free
//! functions, "always return a valid packet" discipline), and
//! `DnsUdpServer`/`DnsTcpServer` reuse its condvar-queue worker pool (UDP)
//! and per-connection-thread-with-round-robin-dispatch (TCP) designs,
//! adapted to call `Backend::resolve` instead of creating a
//! `DnsResolver`. EDNS handling is dropped with `QueryType::Opt` (non-goal).

use std::collections::VecDeque;
use std::io::Write;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::Builder;

use derive_more::{Display, Error, From};

use crate::dns::buffer::{BytePacketBuffer, PacketBuffer, StreamPacketBuffer, VectorPacketBuffer};
use crate::dns::context::ServerContext;
use crate::dns::errors::BackendError;
use crate::dns::netutil::{read_packet_length, write_packet_length};
use crate::dns::protocol::{DnsPacket, DnsQuestion, DnsRecord, QueryType, ResultCode};
use crate::dns::record::{apex_zone, normalize_name, Record, RecordType};

#[derive(Debug, Display, From, Error)]
pub enum FrontendServerError {
    Io(std::io::Error),
}

type Result<T> = std::result::Result<T, FrontendServerError>;

const UDP_RESPONSE_SIZE_LIMIT: usize = 512;

/// `ReceiveQuery(ctx, query) -> response` (§4.6). Always returns a valid
/// packet, even on a resolution failure, since the client must get
/// something back.
pub fn execute_query(
    context: &ServerContext,
    request: &DnsPacket,
    client_ip: Option<&str>,
) -> DnsPacket {
    let mut packet = build_response_packet(request);

    match validate_request(request) {
        Some(error_code) => {
            packet.header.rescode = error_code;
            context
                .statistics
                .formerr_count
                .fetch_add(1, Ordering::Relaxed);
        }
        None => process_valid_query(context, request, client_ip, &mut packet),
    }

    packet
}

fn build_response_packet(request: &DnsPacket) -> DnsPacket {
    let mut packet = DnsPacket::new();
    packet.header.id = request.header.id;
    packet.header.response = true;
    packet
}

/// Non-empty question section, non-empty name (§4.6 point 1).
fn validate_request(request: &DnsPacket) -> Option<ResultCode> {
    if request.questions.is_empty() {
        log::info!("rejecting query with empty question section: FORMERR");
        return Some(ResultCode::FORMERR);
    }

    if request.questions[0].name.trim_end_matches('.').is_empty() {
        log::info!("rejecting query with empty name: FORMERR");
        return Some(ResultCode::FORMERR);
    }

    None
}

fn process_valid_query(
    context: &ServerContext,
    request: &DnsPacket,
    client_ip: Option<&str>,
    packet: &mut DnsPacket,
) {
    let question = &request.questions[0];
    let name = normalize_name(&question.name);
    packet.questions.push(DnsQuestion::new(name.clone(), question.qtype));

    let client_coords = client_ip.and_then(|ip| context.backend.client_coordinates(ip));

    match context
        .backend
        .resolve(&name, question.qtype, client_coords, &context.cancellation)
    {
        Ok(records) => {
            packet.header.rescode = ResultCode::NOERROR;
            packet.header.authoritative_answer = true;
            for record in &records {
                packet.answers.extend(build_answer_rrs(record));
            }

            let apex = apex_zone(&name);
            if let Ok(ns_records) =
                context
                    .backend
                    .resolve(&apex, QueryType::Ns, None, &context.cancellation)
            {
                for record in &ns_records {
                    packet.authorities.extend(build_answer_rrs(record));
                }
            }
        }
        Err(BackendError::NotFound) => {
            packet.header.rescode = ResultCode::NXDOMAIN;
            packet.header.authoritative_answer = true;
            context
                .statistics
                .nxdomain_count
                .fetch_add(1, Ordering::Relaxed);

            let apex = apex_zone(&name);
            if let Ok(soa_records) =
                context
                    .backend
                    .resolve(&apex, QueryType::Soa, None, &context.cancellation)
            {
                if let Some(soa) = soa_records.first() {
                    packet.authorities.extend(build_answer_rrs(soa));
                }
            }
        }
        Err(BackendError::Internal(e)) => {
            log::error!("backend error resolving {name} {:?}: {e}", question.qtype);
            packet.header.rescode = ResultCode::SERVFAIL;
            context
                .statistics
                .servfail_count
                .fetch_add(1, Ordering::Relaxed);
        }
        Err(BackendError::Cancelled) => {
            log::warn!("resolution for {name} {:?} cancelled", question.qtype);
            packet.header.rescode = ResultCode::SERVFAIL;
            context
                .statistics
                .servfail_count
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Expands one store-shaped `Record` into its wire-level RRs, per §4.6 "RR
/// construction per type". A/AAAA and TXT multiplex one RR per value
/// (P8); everything else emits a single RR from `value[0]`.
fn build_answer_rrs(record: &Record) -> Vec<DnsRecord> {
    let ttl = crate::dns::protocol::TransientTtl(record.ttl);

    match record.rtype {
        RecordType::A => record
            .value
            .iter()
            .filter_map(|v| v.parse::<Ipv4Addr>().ok())
            .map(|addr| DnsRecord::A {
                domain: record.name.clone(),
                addr,
                ttl,
            })
            .collect(),
        RecordType::Aaaa => record
            .value
            .iter()
            .filter_map(|v| v.parse::<Ipv6Addr>().ok())
            .map(|addr| DnsRecord::Aaaa {
                domain: record.name.clone(),
                addr,
                ttl,
            })
            .collect(),
        RecordType::Txt => record
            .value
            .iter()
            .map(|v| DnsRecord::Txt {
                domain: record.name.clone(),
                data: v.clone(),
                ttl,
            })
            .collect(),
        RecordType::Cname => single(record, |v| DnsRecord::Cname {
            domain: record.name.clone(),
            host: v.to_string(),
            ttl,
        }),
        RecordType::Ns => single(record, |v| DnsRecord::Ns {
            domain: record.name.clone(),
            host: v.to_string(),
            ttl,
        }),
        RecordType::Ptr => single(record, |v| DnsRecord::Ptr {
            domain: record.name.clone(),
            host: v.to_string(),
            ttl,
        }),
        RecordType::Mx => single(record, |v| {
            let fields: Vec<&str> = v.split_whitespace().collect();
            let (preference, host) = match fields.as_slice() {
                [pref, host] => (pref.parse().unwrap_or(10), host.to_string()),
                [host] => (10, host.to_string()),
                _ => (10, String::new()),
            };
            DnsRecord::Mx {
                domain: record.name.clone(),
                priority: preference,
                host,
                ttl,
            }
        }),
        RecordType::Srv => single(record, |v| {
            let fields: Vec<&str> = v.split_whitespace().collect();
            DnsRecord::Srv {
                domain: record.name.clone(),
                priority: fields.first().and_then(|f| f.parse().ok()).unwrap_or(0),
                weight: fields.get(1).and_then(|f| f.parse().ok()).unwrap_or(0),
                port: fields.get(2).and_then(|f| f.parse().ok()).unwrap_or(0),
                host: fields.get(3).map(|s| s.to_string()).unwrap_or_default(),
                ttl,
            }
        }),
        RecordType::Soa => single(record, |v| {
            let fields: Vec<&str> = v.split_whitespace().collect();
            DnsRecord::Soa {
                domain: record.name.clone(),
                m_name: fields.first().map(|s| s.to_string()).unwrap_or_default(),
                r_name: fields.get(1).map(|s| s.to_string()).unwrap_or_default(),
                serial: fields.get(2).and_then(|f| f.parse().ok()).unwrap_or(0),
                refresh: fields.get(3).and_then(|f| f.parse().ok()).unwrap_or(3600),
                retry: fields.get(4).and_then(|f| f.parse().ok()).unwrap_or(600),
                expire: fields.get(5).and_then(|f| f.parse().ok()).unwrap_or(86400),
                minimum: fields.get(6).and_then(|f| f.parse().ok()).unwrap_or(60),
                ttl,
            }
        }),
        RecordType::Caa => single(record, |v| DnsRecord::Caa {
            domain: record.name.clone(),
            flag: 0,
            tag: "issue".to_string(),
            value: v.to_string(),
            ttl,
        }),
    }
}

fn single(record: &Record, f: impl Fn(&str) -> DnsRecord) -> Vec<DnsRecord> {
    match record.value.first() {
        Some(v) => vec![f(v)],
        None => Vec::new(),
    }
}

/// Accepts queries over UDP. Packets are read on a single thread and
/// dispatched to a fixed pool of worker threads through a condvar-guarded
/// queue, mirroring the donor's `DnsUdpServer`.
pub struct UdpFrontend {
    context: Arc<ServerContext>,
    request_queue: Arc<Mutex<VecDeque<(SocketAddr, DnsPacket)>>>,
    request_cond: Arc<Condvar>,
    thread_count: usize,
}

impl UdpFrontend {
    pub fn new(context: Arc<ServerContext>, thread_count: usize) -> UdpFrontend {
        UdpFrontend {
            context,
            request_queue: Arc::new(Mutex::new(VecDeque::new())),
            request_cond: Arc::new(Condvar::new()),
            thread_count,
        }
    }

    fn process_request(
        socket: &UdpSocket,
        context: &Arc<ServerContext>,
        src: SocketAddr,
        request: &DnsPacket,
    ) {
        let mut res_buffer = VectorPacketBuffer::new();
        let client_ip = src.ip().to_string();
        let mut packet = execute_query(context, request, Some(&client_ip));
        if packet.write(&mut res_buffer, UDP_RESPONSE_SIZE_LIMIT).is_err() {
            log::warn!("failed to encode UDP response for {src}");
            return;
        }

        let len = res_buffer.pos();
        let data = match res_buffer.get_range(0, len) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("failed to read encoded response buffer: {e}");
                return;
            }
        };

        if let Err(e) = socket.send_to(data, src) {
            log::warn!("failed to send UDP response to {src}: {e}");
        }
    }

    fn spawn_request_handler(&self, thread_id: usize, socket: UdpSocket) -> std::io::Result<()> {
        let context = Arc::clone(&self.context);
        let request_cond = Arc::clone(&self.request_cond);
        let request_queue = Arc::clone(&self.request_queue);

        Builder::new()
            .name(format!("dns-udp-worker-{thread_id}"))
            .spawn(move || loop {
                let (src, request) = match request_queue
                    .lock()
                    .ok()
                    .and_then(|guard| request_cond.wait(guard).ok())
                    .and_then(|mut guard| guard.pop_front())
                {
                    Some(item) => item,
                    None => continue,
                };

                Self::process_request(&socket, &context, src, &request);
            })?;

        Ok(())
    }

    fn spawn_incoming_handler(self, socket: UdpSocket) -> std::io::Result<()> {
        Builder::new()
            .name("dns-udp-listener".into())
            .spawn(move || loop {
                self.context
                    .statistics
                    .udp_query_count
                    .fetch_add(1, Ordering::Relaxed);

                let mut req_buffer = BytePacketBuffer::default();
                let (_, src) = match socket.recv_from(&mut req_buffer.buf) {
                    Ok(x) => x,
                    Err(e) => {
                        log::debug!("failed to read from UDP socket: {e}");
                        continue;
                    }
                };

                let request = match DnsPacket::from_buffer(&mut req_buffer) {
                    Ok(x) => x,
                    Err(e) => {
                        log::debug!("failed to parse UDP query from {src}: {e}");
                        continue;
                    }
                };

                if let Ok(mut queue) = self.request_queue.lock() {
                    queue.push_back((src, request));
                    self.request_cond.notify_one();
                }
            })?;

        Ok(())
    }

    /// Does not block; spawns its listener and worker threads and returns.
    pub fn run(self) -> Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", self.context.dns_port))?;

        for thread_id in 0..self.thread_count {
            let socket_clone = socket.try_clone()?;
            self.spawn_request_handler(thread_id, socket_clone)?;
        }

        self.spawn_incoming_handler(socket)?;
        Ok(())
    }
}

/// Accepts queries over TCP. Each accepted connection is dispatched
/// round-robin to one of a fixed pool of worker threads, mirroring the
/// donor's `DnsTcpServer`.
pub struct TcpFrontend {
    context: Arc<ServerContext>,
    senders: Vec<Sender<TcpStream>>,
    thread_count: usize,
}

impl TcpFrontend {
    pub fn new(context: Arc<ServerContext>, thread_count: usize) -> TcpFrontend {
        TcpFrontend {
            context,
            senders: Vec::new(),
            thread_count,
        }
    }

    fn handle_connection(context: &Arc<ServerContext>, mut stream: TcpStream) {
        loop {
            let _ = stream.set_nodelay(true);
            let request_len = match read_packet_length(&mut stream) {
                Ok(x) => x,
                Err(_) => return,
            };

            let mut stream_buffer = StreamPacketBuffer::new(&mut stream);
            let request = match DnsPacket::from_buffer(&mut stream_buffer) {
                Ok(x) => x,
                Err(e) => {
                    log::debug!("failed to parse TCP query: {e}");
                    return;
                }
            };
            let _ = request_len;

            let client_ip = stream
                .peer_addr()
                .ok()
                .map(|addr| addr.ip().to_string());
            let mut packet = execute_query(context, &request, client_ip.as_deref());

            let mut res_buffer = VectorPacketBuffer::new();
            if packet.write(&mut res_buffer, 0xFFFF).is_err() {
                return;
            }

            let len = res_buffer.pos();
            let data = match res_buffer.get_range(0, len) {
                Ok(d) => d,
                Err(_) => return,
            };

            if write_packet_length(&mut stream, data.len()).is_err() {
                return;
            }
            if stream.write_all(data).is_err() {
                return;
            }
        }
    }

    pub fn run(mut self) -> Result<()> {
        let socket = TcpListener::bind(("0.0.0.0", self.context.dns_port))?;

        for thread_id in 0..self.thread_count {
            let (tx, rx) = channel::<TcpStream>();
            let context = Arc::clone(&self.context);

            Builder::new()
                .name(format!("dns-tcp-worker-{thread_id}"))
                .spawn(move || {
                    for stream in rx {
                        Self::handle_connection(&context, stream);
                    }
                })?;

            self.senders.push(tx);
        }

        let context = Arc::clone(&self.context);
        Builder::new()
            .name("dns-tcp-listener".into())
            .spawn(move || {
                let mut next = 0usize;
                for stream in socket.incoming() {
                    let stream = match stream {
                        Ok(s) => s,
                        Err(e) => {
                            log::debug!("failed to accept TCP connection: {e}");
                            continue;
                        }
                    };

                    context
                        .statistics
                        .tcp_query_count
                        .fetch_add(1, Ordering::Relaxed);

                    if self.senders[next].send(stream).is_err() {
                        log::warn!("TCP worker {next} is gone, dropping connection");
                    }
                    next = (next + 1) % self.senders.len();
                }
            })?;

        Ok(())
    }
}
