//! Worker-side packet processing.
//!
//! One [`PacketProcessor`] per capture thread. For each packet it
//! dissects L2–L4, classifies the payload, possibly consults the TCP
//! reassembler or the QUIC engine, builds a fingerprint, queries the
//! classifier, and serializes at most one JSON record into the caller's
//! buffer (normally a ring slot). A return of 0 means nothing to emit.

use std::sync::Arc;

use crate::analysis::Classifier;
use crate::cursor::Cursor;
use crate::fingerprint::{Fingerprint, FingerprintType};
use crate::flow::{FlowKey, IpFlowTable, TcpFlowTable};
use crate::format::{format_event_start, format_ipv4, format_ipv6};
use crate::output::{BufferStream, JsonObject, Timestamp};
use crate::protocol::quic::{QuicCryptoEngine, QuicInit, QuicVersionNegotiation};
use crate::protocol::tls::{TlsClientHello, TlsHandshake, TlsRecord, TlsServerCertificate, TlsServerHello};
use crate::protocol::{
    dhcp::DhcpDiscover, dns::DnsPacket, dtls::DtlsClientHello, http::HttpRequest,
    http::HttpResponse, ssh::SshInit, ssh::SshKexInit, wireguard::WireguardHandshakeInit,
};
use crate::protocol::{
    ethernet, ipv4, EthernetHeader, Ipv4Header, Ipv6Header, SelectorConfig, TcpHeader, TcpMsgType,
    TrafficSelector, UdpHeader, UdpMsgType,
};
use crate::stream::TcpReassembler;

/// Bound on tracked flows per worker.
const FLOW_TABLE_CAPACITY: usize = 65_536;

/// Per-worker packet processor.
pub struct PacketProcessor {
    selector: TrafficSelector,
    ip_flow_table: IpFlowTable,
    tcp_flow_table: TcpFlowTable,
    reassembler: TcpReassembler,
    quic_engine: QuicCryptoEngine,
    classifier: Option<Arc<Classifier>>,
}

impl PacketProcessor {
    pub fn new(config: SelectorConfig, classifier: Option<Arc<Classifier>>) -> Self {
        PacketProcessor {
            selector: TrafficSelector::all(config),
            ip_flow_table: IpFlowTable::new(FLOW_TABLE_CAPACITY),
            tcp_flow_table: TcpFlowTable::new(FLOW_TABLE_CAPACITY),
            reassembler: TcpReassembler::new(),
            quic_engine: QuicCryptoEngine::new(),
            classifier: classifier.filter(|c| !c.is_disabled()),
        }
    }

    /// Process one raw Ethernet frame. Returns the number of bytes
    /// serialized into `out` (0 = no record).
    pub fn process_packet(&mut self, ts: Timestamp, packet: &[u8], out: &mut [u8]) -> usize {
        let mut c = Cursor::new(packet);
        let eth = EthernetHeader::parse(&mut c);

        let (src, dst, protocol) = match eth.ethertype {
            ethernet::ETHERTYPE_IPV4 => {
                let ip = Ipv4Header::parse(&mut c);
                (ip.src(), ip.dst(), ip.protocol)
            }
            ethernet::ETHERTYPE_IPV6 => {
                let ip = Ipv6Header::parse(&mut c);
                (ip.src(), ip.dst(), ip.next_header)
            }
            _ => return 0,
        };
        if c.is_null() {
            return 0;
        }

        match protocol {
            ipv4::PROTO_TCP => {
                let tcp = TcpHeader::parse(&mut c);
                if c.is_null() {
                    return 0;
                }
                let key = FlowKey::new(src, dst, protocol, tcp.src_port, tcp.dst_port);
                self.process_tcp(ts, key, &tcp, c.as_slice(), out)
            }
            ipv4::PROTO_UDP => {
                let udp = UdpHeader::parse(&mut c);
                if c.is_null() {
                    return 0;
                }
                let key = FlowKey::new(src, dst, protocol, udp.src_port, udp.dst_port);
                self.process_udp(ts, key, c.as_slice(), out)
            }
            _ => 0,
        }
    }

    /// Reap one expired reassembly and emit whatever was collected.
    /// Intended for idle moments in the capture loop.
    pub fn flush_expired(&mut self, now: u64, out: &mut [u8]) -> usize {
        let Some(reaped) = self.reassembler.reap(now) else {
            return 0;
        };
        let ts = Timestamp::new(now, 0);
        self.emit_tcp_message(ts, reaped.key, 0, reaped.data(), false, out)
    }

    fn process_tcp(
        &mut self,
        ts: Timestamp,
        key: FlowKey,
        tcp: &TcpHeader<'_>,
        payload: &[u8],
        out: &mut [u8],
    ) -> usize {
        if tcp.is_syn() || tcp.is_syn_ack() {
            self.tcp_flow_table.syn_packet(key, ts.sec, tcp.seq);
            let wanted = if tcp.is_syn_ack() {
                self.selector.tcp_syn() && self.selector.tcp_syn_ack()
            } else {
                self.selector.tcp_syn()
            };
            if !wanted {
                return 0;
            }
            let fp = tcp.fingerprint();
            if fp.is_null() {
                return 0; // malformed options: drop the sub-record
            }
            let fp_key = if tcp.is_syn_ack() { "tcp_server" } else { "tcp" };
            return write_record(out, &key, ts, |o| {
                let mut fps = o.open_object("fingerprints");
                fps.print_key_string(fp_key, fp.as_str());
                fps.close();
                true
            });
        }

        if payload.is_empty() {
            return 0;
        }
        self.tcp_flow_table
            .is_first_data_packet(key, ts.sec, tcp.seq);

        // a pending reassembly swallows segments until complete
        if self.reassembler.is_in_progress(&key) {
            if let Some(done) = self.reassembler.check_packet(key, ts.sec, tcp.seq, payload) {
                return self.emit_tcp_message(ts, key, 0, done.data(), false, out);
            }
            return 0;
        }

        self.emit_tcp_message(ts, key, tcp.seq, payload, true, out)
    }

    /// Parse and emit one classified TCP message. `allow_reassembly`
    /// lets a truncated TLS handshake be stashed instead of emitted.
    fn emit_tcp_message(
        &mut self,
        ts: Timestamp,
        key: FlowKey,
        seq: u32,
        data: &[u8],
        allow_reassembly: bool,
        out: &mut [u8],
    ) -> usize {
        let metadata = self.selector.config().metadata;
        let certs = self.selector.config().certs;

        match self.selector.tcp_msg_type(data) {
            TcpMsgType::TlsClientHello => {
                let mut c = Cursor::new(data);
                let record = TlsRecord::parse(&mut c);
                let mut frag = record.fragment;
                let handshake = TlsHandshake::parse(&mut frag);

                let deficit = handshake
                    .additional_bytes_needed
                    .max(record.additional_bytes_needed);
                if deficit > 0
                    && allow_reassembly
                    && self.reassembler.copy_packet(key, ts.sec, seq, data, deficit)
                {
                    return 0; // wait for the rest
                }

                let mut body = handshake.body;
                let hello = TlsClientHello::parse(&mut body);
                if !hello.is_not_empty() {
                    return 0;
                }
                let fp = Fingerprint::build(FingerprintType::Tls, |b| hello.fingerprint(b));
                let analysis = analyze(self.classifier.as_deref(), &fp, hello.server_name(), &key, None);
                write_record(out, &key, ts, |o| {
                    write_fingerprint(o, "tls", &fp);
                    if metadata {
                        let mut tls = o.open_object("tls");
                        hello.write_json(&mut tls);
                        tls.close();
                    }
                    if let Some(result) = &analysis {
                        result.write_json(o);
                    }
                    true
                })
            }
            TcpMsgType::TlsServerHello => {
                let mut c = Cursor::new(data);
                let record = TlsRecord::parse(&mut c);
                let mut frag = record.fragment;
                let handshake = TlsHandshake::parse(&mut frag);

                let deficit = handshake
                    .additional_bytes_needed
                    .max(record.additional_bytes_needed);
                if deficit > 0
                    && allow_reassembly
                    && self.reassembler.copy_packet(key, ts.sec, seq, data, deficit)
                {
                    return 0;
                }

                let mut body = handshake.body;
                let hello = TlsServerHello::parse(&mut body);
                if !hello.is_not_empty() {
                    return 0;
                }
                let fp = Fingerprint::build(FingerprintType::TlsServer, |b| hello.fingerprint(b));
                write_record(out, &key, ts, |o| {
                    write_fingerprint(o, "tls_server", &fp);
                    if metadata {
                        let mut tls = o.open_object("tls");
                        hello.write_json(&mut tls);
                        tls.close();
                    }
                    true
                })
            }
            TcpMsgType::TlsCertificate => {
                if !certs {
                    return 0;
                }
                let mut c = Cursor::new(data);
                let record = TlsRecord::parse(&mut c);
                let mut frag = record.fragment;
                let handshake = TlsHandshake::parse(&mut frag);

                let deficit = handshake
                    .additional_bytes_needed
                    .max(record.additional_bytes_needed);
                if deficit > 0
                    && allow_reassembly
                    && self.reassembler.copy_packet(key, ts.sec, seq, data, deficit)
                {
                    return 0;
                }

                let mut body = handshake.body;
                let chain = TlsServerCertificate::parse(&mut body);
                if !chain.is_not_empty() {
                    return 0;
                }
                write_record(out, &key, ts, |o| {
                    let mut tls = o.open_object("tls");
                    let mut server = tls.open_object("server");
                    chain.write_json(&mut server);
                    server.close();
                    tls.close();
                    true
                })
            }
            TcpMsgType::HttpRequest => {
                let mut c = Cursor::new(data);
                let request = HttpRequest::parse(&mut c);
                if !request.is_not_empty() {
                    return 0;
                }
                let fp = Fingerprint::build(FingerprintType::Http, |b| request.fingerprint(b));
                let analysis = analyze(
                    self.classifier.as_deref(),
                    &fp,
                    request.host(),
                    &key,
                    request.user_agent(),
                );
                write_record(out, &key, ts, |o| {
                    write_fingerprint(o, "http", &fp);
                    if metadata {
                        let mut http = o.open_object("http");
                        request.write_json(&mut http);
                        http.print_key_string(
                            "complete",
                            if request.complete { "yes" } else { "no" },
                        );
                        http.close();
                    }
                    if let Some(result) = &analysis {
                        result.write_json(o);
                    }
                    true
                })
            }
            TcpMsgType::HttpResponse => {
                let mut c = Cursor::new(data);
                let response = HttpResponse::parse(&mut c);
                if !response.is_not_empty() {
                    return 0;
                }
                let fp =
                    Fingerprint::build(FingerprintType::HttpServer, |b| response.fingerprint(b));
                write_record(out, &key, ts, |o| {
                    write_fingerprint(o, "http_server", &fp);
                    if metadata {
                        let mut http = o.open_object("http");
                        response.write_json(&mut http);
                        http.print_key_string(
                            "complete",
                            if response.complete { "yes" } else { "no" },
                        );
                        http.close();
                    }
                    true
                })
            }
            TcpMsgType::SshInit => {
                let mut c = Cursor::new(data);
                let init = SshInit::parse(&mut c);
                if !init.is_not_empty() {
                    return 0;
                }
                let fp = Fingerprint::build(FingerprintType::Ssh, |b| init.fingerprint(b));
                write_record(out, &key, ts, |o| {
                    write_fingerprint(o, "ssh", &fp);
                    if metadata {
                        let mut ssh = o.open_object("ssh");
                        init.write_json(&mut ssh);
                        ssh.close();
                    }
                    true
                })
            }
            TcpMsgType::SshKex => {
                let mut c = Cursor::new(data);
                let kex = SshKexInit::parse(&mut c);
                if !kex.is_not_empty() {
                    return 0;
                }
                let fp = Fingerprint::build(FingerprintType::SshKex, |b| kex.fingerprint(b));
                write_record(out, &key, ts, |o| {
                    write_fingerprint(o, "ssh_kex", &fp);
                    if metadata {
                        let mut ssh = o.open_object("ssh");
                        kex.write_json(&mut ssh);
                        ssh.close();
                    }
                    true
                })
            }
            TcpMsgType::Unknown => {
                self.ip_flow_table.flow_is_new(key, ts.sec);
                0
            }
        }
    }

    fn process_udp(
        &mut self,
        ts: Timestamp,
        key: FlowKey,
        payload: &[u8],
        out: &mut [u8],
    ) -> usize {
        let metadata = self.selector.config().metadata;

        match self.selector.udp_msg_type(payload, key.src_port, key.dst_port) {
            UdpMsgType::Quic => {
                // version 0 is a version negotiation packet
                if payload.len() >= 5 && payload[1..5] == [0, 0, 0, 0] {
                    let mut c = Cursor::new(payload);
                    let vn = QuicVersionNegotiation::parse(&mut c);
                    if !vn.is_not_empty() {
                        return 0;
                    }
                    return write_record(out, &key, ts, |o| {
                        let mut quic = o.open_object("quic");
                        vn.write_json(&mut quic);
                        quic.close();
                        true
                    });
                }

                let mut c = Cursor::new(payload);
                let init = QuicInit::parse(&mut c, &mut self.quic_engine);
                if !init.is_not_empty() {
                    return 0;
                }
                // failed decryption yields nothing; gquic is reported
                // as metadata without decryption
                if !init.decrypted && !init.packet.gquic {
                    return 0;
                }
                let fp = if init.has_tls() {
                    Fingerprint::build(FingerprintType::Quic, |b| init.fingerprint(b))
                } else {
                    Fingerprint::null()
                };
                let analysis = if init.has_tls() {
                    analyze(
                        self.classifier.as_deref(),
                        &fp,
                        init.hello.server_name(),
                        &key,
                        None,
                    )
                } else {
                    None
                };
                write_record(out, &key, ts, |o| {
                    if !fp.is_null() {
                        write_fingerprint(o, "quic", &fp);
                    }
                    if metadata || !init.has_tls() {
                        if init.hello.is_not_empty() {
                            let mut tls = o.open_object("tls");
                            init.hello.write_json(&mut tls);
                            tls.close();
                        }
                        init.write_json(o);
                    }
                    if let Some(result) = &analysis {
                        result.write_json(o);
                    }
                    true
                })
            }
            UdpMsgType::Dns => {
                let mut c = Cursor::new(payload);
                let dns = DnsPacket::parse(&mut c);
                if !dns.is_not_empty() {
                    return 0;
                }
                let dns_json = self.selector.config().dns_json;
                write_record(out, &key, ts, |o| {
                    let mut block = o.open_object("dns");
                    if dns_json {
                        dns.write_json(&mut block);
                    } else {
                        dns.write_json_base64(&mut block);
                    }
                    block.close();
                    true
                })
            }
            UdpMsgType::Dhcp => {
                let mut c = Cursor::new(payload);
                let dhcp = DhcpDiscover::parse(&mut c);
                if !dhcp.is_not_empty() {
                    return 0;
                }
                let fp = Fingerprint::build(FingerprintType::Dhcp, |b| dhcp.fingerprint(b));
                write_record(out, &key, ts, |o| {
                    write_fingerprint(o, "dhcp", &fp);
                    if metadata {
                        let mut block = o.open_object("dhcp");
                        dhcp.write_json(&mut block);
                        block.close();
                    }
                    true
                })
            }
            UdpMsgType::Wireguard => {
                let mut c = Cursor::new(payload);
                let wg = WireguardHandshakeInit::parse(&mut c);
                if !wg.is_not_empty() {
                    return 0;
                }
                write_record(out, &key, ts, |o| {
                    let mut block = o.open_object("wireguard");
                    wg.write_json(&mut block);
                    block.close();
                    true
                })
            }
            UdpMsgType::DtlsClientHello => {
                let mut c = Cursor::new(payload);
                let ch = DtlsClientHello::parse(&mut c);
                if !ch.is_not_empty() {
                    return 0;
                }
                let fp = Fingerprint::build(FingerprintType::Dtls, |b| ch.fingerprint(b));
                write_record(out, &key, ts, |o| {
                    write_fingerprint(o, "dtls", &fp);
                    if metadata {
                        ch.write_json(o);
                    }
                    true
                })
            }
            UdpMsgType::DtlsServerHello => {
                // only the client hello is fingerprinted; record the flow
                let mut c = Cursor::new(payload);
                let ch = DtlsClientHello::parse(&mut c); // shared framing
                if !ch.record.is_not_empty() {
                    return 0;
                }
                write_record(out, &key, ts, |o| {
                    let mut block = o.open_object("dtls");
                    block.print_key_hex("version", &ch.record.version.to_be_bytes());
                    block.print_key_string("server_hello", "seen");
                    block.close();
                    true
                })
            }
            UdpMsgType::Unknown => {
                self.ip_flow_table.flow_is_new(key, ts.sec);
                0
            }
        }
    }

}

/// Run the classifier for one fingerprint, if one is loaded.
fn analyze(
    classifier: Option<&Classifier>,
    fp: &Fingerprint,
    server_name: Option<&str>,
    key: &FlowKey,
    user_agent: Option<&str>,
) -> Option<crate::analysis::AnalysisResult> {
    let classifier = classifier?;
    let dst_ip = ip_to_string(key);
    classifier.analyze_fingerprint(
        fp,
        server_name.unwrap_or(""),
        &dst_ip,
        key.dst_port,
        user_agent,
    )
}

fn ip_to_string(key: &FlowKey) -> String {
    match key.dst_addr {
        std::net::IpAddr::V4(v4) => format_ipv4(u32::from(v4)),
        std::net::IpAddr::V6(v6) => format_ipv6(&v6.octets()),
    }
}

/// Write one fingerprint under the `fingerprints` block; a null
/// fingerprint writes nothing.
fn write_fingerprint(o: &mut JsonObject, name: &str, fp: &Fingerprint) {
    if fp.is_null() {
        return;
    }
    let mut fps = o.open_object("fingerprints");
    fps.print_key_string(name, fp.as_str());
    fps.close();
}

/// Serialize one record: protocol blocks from `body`, then the flow
/// five-tuple and event timestamp, newline terminated. Returns 0 when
/// the body declined to write or the buffer overflowed.
fn write_record<F>(out: &mut [u8], key: &FlowKey, ts: Timestamp, body: F) -> usize
where
    F: FnOnce(&mut JsonObject) -> bool,
{
    let mut stream = BufferStream::new(out);
    let mut o = JsonObject::new(&mut stream);
    if !body(&mut o) {
        return 0;
    }

    let (src_ip, dst_ip) = match (key.src_addr, key.dst_addr) {
        (std::net::IpAddr::V4(s), std::net::IpAddr::V4(d)) => (
            format_ipv4(u32::from(s)),
            format_ipv4(u32::from(d)),
        ),
        (std::net::IpAddr::V6(s), std::net::IpAddr::V6(d)) => {
            (format_ipv6(&s.octets()), format_ipv6(&d.octets()))
        }
        (s, d) => (s.to_string(), d.to_string()),
    };
    o.print_key_string("src_ip", &src_ip);
    o.print_key_string("dst_ip", &dst_ip);
    o.print_key_uint("protocol", key.protocol as u64);
    o.print_key_uint("src_port", key.src_port as u64);
    o.print_key_uint("dst_port", key.dst_port as u64);
    o.print_key_string("event_start", &format_event_start(ts.sec, ts.nsec));
    o.close();
    stream.write_char(b'\n');
    stream.length()
}
