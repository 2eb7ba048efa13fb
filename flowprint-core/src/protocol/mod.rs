//! Protocol dissection.
//!
//! Layers 2–4 produce the flow key; application payloads are classified
//! by mask-and-value magic matchers into a message type, then parsed into
//! borrowed views. Every view parses through [`crate::cursor::Cursor`]
//! and exposes `is_not_empty()`, true only when the minimum required
//! fields were present and well-formed.

pub mod dhcp;
pub mod dns;
pub mod dtls;
pub mod ethernet;
pub mod http;
pub mod ipv4;
pub mod ipv6;
pub mod quic;
pub mod ssh;
pub mod tcp;
pub mod tls;
pub mod udp;
pub mod wireguard;

pub use ethernet::EthernetHeader;
pub use ipv4::Ipv4Header;
pub use ipv6::Ipv6Header;
pub use tcp::TcpHeader;
pub use udp::UdpHeader;

/// Message carried by a TCP payload, as identified by magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpMsgType {
    Unknown,
    HttpRequest,
    HttpResponse,
    TlsClientHello,
    TlsServerHello,
    TlsCertificate,
    SshInit,
    SshKex,
}

/// Message carried by a UDP payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdpMsgType {
    Unknown,
    Dns,
    Dhcp,
    DtlsClientHello,
    DtlsServerHello,
    Wireguard,
    Quic,
}

/// Bitwise magic matcher: `data & mask == value` over the first N bytes.
#[derive(Debug, Clone, Copy)]
pub struct MaskAndValue<const N: usize> {
    pub mask: [u8; N],
    pub value: [u8; N],
}

impl<const N: usize> MaskAndValue<N> {
    pub const fn new(mask: [u8; N], value: [u8; N]) -> Self {
        MaskAndValue { mask, value }
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        if data.len() < N {
            return false;
        }
        self.mask
            .iter()
            .zip(self.value.iter())
            .zip(data.iter())
            .all(|((m, v), d)| d & m == *v)
    }
}

/// Protocol selection policy for TCP and UDP payloads.
///
/// Matchers are registered per enabled protocol; classification walks the
/// table in registration order (HTTP response before request, as the
/// response magic is the more specific of the two).
pub struct TrafficSelector {
    tcp: Vec<(MaskAndValue<8>, TcpMsgType)>,
    udp: Vec<(MaskAndValue<8>, UdpMsgType)>,
    udp16: Vec<(MaskAndValue<16>, UdpMsgType)>,
    config: SelectorConfig,
}

/// Runtime protocol selection flags.
#[derive(Debug, Clone, Copy)]
pub struct SelectorConfig {
    /// Emit a record (with TCP fingerprint) for every SYN.
    pub tcp_syn: bool,
    /// Also fingerprint SYN-ACK packets.
    pub tcp_syn_ack: bool,
    /// Decode DNS into JSON; false emits base64 of the raw message.
    pub dns_json: bool,
    /// Report handshake metadata blocks alongside fingerprints.
    pub metadata: bool,
    /// Report certificate bytes for TLS server handshakes.
    pub certs: bool,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        SelectorConfig {
            tcp_syn: false,
            tcp_syn_ack: false,
            dns_json: true,
            metadata: true,
            certs: false,
        }
    }
}

impl TrafficSelector {
    /// Selector with every application protocol enabled.
    pub fn all(config: SelectorConfig) -> Self {
        let mut s = TrafficSelector {
            tcp: Vec::new(),
            udp: Vec::new(),
            udp16: Vec::new(),
            config,
        };

        // the HTTP request bitmask is the loosest matcher (any three
        // uppercase letters), so it must come last; the response magic
        // would itself satisfy it
        s.tcp.push((tls::CLIENT_HELLO_MATCHER, TcpMsgType::TlsClientHello));
        s.tcp.push((tls::SERVER_HELLO_MATCHER, TcpMsgType::TlsServerHello));
        s.tcp.push((tls::CERTIFICATE_MATCHER, TcpMsgType::TlsCertificate));
        s.tcp.push((ssh::INIT_MATCHER, TcpMsgType::SshInit));
        s.tcp.push((ssh::KEX_MATCHER, TcpMsgType::SshKex));
        s.tcp.push((http::RESPONSE_MATCHER, TcpMsgType::HttpResponse));
        s.tcp.push((http::REQUEST_MATCHER, TcpMsgType::HttpRequest));

        s.udp.push((quic::INITIAL_MATCHER, UdpMsgType::Quic));
        s.udp.push((wireguard::HANDSHAKE_INIT_MATCHER, UdpMsgType::Wireguard));
        s.udp.push((dhcp::DISCOVER_MATCHER, UdpMsgType::Dhcp));
        s.udp.push((dns::MATCHER, UdpMsgType::Dns));

        s.udp16.push((dtls::CLIENT_HELLO_MATCHER, UdpMsgType::DtlsClientHello));
        s.udp16.push((dtls::SERVER_HELLO_MATCHER, UdpMsgType::DtlsServerHello));

        s
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    pub fn tcp_syn(&self) -> bool {
        self.config.tcp_syn
    }

    pub fn tcp_syn_ack(&self) -> bool {
        self.config.tcp_syn_ack
    }

    /// Classify a TCP payload by magic bytes.
    pub fn tcp_msg_type(&self, data: &[u8]) -> TcpMsgType {
        if data.len() < 8 {
            return TcpMsgType::Unknown;
        }
        for (matcher, msg_type) in &self.tcp {
            if matcher.matches(data) {
                return *msg_type;
            }
        }
        TcpMsgType::Unknown
    }

    /// Classify a UDP payload by magic bytes, falling back to port
    /// heuristics for DNS and DHCP.
    pub fn udp_msg_type(&self, data: &[u8], src_port: u16, dst_port: u16) -> UdpMsgType {
        if data.len() >= 8 {
            for (matcher, msg_type) in &self.udp {
                if matcher.matches(data) {
                    // the DNS header magic is weak; require the service port
                    if *msg_type == UdpMsgType::Dns && !is_dns_port(src_port, dst_port) {
                        continue;
                    }
                    return *msg_type;
                }
            }
        }
        if data.len() >= 16 {
            for (matcher, msg_type) in &self.udp16 {
                if matcher.matches(data) {
                    return *msg_type;
                }
            }
        }
        if is_dns_port(src_port, dst_port) && data.len() >= 12 {
            return UdpMsgType::Dns;
        }
        UdpMsgType::Unknown
    }
}

fn is_dns_port(src_port: u16, dst_port: u16) -> bool {
    const DNS: u16 = 53;
    const MDNS: u16 = 5353;
    const NBNS: u16 = 137;
    [src_port, dst_port]
        .iter()
        .any(|&p| p == DNS || p == MDNS || p == NBNS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> TrafficSelector {
        TrafficSelector::all(SelectorConfig::default())
    }

    #[test]
    fn test_mask_and_value() {
        let m = MaskAndValue::new([0xff, 0xf0], [0x16, 0x30]);
        assert!(m.matches(&[0x16, 0x3f]));
        assert!(!m.matches(&[0x17, 0x3f]));
        assert!(!m.matches(&[0x16])); // too short
    }

    #[test]
    fn test_tcp_classification() {
        let s = selector();
        assert_eq!(
            s.tcp_msg_type(b"GET /index.html "),
            TcpMsgType::HttpRequest
        );
        assert_eq!(s.tcp_msg_type(b"HTTP/1.1 200 OK "), TcpMsgType::HttpResponse);
        assert_eq!(
            s.tcp_msg_type(&[0x16, 0x03, 0x01, 0x00, 0x50, 0x01, 0x00, 0x00]),
            TcpMsgType::TlsClientHello
        );
        assert_eq!(
            s.tcp_msg_type(&[0x16, 0x03, 0x03, 0x00, 0x50, 0x02, 0x00, 0x00]),
            TcpMsgType::TlsServerHello
        );
        assert_eq!(s.tcp_msg_type(b"SSH-2.0-OpenSSH"), TcpMsgType::SshInit);
        assert_eq!(s.tcp_msg_type(&[0x00; 4]), TcpMsgType::Unknown);
    }

    #[test]
    fn test_udp_classification() {
        let s = selector();

        // QUIC long header, v1
        let quic = [0xc3, 0x00, 0x00, 0x00, 0x01, 0x08, 0x00, 0x00];
        assert_eq!(s.udp_msg_type(&quic, 50000, 443), UdpMsgType::Quic);

        // Wireguard handshake initiation
        let wg = [0x01, 0x00, 0x00, 0x00, 0xaa, 0xbb, 0xcc, 0xdd];
        assert_eq!(s.udp_msg_type(&wg, 51820, 51820), UdpMsgType::Wireguard);

        // DHCP discover
        let dhcp = [0x01, 0x01, 0x06, 0x00, 0x11, 0x22, 0x33, 0x44];
        assert_eq!(s.udp_msg_type(&dhcp, 68, 67), UdpMsgType::Dhcp);

        // DNS query needs the service port
        let dns = [0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0, 0, 0, 0];
        assert_eq!(s.udp_msg_type(&dns, 40000, 53), UdpMsgType::Dns);
        assert_eq!(s.udp_msg_type(&dns, 40000, 4444), UdpMsgType::Unknown);
    }

    #[test]
    fn test_udp16_dtls_classification() {
        let s = selector();
        let mut dtls_ch = [0u8; 16];
        dtls_ch[0] = 22; // handshake record
        dtls_ch[1] = 0xfe;
        dtls_ch[2] = 0xfd;
        dtls_ch[13] = 0x01; // client hello
        assert_eq!(
            s.udp_msg_type(&dtls_ch, 40000, 4433),
            UdpMsgType::DtlsClientHello
        );
        dtls_ch[13] = 0x02;
        assert_eq!(
            s.udp_msg_type(&dtls_ch, 4433, 40000),
            UdpMsgType::DtlsServerHello
        );
    }
}
