//! # flowprint-core
//!
//! Handshake fingerprint extraction and process classification.
//!
//! Every packet handed to a [`pkt_proc::PacketProcessor`] is dissected
//! down to its initiating protocol handshake (TLS ClientHello, QUIC
//! Initial, HTTP request/response, SSH KEX, DHCP, DTLS, Wireguard, DNS),
//! reduced to a canonical fingerprint string, optionally classified
//! against a pre-trained naive-Bayes model, and serialized as one JSON
//! line. Per-worker SPSC rings feed a single output thread that merges
//! all workers' records in timestamp order.
//!
//! ## Quick start
//!
//! ```rust
//! use flowprint_core::output::Timestamp;
//! use flowprint_core::pkt_proc::PacketProcessor;
//! use flowprint_core::protocol::SelectorConfig;
//!
//! let mut processor = PacketProcessor::new(SelectorConfig::default(), None);
//! let mut record = vec![0u8; 65536];
//!
//! // raw Ethernet frame bytes from a capture source
//! let frame: &[u8] = &[0u8; 64];
//! let len = processor.process_packet(Timestamp::new(0, 0), frame, &mut record);
//! assert_eq!(len, 0); // nothing fingerprintable in an empty frame
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                          flowprint-core                            |
//! +--------------------------------------------------------------------+
//! |  cursor/      - bounded byte reader with null-propagation          |
//! |  protocol/    - L2-L4 decode, app-layer handshake views, QUIC      |
//! |  crypto/      - HKDF-Expand-Label, AES-ECB mask, AES-GCM open      |
//! |  stream/      - TCP reassembly for split handshakes                |
//! |  flow/        - flow keys and first-packet tracking                |
//! |  fingerprint/ - canonical fingerprint strings, GREASE handling     |
//! |  analysis/    - naive-Bayes classifier, prevalence, ASN table      |
//! |  pkt_proc/    - per-packet worker pipeline                         |
//! |  output/      - JSON writer, SPSC rings, k-way merge thread        |
//! +--------------------------------------------------------------------+
//! ```
//!
//! Live capture, PCAP file I/O, CLI handling and resource-archive
//! decompression live in the surrounding application, not here.

pub mod analysis;
pub mod crypto;
pub mod cursor;
pub mod error;
pub mod fingerprint;
pub mod flow;
pub mod format;
pub mod output;
pub mod pkt_proc;
pub mod protocol;
pub mod stream;

pub use analysis::{
    AnalysisResult, Classifier, ClassifierConfig, FingerprintStatus, ResourceRecord,
};
pub use cursor::Cursor;
pub use error::{ArchiveError, Error, OutputError, Result};
pub use fingerprint::{Fingerprint, FingerprintType};
pub use flow::FlowKey;
pub use output::{
    Backpressure, LlqProducer, LlqQueue, OutputFile, OutputWriter, Timestamp, LLQ_DEPTH,
    LLQ_MAX_AGE,
};
pub use pkt_proc::PacketProcessor;
pub use protocol::{SelectorConfig, TrafficSelector};
pub use stream::TcpReassembler;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
