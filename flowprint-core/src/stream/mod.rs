//! TCP segment reassembly for handshakes that span packets.

mod reassembly;

pub use reassembly::{Reassembled, TcpReassembler, REASSEMBLY_BUF_LEN, REASSEMBLY_TIMEOUT};
