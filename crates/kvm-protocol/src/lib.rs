//! KVM Protocol Library
//!
//! This crate provides parsing and encoding for the serial console protocols
//! spoken by AV/KVM switching hardware:
//!
//! - **Blustream matrix** (CMX44AB and friends): CRLF-delimited ASCII with a
//!   multi-line `STATUS` dump and unsolicited `[SUCCESS]` confirmations
//! - **Startech KVM** (SV431DVIUDDM and friends): CRLF-delimited ASCII with
//!   an `ERROR` handshake, a boot banner, and `CH<n>` channel reports
//!
//! # Architecture
//!
//! Each device module provides:
//! - A streaming state machine that consumes reassembled lines and yields
//!   events (confirmations, port changes, identification)
//! - Command composition for the device's switch operations
//!
//! Byte-stream reassembly is shared: [`LineCodec`] splits raw serial reads on
//! the CRLF terminator, buffering partial lines across reads. The state
//! machines are pure (no I/O), so the whole protocol layer is testable by
//! replaying captured console output.
//!
//! # Example
//!
//! ```rust
//! use kvm_protocol::blustream::{MatrixEvent, MatrixState};
//! use kvm_protocol::LineCodec;
//!
//! let mut codec = LineCodec::new();
//! let mut state = MatrixState::new();
//!
//! codec.push_bytes(b"[SUCCESS]Set output 01 connect from input 02.\r\n");
//! while let Some(line) = codec.next_line() {
//!     if let Some(MatrixEvent::SwapConfirmed { output, input }) = state.process_line(&line) {
//!         assert_eq!((output.as_str(), input.as_str()), ("01", "02"));
//!     }
//! }
//! ```

pub mod blustream;
pub mod error;
pub mod lines;
pub mod port;
pub mod startech;

pub use error::ParseError;
pub use lines::LineCodec;
pub use port::{is_active, InputPort, OutputPort};

/// Identifies which protocol family a device speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DeviceFamily {
    /// Matrix switch: many inputs, many outputs, any-to-any routing
    Matrix,
    /// Single-output switch: many inputs, one physical output
    Single,
}

impl DeviceFamily {
    /// Returns a human-readable name for the family
    pub fn name(&self) -> &'static str {
        match self {
            DeviceFamily::Matrix => "Matrix",
            DeviceFamily::Single => "Single-output",
        }
    }
}
