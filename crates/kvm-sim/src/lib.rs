//! KVM Device Simulation Library
//!
//! This crate provides protocol-accurate virtual switching devices for
//! testing the driver engine without physical hardware:
//!
//! - **VirtualMatrix**: a Blustream-class matrix with the fenced `STATUS`
//!   dump and `[SUCCESS]` routing confirmations
//! - **VirtualKvm**: a Startech-class single-output KVM with the `ERROR`
//!   handshake, boot banner, and `CH<n>` reports
//!
//! Both can be served over any `AsyncRead + AsyncWrite` stream, typically
//! one half of `tokio::io::duplex()` with a driver on the other half.
//!
//! # Example
//!
//! ```rust
//! use kvm_sim::VirtualMatrix;
//!
//! let mut matrix = VirtualMatrix::cmx44ab();
//! let replies = matrix.process_command("OUT01FR03");
//! assert_eq!(replies[0], "[SUCCESS]Set output 01 connect from input 03.");
//! assert_eq!(matrix.route(1), Some(3));
//! ```

pub mod io;
pub mod kvm;
pub mod matrix;

pub use io::{run_virtual_kvm, run_virtual_matrix};
pub use kvm::VirtualKvm;
pub use matrix::VirtualMatrix;
