//! KVM Driver Engine
//!
//! This crate provides the driver layer for serial AV/KVM switching
//! hardware and the layout engine that routes edge-trigger events to it.
//!
//! # Architecture
//!
//! Each configured device gets one [`Driver`]: a handle over three tasks
//! that own the serial connection and the protocol state machine for that
//! device family. Tasks communicate only over channels; driver state has a
//! single writer (the processing task) and is observed through `watch`
//! snapshots, so there are no locks.
//!
//! - **Transport**: reassembles the byte stream into CRLF lines, drains an
//!   outbound command queue
//! - **Driver**: lifecycle (start / status / shutdown) plus one of two
//!   switching capabilities: matrix (output+input pair, blocks until the
//!   device confirms) or single-output (fire-and-forget channel select)
//! - **Registry**: short-name lookup over the fixed driver list
//! - **Layout**: static (computer, direction) → ordered action list, with
//!   dispatch through the registry
//!
//! # Example
//!
//! ```rust,no_run
//! use kvm_core::{AppContext, DeviceConfig, DeviceRegistry, Direction, Driver, Layout};
//! use kvm_protocol::DeviceFamily;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = DeviceRegistry::new();
//! registry.register(Driver::new(DeviceConfig {
//!     name: "Blustream".into(),
//!     short_name: "matrix".into(),
//!     family: DeviceFamily::Matrix,
//!     serial_path: "/dev/ttyUSB0".into(),
//!     baud_rate: 57_600,
//!     swap_timeout_ms: 5_000,
//!     settle_delay_ms: 500,
//! }))?;
//! registry.start_all();
//!
//! let context = AppContext::new(registry, Layout::default());
//! let _ = context.apply_edge_trigger("home-computer", Direction::Right).await;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod driver;
pub mod error;
pub mod layout;
pub mod registry;
pub mod transport;

pub use context::AppContext;
pub use driver::{DeviceConfig, Driver, DriverStatus, SwapOutcome};
pub use error::{DriverError, LayoutError, RegistryError};
pub use layout::{Action, Computer, Direction, Directions, Layout};
pub use registry::DeviceRegistry;
pub use transport::TransportEvent;
