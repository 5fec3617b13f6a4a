//! # kvm-switch-core
//!
//! Shared library for the KVM switch integration containing the wire
//! protocol codec and the domain model.
//!
//! This crate is used by the integration runtime (`kvm-switch-link`).
//! It has zero dependencies on sockets, async runtimes, or any host
//! automation platform.
//!
//! # What is being modeled?
//!
//! A hardware KVM switch routes one of M input sources to each of its N
//! output ports, independently per output.  The device is controlled
//! over a TCP socket with a small line-oriented ASCII protocol:
//!
//! - **`protocol`** – How bytes travel over the wire.  Commands are
//!   short ASCII lines (`cir 0a\r\n`); the device answers with status
//!   lines (`s23`) that double as acknowledgements.
//!
//! - **`domain`** – Pure business logic with no I/O.  [`SwitchEndpoint`]
//!   describes the device's address and topology, and [`PortState`]
//!   tracks what one output port currently reports.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `kvm_switch_core::PortState` instead of the full module path.
pub use domain::endpoint::{DomainError, InputId, OutputId, SwitchEndpoint};
pub use domain::port_state::{PortState, Selection};
pub use protocol::command::{ProtocolOptions, StepDirection};
pub use protocol::response::{parse_line, DeviceReply, ProtocolError};
