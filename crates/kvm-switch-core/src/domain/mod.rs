//! Domain module: switch topology and per-port selection state.
//!
//! Everything in here is pure data and logic — no sockets, no clocks.

pub mod endpoint;
pub mod port_state;

pub use endpoint::{DomainError, InputId, OutputId, SwitchEndpoint};
pub use port_state::{PortState, Selection};
