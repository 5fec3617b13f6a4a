//! # kvm-switch-link
//!
//! Integration runtime for a TCP-controlled KVM switch: the network
//! link to the device, one controller per output port, and the
//! setup/teardown lifecycle that ties them together.
//!
//! # Architecture overview
//!
//! ```text
//! host automation platform
//!       ↕  SelectorEntity trait (select_option / current_option / is_available)
//! application/
//!   PortController     one per output port; truthful reported state
//!   SwitchIntegration  setup, event pump, periodic refresh, teardown
//!       ↕  InputRouting trait (set_input / get_input / step_input)
//! infrastructure/
//!   SwitchLink         owns the TCP connection, serializes exchanges,
//!                      reconnects once on transport failure
//!       ↕  ASCII line protocol (kvm-switch-core)
//! KVM switch hardware (default TCP port 5000)
//! ```
//!
//! The host platform is an external collaborator: it supplies an
//! [`IntegrationConfig`] at setup and drives the selectors through the
//! [`SelectorEntity`] contract.  Nothing in this crate registers
//! entities, renders UI, or persists state.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::integration::SwitchIntegration;
pub use application::port_controller::{InputRouting, PortController, SelectError, SelectorEntity};
pub use domain::config::{ConfigError, IntegrationConfig};
pub use infrastructure::switch_link::{LinkError, SwitchEvent, SwitchLink};
