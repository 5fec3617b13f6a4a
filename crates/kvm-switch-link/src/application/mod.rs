//! Application layer: port controllers and the integration lifecycle.

pub mod integration;
pub mod port_controller;

pub use integration::SwitchIntegration;
pub use port_controller::{InputRouting, PortController, SelectError, SelectorEntity};
