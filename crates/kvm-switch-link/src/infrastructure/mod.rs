//! Infrastructure layer: the TCP link to the physical switch.

pub mod switch_link;

pub use switch_link::{LinkError, SwitchEvent, SwitchLink};
