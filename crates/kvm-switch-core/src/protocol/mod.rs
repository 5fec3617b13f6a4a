//! Wire protocol module: command encoding and device reply parsing.

pub mod command;
pub mod response;

pub use command::{encode_query, encode_set, encode_step, ProtocolOptions, StepDirection};
pub use response::{parse_line, DeviceReply, ProtocolError};
