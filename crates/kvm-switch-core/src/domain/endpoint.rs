//! Switch topology: the device endpoint and validated port indices.
//!
//! The KVM switch is described by a [`SwitchEndpoint`]: where it lives
//! on the network and how many outputs and inputs it has.  Output and
//! input indices are 1-based on the device's front panel and in its
//! protocol, so they are 1-based here too, wrapped in newtypes so a raw
//! `u8` can never be confused for a validated index.

use std::fmt;

use thiserror::Error;

/// Errors produced when constructing or validating domain values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// Port indices are 1-based; 0 never names a physical port.
    #[error("index 0 is not a valid 1-based port index")]
    ZeroIndex,

    /// The output index exceeds the switch's output count.
    #[error("output index {index} out of range 1..={count}")]
    OutputOutOfRange { index: u8, count: u8 },

    /// The input index exceeds the switch's input count.
    #[error("input index {index} out of range 1..={count}")]
    InputOutOfRange { index: u8, count: u8 },

    /// A switch with zero outputs or zero inputs cannot route anything.
    #[error("switch must have at least one output and one input")]
    EmptyTopology,
}

/// A 1-based output port index, e.g. `OUT2`.
///
/// Obtained from [`SwitchEndpoint::output`], which bounds-checks the
/// index against the configured output count.  Stable and unique per
/// port for the life of the integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(u8);

impl OutputId {
    /// Returns the raw 1-based index.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OUT{}", self.0)
    }
}

/// A 1-based input source index, e.g. `IN3`.
///
/// [`InputId::new`] only rejects index 0.  Bounding against the
/// switch's input count is done by [`SwitchEndpoint::input`]; the
/// select path deliberately skips that check so the device itself gets
/// to refuse an out-of-range input with an explicit rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputId(u8);

impl InputId {
    /// Creates an input index, rejecting only the invalid 0.
    pub fn new(index: u8) -> Result<Self, DomainError> {
        if index == 0 {
            return Err(DomainError::ZeroIndex);
        }
        Ok(Self(index))
    }

    /// Returns the raw 1-based index.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Parses a selector option label of the form `IN<n>`.
    ///
    /// Returns `None` for anything that is not an `IN`-prefixed
    /// positive integer (`"IN3"` → `InputId(3)`, `"HDMI"` → `None`).
    pub fn from_label(label: &str) -> Option<Self> {
        let digits = label.strip_prefix("IN")?;
        let index: u8 = digits.parse().ok()?;
        Self::new(index).ok()
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IN{}", self.0)
    }
}

/// Network address and topology of one physical KVM switch.
///
/// Immutable after configuration: created at integration setup, shared
/// read-only by every port controller, dropped at teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchEndpoint {
    /// Hostname or IP address of the switch.
    pub host: String,
    /// TCP control port.
    pub port: u16,
    /// Number of output ports (N).
    pub output_count: u8,
    /// Number of selectable input sources (M).
    pub input_count: u8,
}

impl SwitchEndpoint {
    /// Creates an endpoint, rejecting empty topologies.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        output_count: u8,
        input_count: u8,
    ) -> Result<Self, DomainError> {
        if output_count == 0 || input_count == 0 {
            return Err(DomainError::EmptyTopology);
        }
        Ok(Self {
            host: host.into(),
            port,
            output_count,
            input_count,
        })
    }

    /// The `host:port` string used to open the TCP connection.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates a 1-based output index against this switch's topology.
    pub fn output(&self, index: u8) -> Result<OutputId, DomainError> {
        if index == 0 {
            return Err(DomainError::ZeroIndex);
        }
        if index > self.output_count {
            return Err(DomainError::OutputOutOfRange {
                index,
                count: self.output_count,
            });
        }
        Ok(OutputId(index))
    }

    /// Iterates over all output ports, `OUT1..=OUTN`.
    pub fn outputs(&self) -> impl Iterator<Item = OutputId> {
        (1..=self.output_count).map(OutputId)
    }

    /// Validates a 1-based input index against this switch's topology.
    pub fn input(&self, index: u8) -> Result<InputId, DomainError> {
        if index == 0 {
            return Err(DomainError::ZeroIndex);
        }
        if index > self.input_count {
            return Err(DomainError::InputOutOfRange {
                index,
                count: self.input_count,
            });
        }
        Ok(InputId(index))
    }

    /// Iterates over all selectable inputs, `IN1..=INM`.
    pub fn inputs(&self) -> impl Iterator<Item = InputId> {
        (1..=self.input_count).map(InputId)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> SwitchEndpoint {
        SwitchEndpoint::new("10.0.0.10", 5000, 4, 4).unwrap()
    }

    #[test]
    fn test_addr_joins_host_and_port() {
        assert_eq!(endpoint().addr(), "10.0.0.10:5000");
    }

    #[test]
    fn test_zero_counts_are_rejected() {
        assert_eq!(
            SwitchEndpoint::new("h", 5000, 0, 4),
            Err(DomainError::EmptyTopology)
        );
        assert_eq!(
            SwitchEndpoint::new("h", 5000, 4, 0),
            Err(DomainError::EmptyTopology)
        );
    }

    #[test]
    fn test_output_accepts_full_range() {
        let ep = endpoint();
        for i in 1..=4 {
            assert_eq!(ep.output(i).unwrap().get(), i);
        }
    }

    #[test]
    fn test_output_rejects_zero_and_out_of_range() {
        let ep = endpoint();
        assert_eq!(ep.output(0), Err(DomainError::ZeroIndex));
        assert_eq!(
            ep.output(5),
            Err(DomainError::OutputOutOfRange { index: 5, count: 4 })
        );
    }

    #[test]
    fn test_input_rejects_out_of_range() {
        let ep = endpoint();
        assert_eq!(
            ep.input(9),
            Err(DomainError::InputOutOfRange { index: 9, count: 4 })
        );
    }

    #[test]
    fn test_outputs_iterates_in_order() {
        let ids: Vec<u8> = endpoint().outputs().map(OutputId::get).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_input_id_display_matches_option_labels() {
        let ep = endpoint();
        let labels: Vec<String> = ep.inputs().map(|i| i.to_string()).collect();
        assert_eq!(labels, vec!["IN1", "IN2", "IN3", "IN4"]);
    }

    #[test]
    fn test_input_id_from_label_round_trips() {
        let input = InputId::from_label("IN3").unwrap();
        assert_eq!(input.get(), 3);
        assert_eq!(input.to_string(), "IN3");
    }

    #[test]
    fn test_input_id_from_label_rejects_garbage() {
        assert!(InputId::from_label("HDMI1").is_none());
        assert!(InputId::from_label("IN0").is_none());
        assert!(InputId::from_label("IN").is_none());
        assert!(InputId::from_label("in2").is_none());
    }

    #[test]
    fn test_input_id_new_rejects_zero() {
        assert_eq!(InputId::new(0), Err(DomainError::ZeroIndex));
    }

    #[test]
    fn test_input_id_new_allows_indices_beyond_topology() {
        // The select path relies on being able to name an input the
        // device will reject, so `new` only guards against 0.
        assert!(InputId::new(9).is_ok());
    }
}
