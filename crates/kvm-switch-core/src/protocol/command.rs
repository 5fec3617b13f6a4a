//! Command encoding for the switch's line-oriented ASCII protocol.
//!
//! The device understands short ASCII lines of the form
//! `<verb> <code>\r\n`, where `<code>` is a single byte rendered as two
//! lowercase hex digits.  The routing code packs an output/input pair
//! into banks of eight:
//!
//! ```text
//! code = (output - 1) * 8 + (input - 1)
//! ```
//!
//! so `cir 00` selects IN1 on OUT1, `cir 0a` selects IN3 on OUT2, and
//! `cir 1b` selects IN4 on OUT4.
//!
//! Step commands ("next input" / "previous input") exist in the same
//! code space with offsets 6 and 5, but the firmware addresses them at
//! the *previous* output's bank, wrapping around: stepping OUT1 goes
//! through OUT4's bank (`cir 1e`), stepping OUT2 through OUT1's
//! (`cir 06`), and so on.
//!
//! The device's protocol is otherwise undocumented, so everything that
//! is plausibly firmware-specific — the verbs, the line terminator, the
//! bank stride — lives in [`ProtocolOptions`] rather than in constants.

use serde::{Deserialize, Serialize};

use crate::domain::endpoint::{InputId, OutputId};

/// Direction for a step ("cycle input") command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    /// Advance to the next input source.
    Next,
    /// Go back to the previous input source.
    Previous,
}

/// Configurable pieces of the wire protocol.
///
/// Defaults reproduce the observed firmware byte sequences.  Fields use
/// per-field serde defaults so a config file can override any single
/// knob without restating the rest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtocolOptions {
    /// Verb for routing and step commands.
    #[serde(default = "default_set_verb")]
    pub set_verb: String,
    /// Verb for the per-output status query.
    #[serde(default = "default_query_verb")]
    pub query_verb: String,
    /// Line terminator appended to every command.
    #[serde(default = "default_terminator")]
    pub terminator: String,
    /// Width of one output's code bank.
    #[serde(default = "default_bank_stride")]
    pub bank_stride: u8,
}

fn default_set_verb() -> String {
    "cir".to_string()
}
fn default_query_verb() -> String {
    "sta".to_string()
}
fn default_terminator() -> String {
    "\r\n".to_string()
}
fn default_bank_stride() -> u8 {
    8
}

impl Default for ProtocolOptions {
    fn default() -> Self {
        Self {
            set_verb: default_set_verb(),
            query_verb: default_query_verb(),
            terminator: default_terminator(),
            bank_stride: default_bank_stride(),
        }
    }
}

/// Encodes a routing command: route `input` to `output`.
pub fn encode_set(options: &ProtocolOptions, output: OutputId, input: InputId) -> String {
    let code = bank(options, output.get()) + u16::from(input.get() - 1);
    format!("{} {:02x}{}", options.set_verb, code, options.terminator)
}

/// Encodes a status query for one output.
///
/// The device answers with the same `s<output><code>` status line it
/// pushes after a routing change.
pub fn encode_query(options: &ProtocolOptions, output: OutputId) -> String {
    format!("{} {}{}", options.query_verb, output.get(), options.terminator)
}

/// Encodes a step command cycling `output` to its next or previous input.
///
/// `output_count` is needed because the firmware's step codes address
/// the previous output's bank with wraparound (see module docs).
pub fn encode_step(
    options: &ProtocolOptions,
    output_count: u8,
    output: OutputId,
    direction: StepDirection,
) -> String {
    let previous = if output.get() == 1 {
        output_count
    } else {
        output.get() - 1
    };
    let offset: u16 = match direction {
        StepDirection::Next => 6,
        StepDirection::Previous => 5,
    };
    let code = bank(options, previous) + offset;
    format!("{} {:02x}{}", options.set_verb, code, options.terminator)
}

// Widened so a topology too large for the one-byte code space encodes
// a multi-digit (device-refused) code instead of wrapping into a lower
// output's bank.  Configuration loading rejects such topologies.
fn bank(options: &ProtocolOptions, output: u8) -> u16 {
    u16::from(output - 1) * u16::from(options.bank_stride)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::endpoint::SwitchEndpoint;

    fn endpoint() -> SwitchEndpoint {
        SwitchEndpoint::new("10.0.0.10", 5000, 4, 4).unwrap()
    }

    fn opts() -> ProtocolOptions {
        ProtocolOptions::default()
    }

    /// The encoder must reproduce the device's documented byte
    /// sequences exactly; `6369722030300d0a` is ASCII `cir 00\r\n`.
    #[test]
    fn test_set_command_matches_known_firmware_bytes() {
        let ep = endpoint();
        let cmd = encode_set(&opts(), ep.output(1).unwrap(), ep.input(1).unwrap());
        assert_eq!(cmd.as_bytes(), b"\x63\x69\x72\x20\x30\x30\x0d\x0a");
    }

    #[test]
    fn test_set_command_bank_math() {
        let ep = endpoint();
        let case = |o, i| encode_set(&opts(), ep.output(o).unwrap(), ep.input(i).unwrap());
        assert_eq!(case(1, 2), "cir 01\r\n");
        assert_eq!(case(2, 1), "cir 08\r\n");
        assert_eq!(case(2, 3), "cir 0a\r\n");
        assert_eq!(case(3, 1), "cir 10\r\n");
        assert_eq!(case(4, 4), "cir 1b\r\n");
    }

    #[test]
    fn test_step_commands_address_previous_bank_with_wraparound() {
        let ep = endpoint();
        let step = |o, d| encode_step(&opts(), 4, ep.output(o).unwrap(), d);
        // OUT1 wraps around to OUT4's bank.
        assert_eq!(step(1, StepDirection::Next), "cir 1e\r\n");
        assert_eq!(step(1, StepDirection::Previous), "cir 1d\r\n");
        assert_eq!(step(2, StepDirection::Next), "cir 06\r\n");
        assert_eq!(step(3, StepDirection::Previous), "cir 0d\r\n");
        assert_eq!(step(4, StepDirection::Next), "cir 16\r\n");
    }

    #[test]
    fn test_query_uses_query_verb_and_decimal_output() {
        let ep = endpoint();
        let cmd = encode_query(&opts(), ep.output(2).unwrap());
        assert_eq!(cmd, "sta 2\r\n");
    }

    #[test]
    fn test_custom_options_are_honored() {
        let ep = endpoint();
        let custom = ProtocolOptions {
            set_verb: "route".to_string(),
            query_verb: "query".to_string(),
            terminator: "\n".to_string(),
            bank_stride: 16,
        };
        let cmd = encode_set(&custom, ep.output(2).unwrap(), ep.input(1).unwrap());
        assert_eq!(cmd, "route 10\n");
        assert_eq!(encode_query(&custom, ep.output(3).unwrap()), "query 3\n");
    }

    /// An output whose bank starts past `0xff` must encode a wider
    /// (device-refused) code rather than wrap into a lower bank and
    /// silently address the wrong port.
    #[test]
    fn test_oversized_banks_widen_instead_of_wrapping() {
        let ep = SwitchEndpoint::new("10.0.0.10", 5000, 40, 4).unwrap();
        let cmd = encode_set(&opts(), ep.output(33).unwrap(), ep.input(1).unwrap());
        assert_eq!(cmd, "cir 100\r\n");

        // Stepping OUT1 addresses OUT40's bank: 39 * 8 + 6 = 0x13e.
        let cmd = encode_step(&opts(), 40, ep.output(1).unwrap(), StepDirection::Next);
        assert_eq!(cmd, "cir 13e\r\n");
    }
}
