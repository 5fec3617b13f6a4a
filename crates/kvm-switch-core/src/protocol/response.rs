//! Parsing of reply lines coming back from the switch.
//!
//! The device speaks in newline-terminated ASCII lines:
//!
//! - `s<output><code>` — status report: `<output>` is a single decimal
//!   digit (1-based output port) and `<code>` is the zero-based input
//!   code in decimal, so `s10` means OUT1 routes IN1 and `s23` means
//!   OUT2 routes IN4.  The same line serves as the acknowledgement for
//!   routing commands and as a spontaneous push when someone presses a
//!   front-panel button.
//! - `e…` — explicit rejection of the previous command (invalid input
//!   code, unsupported operation).
//!
//! Anything else is noise; callers are expected to log and skip it, the
//! way the device occasionally emits banner text on connect.

use thiserror::Error;

/// Errors produced while parsing a reply line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line was empty after trimming.
    #[error("empty line from device")]
    EmptyLine,

    /// The line does not start with a known reply marker.
    #[error("unrecognized reply line: {0:?}")]
    UnknownReply(String),

    /// A status line whose output or code fields are not digits.
    #[error("malformed status line: {0:?}")]
    MalformedStatus(String),
}

/// One parsed reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceReply {
    /// `s<output><code>`: `output` routes `input`, both 1-based.
    Status { output: u8, input: u8 },
    /// `e…`: the device refused the previous command.
    Rejected { detail: String },
}

/// Parses one reply line from the device.
///
/// Trailing CR/LF and surrounding whitespace are stripped first, since
/// the device terminates lines with `\r\n` but only `\n` is consumed by
/// line-oriented readers.
pub fn parse_line(line: &str) -> Result<DeviceReply, ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ProtocolError::EmptyLine);
    }

    if let Some(rest) = line.strip_prefix('s') {
        return parse_status(line, rest);
    }
    if line.starts_with('e') {
        return Ok(DeviceReply::Rejected {
            detail: line.to_string(),
        });
    }
    Err(ProtocolError::UnknownReply(line.to_string()))
}

fn parse_status(line: &str, rest: &str) -> Result<DeviceReply, ProtocolError> {
    // First character: the output port digit.  Remainder: the input
    // code in decimal (one digit on a 4-input switch, but larger
    // devices report two).
    let mut chars = rest.chars();
    let output = chars
        .next()
        .and_then(|c| c.to_digit(10))
        .ok_or_else(|| ProtocolError::MalformedStatus(line.to_string()))?;
    let code_digits = chars.as_str();
    if code_digits.is_empty() || !code_digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::MalformedStatus(line.to_string()));
    }
    let code: u8 = code_digits
        .parse()
        .map_err(|_| ProtocolError::MalformedStatus(line.to_string()))?;
    if output == 0 {
        return Err(ProtocolError::MalformedStatus(line.to_string()));
    }
    // The wire carries the zero-based code; inputs are 1-based.
    let input = code
        .checked_add(1)
        .ok_or_else(|| ProtocolError::MalformedStatus(line.to_string()))?;

    Ok(DeviceReply::Status {
        output: output as u8,
        input,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line_decodes_output_and_input() {
        assert_eq!(
            parse_line("s10"),
            Ok(DeviceReply::Status { output: 1, input: 1 })
        );
        assert_eq!(
            parse_line("s23"),
            Ok(DeviceReply::Status { output: 2, input: 4 })
        );
        assert_eq!(
            parse_line("s41"),
            Ok(DeviceReply::Status { output: 4, input: 2 })
        );
    }

    #[test]
    fn test_status_line_tolerates_crlf_and_whitespace() {
        assert_eq!(
            parse_line("s12\r\n"),
            Ok(DeviceReply::Status { output: 1, input: 3 })
        );
        assert_eq!(
            parse_line("  s12  "),
            Ok(DeviceReply::Status { output: 1, input: 3 })
        );
    }

    #[test]
    fn test_multi_digit_code_is_accepted() {
        // Larger switches report two-digit input codes.
        assert_eq!(
            parse_line("s112"),
            Ok(DeviceReply::Status { output: 1, input: 13 })
        );
    }

    #[test]
    fn test_rejection_line() {
        assert_eq!(
            parse_line("e01\r\n"),
            Ok(DeviceReply::Rejected {
                detail: "e01".to_string()
            })
        );
    }

    #[test]
    fn test_empty_line() {
        assert_eq!(parse_line("\r\n"), Err(ProtocolError::EmptyLine));
        assert_eq!(parse_line(""), Err(ProtocolError::EmptyLine));
    }

    #[test]
    fn test_unknown_reply() {
        assert_eq!(
            parse_line("hello"),
            Err(ProtocolError::UnknownReply("hello".to_string()))
        );
    }

    #[test]
    fn test_malformed_status_lines() {
        assert!(matches!(
            parse_line("sx9"),
            Err(ProtocolError::MalformedStatus(_))
        ));
        assert!(matches!(
            parse_line("s1"),
            Err(ProtocolError::MalformedStatus(_))
        ));
        assert!(matches!(
            parse_line("s1x"),
            Err(ProtocolError::MalformedStatus(_))
        ));
        assert!(matches!(
            parse_line("s01"),
            Err(ProtocolError::MalformedStatus(_))
        ));
    }
}
