//! Per-port selection state and its small state machine.
//!
//! Each output port tracks what the device last reported or confirmed:
//!
//! ```text
//! Unknown ──(refresh ok)──► Known(i) ──(select ok)──► Known(j)
//! ```
//!
//! Any failed operation keeps the prior selection.  Only sustained
//! unreachability — a configurable run of consecutive transport
//! failures — drops a port back to `Unknown` and marks it unavailable,
//! at which point the host platform should grey out the entity.

use crate::domain::endpoint::{InputId, OutputId};

/// What an output port is currently known to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// No successful read yet, or knowledge lost to unreachability.
    Unknown,
    /// The device confirmed this input, either as a command
    /// acknowledgement or in a status report.
    Known(InputId),
}

/// Mutable state for one output port.
///
/// The `output` field is unique per instance and never changes; the
/// selection and failure counter evolve as commands succeed or fail.
#[derive(Debug, Clone)]
pub struct PortState {
    output: OutputId,
    selection: Selection,
    consecutive_failures: u32,
    available: bool,
}

impl PortState {
    /// Creates the initial state: selection unknown, port available.
    pub fn new(output: OutputId) -> Self {
        Self {
            output,
            selection: Selection::Unknown,
            consecutive_failures: 0,
            available: true,
        }
    }

    /// The output port this state belongs to.
    pub fn output(&self) -> OutputId {
        self.output
    }

    /// Current selection, if known.
    pub fn current_input(&self) -> Option<InputId> {
        match self.selection {
            Selection::Known(input) => Some(input),
            Selection::Unknown => None,
        }
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Whether the port should be presented as reachable.
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Records a device-confirmed selection (acknowledged `select`).
    pub fn confirm_selection(&mut self, input: InputId) {
        self.mark_known(input);
    }

    /// Records an authoritative device report (refresh result or
    /// unsolicited status line).  Overrides any locally assumed value —
    /// the device wins, e.g. after a front-panel button press.
    pub fn apply_report(&mut self, input: InputId) {
        self.mark_known(input);
    }

    fn mark_known(&mut self, input: InputId) {
        self.selection = Selection::Known(input);
        self.consecutive_failures = 0;
        self.available = true;
    }

    /// Records a transport failure (connect error, timeout, drop).
    ///
    /// Prior selection is kept until `unavailable_after` consecutive
    /// failures accumulate; at that point the selection falls back to
    /// `Unknown` and the port becomes unavailable.  Returns `true` when
    /// this call is the one that crossed the threshold.
    pub fn record_transport_failure(&mut self, unavailable_after: u32) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.available && self.consecutive_failures >= unavailable_after {
            self.available = false;
            self.selection = Selection::Unknown;
            return true;
        }
        false
    }

    /// Consecutive transport failures since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
