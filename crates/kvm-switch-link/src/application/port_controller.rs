//! Port controllers: one per output port, keeping reported state
//! truthful and forwarding user selections to the switch link.
//!
//! Two trait seams live here:
//!
//! - [`InputRouting`] is what a controller needs from below — the
//!   switch link implements it, and unit tests mock it.
//! - [`SelectorEntity`] is what the host automation platform consumes
//!   from above: a discrete-choice control with named options, a
//!   current option, and an availability flag.  This is the explicit
//!   capability boundary; the host's own entity registration machinery
//!   stays on its side of it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use kvm_switch_core::{InputId, OutputId, PortState, StepDirection};
use thiserror::Error;
use tracing::{debug, warn};

use crate::infrastructure::switch_link::LinkError;

/// What a port controller requires from the switch side.
///
/// All calls are serialized on the wire by the implementation; callers
/// may invoke them from independent concurrent contexts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InputRouting: Send + Sync {
    /// Routes `input` to `output`; returns the acknowledged input.
    async fn set_input(&self, output: OutputId, input: InputId) -> Result<InputId, LinkError>;
    /// Queries the input currently routed to `output`.
    async fn get_input(&self, output: OutputId) -> Result<InputId, LinkError>;
    /// Cycles `output` one input forward or back; returns the result.
    async fn step_input(
        &self,
        output: OutputId,
        direction: StepDirection,
    ) -> Result<InputId, LinkError>;
}

/// Errors surfaced through the host-facing selector contract.
#[derive(Debug, Error)]
pub enum SelectError {
    /// The option label is not one this port offers.
    #[error("{0:?} is not one of this port's input options")]
    UnknownOption(String),

    /// The underlying exchange failed.
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// The selector contract consumed by the host automation platform.
///
/// One implementor per output port.  `select_option` may be invoked
/// concurrently across ports; state reads are cheap and synchronous.
#[async_trait]
pub trait SelectorEntity: Send + Sync {
    /// Human-readable entity name, e.g. `"OUT2 Source"`.
    fn name(&self) -> String;
    /// Stable identifier, e.g. `"kvm_select_out2"`.
    fn unique_id(&self) -> String;
    /// The selectable option labels, `IN1..=INM`.
    fn options(&self) -> Vec<String>;
    /// The currently reported option, if known.
    fn current_option(&self) -> Option<String>;
    /// Whether the port should be presented as reachable.
    fn is_available(&self) -> bool;
    /// Selects an option by label.
    async fn select_option(&self, option: &str) -> Result<(), SelectError>;
}

/// Controller for one output port.
///
/// Owns the port's [`PortState`]; shares the switch link by reference.
/// Reported state only changes on device-confirmed information — a
/// failed command leaves the previous selection untouched.
pub struct PortController {
    output: OutputId,
    input_count: u8,
    link: Arc<dyn InputRouting>,
    state: Mutex<PortState>,
    unavailable_after: u32,
}

impl PortController {
    pub fn new(
        link: Arc<dyn InputRouting>,
        output: OutputId,
        input_count: u8,
        unavailable_after: u32,
    ) -> Self {
        Self {
            output,
            input_count,
            link,
            state: Mutex::new(PortState::new(output)),
            unavailable_after,
        }
    }

    /// The output port this controller drives.
    pub fn output(&self) -> OutputId {
        self.output
    }

    /// The currently reported input, if known.
    pub fn current_input(&self) -> Option<InputId> {
        self.state().current_input()
    }

    /// Whether the port is currently reachable.
    pub fn is_available(&self) -> bool {
        self.state().is_available()
    }

    /// User-facing selection request.
    ///
    /// On success the device-acknowledged input becomes the reported
    /// state; on failure the prior state is kept and the error is
    /// propagated to the host's failure-reporting path.
    pub async fn select(&self, input: InputId) -> Result<(), LinkError> {
        match self.link.set_input(self.output, input).await {
            Ok(confirmed) => {
                debug!("{}: selection confirmed as {confirmed}", self.output);
                self.state().confirm_selection(confirmed);
                Ok(())
            }
            Err(err) => {
                warn!("{}: selecting {input} failed: {err}", self.output);
                self.note_transport_failure(&err);
                Err(err)
            }
        }
    }

    /// Re-reads the port's routing from the device.
    ///
    /// The device's answer is authoritative and overrides any locally
    /// assumed value (e.g. after a front-panel button press).
    pub async fn refresh(&self) -> Result<InputId, LinkError> {
        match self.link.get_input(self.output).await {
            Ok(input) => {
                self.state().apply_report(input);
                Ok(input)
            }
            Err(err) => {
                warn!("{}: refresh failed: {err}", self.output);
                self.note_transport_failure(&err);
                Err(err)
            }
        }
    }

    /// Cycles the port to its next or previous input source.
    pub async fn step(&self, direction: StepDirection) -> Result<InputId, LinkError> {
        match self.link.step_input(self.output, direction).await {
            Ok(input) => {
                debug!("{}: stepped to {input}", self.output);
                self.state().apply_report(input);
                Ok(input)
            }
            Err(err) => {
                warn!("{}: step failed: {err}", self.output);
                self.note_transport_failure(&err);
                Err(err)
            }
        }
    }

    /// Ingests an unsolicited status report from the event pump.
    pub fn apply_report(&self, input: InputId) {
        debug!("{}: device reports {input}", self.output);
        self.state().apply_report(input);
    }

    /// Counts a failed exchange against this port's availability.
    ///
    /// Also called by the sweep for ports it skipped after a connect
    /// failure, so an unreachable device degrades every port and not
    /// just the one whose refresh hit the dead transport.
    pub(crate) fn note_transport_failure(&self, err: &LinkError) {
        // A rejection proves the device is reachable; only transport
        // failures count toward unavailability.
        if !err.is_transport() {
            return;
        }
        let became_unavailable = self
            .state()
            .record_transport_failure(self.unavailable_after);
        if became_unavailable {
            warn!(
                "{} marked unavailable after {} consecutive transport failures",
                self.output, self.unavailable_after
            );
        }
    }

    fn state(&self) -> MutexGuard<'_, PortState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SelectorEntity for PortController {
    fn name(&self) -> String {
        format!("{} Source", self.output)
    }

    fn unique_id(&self) -> String {
        format!("kvm_select_out{}", self.output.get())
    }

    fn options(&self) -> Vec<String> {
        (1..=self.input_count).map(|i| format!("IN{i}")).collect()
    }

    fn current_option(&self) -> Option<String> {
        self.current_input().map(|input| input.to_string())
    }

    fn is_available(&self) -> bool {
        PortController::is_available(self)
    }

    async fn select_option(&self, option: &str) -> Result<(), SelectError> {
        let input = InputId::from_label(option)
            .filter(|input| input.get() <= self.input_count)
            .ok_or_else(|| SelectError::UnknownOption(option.to_string()))?;
        self.select(input).await?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use kvm_switch_core::SwitchEndpoint;
    use std::io;
    use std::time::Duration;

    fn output(n: u8) -> OutputId {
        SwitchEndpoint::new("h", 5000, 4, 4)
            .unwrap()
            .output(n)
            .unwrap()
    }

    fn input(n: u8) -> InputId {
        InputId::new(n).unwrap()
    }

    fn controller(mock: MockInputRouting) -> PortController {
        PortController::new(Arc::new(mock), output(2), 4, 3)
    }

    fn timeout_err() -> LinkError {
        LinkError::Timeout {
            timeout: Duration::from_secs(3),
        }
    }

    fn rejected_err() -> LinkError {
        LinkError::DeviceRejected {
            detail: "e01".to_string(),
        }
    }

    #[tokio::test]
    async fn test_select_success_updates_reported_state() {
        let mut mock = MockInputRouting::new();
        mock.expect_set_input()
            .withf(|o, i| o.get() == 2 && i.get() == 3)
            .returning(|_, i| Ok(i));

        let ctrl = controller(mock);
        ctrl.select(input(3)).await.unwrap();

        assert_eq!(ctrl.current_input(), Some(input(3)));
        assert!(ctrl.is_available());
    }

    #[tokio::test]
    async fn test_select_rejected_leaves_state_and_availability_intact() {
        let mut mock = MockInputRouting::new();
        mock.expect_get_input().returning(|_| Ok(input(2)));
        mock.expect_set_input().returning(|_, _| Err(rejected_err()));

        let ctrl = controller(mock);
        ctrl.refresh().await.unwrap();

        let err = ctrl.select(input(4)).await.unwrap_err();
        assert!(matches!(err, LinkError::DeviceRejected { .. }));
        assert_eq!(ctrl.current_input(), Some(input(2)), "prior state kept");
        assert!(ctrl.is_available(), "rejection proves the device is up");
    }

    #[tokio::test]
    async fn test_select_timeout_leaves_state_intact() {
        let mut mock = MockInputRouting::new();
        mock.expect_get_input().returning(|_| Ok(input(1)));
        mock.expect_set_input().returning(|_, _| Err(timeout_err()));

        let ctrl = controller(mock);
        ctrl.refresh().await.unwrap();

        let err = ctrl.select(input(2)).await.unwrap_err();
        assert!(matches!(err, LinkError::Timeout { .. }));
        assert_eq!(ctrl.current_input(), Some(input(1)));
    }

    #[tokio::test]
    async fn test_sustained_failures_mark_port_unavailable() {
        let mut mock = MockInputRouting::new();
        mock.expect_get_input().returning(|_| {
            Err(LinkError::Disconnected {
                source: io::Error::new(io::ErrorKind::UnexpectedEof, "gone"),
            })
        });

        let ctrl = controller(mock);
        for _ in 0..3 {
            let _ = ctrl.refresh().await;
        }

        assert!(!ctrl.is_available());
        assert_eq!(ctrl.current_input(), None, "knowledge dropped to unknown");
    }

    #[tokio::test]
    async fn test_refresh_overrides_assumed_selection() {
        let mut mock = MockInputRouting::new();
        mock.expect_set_input().returning(|_, i| Ok(i));
        // The device reports IN4 — someone pressed a front-panel button.
        mock.expect_get_input().returning(|_| Ok(input(4)));

        let ctrl = controller(mock);
        ctrl.select(input(1)).await.unwrap();
        assert_eq!(ctrl.current_input(), Some(input(1)));

        let reported = ctrl.refresh().await.unwrap();
        assert_eq!(reported, input(4));
        assert_eq!(ctrl.current_input(), Some(input(4)));
    }

    #[tokio::test]
    async fn test_refresh_success_restores_availability() {
        let mut mock = MockInputRouting::new();
        let mut fail = true;
        mock.expect_get_input().returning(move |_| {
            if fail {
                fail = false;
                Err(timeout_err())
            } else {
                Ok(input(2))
            }
        });

        let ctrl = PortController::new(Arc::new(mock), output(1), 4, 1);
        let _ = ctrl.refresh().await;
        assert!(!ctrl.is_available());

        ctrl.refresh().await.unwrap();
        assert!(ctrl.is_available());
        assert_eq!(ctrl.current_input(), Some(input(2)));
    }

    #[tokio::test]
    async fn test_step_applies_device_result() {
        let mut mock = MockInputRouting::new();
        mock.expect_step_input()
            .withf(|o, d| o.get() == 2 && *d == StepDirection::Next)
            .returning(|_, _| Ok(input(2)));

        let ctrl = controller(mock);
        let landed = ctrl.step(StepDirection::Next).await.unwrap();
        assert_eq!(landed, input(2));
        assert_eq!(ctrl.current_input(), Some(input(2)));
    }

    #[tokio::test]
    async fn test_apply_report_updates_state_without_network() {
        let ctrl = controller(MockInputRouting::new());
        ctrl.apply_report(input(3));
        assert_eq!(ctrl.current_input(), Some(input(3)));
    }

    // ── SelectorEntity contract ──

    #[test]
    fn test_entity_naming_follows_port_index() {
        let ctrl = controller(MockInputRouting::new());
        assert_eq!(ctrl.name(), "OUT2 Source");
        assert_eq!(ctrl.unique_id(), "kvm_select_out2");
    }

    #[test]
    fn test_options_enumerate_all_inputs() {
        let ctrl = controller(MockInputRouting::new());
        assert_eq!(ctrl.options(), vec!["IN1", "IN2", "IN3", "IN4"]);
    }

    #[test]
    fn test_current_option_reflects_state() {
        let ctrl = controller(MockInputRouting::new());
        assert_eq!(ctrl.current_option(), None);
        ctrl.apply_report(input(2));
        assert_eq!(ctrl.current_option(), Some("IN2".to_string()));
    }

    #[tokio::test]
    async fn test_select_option_maps_label_to_input() {
        let mut mock = MockInputRouting::new();
        mock.expect_set_input()
            .withf(|o, i| o.get() == 2 && i.get() == 4)
            .returning(|_, i| Ok(i));

        let ctrl = controller(mock);
        ctrl.select_option("IN4").await.unwrap();
        assert_eq!(ctrl.current_option(), Some("IN4".to_string()));
    }

    #[tokio::test]
    async fn test_select_option_rejects_unknown_labels_without_touching_the_wire() {
        // No expectations on the mock: any link call would panic.
        let ctrl = controller(MockInputRouting::new());

        let err = ctrl.select_option("HDMI2").await.unwrap_err();
        assert!(matches!(err, SelectError::UnknownOption(_)));

        // A well-formed label beyond this port's option list is equally unknown.
        let err = ctrl.select_option("IN9").await.unwrap_err();
        assert!(matches!(err, SelectError::UnknownOption(_)));
    }
}
