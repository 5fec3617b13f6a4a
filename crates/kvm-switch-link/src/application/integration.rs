//! Integration lifecycle: wiring the switch link to port controllers.
//!
//! [`SwitchIntegration::setup`] is the single entry point the host
//! platform calls with its configuration; [`SwitchIntegration::teardown`]
//! releases everything.  In between, the integration owns two
//! background tasks:
//!
//! - the **event pump**, which routes unsolicited status reports from
//!   the link to the matching port controller, and
//! - the optional **refresh loop**, which periodically re-reads every
//!   port so front-panel changes surface even when the host platform
//!   does not poll on its own.

use std::sync::Arc;
use std::time::Duration;

use kvm_switch_core::OutputId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::application::port_controller::{InputRouting, PortController, SelectorEntity};
use crate::domain::config::{ConfigError, IntegrationConfig};
use crate::infrastructure::switch_link::{LinkError, SwitchEvent, SwitchLink};

/// One running integration instance: a link to one physical switch and
/// a controller per output port.
pub struct SwitchIntegration {
    link: Arc<SwitchLink>,
    controllers: Vec<Arc<PortController>>,
    poll_interval: Duration,
    event_pump: JoinHandle<()>,
    refresh_loop: Option<JoinHandle<()>>,
}

impl SwitchIntegration {
    /// Builds the link and controllers from the host-supplied config,
    /// performs an initial status sweep, and starts the event pump.
    ///
    /// An unreachable device does not fail setup: every port simply
    /// starts out `Unknown`, and the host platform will see them become
    /// known once the switch answers a later command or refresh.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] only for an invalid configuration
    /// (e.g. a zero output count).
    pub async fn setup(config: IntegrationConfig) -> Result<Self, ConfigError> {
        let endpoint = config.endpoint()?;
        info!(
            "setting up KVM switch integration for {} ({} outputs, {} inputs)",
            endpoint.addr(),
            endpoint.output_count,
            endpoint.input_count
        );

        let (link, events) = SwitchLink::new(
            endpoint.clone(),
            config.protocol.clone(),
            config.connect_timeout(),
            config.exchange_timeout(),
        );
        let link = Arc::new(link);

        let controllers: Vec<Arc<PortController>> = endpoint
            .outputs()
            .map(|output| {
                Arc::new(PortController::new(
                    Arc::clone(&link) as Arc<dyn InputRouting>,
                    output,
                    endpoint.input_count,
                    config.unavailable_after,
                ))
            })
            .collect();

        initial_sweep(&controllers).await;

        let event_pump = spawn_event_pump(events, controllers.clone());

        Ok(Self {
            link,
            controllers,
            poll_interval: config.poll_interval(),
            event_pump,
            refresh_loop: None,
        })
    }

    /// The per-port controllers, in output order.
    pub fn controllers(&self) -> &[Arc<PortController>] {
        &self.controllers
    }

    /// Looks up the controller for one output port.
    pub fn controller(&self, output: OutputId) -> Option<&Arc<PortController>> {
        self.controllers.iter().find(|c| c.output() == output)
    }

    /// The controllers as host-facing selector entities.
    pub fn selectors(&self) -> Vec<Arc<dyn SelectorEntity>> {
        self.controllers
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn SelectorEntity>)
            .collect()
    }

    /// Starts the periodic refresh sweep at the configured interval.
    ///
    /// Does nothing when the interval is zero (hosts that poll entity
    /// state themselves) or when the loop is already running.
    pub fn spawn_refresh_loop(&mut self) {
        if self.poll_interval.is_zero() || self.refresh_loop.is_some() {
            return;
        }
        let controllers = self.controllers.clone();
        let interval = self.poll_interval;
        self.refresh_loop = Some(tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; setup already swept.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sweep(&controllers).await;
            }
        }));
    }

    /// Stops background tasks and closes the connection.
    pub async fn teardown(self) {
        if let Some(handle) = self.refresh_loop {
            handle.abort();
        }
        self.event_pump.abort();
        self.link.disconnect().await;
        info!("KVM switch integration torn down");
    }
}

async fn initial_sweep(controllers: &[Arc<PortController>]) {
    debug!("reading initial status for all output ports");
    sweep(controllers).await;
}

/// Refreshes every port once, tolerating failures.
///
/// A connect failure aborts the sweep early: with the device down,
/// every remaining port would just burn its own connect timeout.  The
/// skipped ports share the dead transport, so the failure is counted
/// against each of them too; otherwise only the first port would ever
/// accumulate enough consecutive failures to go unavailable.
async fn sweep(controllers: &[Arc<PortController>]) {
    for (idx, controller) in controllers.iter().enumerate() {
        if let Err(err) = controller.refresh().await {
            warn!("refresh for {} failed: {err}", controller.output());
            if matches!(err, LinkError::Connect { .. }) {
                for skipped in &controllers[idx + 1..] {
                    skipped.note_transport_failure(&err);
                }
                break;
            }
        }
    }
}

/// Routes link events to controllers until the channel closes.
fn spawn_event_pump(
    mut events: mpsc::Receiver<SwitchEvent>,
    controllers: Vec<Arc<PortController>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SwitchEvent::InputChanged { output, input } => {
                    match controllers.iter().find(|c| c.output() == output) {
                        Some(controller) => controller.apply_report(input),
                        None => warn!("status report for unmanaged output {output}"),
                    }
                }
                SwitchEvent::Connected => debug!("link reports connection established"),
                SwitchEvent::Disconnected => debug!("link reports connection lost"),
            }
        }
    })
}
