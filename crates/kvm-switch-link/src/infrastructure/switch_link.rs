//! The Switch Link: TCP connection management and serialized
//! command/response exchanges with the physical KVM switch.
//!
//! # One request at a time
//!
//! The device's protocol is plain request/response with no multiplexing
//! and no sequence numbers, so the reply currently on the wire can only
//! be paired with the request most recently written.  All exchanges
//! therefore go through one `Mutex<Option<Conn>>`: a caller holds the
//! lock from the moment its command bytes are written until its status
//! line (or a timeout) arrives.  Port controllers calling in
//! concurrently simply queue on the lock.
//!
//! # Reconnect policy
//!
//! A failed exchange of transport kind (connect failure, timeout, or a
//! dropped socket) gets exactly one automatic reconnect-and-resend; the
//! second failure is surfaced to the caller, which decides whether to
//! retry further.  A device rejection is never retried — the transport
//! is fine, the command was refused.
//!
//! # Unsolicited status lines
//!
//! The switch pushes `s<output><code>` lines on its own when someone
//! presses a front-panel button.  Any status line read while awaiting a
//! different output's reply is published as a [`SwitchEvent`] on the
//! channel handed out by [`SwitchLink::new`], so the integration layer
//! can keep the other ports truthful instead of discarding the report.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use kvm_switch_core::protocol::{encode_query, encode_set, encode_step};
use kvm_switch_core::{
    parse_line, DeviceReply, InputId, OutputId, ProtocolOptions, StepDirection, SwitchEndpoint,
};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time;
use tracing::{debug, info, warn};

use crate::application::port_controller::InputRouting;

/// Errors surfaced by switch exchanges.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The TCP connection could not be established.
    #[error("failed to connect to switch at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// No acknowledgement arrived within the exchange timeout.
    #[error("no response from switch within {timeout:?}")]
    Timeout { timeout: Duration },

    /// The socket dropped mid-exchange.
    #[error("connection to switch lost: {source}")]
    Disconnected {
        #[source]
        source: io::Error,
    },

    /// The device explicitly refused the command.
    #[error("switch rejected command: {detail}")]
    DeviceRejected { detail: String },
}

impl LinkError {
    /// Whether this error indicates a transport problem (retried once
    /// by the link, counted toward unavailability by controllers) as
    /// opposed to an explicit device rejection.
    pub fn is_transport(&self) -> bool {
        !matches!(self, LinkError::DeviceRejected { .. })
    }
}

/// Events published by the link to the integration layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchEvent {
    /// A status line arrived for an output other than the one being
    /// awaited — typically a front-panel change.
    InputChanged { output: OutputId, input: InputId },
    /// The TCP connection was established.
    Connected,
    /// The TCP connection was lost or abandoned.
    Disconnected,
}

/// An established connection: buffered line reader plus write half.
struct Conn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Owns the single TCP connection to one physical KVM switch.
///
/// Shared by reference (`Arc`) across all port controllers; the
/// lifecycle is tied to integration setup/teardown, never ambient.
pub struct SwitchLink {
    endpoint: SwitchEndpoint,
    options: ProtocolOptions,
    connect_timeout: Duration,
    exchange_timeout: Duration,
    conn: Mutex<Option<Conn>>,
    event_tx: mpsc::Sender<SwitchEvent>,
}

impl SwitchLink {
    /// Creates a link (not yet connected) together with the receiver
    /// for its [`SwitchEvent`]s.
    pub fn new(
        endpoint: SwitchEndpoint,
        options: ProtocolOptions,
        connect_timeout: Duration,
        exchange_timeout: Duration,
    ) -> (Self, mpsc::Receiver<SwitchEvent>) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let link = Self {
            endpoint,
            options,
            connect_timeout,
            exchange_timeout,
            conn: Mutex::new(None),
            event_tx,
        };
        (link, event_rx)
    }

    /// The switch this link talks to.
    pub fn endpoint(&self) -> &SwitchEndpoint {
        &self.endpoint
    }

    /// Eagerly opens the TCP connection.
    ///
    /// Optional — every exchange connects on demand — but lets setup
    /// report an unreachable device before the first command.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Connect`] when the socket cannot be opened
    /// within the connect timeout.
    pub async fn connect(&self) -> Result<(), LinkError> {
        let mut slot = self.conn.lock().await;
        if slot.is_none() {
            *slot = Some(self.open_connection().await?);
        }
        Ok(())
    }

    /// Gracefully closes the connection at integration teardown.
    pub async fn disconnect(&self) {
        let mut slot = self.conn.lock().await;
        if let Some(mut conn) = slot.take() {
            let _ = conn.writer.shutdown().await;
            let _ = self.event_tx.try_send(SwitchEvent::Disconnected);
            info!("disconnected from KVM switch at {}", self.endpoint.addr());
        }
    }

    /// Routes `input` to `output`; returns the input the device
    /// acknowledged.
    ///
    /// Inputs merely beyond the switch's input count are sent anyway so
    /// the device can refuse them itself, but an input past the code
    /// bank stride would alias into the *next output's* bank and
    /// silently reroute the wrong port — those are refused here.
    pub async fn set_input(&self, output: OutputId, input: InputId) -> Result<InputId, LinkError> {
        if input.get() > self.options.bank_stride {
            return Err(LinkError::DeviceRejected {
                detail: format!("{input} exceeds the device's code bank"),
            });
        }
        let cmd = encode_set(&self.options, output, input);
        self.exchange(&cmd, output).await
    }

    /// Queries the input currently routed to `output`.
    pub async fn get_input(&self, output: OutputId) -> Result<InputId, LinkError> {
        let cmd = encode_query(&self.options, output);
        self.exchange(&cmd, output).await
    }

    /// Cycles `output` to its next or previous input; returns the
    /// input the device settled on.
    pub async fn step_input(
        &self,
        output: OutputId,
        direction: StepDirection,
    ) -> Result<InputId, LinkError> {
        let cmd = encode_step(&self.options, self.endpoint.output_count, output, direction);
        self.exchange(&cmd, output).await
    }

    /// Runs one exchange with the reconnect-once policy applied.
    async fn exchange(&self, command: &str, target: OutputId) -> Result<InputId, LinkError> {
        let mut slot = self.conn.lock().await;
        let first = self.try_exchange(&mut slot, command, target).await;
        match first {
            Err(err) if err.is_transport() => {
                warn!("exchange for {target} failed ({err}); reconnecting for one retry");
                self.try_exchange(&mut slot, command, target).await
            }
            result => result,
        }
    }

    /// One attempt: connect if needed, write the command, await the
    /// matching status line within the exchange timeout.
    ///
    /// On any transport failure the connection slot is cleared, both so
    /// the retry starts from a fresh socket and because a late reply on
    /// the old one would pair with the wrong request.
    async fn try_exchange(
        &self,
        slot: &mut Option<Conn>,
        command: &str,
        target: OutputId,
    ) -> Result<InputId, LinkError> {
        if slot.is_none() {
            *slot = Some(self.open_connection().await?);
        }
        let conn = match slot.as_mut() {
            Some(conn) => conn,
            None => {
                return Err(LinkError::Disconnected {
                    source: io::Error::new(io::ErrorKind::NotConnected, "connection slot empty"),
                })
            }
        };

        let outcome = time::timeout(
            self.exchange_timeout,
            self.drive_exchange(conn, command, target),
        )
        .await;
        match outcome {
            Ok(Ok(input)) => Ok(input),
            Ok(Err(err)) => {
                if err.is_transport() {
                    *slot = None;
                    let _ = self.event_tx.try_send(SwitchEvent::Disconnected);
                }
                Err(err)
            }
            Err(_elapsed) => {
                *slot = None;
                let _ = self.event_tx.try_send(SwitchEvent::Disconnected);
                Err(LinkError::Timeout {
                    timeout: self.exchange_timeout,
                })
            }
        }
    }

    /// Writes the command and reads lines until the status line for
    /// `target` or a rejection arrives.  Status lines for other outputs
    /// are published as events; noise lines are logged and skipped.
    async fn drive_exchange(
        &self,
        conn: &mut Conn,
        command: &str,
        target: OutputId,
    ) -> Result<InputId, LinkError> {
        conn.writer
            .write_all(command.as_bytes())
            .await
            .map_err(|source| LinkError::Disconnected { source })?;
        debug!("sent {:?}, awaiting status for {target}", command.trim_end());

        let mut line = String::new();
        loop {
            line.clear();
            let n = conn
                .reader
                .read_line(&mut line)
                .await
                .map_err(|source| LinkError::Disconnected { source })?;
            if n == 0 {
                return Err(LinkError::Disconnected {
                    source: io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "switch closed the connection",
                    ),
                });
            }
            if line.trim().is_empty() {
                continue;
            }

            match parse_line(&line) {
                Ok(DeviceReply::Status { output, input }) => {
                    let input = match InputId::new(input) {
                        Ok(input) => input,
                        Err(err) => {
                            warn!("status line with invalid input: {err}");
                            continue;
                        }
                    };
                    match self.endpoint.output(output) {
                        Ok(output) if output == target => {
                            debug!("{output} reports {input}");
                            return Ok(input);
                        }
                        Ok(output) => {
                            debug!("unsolicited status: {output} now routes {input}");
                            if self
                                .event_tx
                                .try_send(SwitchEvent::InputChanged { output, input })
                                .is_err()
                            {
                                warn!("event channel closed or full; dropped update for {output}");
                            }
                        }
                        Err(err) => warn!("status line for unconfigured output: {err}"),
                    }
                }
                Ok(DeviceReply::Rejected { detail }) => {
                    return Err(LinkError::DeviceRejected { detail })
                }
                Err(err) => warn!("ignoring unintelligible line from switch: {err}"),
            }
        }
    }

    async fn open_connection(&self) -> Result<Conn, LinkError> {
        let addr = self.endpoint.addr();
        let stream = match time::timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(LinkError::Connect { addr, source }),
            Err(_elapsed) => {
                return Err(LinkError::Connect {
                    addr,
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                })
            }
        };
        info!("connected to KVM switch at {addr}");
        let _ = self.event_tx.try_send(SwitchEvent::Connected);
        let (read_half, write_half) = stream.into_split();
        Ok(Conn {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }
}

#[async_trait]
impl InputRouting for SwitchLink {
    async fn set_input(&self, output: OutputId, input: InputId) -> Result<InputId, LinkError> {
        SwitchLink::set_input(self, output, input).await
    }

    async fn get_input(&self, output: OutputId) -> Result<InputId, LinkError> {
        SwitchLink::get_input(self, output).await
    }

    async fn step_input(
        &self,
        output: OutputId,
        direction: StepDirection,
    ) -> Result<InputId, LinkError> {
        SwitchLink::step_input(self, output, direction).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
//
// Network behavior (reconnect-once, serialization, timeouts) is covered
// by the integration tests in `tests/switch_link_integration.rs`, which
// run against a scripted fake device on a real TCP socket.
