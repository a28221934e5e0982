use crate::config::{ConfigSchema, ProtocolConfig};
use crate::error::{FuzzError, FuzzResult};
use crate::mutator::{FuzzRng, Mutator};
use crate::types::FuzzedMessage;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

/// The two kinds of I/O interfaces a job can talk over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// TCP stream socket, one connection per message
    #[serde(rename = "TCP Socket")]
    Socket,
    /// Serial line
    #[serde(rename = "Serial")]
    Serial,
}

impl TransportKind {
    /// Registered name of the I/O interface
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            TransportKind::Socket => "TCP Socket",
            TransportKind::Serial => "Serial",
        }
    }

    /// Inverse of `name`
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "TCP Socket" => Some(TransportKind::Socket),
            "Serial" => Some(TransportKind::Serial),
            _ => None,
        }
    }
}

impl Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A message type of a protocol and whether it is selected by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MessageEntry {
    /// message name as used in `JobConfig::msg_types`
    pub name: &'static str,
    /// false if the message does not apply to the queried transport
    pub enabled: bool,
}

/// Static description of a protocol. A single instance is shared by all jobs, so
/// everything that changes while fuzzing lives in the `ProtocolSession` it creates.
pub trait Protocol: Send + Sync {
    /// Registered protocol name
    fn name(&self) -> &'static str;

    /// Message catalogue. With a transport, messages that do not apply to it are
    /// reported as disabled.
    fn msg_names(&self, transport: Option<TransportKind>) -> Vec<MessageEntry>;

    /// Configuration fields required to fuzz `selected` messages over `transport`,
    /// including the fields of the I/O interface itself.
    /// # Errors
    fn config(&self, selected: &[String], transport: TransportKind) -> FuzzResult<ConfigSchema>;

    /// True if `validate` knows how to check frames of this message type
    fn validates(&self, _msg_name: &str) -> bool {
        false
    }

    /// Semantic check of an encoded frame. Returns false for invalid frames and for
    /// protocols without a validator.
    fn validate(&self, _raw: &[u8], _transport: TransportKind) -> bool {
        false
    }

    /// Creates the per-job state used to generate messages
    /// # Errors
    fn session(
        &self,
        config: &ProtocolConfig,
        transport: TransportKind,
    ) -> FuzzResult<Box<dyn ProtocolSession>>;
}

/// Per-job message generator of a protocol
pub trait ProtocolSession: Send {
    /// Called once per fuzz iteration before the first `fuzz_one`. Validation retries
    /// call `fuzz_one` again without a new `begin_iteration`.
    fn begin_iteration(&mut self) {}

    /// Generates a random instance of `msg_name`, framed for the wire
    /// # Errors
    fn fuzz_one(
        &mut self,
        msg_name: &str,
        mutator: &mut Mutator<FuzzRng>,
    ) -> FuzzResult<FuzzedMessage>;
}

/// Address of the system under test, handed to the device on failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP host and port
    Tcp {
        /// host name or ip
        host: String,
        /// tcp port
        port: u16,
    },
    /// Serial port path
    Serial {
        /// e.g. /dev/ttyUSB0
        port: String,
    },
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "{host}:{port}"),
            Endpoint::Serial { port } => write!(f, "{port}"),
        }
    }
}

/// Device specific knowledge about the system under test
pub trait Device: Send {
    /// Registered device name
    fn name(&self) -> &'static str;

    /// Called by a transport after sending failed. The transport reports "no reply"
    /// for the current message regardless of what the device does here.
    fn on_transport_failure(
        &mut self,
        endpoint: &Endpoint,
        err: &FuzzError,
    ) -> impl Future<Output = ()> + Send;
}

/// Transport layer to talk to the target
pub trait Transport: Send {
    /// Description of the configured interface, used in crash logs
    fn title(&self) -> String;

    /// Kind of this transport
    fn kind(&self) -> TransportKind;

    /// Reads the interface settings from the job configuration and opens the interface
    /// # Errors
    fn configure(
        &mut self,
        config: &ProtocolConfig,
    ) -> impl Future<Output = FuzzResult<()>> + Send;

    /// Releases the interface
    /// # Errors
    fn teardown(&mut self) -> impl Future<Output = FuzzResult<()>> + Send;

    /// Sends `buf` and, if `wait_for_reply`, waits for a reply.
    /// - `None` if no reply was requested, none arrived in time or the interface failed
    /// - `Some(vec![])` if the peer closed without data
    fn transmit(
        &mut self,
        buf: &[u8],
        wait_for_reply: bool,
    ) -> impl Future<Output = Option<Vec<u8>>> + Send;

    /// Reads whatever the target sends next
    fn receive(&mut self) -> impl Future<Output = Option<Vec<u8>>> + Send;
}

/// Immutable lookup tables of everything a job can be built from
pub trait Registry: Send + Sync + 'static {
    /// Transport type created for jobs
    type Transport: Transport + 'static;

    /// Names of all registered protocols
    fn protocol_names(&self) -> Vec<&'static str>;

    /// Protocol registered under `name`
    fn protocol(&self, name: &str) -> Option<Arc<dyn Protocol>>;

    /// Names of all registered I/O interfaces
    fn io_interface_names(&self) -> Vec<&'static str>;

    /// Kind of the I/O interface registered under `name`
    fn io_interface_kind(&self, name: &str) -> Option<TransportKind>;

    /// Names of all registered devices
    fn device_names(&self) -> Vec<&'static str>;

    /// Creates an unconfigured transport for `io_interface` wired to `device`
    /// # Errors
    /// Fails if either name is unknown.
    fn transport(&self, io_interface: &str, device: &str) -> FuzzResult<Self::Transport>;
}
