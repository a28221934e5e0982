use crate::device::AnyDevice;
use fieldfuzz_core::config::{ConfigField, ProtocolConfig};
use fieldfuzz_core::error::FuzzResult;
use fieldfuzz_core::traits::{Transport, TransportKind};

/// Implements the `Transport` trait for TCP, one connection per message
pub mod tcp;

/// Implements the `Transport` trait for a serial line
pub mod serial;

pub use serial::SerialTransport;
pub use tcp::TcpTransport;

/// Config key of the target host
pub const DESTINATION_IP: &str = "Destination IP";
/// Config key of the target TCP port
pub const DESTINATION_PORT: &str = "Destination Port";
/// Config key of the serial device path
pub const SERIAL_PORT: &str = "Serial Port";
/// Config key of the serial baud rate
pub const BAUD_RATE: &str = "Baud Rate";
/// Config key of the serial read timeout in seconds
pub const SERIAL_TIMEOUT: &str = "Timeout";

/// Configuration fields of the I/O interface of `kind`. Protocols add these in front of
/// their own fields.
#[must_use]
pub fn io_config_fields(kind: TransportKind, default_tcp_port: u16) -> Vec<ConfigField> {
    match kind {
        TransportKind::Socket => vec![
            ConfigField::text(DESTINATION_IP, "host name or IP address of the target")
                .with_default("localhost"),
            ConfigField::int(DESTINATION_PORT, "TCP port of the target")
                .with_default(default_tcp_port)
                .with_range(0, u16::MAX),
        ],
        TransportKind::Serial => {
            let mut port = ConfigField::text(SERIAL_PORT, "serial device, e.g. /dev/ttyUSB0");
            if let Some(first) = serial::first_port() {
                port = port.with_default(first);
            }
            vec![
                port,
                ConfigField::int(BAUD_RATE, "baud rate")
                    .with_default(9600)
                    .with_range(1, u32::MAX),
                ConfigField::float(SERIAL_TIMEOUT, "seconds to wait for a reply")
                    .with_default(5)
                    .with_range(0, f64::MAX),
            ]
        }
    }
}

/// The transports of `DefaultRegistry`, selected by I/O interface name
pub enum AnyTransport {
    /// `TCP Socket`
    Tcp(TcpTransport<AnyDevice>),
    /// `Serial`
    Serial(SerialTransport<AnyDevice>),
}

impl AnyTransport {
    /// Unconfigured transport of `kind` reporting failures to `device`
    #[must_use]
    pub fn new(kind: TransportKind, device: AnyDevice) -> Self {
        match kind {
            TransportKind::Socket => AnyTransport::Tcp(TcpTransport::new(device)),
            TransportKind::Serial => AnyTransport::Serial(SerialTransport::new(device)),
        }
    }
}

impl Transport for AnyTransport {
    fn title(&self) -> String {
        match self {
            AnyTransport::Tcp(t) => t.title(),
            AnyTransport::Serial(t) => t.title(),
        }
    }

    fn kind(&self) -> TransportKind {
        match self {
            AnyTransport::Tcp(t) => t.kind(),
            AnyTransport::Serial(t) => t.kind(),
        }
    }

    async fn configure(&mut self, config: &ProtocolConfig) -> FuzzResult<()> {
        match self {
            AnyTransport::Tcp(t) => t.configure(config).await,
            AnyTransport::Serial(t) => t.configure(config).await,
        }
    }

    async fn teardown(&mut self) -> FuzzResult<()> {
        match self {
            AnyTransport::Tcp(t) => t.teardown().await,
            AnyTransport::Serial(t) => t.teardown().await,
        }
    }

    async fn transmit(&mut self, buf: &[u8], wait_for_reply: bool) -> Option<Vec<u8>> {
        match self {
            AnyTransport::Tcp(t) => t.transmit(buf, wait_for_reply).await,
            AnyTransport::Serial(t) => t.transmit(buf, wait_for_reply).await,
        }
    }

    async fn receive(&mut self) -> Option<Vec<u8>> {
        match self {
            AnyTransport::Tcp(t) => t.receive().await,
            AnyTransport::Serial(t) => t.receive().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcp_fields_carry_the_port_default() {
        let fields = io_config_fields(TransportKind::Socket, 8080);
        assert_eq!(fields[0].name, DESTINATION_IP);
        assert_eq!(fields[1].default, Some(8080.into()));
    }

    #[test]
    fn serial_fields() {
        let fields = io_config_fields(TransportKind::Serial, 502);
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec![SERIAL_PORT, BAUD_RATE, SERIAL_TIMEOUT]);
        assert_eq!(fields[1].default, Some(9600.into()));
    }
}
