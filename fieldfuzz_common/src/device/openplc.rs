use fieldfuzz_core::error::FuzzError;
use fieldfuzz_core::traits::{Device, Endpoint};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// OpenPLC runtime. On transport failures it checks whether the Modbus server and the
/// web interface of the runtime still accept connections and logs what it finds.
///
/// Restarting the runtime through its web interface is left to the operator.
#[derive(Debug, Clone)]
pub struct OpenPlcDevice {
    web_port: u16,
    probe_timeout: Duration,
    failures: u64,
}

impl Default for OpenPlcDevice {
    fn default() -> Self {
        Self {
            web_port: 8080,
            probe_timeout: Duration::from_secs(5),
            failures: 0,
        }
    }
}

/// What the probes found out about the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnosis {
    /// Modbus server accepts connections again
    ModbusUp,
    /// web interface is up but the Modbus server is not, the PLC program stopped
    RuntimeStopped,
    /// neither port answers, the host or the runtime process is down
    Unreachable,
}

impl OpenPlcDevice {
    /// Registered name
    pub const NAME: &'static str = "open_plc";

    /// Probes a runtime with its web interface on `web_port`
    #[must_use]
    pub fn new(web_port: u16, probe_timeout: Duration) -> Self {
        Self {
            web_port,
            probe_timeout,
            failures: 0,
        }
    }

    /// Number of transport failures reported so far
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures
    }

    async fn accepts(&self, host: &str, port: u16) -> bool {
        matches!(
            timeout(self.probe_timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }

    /// Connects to the Modbus port and the web port of `host`
    pub async fn diagnose(&self, host: &str, modbus_port: u16) -> Diagnosis {
        if self.accepts(host, modbus_port).await {
            Diagnosis::ModbusUp
        } else if self.accepts(host, self.web_port).await {
            Diagnosis::RuntimeStopped
        } else {
            Diagnosis::Unreachable
        }
    }
}

impl Device for OpenPlcDevice {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn on_transport_failure(&mut self, endpoint: &Endpoint, err: &FuzzError) {
        self.failures += 1;
        tracing::warn!("OpenPLC at {endpoint} failed ({err}), failure #{}", self.failures);
        let Endpoint::Tcp { host, port } = endpoint else {
            tracing::warn!("OpenPLC on a serial line, restart the runtime manually");
            return;
        };
        match self.diagnose(host, *port).await {
            Diagnosis::ModbusUp => {
                tracing::info!("OpenPLC Modbus server on {host}:{port} is accepting connections");
            }
            Diagnosis::RuntimeStopped => tracing::warn!(
                "OpenPLC web interface on {host}:{} is up but Modbus is down, restart the PLC program",
                self.web_port
            ),
            Diagnosis::Unreachable => {
                tracing::error!("OpenPLC on {host} does not answer on Modbus nor on the web port");
            }
        }
    }
}
