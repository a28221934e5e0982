use crate::transport::{BAUD_RATE, SERIAL_PORT, SERIAL_TIMEOUT};
use fieldfuzz_core::config::ProtocolConfig;
use fieldfuzz_core::error::{FuzzError, FuzzResult};
use fieldfuzz_core::traits::{Device, Endpoint, Transport, TransportKind};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

const READ_BUFSIZE: usize = 1024;

/// Name of the first serial port of this machine, used as configuration default
#[must_use]
pub fn first_port() -> Option<String> {
    tokio_serial::available_ports()
        .ok()?
        .into_iter()
        .next()
        .map(|port| port.port_name)
}

fn open(port: &str, baud_rate: u32, read_timeout: Duration) -> FuzzResult<SerialStream> {
    tokio_serial::new(port, baud_rate)
        .timeout(read_timeout)
        .open_native_async()
        .map_err(|err| FuzzError::ConnectionFailed {
            err_msg: format!("{port} ({err})"),
        })
}

/// Serial line transport. The port stays open for the whole job.
pub struct SerialTransport<D> {
    device: D,
    port: String,
    baud_rate: u32,
    read_timeout: Duration,
    stream: Option<SerialStream>,
}

impl<D: Device> SerialTransport<D> {
    /// Create an unconfigured instance that reports failures to `device`
    pub fn new(device: D) -> Self {
        Self {
            device,
            port: String::new(),
            baud_rate: 9600,
            read_timeout: Duration::from_secs(5),
            stream: None,
        }
    }

    async fn write(&mut self, buf: &[u8]) -> FuzzResult<()> {
        let stream = self.stream.as_mut().ok_or(FuzzError::TransporterWrite)?;
        stream.write_all(buf).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read(&mut self) -> FuzzResult<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(FuzzError::TransporterRead)?;
        let mut buf = vec![0u8; READ_BUFSIZE];
        let n = timeout(self.read_timeout, stream.read(&mut buf)).await??;
        buf.truncate(n);
        Ok(buf)
    }
}

impl<D: Device> Transport for SerialTransport<D> {
    fn title(&self) -> String {
        format!("Serial Port {}", self.port)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    async fn configure(&mut self, config: &ProtocolConfig) -> FuzzResult<()> {
        self.port = config
            .get_str(SERIAL_PORT)
            .ok_or_else(|| FuzzError::invalid_config(format!("missing value for `{SERIAL_PORT}`")))?;
        if let Some(baud_rate) = config.get_u64(BAUD_RATE)? {
            self.baud_rate = u32::try_from(baud_rate).map_err(|_| {
                FuzzError::invalid_config(format!("{BAUD_RATE} {baud_rate} is out of range"))
            })?;
        }
        if let Some(read_timeout) = config.get_duration(SERIAL_TIMEOUT)? {
            self.read_timeout = read_timeout;
        }
        self.stream = Some(open(&self.port, self.baud_rate, self.read_timeout)?);
        tracing::info!("opened {} at {} baud", self.port, self.baud_rate);
        Ok(())
    }

    async fn teardown(&mut self) -> FuzzResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.flush().await?;
        }
        Ok(())
    }

    async fn transmit(&mut self, buf: &[u8], wait_for_reply: bool) -> Option<Vec<u8>> {
        if let Err(err) = self.write(buf).await {
            tracing::warn!("{}: write failed: {err}", self.title());
            self.stream = None;
            match open(&self.port, self.baud_rate, self.read_timeout) {
                Ok(stream) => self.stream = Some(stream),
                Err(err) => {
                    let endpoint = Endpoint::Serial {
                        port: self.port.clone(),
                    };
                    self.device.on_transport_failure(&endpoint, &err).await;
                }
            }
            return None;
        }
        if !wait_for_reply {
            return None;
        }
        self.receive().await
    }

    async fn receive(&mut self) -> Option<Vec<u8>> {
        match self.read().await {
            Ok(reply) if !reply.is_empty() => Some(reply),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!("{}: no reply: {err}", self.title());
                None
            }
        }
    }
}
