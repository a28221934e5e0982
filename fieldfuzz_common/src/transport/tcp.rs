use crate::transport::{DESTINATION_IP, DESTINATION_PORT};
use fieldfuzz_core::config::ProtocolConfig;
use fieldfuzz_core::error::{FuzzError, FuzzResult};
use fieldfuzz_core::traits::{Device, Endpoint, Transport, TransportKind};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Config key of the reply timeout in seconds
pub const READ_TIMEOUT: &str = "timeout";
/// Config key of the receive buffer size
pub const BUFSIZE: &str = "bufsize";

/// Basic TCP client transport. Every message is sent over a new connection, the
/// previous one is closed when the next message is sent or on teardown.
pub struct TcpTransport<D> {
    device: D,
    host: String,
    port: u16,
    read_timeout: Duration,
    bufsize: usize,
    stream: Option<TcpStream>,
}

impl<D: Device> TcpTransport<D> {
    /// Create an unconfigured instance that reports failures to `device`
    pub fn new(device: D) -> Self {
        Self {
            device,
            host: "localhost".into(),
            port: 502,
            read_timeout: Duration::from_secs(5),
            bufsize: 1024,
            stream: None,
        }
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::Tcp {
            host: self.host.clone(),
            port: self.port,
        }
    }

    async fn read_reply(&mut self) -> FuzzResult<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(FuzzError::ConnectionFailed {
            err_msg: "tcp stream not connected".into(),
        })?;
        let mut buf = vec![0u8; self.bufsize];
        let n = timeout(self.read_timeout, stream.read(&mut buf)).await??;
        buf.truncate(n);
        Ok(buf)
    }

    async fn exchange(
        &mut self,
        buf: &[u8],
        wait_for_reply: bool,
    ) -> FuzzResult<Option<Vec<u8>>> {
        self.stream = None;
        let mut stream = connect(&self.host, self.port, self.read_timeout).await?;
        stream.write_all(buf).await?;
        self.stream = Some(stream);
        if !wait_for_reply {
            return Ok(None);
        }
        self.read_reply().await.map(Some)
    }
}

async fn connect(host: &str, port: u16, limit: Duration) -> FuzzResult<TcpStream> {
    let failed = |err: String| FuzzError::ConnectionFailed {
        err_msg: format!("{host}:{port} ({err})"),
    };
    let stream = timeout(limit, TcpStream::connect((host, port)))
        .await
        .map_err(|_| failed("connect timed out".into()))?
        .map_err(|err| failed(err.to_string()))?;
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

impl<D: Device> Transport for TcpTransport<D> {
    fn title(&self) -> String {
        format!("TCP {}:{}", self.host, self.port)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    async fn configure(&mut self, config: &ProtocolConfig) -> FuzzResult<()> {
        if let Some(host) = config.get_str(DESTINATION_IP) {
            self.host = host;
        }
        if let Some(port) = config.get_u64(DESTINATION_PORT)? {
            self.port = u16::try_from(port).map_err(|_| {
                FuzzError::invalid_config(format!("{DESTINATION_PORT} {port} is not a TCP port"))
            })?;
        }
        if let Some(read_timeout) = config.get_duration(READ_TIMEOUT)? {
            self.read_timeout = read_timeout;
        }
        if let Some(bufsize) = config.get_u64(BUFSIZE)? {
            self.bufsize = usize::try_from(bufsize)
                .map_err(|_| FuzzError::invalid_config(format!("{BUFSIZE} {bufsize} too large")))?
                .max(1);
        }

        // fail the job early if the target is not reachable at all
        drop(connect(&self.host, self.port, self.read_timeout).await?);
        tracing::info!("{} is reachable", self.title());
        Ok(())
    }

    async fn teardown(&mut self) -> FuzzResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    async fn transmit(&mut self, buf: &[u8], wait_for_reply: bool) -> Option<Vec<u8>> {
        match self.exchange(buf, wait_for_reply).await {
            Ok(reply) => {
                if let Some(reply) = &reply {
                    tracing::debug!("received {} bytes", reply.len());
                }
                reply
            }
            Err(FuzzError::Timeout { .. }) => {
                tracing::debug!("no reply within {:?}", self.read_timeout);
                None
            }
            Err(err) => {
                tracing::warn!("{}: {err}", self.title());
                let endpoint = self.endpoint();
                self.device.on_transport_failure(&endpoint, &err).await;
                None
            }
        }
    }

    async fn receive(&mut self) -> Option<Vec<u8>> {
        match self.read_reply().await {
            Ok(reply) => Some(reply),
            Err(err) => {
                tracing::debug!("receive failed: {err}");
                None
            }
        }
    }
}
