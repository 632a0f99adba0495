use crate::prelude::*;
use crate::pylontech::decoder::{ConsoleDecoder, Frame};

use {
    async_trait::async_trait,
    futures::StreamExt,
    net2::TcpStreamExt,
    std::time::Duration,
    tokio::io::AsyncWriteExt,
    tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    tokio_util::codec::FramedRead,
};

const WRITE_TIMEOUT_SECS: u64 = 2;
const TCP_KEEPALIVE_SECS: u64 = 60;
const MAX_RESPONSE_SIZE: usize = 65536;

/// A console session, one command in flight at a time.
#[async_trait]
pub trait Console: Send {
    async fn connect(&mut self) -> Result<(), TransportError>;

    async fn send(&mut self, command: Command) -> Result<(), TransportError>;

    /// Every non-empty line up to the next prompt, echo included.
    async fn read_response(&mut self) -> Result<Vec<String>, TransportError>;

    async fn disconnect(&mut self);

    async fn execute(&mut self, command: Command) -> Result<Vec<String>, TransportError> {
        self.send(command).await?;
        self.read_response().await
    }
}

// TcpConsole {{{
pub struct TcpConsole {
    config: config::Bms,
    reader: Option<FramedRead<OwnedReadHalf, ConsoleDecoder>>,
    writer: Option<OwnedWriteHalf>,
}

impl TcpConsole {
    pub fn new(config: config::Bms) -> Self {
        Self {
            config,
            reader: None,
            writer: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }
}

#[async_trait]
impl Console for TcpConsole {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let addr = self.config.addr();
        let timeout = self.config.connect_timeout();

        debug!("connecting to BMS console at {}", addr);

        let stream = match tokio::time::timeout(
            timeout,
            tokio::net::TcpStream::connect((self.config.host(), self.config.port())),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(TransportError::Connect { addr, source }),
            Err(_) => return Err(TransportError::ConnectTimeout { addr, timeout }),
        };

        let stream = if self.config.use_tcp_keepalive() {
            let std_stream = stream.into_std()?;
            if let Err(e) = std_stream.set_keepalive(Some(Duration::new(TCP_KEEPALIVE_SECS, 0))) {
                warn!("Failed to set TCP keepalive: {}", e);
            }
            tokio::net::TcpStream::from_std(std_stream)?
        } else {
            stream
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        let (reader, writer) = stream.into_split();
        self.reader = Some(FramedRead::new(reader, ConsoleDecoder::new()));
        self.writer = Some(writer);

        debug!("BMS console {} connected", addr);

        Ok(())
    }

    async fn send(&mut self, command: Command) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::NotConnected)?;

        trace!("TX {:?}", command.as_str());

        let write = async {
            writer.write_all(&command.to_wire()).await?;
            writer.flush().await
        };

        match tokio::time::timeout(Duration::from_secs(WRITE_TIMEOUT_SECS), write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(TransportError::Write { command, source }),
            Err(_) => Err(TransportError::Write {
                command,
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "write timed out"),
            }),
        }
    }

    async fn read_response(&mut self) -> Result<Vec<String>, TransportError> {
        let reader = self.reader.as_mut().ok_or(TransportError::NotConnected)?;
        let timeout = self.config.read_timeout();

        let mut lines = Vec::new();
        let mut size = 0;

        loop {
            match tokio::time::timeout(timeout, reader.next()).await {
                Err(_) => return Err(TransportError::ReadTimeout(timeout)),
                Ok(None) => return Err(TransportError::Closed),
                Ok(Some(Err(e))) => return Err(e),
                // a leftover prompt from before our command was sent
                Ok(Some(Ok(Frame::Prompt))) if lines.is_empty() => continue,
                Ok(Some(Ok(Frame::Prompt))) => break,
                Ok(Some(Ok(Frame::Line(line)))) => {
                    size += line.len();
                    if size > MAX_RESPONSE_SIZE {
                        return Err(TransportError::Overflow(MAX_RESPONSE_SIZE));
                    }
                    trace!("RX {}", line);
                    lines.push(line);
                }
            }
        }

        Ok(lines)
    }

    async fn disconnect(&mut self) {
        self.reader = None;
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
            debug!("BMS console {} disconnected", self.config.addr());
        }
    }
} // }}}
