//! Minimal SMTP client connection.

use async_trait::async_trait;
use core_runtime::MailConfig;
use core_vfs::{VfsError, VfsResult};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Opens the byte stream to the mail server.
#[async_trait]
pub trait SmtpConnector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn connect(&self, config: &MailConfig) -> VfsResult<Self::Stream>;
}

/// Plain TCP to `smtp_server:smtp_port`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl SmtpConnector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, config: &MailConfig) -> VfsResult<TcpStream> {
        let address = (config.smtp_server.as_str(), config.smtp_port);
        match timeout(config.io_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(VfsError::unavailable(&config.smtp_server, e.to_string())),
            Err(_) => Err(VfsError::unavailable(
                &config.smtp_server,
                "connection timed out",
            )),
        }
    }
}

/// A server reply: status code and text lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    pub fn is_error(&self) -> bool {
        self.code >= 400
    }

    pub fn text(&self) -> String {
        self.lines.join(" ")
    }
}

/// Line-oriented SMTP session over any byte stream.
pub struct SmtpConnection<S> {
    stream: BufStream<S>,
    server: String,
    io_timeout: Duration,
}

impl<S> SmtpConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps `stream` and reads the server greeting.
    pub async fn open(stream: S, server: impl Into<String>, io_timeout: Duration) -> VfsResult<Self> {
        let mut connection = Self {
            stream: BufStream::new(stream),
            server: server.into(),
            io_timeout,
        };
        let greeting = connection.read_reply().await?;
        connection.check(&greeting)?;
        debug!(server = %connection.server, code = greeting.code, "Connected to mail server");
        Ok(connection)
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Sends `command` and waits for a successful reply.
    pub async fn command(&mut self, command: &str) -> VfsResult<SmtpReply> {
        trace!(command, "SMTP >");
        self.send_line(command).await?;
        self.flush().await?;
        let reply = self.read_reply().await?;
        self.check(&reply)?;
        Ok(reply)
    }

    /// Writes one line of message data, dot-stuffed. Nothing is read back.
    ///
    /// A line break inside `line` is rejected before anything is written: it
    /// would let message text end the data section.
    pub async fn data_line(&mut self, line: &str) -> VfsResult<()> {
        if line.contains(['\r', '\n']) {
            return Err(VfsError::InvalidData(format!(
                "line break inside message data for {}",
                self.server
            )));
        }
        if line.starts_with('.') {
            self.send_raw(".").await?;
        }
        self.send_line(line).await
    }

    /// Writes message text, one data line per input line. `\n`, `\r\n` and
    /// a lone `\r` all end a line.
    pub async fn data_text(&mut self, text: &str) -> VfsResult<()> {
        for line in text.lines().flat_map(|line| line.split('\r')) {
            self.data_line(line).await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> VfsResult<()> {
        let result = timeout(self.io_timeout, self.stream.flush()).await;
        self.io_result(result)
    }

    /// Shuts the stream down. Errors are ignored: the session is over.
    pub async fn close(mut self) {
        let _ = timeout(self.io_timeout, self.stream.shutdown()).await;
        debug!(server = %self.server, "Closed mail server connection");
    }

    async fn send_line(&mut self, line: &str) -> VfsResult<()> {
        self.send_raw(line).await?;
        self.send_raw("\r\n").await
    }

    async fn send_raw(&mut self, text: &str) -> VfsResult<()> {
        let result = timeout(self.io_timeout, self.stream.write_all(text.as_bytes())).await;
        self.io_result(result)
    }

    async fn read_reply(&mut self) -> VfsResult<SmtpReply> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let read = timeout(self.io_timeout, self.stream.read_line(&mut line)).await;
            if self.io_result(read)? == 0 {
                return Err(VfsError::unavailable(
                    &self.server,
                    "connection closed by server",
                ));
            }

            let line = line.trim_end_matches(['\r', '\n']);
            trace!(line, "SMTP <");
            let code = line
                .get(..3)
                .and_then(|code| code.parse::<u16>().ok())
                .ok_or_else(|| {
                    VfsError::unavailable(&self.server, format!("malformed reply '{}'", line))
                })?;
            let last = line.as_bytes().get(3) != Some(&b'-');
            lines.push(line.get(4..).unwrap_or_default().to_string());

            if last {
                return Ok(SmtpReply { code, lines });
            }
        }
    }

    fn check(&self, reply: &SmtpReply) -> VfsResult<()> {
        if reply.is_error() {
            Err(VfsError::unavailable(
                &self.server,
                format!("{} {}", reply.code, reply.text()),
            ))
        } else {
            Ok(())
        }
    }

    fn io_result<T>(
        &self,
        result: Result<std::io::Result<T>, tokio::time::error::Elapsed>,
    ) -> VfsResult<T> {
        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(VfsError::unavailable(&self.server, e.to_string())),
            Err(_) => Err(VfsError::unavailable(&self.server, "mail server timed out")),
        }
    }
}
