//! Sends the FileSet as attachments of one e-mail.

use super::encoding::{attachment_name, encode_header_value, mime_type_for, Base64Lines};
use super::recipients::RecipientList;
use super::smtp::{SmtpConnection, SmtpConnector, TcpConnector};
use crate::context::JobContext;
use crate::transfer::{transfer, ChunkSink, TransferOutcome};
use crate::variant::{FileContext, JobVariant, Traversal};
use crate::{JobError, Result};
use async_trait::async_trait;
use core_runtime::MailConfig;
use core_vfs::{FileHandle, ReadStream, ResourceLocator, VfsError, VfsResult};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Subject, body and recipients of the message.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub recipients: RecipientList,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    pub fn new(recipients: RecipientList, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipients,
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Mail-send job.
///
/// The SMTP connection is owned by the job: opened in `on_start`, closed
/// after `QUIT` in `on_complete`, or closed in `on_stop` on every other
/// path. It is taken out of its slot exactly once.
pub struct SendMailJob<C: SmtpConnector = TcpConnector> {
    config: MailConfig,
    message: MailMessage,
    connector: C,
    boundary: String,
    connection: Option<SmtpConnection<C::Stream>>,
    connected: bool,
}

impl SendMailJob<TcpConnector> {
    pub fn new(config: MailConfig, message: MailMessage) -> Result<Self> {
        Self::with_connector(config, message, TcpConnector)
    }
}

impl<C: SmtpConnector> SendMailJob<C> {
    /// # Errors
    ///
    /// Returns an error when the mail settings are incomplete, or when the
    /// subject or a header setting contains a line break.
    pub fn with_connector(config: MailConfig, message: MailMessage, connector: C) -> Result<Self> {
        config.validate()?;
        for (field, value) in [
            ("subject", message.subject.as_str()),
            ("sender name", config.sender_name.as_str()),
            ("sender address", config.sender_address.as_str()),
            ("HELO name", config.helo_name.as_str()),
        ] {
            if value.chars().any(|c| c.is_control()) {
                return Err(JobError::InvalidMessage(format!(
                    "{} contains control characters",
                    field
                )));
            }
        }
        Ok(Self {
            config,
            message,
            connector,
            boundary: format!("commander-{}", Uuid::new_v4().simple()),
            connection: None,
            connected: false,
        })
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    fn connection(&mut self) -> VfsResult<&mut SmtpConnection<C::Stream>> {
        let server = &self.config.smtp_server;
        self.connection
            .as_mut()
            .ok_or_else(|| VfsError::unavailable(server, "not connected"))
    }

    fn from_header(&self) -> String {
        if self.config.sender_name.is_empty() {
            format!("From: <{}>", self.config.sender_address)
        } else {
            format!(
                "From: {} <{}>",
                encode_header_value(&self.config.sender_name),
                self.config.sender_address
            )
        }
    }

    /// Envelope, message headers and the text part.
    async fn send_preamble(&mut self) -> VfsResult<()> {
        let helo = format!("HELO {}", self.config.helo_name);
        let mail_from = format!("MAIL FROM:<{}>", self.config.sender_address);
        let recipients: Vec<String> = self
            .message
            .recipients
            .addresses()
            .map(|address| format!("RCPT TO:<{}>", address))
            .collect();
        let headers = [
            "MIME-Version: 1.0".to_string(),
            format!("Subject: {}", encode_header_value(&self.message.subject)),
            self.from_header(),
            format!("To: {}", self.message.recipients.display()),
            format!("Content-Type: multipart/mixed; boundary=\"{}\"", self.boundary),
            String::new(),
            format!("--{}", self.boundary),
            "Content-Type: text/plain; charset=\"utf-8\"".to_string(),
            String::new(),
        ];
        let body = self.message.body.clone();

        let connection = self.connection()?;
        connection.command(&helo).await?;
        connection.command(&mail_from).await?;
        for rcpt in &recipients {
            connection.command(rcpt).await?;
        }
        connection.command("DATA").await?;
        for header in &headers {
            connection.data_line(header).await?;
        }
        connection.data_text(&body).await?;
        connection.data_line("").await
    }

    /// Sends one file as a base64 part.
    ///
    /// Failing to open the file leaves the message untouched and goes to the
    /// controller. Once the part headers are out, a failure would leave a
    /// truncated part in the message, so it interrupts the job instead.
    async fn send_attachment(&mut self, ctx: &JobContext, handle: &FileHandle) -> VfsResult<bool> {
        let mut reader = handle.open_read().await?;

        let result = self.write_attachment(ctx, handle, &mut reader).await;
        if let Err(e) = &result {
            if !ctx.is_cancelled() {
                warn!(file = %handle.locator(), error = %e, "Attachment failed after it was started");
                ctx.abort(format!("attachment {} was cut short: {}", handle.name(), e));
            }
        }
        result
    }

    async fn write_attachment(
        &mut self,
        ctx: &JobContext,
        handle: &FileHandle,
        reader: &mut ReadStream,
    ) -> VfsResult<bool> {
        let name = attachment_name(handle.name());
        let headers = [
            format!("--{}", self.boundary),
            format!(
                "Content-Type: {}; name=\"{}\"",
                mime_type_for(handle.name()),
                name
            ),
            format!("Content-Disposition: attachment; filename=\"{}\"", name),
            "Content-transfer-encoding: base64".to_string(),
            String::new(),
        ];

        let connection = self.connection()?;
        for header in &headers {
            connection.data_line(header).await?;
        }

        let mut sink = AttachmentSink {
            connection,
            encoder: Base64Lines::new(),
        };
        match transfer(ctx, handle.locator(), reader, &mut sink).await? {
            TransferOutcome::Completed(bytes) => {
                debug!(bytes, file = %handle.locator(), "Attachment sent");
                Ok(true)
            }
            TransferOutcome::Interrupted(_) => Ok(false),
        }
    }

    async fn send_closing(&mut self) -> VfsResult<()> {
        let closing = format!("--{}--", self.boundary);
        let connection = self.connection()?;
        connection.data_line(&closing).await?;
        connection.command(".").await?;
        connection.command("QUIT").await?;
        Ok(())
    }
}

/// Base64-encodes a transfer straight onto the connection.
struct AttachmentSink<'a, S> {
    connection: &'a mut SmtpConnection<S>,
    encoder: Base64Lines,
}

#[async_trait]
impl<'a, S> ChunkSink for AttachmentSink<'a, S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    async fn write_chunk(&mut self, chunk: &[u8]) -> VfsResult<()> {
        for line in self.encoder.push(chunk) {
            self.connection.data_line(&line).await?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> VfsResult<()> {
        if let Some(line) = self.encoder.finish() {
            self.connection.data_line(&line).await?;
        }
        self.connection.flush().await
    }
}

#[async_trait]
impl<C: SmtpConnector> JobVariant for SendMailJob<C> {
    fn name(&self) -> &'static str {
        "send-mail"
    }

    fn traversal(&self) -> Traversal {
        Traversal::FilesOnly
    }

    #[instrument(skip(self, _ctx), fields(server = %self.config.smtp_server))]
    async fn on_start(&mut self, _ctx: &JobContext) -> Result<()> {
        let stream = self.connector.connect(&self.config).await?;
        let connection =
            SmtpConnection::open(stream, self.config.smtp_server.clone(), self.config.io_timeout)
                .await?;
        self.connection = Some(connection);
        self.connected = true;
        info!(recipients = self.message.recipients.len(), "Connected to mail server");

        self.send_preamble().await?;
        Ok(())
    }

    async fn process_file(
        &mut self,
        ctx: &JobContext,
        handle: &FileHandle,
        _file: &FileContext,
    ) -> VfsResult<bool> {
        if ctx.is_cancelled() {
            return Ok(false);
        }
        self.send_attachment(ctx, handle).await
    }

    async fn on_stop(&mut self, _ctx: &JobContext) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
    }

    async fn on_complete(&mut self, _ctx: &JobContext) -> Result<()> {
        let result = self.send_closing().await;
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
        result.map_err(|e| {
            warn!(error = %e, "Mail server did not accept the message");
            JobError::Smtp(e.to_string())
        })
    }

    fn status_message(&self, ctx: &JobContext) -> String {
        if !self.connected {
            return format!("Connecting to {}", self.config.smtp_server);
        }
        match ctx.current_file_name() {
            Some(name) => format!("Sending {}", name),
            None => format!("Connected to {}", self.config.smtp_server),
        }
    }

    fn affects_folder(&self, _folder: &ResourceLocator) -> bool {
        false
    }
}
