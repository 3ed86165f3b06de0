//! Sending files as e-mail attachments over SMTP.
//!
//! The dialogue is `HELO`, `MAIL FROM`, one `RCPT TO` per recipient, `DATA`,
//! a `multipart/mixed` message with a text part and one base64 part per
//! file, the closing boundary, `.` and `QUIT`.

pub mod encoding;
pub mod job;
pub mod recipients;
pub mod smtp;

pub use encoding::{mime_type_for, Base64Lines};
pub use job::{MailMessage, SendMailJob};
pub use recipients::{Recipient, RecipientList};
pub use smtp::{SmtpConnection, SmtpConnector, SmtpReply, TcpConnector};
