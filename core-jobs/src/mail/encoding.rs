//! Attachment encoding: base64 body lines and MIME types.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Encoded characters per body line.
pub const LINE_LENGTH: usize = 76;

/// Input bytes that encode to exactly one full line.
const BYTES_PER_LINE: usize = LINE_LENGTH / 4 * 3;

/// Streaming base64 encoder producing lines of [`LINE_LENGTH`] characters.
#[derive(Debug, Default)]
pub struct Base64Lines {
    pending: Vec<u8>,
}

impl Base64Lines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes `chunk` and returns every line that is now complete.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let full = self.pending.len() / BYTES_PER_LINE * BYTES_PER_LINE;
        let lines = self.pending[..full]
            .chunks(BYTES_PER_LINE)
            .map(|line| STANDARD.encode(line))
            .collect();
        self.pending.drain(..full);
        lines
    }

    /// Encodes what is left, padded, as a last (possibly short) line.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = STANDARD.encode(&self.pending);
        self.pending.clear();
        Some(line)
    }
}

/// Header value as written: printable ASCII is kept as is, anything else is
/// sent as an RFC 2047 `=?utf-8?B?...?=` encoded word.
///
/// Control characters never reach the header; the caller decides whether
/// to reject them first.
pub fn encode_header_value(value: &str) -> String {
    if value.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        value.to_string()
    } else {
        format!("=?utf-8?B?{}?=", STANDARD.encode(value.as_bytes()))
    }
}

/// Attachment name safe for a quoted header parameter: control characters
/// become `_` and double quotes become single quotes.
pub fn attachment_name(name: &str) -> String {
    let folded: String = name
        .chars()
        .map(|c| match c {
            c if c.is_control() => '_',
            '"' => '\'',
            c => c,
        })
        .collect();
    encode_header_value(&folded)
}

/// MIME type for a file name, `application/octet-stream` when unknown.
pub fn mime_type_for(name: &str) -> &'static str {
    let extension = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return "application/octet-stream",
    };

    match extension.as_str() {
        "txt" | "log" | "ini" | "cfg" => "text/plain",
        "htm" | "html" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "xml" => "text/xml",
        "js" => "application/javascript",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "tar" => "application/x-tar",
        "jar" => "application/java-archive",
        "rtf" => "application/rtf",
        "doc" => "application/msword",
        "xls" => "application/vnd.ms-excel",
        "ppt" => "application/vnd.ms-powerpoint",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "mp3" => "audio/mpeg",
        "wav" => "audio/x-wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "mpg" | "mpeg" => "video/mpeg",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_wrapped_at_76() {
        let data = vec![b'x'; 200];
        let mut encoder = Base64Lines::new();
        let mut lines = encoder.push(&data[..100]);
        lines.extend(encoder.push(&data[100..]));
        lines.extend(encoder.finish());

        assert_eq!(lines.len(), 4);
        assert!(lines[..3].iter().all(|line| line.len() == LINE_LENGTH));
        assert_eq!(lines.concat(), STANDARD.encode(&data));
    }

    #[test]
    fn test_final_line_is_padded() {
        let mut encoder = Base64Lines::new();
        assert!(encoder.push(b"hello").is_empty());
        assert_eq!(encoder.finish().as_deref(), Some("aGVsbG8="));
        assert_eq!(encoder.finish(), None);
    }

    #[test]
    fn test_header_values() {
        assert_eq!(encode_header_value("Quarterly report"), "Quarterly report");
        assert_eq!(encode_header_value("Café"), "=?utf-8?B?Q2Fmw6k=?=");
        assert!(!encode_header_value("Hi\r\nRSET").contains(['\r', '\n']));
    }

    #[test]
    fn test_attachment_names() {
        assert_eq!(attachment_name("notes.txt"), "notes.txt");
        assert_eq!(attachment_name("say \"hi\".txt"), "say 'hi'.txt");
        assert_eq!(attachment_name("a\r\n.\r\nQUIT.txt"), "a__.__QUIT.txt");
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(mime_type_for("report.PDF"), "application/pdf");
        assert_eq!(mime_type_for("photo.jpeg"), "image/jpeg");
        assert_eq!(mime_type_for("README"), "application/octet-stream");
        assert_eq!(mime_type_for(".bashrc"), "application/octet-stream");
        assert_eq!(mime_type_for("data.unknownext"), "application/octet-stream");
    }
}
